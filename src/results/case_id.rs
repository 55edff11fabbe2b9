//! Dotted numeric test case identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A harness test case identifier such as `"1.2.3"`.
///
/// Only the canonical spelling parses: `"1.01.1"` is rejected so that no two
/// keys of a results document map to the same identifier.
///
/// Identifiers order by numeric segment, not by string: `2.3.1 < 2.10.1 <
/// 10.1.1`. A shorter identifier that is a prefix of a longer one sorts
/// first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaseId(Vec<u32>);

impl CaseId {
    /// Returns the numeric segments.
    #[must_use]
    pub fn segments(&self) -> &[u32] {
        &self.0
    }
}

/// Error returned when a string is not a dotted numeric path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCaseIdError {
    input: String,
}

impl fmt::Display for ParseCaseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid test case id {:?}", self.input)
    }
}

impl std::error::Error for ParseCaseIdError {}

impl FromStr for CaseId {
    type Err = ParseCaseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCaseIdError { input: s.to_string() };
        if s.is_empty() {
            return Err(err());
        }
        let segments = s
            .split('.')
            .map(|seg| {
                if seg.is_empty() || !seg.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(err());
                }
                if seg.len() > 1 && seg.starts_with('0') {
                    return Err(err());
                }
                seg.parse::<u32>().map_err(|_| err())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }
}

impl TryFrom<String> for CaseId {
    type Error = ParseCaseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CaseId> for String {
    fn from(id: CaseId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

/// Sorts case id strings numerically.
///
/// Strings that do not parse as [`CaseId`] sort after every valid id, in
/// lexical order among themselves.
pub fn sort_case_ids<S: AsRef<str>>(ids: &mut [S]) {
    ids.sort_by(|a, b| {
        let pa = a.as_ref().parse::<CaseId>();
        let pb = b.as_ref().parse::<CaseId>();
        match (pa, pb) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.as_ref().cmp(b.as_ref()),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn numeric_not_lexical_order() {
        let mut ids = vec!["10.1.1", "2.3.1", "2.10.1"];
        sort_case_ids(&mut ids);
        assert_eq!(ids, vec!["2.3.1", "2.10.1", "10.1.1"]);
    }

    #[test]
    fn parse_and_display() {
        let id: CaseId = "12.4.17".parse().unwrap();
        assert_eq!(id.segments(), &[12, 4, 17]);
        assert_eq!(id.to_string(), "12.4.17");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["", "1..2", ".1", "1.", "a.b.c", "1.-2.3", "1.2.3 ", "+1.2", "1.01.1", "00.1"] {
            assert!(bad.parse::<CaseId>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn zero_segment_is_canonical() {
        let id: CaseId = "0.10.0".parse().unwrap();
        assert_eq!(id.segments(), &[0, 10, 0]);
    }

    #[test]
    fn prefix_sorts_first() {
        let short: CaseId = "1.2".parse().unwrap();
        let long: CaseId = "1.2.1".parse().unwrap();
        assert!(short < long);
    }

    #[test]
    fn invalid_ids_sort_last() {
        let mut ids = vec!["zeta", "9.1.1", "alpha", "1.1.1"];
        sort_case_ids(&mut ids);
        assert_eq!(ids, vec!["1.1.1", "9.1.1", "alpha", "zeta"]);
    }

    #[test]
    fn serde_as_string() {
        let id: CaseId = serde_json::from_str("\"7.1.6\"").unwrap();
        assert_eq!(id.segments(), &[7, 1, 6]);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"7.1.6\"");
        assert!(serde_json::from_str::<CaseId>("\"7.x\"").is_err());
    }

    fn dotted(segments: &[u32]) -> String {
        segments.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
    }

    proptest! {
        #[test]
        fn order_matches_segment_order(a in prop::collection::vec(0u32..200, 3), b in prop::collection::vec(0u32..200, 3)) {
            let ia: CaseId = dotted(&a).parse().unwrap();
            let ib: CaseId = dotted(&b).parse().unwrap();
            prop_assert_eq!(ia.cmp(&ib), a.cmp(&b));
        }

        #[test]
        fn display_parse_is_identity(segs in prop::collection::vec(0u32..10_000, 1..5)) {
            let text = dotted(&segs);
            let id: CaseId = text.parse().unwrap();
            prop_assert_eq!(id.segments(), segs.as_slice());
            prop_assert_eq!(id.to_string(), text);
        }
    }
}
