//! Results rendering.
//!
//! Turns a [`ResultsDocument`] into a per-implementation summary: run count,
//! counts per status category, and a case grid linking to per-case reports.
//! Cases are listed in numeric [`CaseId`](crate::CaseId) order.
//!
//! Presentation only. Two properties matter: counts are exact and ordering
//! is stable.

use crate::error::{Error, Result};
use crate::results::{Behavior, ResultsDocument, TestCase};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use std::fmt::Write;

/// Counts per status category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Cases run.
    pub total: usize,
    /// `OK` cases.
    pub passed: usize,
    /// Subset of `passed` whose close handshake was not clean.
    pub unclean_close: usize,
    /// `NON-STRICT` cases.
    pub non_strict: usize,
    /// `UNIMPLEMENTED` cases.
    pub unimplemented: usize,
    /// `FAILED` cases.
    pub failed: usize,
    /// `INFORMATIONAL` cases.
    pub informational: usize,
    /// Any other status.
    pub other: usize,
}

impl Counts {
    fn record(&mut self, case: &TestCase) {
        self.total += 1;
        match case.behavior {
            Behavior::Ok => {
                self.passed += 1;
                if !case.closed_cleanly() {
                    self.unclean_close += 1;
                }
            }
            Behavior::NonStrict => self.non_strict += 1,
            Behavior::Unimplemented => self.unimplemented += 1,
            Behavior::Failed => self.failed += 1,
            Behavior::Informational => self.informational += 1,
            Behavior::Other(_) => self.other += 1,
        }
    }

    fn add(&mut self, other: &Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.unclean_close += other.unclean_close;
        self.non_strict += other.non_strict;
        self.unimplemented += other.unimplemented;
        self.failed += other.failed;
        self.informational += other.informational;
        self.other += other.other;
    }
}

/// One grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRow {
    /// Dotted case id.
    pub id: String,
    /// Case status.
    pub behavior: String,
    /// Close handshake status.
    pub behavior_close: Option<String>,
    /// Per-case report file.
    pub report_file: Option<String>,
}

/// Summary of one implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    /// Implementation name.
    pub agent: String,
    /// Category counts.
    pub counts: Counts,
    /// Cases in numeric id order.
    pub cases: Vec<CaseRow>,
}

/// Summary of a whole results document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Per implementation, sorted by name.
    pub agents: Vec<AgentSummary>,
    /// Sum over all implementations.
    pub totals: Counts,
}

impl Summary {
    /// Builds the summary.
    #[must_use]
    pub fn from_document(doc: &ResultsDocument) -> Self {
        let mut summary = Self::default();
        for (agent, cases) in doc.iter() {
            let mut counts = Counts::default();
            let mut rows = Vec::with_capacity(cases.len());
            // AgentResults is keyed by CaseId, so iteration is numeric order.
            for (id, case) in cases {
                counts.record(case);
                rows.push(CaseRow {
                    id: id.to_string(),
                    behavior: case.behavior.to_string(),
                    behavior_close: case.behavior_close.as_ref().map(ToString::to_string),
                    report_file: case.report_file.clone(),
                });
            }
            summary.totals.add(&counts);
            summary.agents.push(AgentSummary {
                agent: agent.to_string(),
                counts,
                cases: rows,
            });
        }
        summary
    }
}

/// Renders the summary for a terminal.
#[must_use]
pub fn render_text(summary: &Summary) -> String {
    let mut out = String::new();
    if summary.agents.is_empty() {
        out.push_str("no results\n");
        return out;
    }
    for agent in &summary.agents {
        let c = &agent.counts;
        let _ = writeln!(out, "{}: {} cases", agent.agent, c.total);
        let _ = writeln!(out, "  passed         {:>5} ({} unclean close)", c.passed, c.unclean_close);
        let _ = writeln!(out, "  non-strict     {:>5}", c.non_strict);
        let _ = writeln!(out, "  unimplemented  {:>5}", c.unimplemented);
        let _ = writeln!(out, "  failed         {:>5}", c.failed);
        let _ = writeln!(out, "  informational  {:>5}", c.informational);
        if c.other > 0 {
            let _ = writeln!(out, "  other          {:>5}", c.other);
        }
        let failing: Vec<&str> = agent
            .cases
            .iter()
            .filter(|row| row.behavior == "FAILED")
            .map(|row| row.id.as_str())
            .collect();
        if !failing.is_empty() {
            let _ = writeln!(out, "  failing cases: {}", failing.join(", "));
        }
    }
    out
}

/// Options for [`render_html`].
#[derive(Debug, Clone, Default)]
pub struct HtmlOptions {
    /// Page title.
    pub title: String,
    /// Prefix joined to each report file name in links (e.g. `"server/"`).
    pub report_base: String,
    /// Timestamp shown in the footer.
    pub generated_at: Option<DateTime<Utc>>,
}

/// Renders a standalone HTML page.
///
/// Every interpolated value goes through the template engine's HTML
/// escaping.
pub fn render_html(summary: &Summary, options: &HtmlOptions) -> Result<String> {
    let title = if options.title.is_empty() {
        "Conformance results"
    } else {
        options.title.as_str()
    };
    let page = HtmlPage {
        title,
        agents: summary
            .agents
            .iter()
            .map(|agent| AgentView::new(agent, &options.report_base))
            .collect(),
        generated_at: options
            .generated_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
    };
    Handlebars::new()
        .render_template(HTML_TEMPLATE, &page)
        .map_err(|source| Error::Render { source })
}

#[derive(Serialize)]
struct HtmlPage<'a> {
    title: &'a str,
    agents: Vec<AgentView<'a>>,
    generated_at: Option<String>,
}

#[derive(Serialize)]
struct AgentView<'a> {
    agent: &'a str,
    counts: Vec<CountView>,
    cases: Vec<CaseView<'a>>,
}

#[derive(Serialize)]
struct CountView {
    label: &'static str,
    class: &'static str,
    count: usize,
}

#[derive(Serialize)]
struct CaseView<'a> {
    id: &'a str,
    class: &'static str,
    tip: String,
    href: Option<String>,
}

impl<'a> AgentView<'a> {
    fn new(agent: &'a AgentSummary, report_base: &str) -> Self {
        let c = &agent.counts;
        let counts = [
            ("total", "total", c.total),
            ("passed", "ok", c.passed),
            ("unclean close", "unclean", c.unclean_close),
            ("non-strict", "non-strict", c.non_strict),
            ("unimplemented", "unimplemented", c.unimplemented),
            ("failed", "failed", c.failed),
            ("informational", "informational", c.informational),
        ]
        .into_iter()
        .map(|(label, class, count)| CountView {
            label,
            class,
            count,
        })
        .collect();
        let cases = agent
            .cases
            .iter()
            .map(|row| CaseView {
                id: &row.id,
                class: status_class(&row.behavior),
                tip: match &row.behavior_close {
                    Some(close) => format!("{} / close {}", row.behavior, close),
                    None => row.behavior.clone(),
                },
                href: row.report_file.as_ref().map(|file| format!("{report_base}{file}")),
            })
            .collect();
        Self {
            agent: &agent.agent,
            counts,
            cases,
        }
    }
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>{{title}}</title>
<style>
body{font-family:sans-serif;margin:2em}
.counts{list-style:none;padding:0;display:flex;gap:1em}
.grid{display:flex;flex-wrap:wrap;gap:2px}
.case{display:inline-block;min-width:4em;padding:2px 4px;font-size:12px;text-decoration:none;color:#000}
.ok{background:#9f9}.non-strict{background:#ff9}.unimplemented{background:#ccc}
.failed{background:#f99}.informational{background:#9cf}.other{background:#fc9}.unclean{background:#fd8}
</style>
</head><body>
<h1>{{title}}</h1>
{{#each agents}}
<section class="agent">
<h2>{{agent}}</h2>
<ul class="counts">
{{#each counts}}
<li class="{{class}}">{{label}}: {{count}}</li>
{{/each}}
</ul>
<div class="grid">
{{#each cases}}
{{#if href}}
<a class="case {{class}}" href="{{href}}" title="{{tip}}">{{id}}</a>
{{else}}
<span class="case {{class}}" title="{{tip}}">{{id}}</span>
{{/if}}
{{/each}}
</div>
</section>
{{/each}}
{{#if generated_at}}
<footer>generated {{generated_at}}</footer>
{{/if}}
</body></html>
"#;

fn status_class(behavior: &str) -> &'static str {
    match behavior {
        "OK" => "ok",
        "NON-STRICT" => "non-strict",
        "UNIMPLEMENTED" => "unimplemented",
        "FAILED" => "failed",
        "INFORMATIONAL" => "informational",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::path::Path;

    fn document() -> ResultsDocument {
        ResultsDocument::from_value(&document_value(), Path::new("index.json")).unwrap()
    }

    fn document_value() -> serde_json::Value {
        json!({
            "rust-websocket": {
                "10.1.1": {"behavior": "OK", "behaviorClose": "OK", "reportfile": "rw_10_1_1.json"},
                "2.10.1": {"behavior": "FAILED", "behaviorClose": "FAILED", "reportfile": "rw_2_10_1.json"},
                "2.3.1": {"behavior": "OK", "behaviorClose": "UNCLEAN", "reportfile": "rw_2_3_1.json"},
                "6.4.3": {"behavior": "NON-STRICT", "behaviorClose": "OK"},
                "12.1.1": {"behavior": "UNIMPLEMENTED", "behaviorClose": "UNIMPLEMENTED"},
                "7.1.6": {"behavior": "INFORMATIONAL", "behaviorClose": "INFORMATIONAL"},
                "7.13.1": {"behavior": "WRONG CODE"}
            }
        })
    }

    #[test]
    fn counts_every_category() {
        let summary = Summary::from_document(&document());
        let c = summary.agents[0].counts;
        assert_eq!(c.total, 7);
        assert_eq!(c.passed, 2);
        assert_eq!(c.unclean_close, 1);
        assert_eq!(c.non_strict, 1);
        assert_eq!(c.unimplemented, 1);
        assert_eq!(c.failed, 1);
        assert_eq!(c.informational, 1);
        assert_eq!(c.other, 1);
        assert_eq!(summary.totals, c);
    }

    #[test]
    fn cases_sorted_numerically() {
        let summary = Summary::from_document(&document());
        let ids: Vec<&str> = summary.agents[0].cases.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2.3.1", "2.10.1", "6.4.3", "7.1.6", "7.13.1", "10.1.1", "12.1.1"]);
    }

    #[test]
    fn text_lists_failing_cases() {
        let text = render_text(&Summary::from_document(&document()));
        assert!(text.starts_with("rust-websocket: 7 cases"));
        assert!(text.contains("(1 unclean close)"));
        assert!(text.contains("failing cases: 2.10.1"));
        assert!(text.contains("other"));
    }

    #[test]
    fn empty_document_renders_placeholder() {
        assert_eq!(render_text(&Summary::default()), "no results\n");
    }

    #[test]
    fn html_links_reports_and_escapes() {
        let value = json!({
            "<script>": {"1.1.1": {"behavior": "OK", "reportfile": "a&b.json"}},
            "rust-websocket": document_value()["rust-websocket"].clone()
        });
        let doc = ResultsDocument::from_value(&value, Path::new("index.json")).unwrap();
        let options = HtmlOptions {
            title: "Server results".into(),
            report_base: "server/".into(),
            generated_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        };
        let html = render_html(&Summary::from_document(&doc), &options).unwrap();
        assert!(html.contains("<title>Server results</title>"));
        assert!(html.contains("href=\"server/rw_2_3_1.json\""));
        assert!(html.contains("<span class=\"case non-strict\""));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<h2><script>"));
        assert!(html.contains("server/a&amp;b.json"));
        assert!(html.contains("<li class=\"failed\">failed: 1</li>"));
        assert!(html.contains("generated 2024-05-01 12:00:00 UTC"));

        // Grid order follows numeric case order.
        let first = html.find(">2.3.1<").unwrap();
        let second = html.find(">2.10.1<").unwrap();
        let last = html.find(">10.1.1<").unwrap();
        assert!(first < second && second < last);
    }

    #[test]
    fn html_without_timestamp_has_no_footer() {
        let html = render_html(&Summary::from_document(&document()), &HtmlOptions::default()).unwrap();
        assert!(html.contains("<h1>Conformance results</h1>"));
        assert!(!html.contains("<footer>"));
    }
}
