//! wsconform: WebSocket conformance gate.
//!
//! Runs the Autobahn harness against a subject implementation and compares
//! the results with the committed baseline.
//!
//! # Quick Start
//!
//! ```bash
//! wsconform init --agent rust-websocket
//! wsconform server          # subject server vs harness fuzzingclient
//! wsconform client          # subject client vs harness fuzzingserver
//! wsconform verify --role server
//! wsconform render --role server --html autobahn/server.html
//! ```
//!
//! Exit codes: 0 pass, 64 regression, any other non-zero for
//! infrastructure or usage failures.

use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wsconform::config::{Config, DEFAULT_CONFIG_FILE};
use wsconform::gate::{self, GateOutcome};
use wsconform::harness_spec::HarnessSpec;
use wsconform::orchestrator::{InterruptFlag, Orchestrator};
use wsconform::render::{HtmlOptions, Summary, render_html, render_text};
use wsconform::results::ResultsDocument;
use wsconform::verify::{self, MatchResult, VerifyOptions};
use wsconform::{Error, Result, Role};

#[derive(Parser, Debug)]
#[command(
    name = "wsconform",
    version,
    about = "WebSocket conformance gate",
    long_about = "wsconform drives the Autobahn conformance harness against a subject\n\
        implementation and diffs the results against a committed baseline.\n\n\
        Exit codes: 0 = pass, 64 = regression, other non-zero = failure."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ./wsconform.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the subject as a server against the harness, then verify
    Server(GateArgs),

    /// Run the subject as a client against the harness, then verify
    Client(GateArgs),

    /// Compare results on disk against a baseline
    Verify(VerifyArgs),

    /// Summarize a results document
    Render(RenderArgs),

    /// Replace a role's baseline with its current results
    Bless(BlessArgs),

    /// Write default harness spec files
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct GateArgs {
    /// Collapse NON-STRICT into OK before comparing
    #[arg(long)]
    relax_non_strict: bool,

    /// Skip the free-port check before launching the listening side
    #[arg(long)]
    no_port_check: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Server,
    Client,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Server => Self::Server,
            RoleArg::Client => Self::Client,
        }
    }
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Use the conventional paths of this role
    #[arg(long, value_enum, conflicts_with_all = ["baseline", "fresh"])]
    role: Option<RoleArg>,

    /// Baseline results document
    #[arg(long, requires = "fresh")]
    baseline: Option<PathBuf>,

    /// Fresh results document
    #[arg(long, requires = "baseline")]
    fresh: Option<PathBuf>,

    /// Collapse NON-STRICT into OK before comparing
    #[arg(long)]
    relax_non_strict: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Use the conventional results path of this role
    #[arg(long, value_enum, conflicts_with = "input")]
    role: Option<RoleArg>,

    /// Results document to render
    #[arg(long)]
    input: Option<PathBuf>,

    /// Also write an HTML page to this path
    #[arg(long)]
    html: Option<PathBuf>,

    /// Page title for the HTML output
    #[arg(long, default_value = "Conformance results")]
    title: String,
}

#[derive(Args, Debug)]
struct BlessArgs {
    /// Role whose baseline is replaced
    #[arg(long, value_enum)]
    role: RoleArg,
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Implementation name recorded in the results
    #[arg(long, default_value = "rust-websocket")]
    agent: String,

    /// Port the subject server listens on
    #[arg(long, default_value_t = 9002)]
    subject_port: u16,

    /// Port the harness listens on in fuzzingserver mode
    #[arg(long, default_value_t = 9001)]
    harness_port: u16,

    /// Overwrite existing spec files
    #[arg(long)]
    force: bool,
}

// ---------------------------------------------------------------------------
// Gate (server / client)
// ---------------------------------------------------------------------------

fn cmd_gate(role: Role, args: GateArgs, mut config: Config, json: bool) -> Result<()> {
    if args.relax_non_strict {
        config.relax_non_strict = true;
    }
    let interrupt = InterruptFlag::install()?;
    let orchestrator = Orchestrator::from_config(&config)
        .with_interrupt(interrupt)
        .with_port_precheck(!args.no_port_check);

    let outcome = gate::run_gate(&config, role, &orchestrator)?;
    print_gate_outcome(&outcome, json)?;
    outcome.into_result().map(|_| ())
}

fn to_json<T: serde::Serialize>(value: &T, what: &'static str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|source| Error::Serialize { what, source })
}

fn print_gate_outcome(outcome: &GateOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", to_json(outcome, "gate outcome")?);
        return Ok(());
    }
    let status = if outcome.result.is_match() { "PASS" } else { "REGRESSION" };
    let mut lines = vec![
        format!("Role: {} [{}]", outcome.run.role, status),
        format!("Results: {}", outcome.run.results_path.display()),
        format!("Baseline: {}", outcome.baseline.display()),
        format!("Ready after: {}ms", outcome.run.ready_after.as_millis()),
        format!("Elapsed: {}s", outcome.run.elapsed.as_secs()),
    ];
    if outcome.relaxed {
        lines.push("NON-STRICT relaxed to OK".to_string());
    }
    if let MatchResult::Mismatch { diff } = &outcome.result {
        lines.push(format!("Affected cases: {}", diff.affected_cases().join(", ")));
    }
    println!("{}", lines.join("\n"));
    Ok(())
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

fn cmd_verify(args: VerifyArgs, config: &Config, json: bool) -> Result<()> {
    let options = VerifyOptions {
        relax_non_strict: args.relax_non_strict || config.relax_non_strict,
    };
    let (baseline, fresh) = match (args.baseline, args.fresh) {
        (Some(baseline), Some(fresh)) => (baseline, fresh),
        _ => {
            let role: Role = args.role.map_or(Role::Server, Role::from);
            (
                config.resolve(&config.role(role).baseline),
                gate::fresh_results_path(config, role)?,
            )
        }
    };

    let result = verify::verify_files(&baseline, &fresh, &options)?;
    if json {
        println!("{}", to_json(&result, "verify result")?);
    } else if result.is_match() {
        println!("{} matches {}", fresh.display(), baseline.display());
    } else {
        println!("{} differs from {}", fresh.display(), baseline.display());
    }
    result.into_result()
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

fn cmd_render(args: RenderArgs, config: &Config, json: bool) -> Result<()> {
    let input = match args.input {
        Some(path) => path,
        None => gate::fresh_results_path(config, args.role.map_or(Role::Server, Role::from))?,
    };
    let doc = ResultsDocument::load(&input)?;
    let summary = Summary::from_document(&doc);

    if json {
        println!("{}", to_json(&summary, "summary")?);
    } else {
        print!("{}", render_text(&summary));
    }

    if let Some(html_path) = args.html {
        let options = HtmlOptions {
            title: args.title,
            report_base: report_base(&input, &html_path),
            generated_at: Some(Utc::now()),
        };
        let html = render_html(&summary, &options)?;
        fs::write(&html_path, html)
            .map_err(|e| Error::io(format!("writing {}", html_path.display()), e))?;
        tracing::info!(path = %html_path.display(), "wrote html summary");
    }
    Ok(())
}

/// Link prefix from the HTML page to the per-case reports next to `input`.
fn report_base(input: &Path, html_path: &Path) -> String {
    let (Ok(input), Ok(html_path)) = (std::path::absolute(input), std::path::absolute(html_path))
    else {
        return String::new();
    };
    let results_dir = input.parent().unwrap_or_else(|| Path::new("/"));
    let html_dir = html_path.parent().unwrap_or_else(|| Path::new("/"));
    match results_dir.strip_prefix(html_dir) {
        Ok(rel) if rel.as_os_str().is_empty() => String::new(),
        Ok(rel) => format!("{}/", rel.display()),
        Err(_) => format!("file://{}/", results_dir.display()),
    }
}

// ---------------------------------------------------------------------------
// Bless / Init
// ---------------------------------------------------------------------------

fn cmd_bless(args: BlessArgs, config: &Config) -> Result<()> {
    let role = Role::from(args.role);
    let fresh = gate::fresh_results_path(config, role)?;
    let baseline = config.resolve(&config.role(role).baseline);
    verify::bless(&fresh, &baseline)?;
    println!("Baseline {} updated from {}", baseline.display(), fresh.display());
    Ok(())
}

fn cmd_init(args: InitArgs, config: &Config) -> Result<()> {
    let specs = [
        (
            config.resolve(&config.server.spec),
            HarnessSpec::default_client(&args.agent, args.subject_port, "autobahn/server"),
        ),
        (
            config.resolve(&config.client.spec),
            HarnessSpec::default_server(args.harness_port, "autobahn/client"),
        ),
    ];
    for (path, spec) in &specs {
        if path.exists() && !args.force {
            println!("{} exists; skipping (use --force to overwrite)", path.display());
            continue;
        }
        spec.write(path)?;
        println!("Wrote {} spec {}", spec.mode(), path.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    if cli.config.is_none() && Path::new(DEFAULT_CONFIG_FILE).is_file() {
        tracing::debug!("using {DEFAULT_CONFIG_FILE}");
    }

    match cli.command {
        Command::Server(args) => cmd_gate(Role::Server, args, config, cli.json),
        Command::Client(args) => cmd_gate(Role::Client, args, config, cli.json),
        Command::Verify(args) => cmd_verify(args, &config, cli.json),
        Command::Render(args) => cmd_render(args, &config, cli.json),
        Command::Bless(args) => cmd_bless(args, &config),
        Command::Init(args) => cmd_init(args, &config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                Error::Regression { diff } => {
                    eprintln!("Regression: results differ from baseline");
                    eprintln!("{diff}");
                }
                other => eprintln!("Error: {other}"),
            }
            ExitCode::from(err.exit_code())
        }
    }
}
