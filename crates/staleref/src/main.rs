//
// main.rs
//
// One-shot workspace scan from the command line
//

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};

use staleref::config::{parse_config, StaleRefConfig};
use staleref::providers::{GitFileLister, MarkerCommentSpans};
use staleref::scan::{ScanProgress, ScanSession, WorkspaceOutcome, WorkspaceReport};
use staleref::tracker::GhClient;

fn print_usage() {
    println!(
        "staleref {}, finds comments that reference resolved issues.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: staleref [OPTIONS] [ROOT]

Scans every tracked file under ROOT (default: current directory).

Available options:

--config <FILE>              Read settings from the "staleref" section of a JSON file
--gh <PATH>                  Path to the gh executable (default: search PATH)
--json                       Print results as JSON
--no-pull-requests           Ignore pull request URLs
--quiet                      Do not print progress
--version                    Print the version
--help                       Print this help message

Set STALEREF_PERF=1 to log phase timings, RUST_LOG=debug for details.

"#
    );
}

struct Options {
    root: PathBuf,
    config_path: Option<PathBuf>,
    gh_path: Option<PathBuf>,
    json: bool,
    include_pull_requests: bool,
    quiet: bool,
}

fn load_config(options: &Options) -> anyhow::Result<StaleRefConfig> {
    let mut config = match &options.config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let settings: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", path.display()))?;
            parse_config(&settings).unwrap_or_else(|| {
                log::warn!("{} has no \"staleref\" section; using defaults", path.display());
                StaleRefConfig::default()
            })
        }
        None => StaleRefConfig::default(),
    };
    if !options.include_pull_requests {
        config.include_pull_requests = false;
    }
    Ok(config)
}

fn print_report(report: &WorkspaceReport) {
    for entry in &report.entries {
        let label = entry.tier.map(|t| t.as_str()).unwrap_or("unresolved");
        match (&entry.status, &entry.error) {
            (Some(status), _) => println!("{:<10} {}  {}", label, entry.key.display_url(), status.title),
            (None, Some(error)) => println!("{:<10} {}  ({})", label, entry.key.display_url(), error),
            (None, None) => println!("{:<10} {}", label, entry.key.display_url()),
        }
        for occurrence in &entry.occurrences {
            println!(
                "    {}:{}:{}  {}",
                occurrence.path.display(),
                occurrence.line,
                occurrence.start_column + 1,
                occurrence.comment_text.lines().next().unwrap_or("")
            );
        }
    }
    println!(
        "\n{} references to {} items in {} files ({} skipped)",
        report.references_found,
        report.entries.len(),
        report.files_scanned,
        report.files_skipped
    );
}

fn report_progress(progress: ScanProgress) {
    let mut stderr = std::io::stderr();
    let _ = write!(
        stderr,
        "\rScanned {}/{} files, {} references",
        progress.files_done, progress.files_total, progress.references_found
    );
    if progress.is_final() {
        let _ = writeln!(stderr);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut options = Options {
        root: PathBuf::from("."),
        config_path: None,
        gh_path: None,
        json: false,
        include_pull_requests: true,
        quiet: false,
    };

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--config" => {
                let path = argv.next().ok_or_else(|| anyhow!("--config requires a file"))?;
                options.config_path = Some(PathBuf::from(path));
            }
            "--gh" => {
                let path = argv.next().ok_or_else(|| anyhow!("--gh requires a path"))?;
                options.gh_path = Some(PathBuf::from(path));
            }
            "--json" => options.json = true,
            "--no-pull-requests" => options.include_pull_requests = false,
            "--quiet" => options.quiet = true,
            "--version" => {
                println!("staleref {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other if other.starts_with("--") => {
                return Err(anyhow!("Unknown argument: '{other}'"));
            }
            root => options.root = PathBuf::from(root),
        }
    }

    env_logger::init();

    let config = load_config(&options)?;
    let client = GhClient::new(options.gh_path.clone())
        .ok_or_else(|| anyhow!("gh executable not found; install the GitHub CLI or pass --gh"))?;
    log::info!("Resolving issue state with {}", client.gh_path().display());
    let root = options
        .root
        .canonicalize()
        .with_context(|| format!("cannot open {}", options.root.display()))?;

    let session = ScanSession::new(config, Arc::new(client), Arc::new(MarkerCommentSpans));
    let lister = GitFileLister::new(root);
    let quiet = options.quiet || options.json;

    let outcome = session
        .scan_workspace(&lister, |progress| {
            if !quiet {
                report_progress(progress);
            }
        })
        .await?;

    let report = match outcome {
        WorkspaceOutcome::Completed(report) => report,
        WorkspaceOutcome::Superseded => return Err(anyhow!("scan was interrupted")),
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}
