use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pdfmatch_core::manifest::{ArticleRecord, ManifestDocument, pdf_file, read_articles};
use pdfmatch_core::pdf::extract_or_degrade;
use pdfmatch_core::reconcile::new_run_dir;
use pdfmatch_core::{LopdfMetadataSource, MatchReport, MatcherConfig, Reconciler};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pdfmatch",
    about = "Attach journal-issue PDFs to the articles of their XML manifest",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting PDFMATCH_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a bundle and write the PDF references into its manifest.
    Match {
        bundle: PathBuf,
        /// Extraction directory (default: a fresh directory under the work root).
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Write an updated copy of the bundle here.
        #[arg(long)]
        repack: Option<PathBuf>,
        /// Keep PDF references already present in the manifest.
        #[arg(long)]
        keep_existing: bool,
        /// Exit with code 2 when any article stays unmatched.
        #[arg(long)]
        fail_on_unmatched: bool,
        /// Also write the JSON report to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the metadata recovered from PDF files.
    InspectPdf {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the article records read from a manifest.
    InspectManifest { manifest: PathBuf },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information.
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file location.
    Path,
    /// Write the default configuration.
    Init {
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

/// Exit code for a finished run that left articles unmatched.
const EXIT_UNMATCHED: u8 = 2;

fn main() -> Result<ExitCode> {
    let start = Instant::now();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let json_output = cli.json || std::env::var("PDFMATCH_JSON").as_deref() == Ok("1");
    let config_path = cli.config.clone().unwrap_or_else(MatcherConfig::config_path);
    tracing::debug!(config = %config_path.display(), "config location");

    match cli.command {
        // ── Match ──────────────────────────────────────────────────────────

        Commands::Match {
            bundle,
            work_dir,
            repack,
            keep_existing,
            fail_on_unmatched,
            report,
        } => {
            let mut config = load_config(&config_path)?;
            if keep_existing {
                config.run.cleanup_existing = false;
            }
            let work_dir = work_dir.unwrap_or_else(|| new_run_dir(&config.work_root()));

            let mut reconciler = Reconciler::new(config);
            if let Some(dest) = repack {
                reconciler = reconciler.with_repack(dest);
            }
            let run = reconciler
                .reconcile(&bundle, &work_dir)
                .with_context(|| format!("failed to reconcile {}", bundle.display()))?;

            if let Some(path) = &report {
                std::fs::write(path, run.report.to_json_pretty()?)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "processed_manifest": run.processed_path,
                        "manifest": run.manifest_path,
                        "repacked": run.repacked_path,
                        "report": run.report,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                print_report(&run.report);
                println!();
                println!("Manifest:  {}", run.processed_path.display());
                if let Some(path) = &run.repacked_path {
                    println!("Repacked:  {}", path.display());
                }
            }

            return Ok(ExitCode::from(match_exit_status(
                run.report.unmatched_articles,
                fail_on_unmatched,
            )));
        }

        // ── Inspect ────────────────────────────────────────────────────────

        Commands::InspectPdf { files } => {
            let config = load_config(&config_path)?;
            let source = LopdfMetadataSource::new(config.extraction.clone());

            let mut items = Vec::with_capacity(files.len());
            for file in &files {
                let name = display_name(file);
                let (metadata, warning) = extract_or_degrade(&source, file, &name);
                items.push((name, metadata, warning));
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                let data: Vec<_> = items
                    .iter()
                    .map(|(name, metadata, warning)| {
                        serde_json::json!({ "file": name, "metadata": metadata, "warning": warning })
                    })
                    .collect();
                print_json(&serde_json::json!({"status":"ok","data":data,"meta":{"duration_ms":dur}}))?;
            } else {
                for (name, metadata, warning) in &items {
                    println!("{name}  [{}]", metadata.extraction_quality.as_str());
                    println!("  title:   {}", metadata.title.as_deref().unwrap_or("-"));
                    println!("  authors: {}", or_dash(&metadata.authors.join("; ")));
                    println!("  doi:     {}", metadata.doi.as_deref().unwrap_or("-"));
                    println!("  edn:     {}", metadata.edn.as_deref().unwrap_or("-"));
                    if metadata.doi_candidates.len() > 1 {
                        println!("  other DOIs: {}", metadata.doi_candidates.join(", "));
                    }
                    if let Some(warning) = warning {
                        println!("  ! {warning}");
                    }
                }
            }
        }

        Commands::InspectManifest { manifest } => {
            let doc = ManifestDocument::load(&manifest)
                .with_context(|| format!("failed to read manifest {}", manifest.display()))?;
            let articles = read_articles(&doc)?;

            let dur = start.elapsed().as_millis();
            if json_output {
                let data: Vec<_> = articles
                    .iter()
                    .map(|article| {
                        serde_json::json!({
                            "article": article,
                            "pdf_file": pdf_file(&doc, article.node),
                        })
                    })
                    .collect();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": data, "total": articles.len() },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("{} articles", articles.len());
                for article in &articles {
                    print_article(&doc, article);
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(&config_path)?;
                if json_output {
                    print_json(&serde_json::json!({"status":"ok","data":config}))?;
                } else {
                    print!("{}", toml::to_string_pretty(&config)?);
                }
            }
            ConfigAction::Path => {
                let exists = config_path.exists();
                if json_output {
                    print_json(&serde_json::json!({
                        "status": "ok",
                        "data": { "path": config_path, "exists": exists }
                    }))?;
                } else if exists {
                    println!("{}", config_path.display());
                } else {
                    println!("{} (not found, using defaults)", config_path.display());
                }
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    eprintln!(
                        "Config already exists at {}. Add --force to overwrite.",
                        config_path.display()
                    );
                    return Ok(ExitCode::FAILURE);
                }
                MatcherConfig::default()
                    .save_to(&config_path)
                    .with_context(|| format!("failed to write {}", config_path.display()))?;
                if json_output {
                    print_json(&serde_json::json!({"status":"ok","data":{"written":config_path}}))?;
                } else {
                    println!("Wrote default config to {}", config_path.display());
                }
            }
        },

        // ── Version ────────────────────────────────────────────────────────

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"version":version}}))?;
            } else {
                println!("pdfmatch v{version}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn match_exit_status(unmatched: usize, fail_on_unmatched: bool) -> u8 {
    if fail_on_unmatched && unmatched > 0 {
        EXIT_UNMATCHED
    } else {
        0
    }
}

fn load_config(path: &Path) -> Result<MatcherConfig> {
    MatcherConfig::load_from(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let cut: String = value.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

fn print_report(report: &MatchReport) {
    for result in &report.results {
        let title = result.article_title.as_deref().unwrap_or("(untitled)");
        match &result.pdf_filename {
            Some(pdf) => println!(
                "{idx:>3}  {pdf:<28}  {method:<20}  {score:.3}  {conf:<6}  {title}",
                idx = result.article_index + 1,
                pdf = truncate(pdf, 28),
                method = result.method.as_str(),
                score = result.score,
                conf = result.confidence.as_str(),
                title = truncate(title, 50),
            ),
            None => println!(
                "{idx:>3}  {none:<28}  {reason:<20}  {score:.3}  {blank:<6}  {title}",
                idx = result.article_index + 1,
                none = "-",
                reason = result.reason.map(|r| r.as_str()).unwrap_or("unmatched"),
                score = result.score,
                blank = "",
                title = truncate(title, 50),
            ),
        }
    }

    if !report.warnings.is_empty() {
        println!();
        for warning in &report.warnings {
            println!("  ! {warning}");
        }
    }

    let t = &report.thresholds;
    if t.calibrated {
        println!();
        println!(
            "Thresholds calibrated from {} scores: high {:.2}, medium {:.2}",
            t.samples, t.high, t.medium
        );
    }
    println!();
    println!("{}", report.summary_line());
}

fn print_article(doc: &ManifestDocument, article: &ArticleRecord) {
    let pages = article
        .pages
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{idx:>3}  pages {pages:<9}  {title}",
        idx = article.index + 1,
        title = truncate(article.display_title().unwrap_or("(untitled)"), 60),
    );
    if let Some(doi) = &article.doi {
        println!("       doi  {doi}");
    }
    if let Some(edn) = &article.edn {
        println!("       edn  {edn}");
    }
    let surnames: Vec<&str> = article
        .author_surnames
        .both()
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect();
    if !surnames.is_empty() {
        println!("       by   {}", surnames.join(", "));
    }
    if let Some(pdf) = pdf_file(doc, article.node) {
        println!("       pdf  {pdf}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_articles_fail_only_when_asked() {
        assert_eq!(match_exit_status(3, true), EXIT_UNMATCHED);
        assert_eq!(match_exit_status(3, false), 0);
        assert_eq!(match_exit_status(0, true), 0);
    }

    #[test]
    fn cli_parses_match_flags() {
        let cli = Cli::try_parse_from([
            "pdfmatch",
            "match",
            "issue.zip",
            "--fail-on-unmatched",
            "--keep-existing",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Match { fail_on_unmatched: true, keep_existing: true, .. }
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Спектральный", 5), "Спек…");
        assert_eq!(truncate("short", 10), "short");
    }
}
