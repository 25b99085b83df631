//! SCORM Engine CLI
//!
//! Ingests SCORM packages, writes validation reports, serves the runtime
//! API and shows learner progress.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use scorm_engine::{
    create_router, ingest_with, package_id_for, AppState, Config, DirectoryPackageSource,
    IngestedPackage, JsonFileAttemptStore, OutlineNode, PackageSource, ParseOptions,
    RuntimeService, ScormError,
};
use scorm_report::{
    json::JsonGenerator, LearnerProgress, MarkdownGenerator, OutlineEntry, Report,
    ReportGenerator, ReportInput, ScoProgress,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// SCORM Engine - package ingestion and sequencing
///
/// Parses and validates SCORM 1.2 and 2004 packages, and serves learners
/// from them over HTTP.
#[derive(Parser, Debug)]
#[command(name = "scorm")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: scorm.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a package and write validation reports
    Ingest {
        /// Package directory or imsmanifest.xml path
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<String>,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Both)]
        format: ReportFormat,
    },

    /// Serve the runtime API for one or more packages
    Serve {
        /// Package directories or imsmanifest.xml paths
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Port for the HTTP API server
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show a learner's progress through a package
    Progress {
        /// Package directory or imsmanifest.xml path
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Learner identifier
        #[arg(short, long, value_name = "ID")]
        learner: String,
    },
}

/// Which report files to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
    Both,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    let result = match load_config(args.config.as_deref()) {
        Ok(config) => match args.command {
            Command::Ingest {
                path,
                output_dir,
                format,
            } => run_ingest(config, &path, output_dir, format),
            Command::Serve { paths, port } => run_serve(config, &paths, port).await,
            Command::Progress { path, learner } => run_progress(&config, &path, &learner).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Runs the ingestion pipeline and writes reports.
fn run_ingest(
    mut config: Config,
    path: &Path,
    output_dir: Option<String>,
    format: ReportFormat,
) -> anyhow::Result<()> {
    if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
    }
    config.validate()?;

    let package_name = package_name(path)?;
    let output_dir = PathBuf::from(&config.output_dir);
    std::fs::create_dir_all(&output_dir)?;

    println!("Ingesting package: {}", path.display());
    let package = match load_package(&config, path) {
        Ok(package) => package,
        Err(e @ (ScormError::Parse(_) | ScormError::Resolve(_))) => {
            let input = ReportInput {
                package_name,
                rejection: Some(e.to_string()),
                ..ReportInput::default()
            };
            let report = ReportGenerator::new(input).generate();
            write_reports(&report, &output_dir, format)?;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let report = ReportGenerator::new(report_input(&package_name, &package)).generate();
    print_summary(&report);
    write_reports(&report, &output_dir, format)?;

    let structure_path = output_dir.join("course-structure.json");
    std::fs::write(&structure_path, serde_json::to_string_pretty(&package)?)?;
    println!("  Course structure: {}", structure_path.display());

    if !package.is_active() {
        anyhow::bail!(
            "Package '{package_name}' failed validation with {} error(s)\n\nSuggestion: Review the report and fix the manifest",
            package.validation.errors.len()
        );
    }
    Ok(())
}

/// Ingests packages and serves the runtime API until Ctrl+C.
async fn run_serve(mut config: Config, paths: &[PathBuf], port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;

    let store = Arc::new(JsonFileAttemptStore::new(&config.attempt_store_dir));
    let runtime = RuntimeService::new(&config, store);

    for path in paths {
        let package_id = package_name(path)?;
        let package = load_package(&config, path)?;
        if !package.is_active() {
            println!(
                "Warning: package '{package_id}' failed validation and will not be delivered"
            );
        }
        runtime.register_package(&package_id, package).await;
        println!("Registered package: {package_id}");
    }

    let addr: SocketAddr = ([127, 0, 0, 1], config.port).into();
    let router = create_router(AppState::new(config, runtime));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}

/// Prints a learner's launchable set and attempts.
async fn run_progress(config: &Config, path: &Path, learner_id: &str) -> anyhow::Result<()> {
    let package_id = package_name(path)?;
    let package = load_package(config, path)?;

    let store = Arc::new(JsonFileAttemptStore::new(&config.attempt_store_dir));
    let runtime = RuntimeService::new(config, store);
    let package = runtime.register_package(&package_id, package).await;

    let launchable = runtime.launchable_scos(learner_id, &package_id).await?;
    let attempts = runtime.attempts(learner_id, &package_id).await?;

    let progress = LearnerProgress {
        learner_id: learner_id.to_string(),
        launchable: launchable.into_iter().collect(),
        scos: package
            .structure
            .scos
            .iter()
            .filter_map(|sco| {
                attempts.get(&sco.identifier).map(|state| ScoProgress {
                    sco_id: sco.identifier.clone(),
                    completion_status: state.completion_status.to_string(),
                    success_status: state.success_status.to_string(),
                    score_raw: state.score_raw,
                    attempt_number: state.attempt_number,
                    session_count: state.session_count,
                })
            })
            .collect(),
    };

    println!("Learner: {learner_id}");
    println!("Package: {package_id}");
    println!(
        "Completed: {} of {} launchable SCOs",
        progress.completed_count(),
        package.structure.launchable_count()
    );
    println!("Launchable now: {}", display_list(&progress.launchable));

    if progress.scos.is_empty() {
        println!("No attempts recorded.");
        return Ok(());
    }

    println!();
    println!(
        "{:<24} {:<14} {:<8} {:>6} {:>8} {:>9}",
        "SCO", "COMPLETION", "SUCCESS", "SCORE", "ATTEMPT", "SESSIONS"
    );
    for sco in &progress.scos {
        let score = sco
            .score_raw
            .map_or_else(|| "-".to_string(), |s| format!("{s}"));
        println!(
            "{:<24} {:<14} {:<8} {:>6} {:>8} {:>9}",
            sco.sco_id,
            sco.completion_status,
            sco.success_status,
            score,
            sco.attempt_number,
            sco.session_count
        );
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Reads and ingests the package at `path`.
fn load_package(config: &Config, path: &Path) -> Result<IngestedPackage, ScormError> {
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let reference = path
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().to_string());

    let source = DirectoryPackageSource::from_config(root, config);
    let bytes = source.get_manifest_bytes(&reference)?;
    ingest_with(
        &bytes,
        ParseOptions {
            schema: config.schema_detection,
        },
    )
}

fn package_name(path: &Path) -> anyhow::Result<String> {
    package_id_for(path).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot derive a package name from '{}'\n\nSuggestion: Pass the package directory",
            path.display()
        )
    })
}

/// Converts an ingested package into report input.
fn report_input(package_name: &str, package: &IngestedPackage) -> ReportInput {
    let structure = &package.structure;
    let title = structure
        .manifest
        .organization(&structure.organization_id)
        .map_or_else(|| structure.manifest.title.clone(), |org| org.title.clone());

    let mut outline = Vec::new();
    for node in &structure.outline {
        flatten_outline(package, node, 0, &mut outline);
    }

    ReportInput {
        package_name: package_name.to_string(),
        manifest_identifier: structure.manifest.identifier.clone(),
        title,
        schema_version: structure.manifest.schema_version.to_string(),
        rejection: None,
        outline,
        errors: package.validation.errors.clone(),
        warnings: package.validation.warnings.clone(),
        progress: None,
    }
}

fn flatten_outline(
    package: &IngestedPackage,
    node: &OutlineNode,
    depth: u32,
    entries: &mut Vec<OutlineEntry>,
) {
    let mut entry = OutlineEntry::new(&node.identifier, &node.title)
        .depth(depth)
        .launchable(node.launchable);
    if let Some(sco) = package.structure.sco(&node.identifier) {
        entry = entry.launch_href(&sco.launch_href);
        if !sco.prerequisites.is_always() {
            entry = entry.prerequisites(sco.prerequisites.to_string());
        }
        if let Some(mastery) = sco.mastery_score {
            entry = entry.mastery_score(mastery);
        }
    }
    entries.push(entry);

    for child in &node.children {
        flatten_outline(package, child, depth + 1, entries);
    }
}

/// Writes the requested report files.
fn write_reports(report: &Report, output_dir: &Path, format: ReportFormat) -> anyhow::Result<()> {
    if matches!(format, ReportFormat::Markdown | ReportFormat::Both) {
        let md_path = output_dir.join("scorm-report.md");
        std::fs::write(&md_path, MarkdownGenerator::new(report).generate())?;
        println!("  Markdown report: {}", md_path.display());
    }
    if matches!(format, ReportFormat::Json | ReportFormat::Both) {
        let json_path = output_dir.join("scorm-report.json");
        JsonGenerator::new(report).write_to_file(&json_path, true)?;
        println!("  JSON report: {}", json_path.display());
    }
    Ok(())
}

fn print_summary(report: &Report) {
    let summary = &report.summary;
    let counts = report.issue_counts();

    println!();
    println!("=== Package Summary ===");
    println!("Status: {}", summary.status);
    println!("Manifest: {}", summary.manifest_identifier);
    println!("Title: {}", summary.title);
    println!("Schema: {}", summary.schema_version);
    println!(
        "Items: {} ({} launchable)",
        summary.item_count, summary.launchable_count
    );
    if counts.total() > 0 {
        println!(
            "Issues: {} ({} errors, {} warnings)",
            counts.total(),
            counts.errors,
            counts.warnings
        );
        for issue in &report.issues {
            println!("  [{}] {}", issue.severity, issue.message);
        }
    } else {
        println!("No issues found");
    }
    println!();
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
