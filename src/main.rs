use anyhow::{Context as _, Result};
use clap::Parser;
use deployctl::{
    commands::{
        Context, ExportKind, ExportRequest, ImportRequest, InspectRequest, export, import,
        inspect, services::build_http_transport,
    },
    config::{
        DEFAULT_API_ROOT, DEFAULT_EXPORT_MAX_WAIT_SECS, DEFAULT_IMPORT_RETRIES,
        DEFAULT_IMPORT_RETRY_DELAY_SECS, DEFAULT_INSPECTION_RETRIES, DEFAULT_POLL_INTERVAL_SECS,
        DEFAULT_PROMOTE_MAX_WAIT_SECS, JobSettings, PollConfig, RetryConfig, ServiceConfig,
    },
    progress::StderrProgress,
    runtime::RealRuntime,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// deployctl - remote deployment job runner
///
/// Submits export, import and inspection jobs to a deployment-management API,
/// waits for them to finish and downloads what they produce.
///
/// Progress goes to stderr; on success a JSON result document is printed to
/// stdout. Any failure exits with a non-zero status.
///
/// Examples:
///   deployctl export --kind app --id _a-0001 --output-dir artifacts
///   deployctl inspect --package artifacts/app.zip
///   deployctl import --package artifacts/app.zip --customization icf.properties
#[derive(Parser, Debug)]
#[command(author, version = env!("DEPLOYCTL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the target environment (also via DEPLOY_BASE_URL)
    #[arg(long, env = "DEPLOY_BASE_URL", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// API key sent on every request (also via DEPLOY_API_KEY)
    #[arg(
        long,
        env = "DEPLOY_API_KEY",
        value_name = "KEY",
        hide_env_values = true,
        global = true
    )]
    pub api_key: Option<String>,

    /// Path of the deployment-management API below the base URL
    #[arg(
        long,
        env = "DEPLOY_API_ROOT",
        value_name = "PATH",
        default_value = DEFAULT_API_ROOT,
        global = true
    )]
    pub api_root: String,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Export an application or package and download its artifacts
    Export(ExportArgs),

    /// Import a package into the target environment
    Import(ImportArgs),

    /// Inspect a package without importing it
    Inspect(InspectArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// What to export: app, application or package
    #[arg(long, value_name = "KIND")]
    pub kind: ExportKind,

    /// Id of the application or package
    #[arg(long = "id", alias = "rid", value_name = "ID")]
    pub resource_id: String,

    /// Display name, also used in the package file name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Directory receiving the package and auxiliary files
    #[arg(long, value_name = "DIR", default_value = "artifacts")]
    pub output_dir: PathBuf,

    /// Seconds to wait for the export before giving up
    #[arg(
        long,
        env = "DEPLOY_EXPORT_MAX_WAIT",
        value_name = "SECS",
        default_value_t = DEFAULT_EXPORT_MAX_WAIT_SECS
    )]
    pub max_wait: u64,

    /// Seconds between status polls (at least 1)
    #[arg(
        long,
        env = "DEPLOY_EXPORT_POLL_INTERVAL",
        value_name = "SECS",
        default_value_t = DEFAULT_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: u64,
}

/// Timing shared by import and inspection.
#[derive(clap::Args, Debug)]
pub struct PromoteTiming {
    /// Seconds to wait for the job before giving up
    #[arg(
        long,
        env = "DEPLOY_PROMOTE_MAX_WAIT",
        value_name = "SECS",
        default_value_t = DEFAULT_PROMOTE_MAX_WAIT_SECS
    )]
    pub max_wait: u64,

    /// Seconds between status polls (at least 1)
    #[arg(
        long,
        env = "DEPLOY_PROMOTE_POLL_INTERVAL",
        value_name = "SECS",
        default_value_t = DEFAULT_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: u64,
}

impl PromoteTiming {
    fn poll(&self) -> PollConfig {
        PollConfig::from_secs(self.poll_interval, self.max_wait)
    }
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Package archive to import
    #[arg(long, value_name = "FILE")]
    pub package: PathBuf,

    /// Import customization file (.properties)
    #[arg(long, value_name = "FILE")]
    pub customization: Option<PathBuf>,

    /// Admin console settings archive
    #[arg(long, value_name = "FILE")]
    pub admin_settings: Option<PathBuf>,

    /// Plugins archive
    #[arg(long, value_name = "FILE")]
    pub plugins: Option<PathBuf>,

    /// Deployment name (defaults to "Import <package file name>")
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = "")]
    pub description: String,

    #[command(flatten)]
    pub timing: PromoteTiming,

    /// Retries for transient failures of the submission and each poll
    #[arg(
        long,
        env = "DEPLOY_PROMOTE_IMPORT_RETRIES",
        value_name = "N",
        default_value_t = DEFAULT_IMPORT_RETRIES
    )]
    pub retries: u32,

    /// Seconds between those retries
    #[arg(
        long,
        env = "DEPLOY_PROMOTE_RETRY_DELAY",
        value_name = "SECS",
        default_value_t = DEFAULT_IMPORT_RETRY_DELAY_SECS
    )]
    pub retry_delay: u64,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Package archive to inspect
    #[arg(long, value_name = "FILE")]
    pub package: PathBuf,

    /// Import customization file (.properties)
    #[arg(long, value_name = "FILE")]
    pub customization: Option<PathBuf>,

    /// Admin console settings archive
    #[arg(long, value_name = "FILE")]
    pub admin_settings: Option<PathBuf>,

    #[command(flatten)]
    pub timing: PromoteTiming,

    /// Consecutive not-ready or network failures tolerated while polling
    #[arg(
        long,
        env = "DEPLOY_PROMOTE_INSPECTION_RETRIES",
        value_name = "N",
        default_value_t = DEFAULT_INSPECTION_RETRIES
    )]
    pub retries: u32,
}

impl ExportArgs {
    fn into_request(self) -> ExportRequest {
        ExportRequest {
            settings: JobSettings::export(PollConfig::from_secs(self.poll_interval, self.max_wait)),
            kind: self.kind,
            resource_id: self.resource_id,
            name: self.name,
            description: self.description,
            output_dir: self.output_dir,
        }
    }
}

impl ImportArgs {
    fn into_request(self) -> ImportRequest {
        let retry = RetryConfig {
            max_retries: self.retries,
            delay: Duration::from_secs(self.retry_delay),
        };
        ImportRequest {
            settings: JobSettings::import(self.timing.poll(), retry),
            package: self.package,
            customization: self.customization,
            admin_settings: self.admin_settings,
            plugins: self.plugins,
            name: self.name,
            description: self.description,
        }
    }
}

impl InspectArgs {
    fn into_request(self) -> InspectRequest {
        InspectRequest {
            settings: JobSettings::inspect(self.timing.poll(), self.retries),
            package: self.package,
            customization: self.customization,
            admin_settings: self.admin_settings,
        }
    }
}

fn print_outcome<T: Serialize>(outcome: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let base_url = cli
        .base_url
        .filter(|u| !u.trim().is_empty())
        .context("No base URL given: pass --base-url or set DEPLOY_BASE_URL")?;
    let api_key = cli
        .api_key
        .filter(|k| !k.trim().is_empty())
        .context("No API key given: pass --api-key or set DEPLOY_API_KEY")?;

    let service = ServiceConfig::with_api_root(&base_url, &cli.api_root);
    let transport = build_http_transport(&api_key)?;
    let runtime = RealRuntime;
    let progress = StderrProgress;
    let ctx = Context::new(&transport, &runtime, &progress, &service);

    match cli.command {
        Commands::Export(args) => print_outcome(&export(&ctx, &args.into_request()).await?)?,
        Commands::Import(args) => print_outcome(&import(&ctx, &args.into_request()).await?)?,
        Commands::Inspect(args) => print_outcome(&inspect(&ctx, &args.into_request()).await?)?,
    }
    Ok(())
}
