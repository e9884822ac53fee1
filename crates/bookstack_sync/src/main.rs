use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use bookstack_sync_core::client::{BookStackClient, BookStackClientConfig};
use bookstack_sync_core::config::{
    DEFAULT_CONFIG_FILENAME, SyncConfig, SyncConfigPatch, load_config, mask_secret, patch_config,
};
use bookstack_sync_core::frontmatter::split_document;
use bookstack_sync_core::sync::{
    ContainerRef, PlannedAction, SyncPlan, WriteOperation, plan, publish_document,
};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(
    name = "bookstack-sync",
    version,
    about = "Publish a markdown document with YAML front matter to a BookStack page"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file to use")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log request details to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config_path: PathBuf,
    verbose: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config_path: cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME)),
            verbose: cli.verbose,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create or update the page for a document and record its id and checksum")]
    Publish(PublishArgs),
    #[command(about = "Show what publish would do, without contacting the server")]
    Status(StatusArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct PublishArgs {
    file: PathBuf,
    #[arg(long, help = "Print the planned request without sending it")]
    dry_run: bool,
    #[arg(long, help = "Print the outcome as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
struct ConfigSetArgs {
    #[arg(long, help = "BookStack server URL; https:// is assumed when no scheme is given")]
    url: Option<String>,
    #[arg(long, help = "API token id")]
    token_id: Option<String>,
    #[arg(long, help = "API token secret")]
    token_secret: Option<String>,
    #[arg(long, value_name = "BOOL", help = "Always log request details")]
    debug: Option<bool>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let runtime = RuntimeOptions::from_cli(&cli);
    let config = load_config(&runtime.config_path)?;
    init_tracing(runtime.verbose || config.bookstack.debug)?;

    match cli.command {
        Some(Commands::Publish(args)) => run_publish(&config, args),
        Some(Commands::Status(args)) => run_status(&args.file),
        Some(Commands::Config(ConfigArgs { command })) => match command {
            ConfigSubcommand::Show => run_config_show(&runtime, &config),
            ConfigSubcommand::Set(args) => run_config_set(&runtime, args),
        },
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let directive = log_directive(verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter: {directive}"))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    tracing::debug!("verbose logging enabled");
    Ok(())
}

/// `--verbose` or `debug = true` forces debug output; otherwise RUST_LOG, then warn.
fn log_directive(verbose: bool, rust_log: Option<String>) -> String {
    if verbose {
        return "debug".to_string();
    }
    rust_log
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "warn".to_string())
}

fn run_publish(config: &SyncConfig, args: PublishArgs) -> Result<()> {
    let document = read_document(&args.file)?;

    if args.dry_run {
        let (front_matter, body) = split_document(&document)
            .with_context(|| format!("failed to parse {}", normalize_path(&args.file)))?;
        println!("publish (dry run)");
        println!("file: {}", normalize_path(&args.file));
        print_plan(&plan(body, &front_matter));
        return Ok(());
    }

    let mut client = BookStackClient::new(BookStackClientConfig::from_config(config)?)?;
    let report = publish_document(&document, &mut client)
        .with_context(|| format!("failed to publish {}", normalize_path(&args.file)))?;

    if let Some(rewritten) = &report.document {
        fs::write(&args.file, rewritten)
            .with_context(|| format!("failed to write {}", normalize_path(&args.file)))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.outcome)?);
        return Ok(());
    }
    println!("publish");
    println!("file: {}", normalize_path(&args.file));
    println!("updated: {}", format_flag(report.outcome.updated));
    println!("page_id: {}", format_optional(report.outcome.id));
    println!("checksum: {}", report.outcome.checksum);
    println!("request_count: {}", report.request_count);
    if report.outcome.updated {
        println!("Published to BookStack");
    } else {
        println!("No need to update since the page is up to date");
    }
    Ok(())
}

fn run_status(file: &Path) -> Result<()> {
    let document = read_document(file)?;
    let (front_matter, body) = split_document(&document)
        .with_context(|| format!("failed to parse {}", normalize_path(file)))?;
    let metadata = front_matter.page_metadata();

    println!("document status");
    println!("file: {}", normalize_path(file));
    println!("front_matter.keys: {}", front_matter.len());
    println!("book_id: {}", format_optional(metadata.book_id));
    println!("chapter_id: {}", format_optional(metadata.chapter_id));
    println!("page_id: {}", format_optional(metadata.page_id));
    println!(
        "page_name: {}",
        metadata.page_name.as_deref().unwrap_or("<none>")
    );
    print_plan(&plan(body, &front_matter));
    Ok(())
}

fn run_config_show(runtime: &RuntimeOptions, config: &SyncConfig) -> Result<()> {
    let (url, url_source) = config.url();
    let (token_id, token_id_source) = config.token_id();
    let (token_secret, token_secret_source) = config.token_secret();

    println!("config");
    println!("config_path: {}", normalize_path(&runtime.config_path));
    println!(
        "config_exists: {}",
        format_flag(runtime.config_path.exists())
    );
    println!(
        "url: {} ({})",
        url.as_deref().unwrap_or("<unset>"),
        url_source.as_str()
    );
    println!(
        "token_id: {} ({})",
        token_id.as_deref().unwrap_or("<unset>"),
        token_id_source.as_str()
    );
    println!(
        "token_secret: {} ({})",
        token_secret
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "<unset>".to_string()),
        token_secret_source.as_str()
    );
    println!("user_agent: {}", config.user_agent());
    println!("debug: {}", format_flag(config.bookstack.debug));
    match config.server_settings() {
        Ok(_) => println!("ready: yes"),
        Err(error) => println!("ready: no ({error})"),
    }
    Ok(())
}

fn run_config_set(runtime: &RuntimeOptions, args: ConfigSetArgs) -> Result<()> {
    let patch = SyncConfigPatch {
        set_url: args.url,
        set_token_id: args.token_id,
        set_token_secret: args.token_secret,
        set_debug: args.debug,
    };
    if patch.is_empty() {
        return Err(anyhow!(
            "config set requires at least one of --url, --token-id, --token-secret, --debug"
        ));
    }
    let wrote = patch_config(&runtime.config_path, &patch)?;
    println!("config set");
    println!("config_path: {}", normalize_path(&runtime.config_path));
    println!("wrote_config: {}", format_flag(wrote));
    Ok(())
}

fn read_document(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("failed to read {}", normalize_path(file)))
}

fn print_plan(plan: &SyncPlan) {
    println!("local_checksum: {}", plan.checksum);
    println!(
        "stored_checksum: {}",
        plan.stored_checksum.as_deref().unwrap_or("<none>")
    );
    match &plan.action {
        PlannedAction::UpToDate => println!("action: up_to_date"),
        PlannedAction::Write(request) => {
            let action = match request.operation {
                WriteOperation::Create => "create",
                WriteOperation::Update { .. } => "update",
            };
            println!("action: {action}");
            println!("method: {}", request.operation.method());
            println!("path: {}", request.operation.path());
            println!(
                "name: {}",
                request.payload.name.as_deref().unwrap_or("<none>")
            );
            let container = match request.payload.container {
                Some(ContainerRef::Book(id)) => format!("book_id={id}"),
                Some(ContainerRef::Chapter(id)) => format!("chapter_id={id}"),
                None => "<server default>".to_string(),
            };
            println!("container: {container}");
        }
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_optional(value: Option<i64>) -> String {
    value
        .map(|value| value.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}
