use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use phage_import_core::{
    DescriptionField, EvalFlags, FlagProvider, NoFlags, RunMode, TicketDefaults,
};
use phage_import_pipeline::{
    load_custom_flags, run_import, EmptyCatalog, GenomeIdField, HttpCatalog, ImportConfig,
    JsonFileCatalog, ReferenceCatalog, DEFAULT_AUTHOR,
};
use phage_import_store_sqlite::SqliteStore;
use serde_json::Value;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const DEFAULT_LOG_FILTER: &str = "phage_import=info";

#[derive(Debug, Parser)]
#[command(name = "phage-import")]
#[command(about = "Import annotated phage genomes into the phage database")]
struct Cli {
    #[arg(long, default_value = "./phages.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a ticket table against a folder of GenBank files.
    Import(Box<ImportArgs>),
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    RunMode {
        #[command(subcommand)]
        command: RunModeCommand,
    },
}

#[derive(Debug, Args)]
struct ImportArgs {
    genome_folder: PathBuf,
    import_table: PathBuf,
    #[arg(short = 'g', long, value_enum, default_value_t = GenomeIdFieldArg::OrganismName)]
    genome_id_field: GenomeIdFieldArg,
    /// Write committed genomes to the database. Without it nothing is written.
    #[arg(short = 'p', long, default_value_t = false)]
    prod_run: bool,
    /// Run mode for tickets that leave the run_mode cell empty.
    #[arg(short = 'r', long, default_value = "draft")]
    run_mode: String,
    /// Description field for tickets that leave the description_field cell empty.
    #[arg(short = 'd', long, value_enum, default_value_t = DescriptionFieldArg::Product)]
    description_field: DescriptionFieldArg,
    #[arg(short = 'o', long, default_value = ".")]
    output_folder: PathBuf,
    #[arg(short = 'l', long)]
    log_file: Option<PathBuf>,
    /// JSON catalog used for `retrieve` ticket fields.
    #[arg(long, conflicts_with = "catalog_url")]
    catalog: Option<PathBuf>,
    #[arg(long)]
    catalog_url: Option<String>,
    /// YAML answers for the custom run mode.
    #[arg(long)]
    custom_flags: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    workers: usize,
    #[arg(long, default_value = DEFAULT_AUTHOR)]
    author: String,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum RunModeCommand {
    Show(RunModeShowArgs),
}

#[derive(Debug, Args)]
struct RunModeShowArgs {
    name: String,
    #[arg(long)]
    custom_flags: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GenomeIdFieldArg {
    OrganismName,
    SourceName,
    DescriptionName,
    Filename,
}

impl From<GenomeIdFieldArg> for GenomeIdField {
    fn from(value: GenomeIdFieldArg) -> Self {
        match value {
            GenomeIdFieldArg::OrganismName => Self::OrganismName,
            GenomeIdFieldArg::SourceName => Self::SourceName,
            GenomeIdFieldArg::DescriptionName => Self::DescriptionName,
            GenomeIdFieldArg::Filename => Self::Filename,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DescriptionFieldArg {
    Product,
    Function,
    Note,
}

impl From<DescriptionFieldArg> for DescriptionField {
    fn from(value: DescriptionFieldArg) -> Self {
        match value {
            DescriptionFieldArg::Product => Self::Product,
            DescriptionFieldArg::Function => Self::Function,
            DescriptionFieldArg::Note => Self::Note,
        }
    }
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}

fn flag_provider(custom_flags: Option<&Path>) -> Result<Box<dyn FlagProvider>> {
    Ok(match custom_flags {
        Some(path) => Box::new(load_custom_flags(path)?),
        None => Box::new(NoFlags),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file = match &cli.command {
        Command::Import(args) => args.log_file.as_deref(),
        Command::Db { .. } | Command::RunMode { .. } => None,
    };
    init_tracing(log_file)?;

    match cli.command {
        Command::Import(args) => run_import_command(&cli.db, &args),
        Command::Db { command } => {
            let mut store = SqliteStore::open(&cli.db)?;
            run_db(command, &mut store)
        }
        Command::RunMode { command } => run_run_mode(command),
    }
}

fn run_import_command(db: &Path, args: &ImportArgs) -> Result<()> {
    RunMode::require(&args.run_mode).context("invalid --run-mode")?;
    let provider = flag_provider(args.custom_flags.as_deref())?;
    let catalog: Box<dyn ReferenceCatalog> = match (&args.catalog, &args.catalog_url) {
        (Some(path), _) => Box::new(JsonFileCatalog::load(path)?),
        (None, Some(url)) => Box::new(HttpCatalog::connect(url)?),
        (None, None) => Box::new(EmptyCatalog),
    };
    let mut store = SqliteStore::open(db)?;
    store.migrate()?;
    tracing::debug!(db = %db.display(), "Genome store ready");

    let mut config = ImportConfig::new(
        args.genome_folder.clone(),
        args.import_table.clone(),
        args.output_folder.clone(),
    );
    config.genome_id_field = args.genome_id_field.into();
    config.prod_run = args.prod_run;
    config.defaults = TicketDefaults {
        description_field: args.description_field.into(),
        run_mode: args.run_mode.trim().to_ascii_lowercase(),
    };
    config.expected_author.clone_from(&args.author);
    config.workers = args.workers;

    let cancel = AtomicBool::new(false);
    let summary = run_import(&config, &mut store, catalog.as_ref(), provider.as_ref(), &cancel)?;
    emit_json(serde_json::to_value(&summary).context("failed to serialize run summary")?)
}

fn run_db(command: DbCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => run_db_schema_version(store),
        DbCommand::Migrate(args) => run_db_migrate(&args, store),
    }
}

fn run_db_schema_version(store: &SqliteStore) -> Result<()> {
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions,
        "up_to_date": status.pending_versions.is_empty()
    }))
}

fn run_db_migrate(args: &DbMigrateArgs, store: &mut SqliteStore) -> Result<()> {
    let before = store.schema_status()?;
    if args.dry_run {
        return emit_json(serde_json::json!({
            "dry_run": true,
            "current_version": before.current_version,
            "target_version": before.target_version,
            "would_apply_versions": before.pending_versions
        }));
    }

    store.migrate()?;
    let after = store.schema_status()?;
    emit_json(serde_json::json!({
        "dry_run": false,
        "before_version": before.current_version,
        "applied_versions": before.pending_versions,
        "after_version": after.current_version,
        "target_version": after.target_version,
        "up_to_date": after.pending_versions.is_empty()
    }))
}

fn run_run_mode(command: RunModeCommand) -> Result<()> {
    match command {
        RunModeCommand::Show(args) => {
            let provider = flag_provider(args.custom_flags.as_deref())?;
            let flags = EvalFlags::for_name(&args.name, provider.as_ref())
                .with_context(|| format!("cannot show run mode {}", args.name))?;
            emit_json(serde_json::json!({
                "run_mode": flags.mode().as_str(),
                "flags": flags.to_map()
            }))
        }
    }
}
