use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use daoforge::codegen::{CodeGenConfig, CodeGenerator, PythonGenerator};
use daoforge::config::{DbConfig, FeatureToggles, LookupColumn, RunConfig, DEFAULT_AUDIT_COLUMNS};
use daoforge::introspect::TableFilter;
use daoforge::pipeline::GenerationReport;

#[derive(Debug, Clone, ValueEnum)]
enum Database {
    Postgres,
}

#[derive(Debug, Clone, ValueEnum)]
enum Language {
    Python,
}

#[derive(Parser, Debug)]
#[command(name = "daoforge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Target database type
    database: Database,

    /// Target language for generated code
    language: Language,

    /// Output directory; generated files in it are overwritten on every run
    #[arg(short, long, default_value = "./database")]
    output: PathBuf,

    /// Database schema to introspect
    #[arg(long, default_value = "public")]
    schema: String,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Comma-separated list of tables to include (default: all)
    #[arg(long, value_delimiter = ',')]
    tables: Option<Vec<String>>,

    /// Comma-separated list of tables to exclude
    #[arg(long, value_delimiter = ',')]
    exclude: Option<Vec<String>>,

    /// Do not emit validate() on records
    #[arg(long)]
    no_validation_methods: bool,

    /// Inline constraint literals instead of emitting class constants
    #[arg(long)]
    no_constraint_constants: bool,

    /// Skip check-constraint introspection and inference
    #[arg(long)]
    no_check_constraints: bool,

    /// Skip unique-constraint introspection
    #[arg(long)]
    no_unique_constraints: bool,

    /// Comma-separated audit columns that get finders
    #[arg(long, value_delimiter = ',')]
    audit_columns: Option<Vec<String>>,

    /// Extra finder column as table.column (repeatable or comma-separated)
    #[arg(long = "lookup", value_delimiter = ',')]
    lookups: Vec<LookupColumn>,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn features(&self) -> FeatureToggles {
        FeatureToggles {
            validation_methods: !self.no_validation_methods,
            constraint_constants: !self.no_constraint_constants,
            check_constraints: !self.no_check_constraints,
            unique_constraints: !self.no_unique_constraints,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("daoforge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        database = ?cli.database,
        language = ?cli.language,
        output = ?cli.output,
        schema = ?cli.schema,
        "Starting code generation"
    );

    // Load configuration
    let config = DbConfig::load(&cli.env_file).context("Failed to load database configuration")?;
    debug!(connection = ?config.redacted_connection_string(), "Loaded configuration");

    // Build table filter
    let filter = TableFilter {
        include: cli.tables.clone(),
        exclude: cli.exclude.clone(),
    };

    if filter.is_active() {
        debug!(filter = ?filter, "Table filter configured");
    }

    let audit_columns = cli
        .audit_columns
        .clone()
        .unwrap_or_else(|| DEFAULT_AUDIT_COLUMNS.iter().map(|c| c.to_string()).collect());

    let run_config = RunConfig::new(cli.schema.clone(), CodeGenConfig::new(cli.output.clone()))
        .with_filter(filter)
        .with_features(cli.features())
        .with_audit_columns(audit_columns)
        .with_lookup_columns(cli.lookups.clone());
    debug!(run_config = ?run_config, "Run configuration");

    let generator = match cli.language {
        Language::Python => PythonGenerator::new().context("Failed to load templates")?,
    };

    let report = generate(&cli.database, &config, &generator, &run_config)?;

    if report.tables.is_empty() {
        warn!("No tables found after filtering");
    }

    info!(
        tables = ?report.tables.len(),
        skipped = ?report.skipped.len(),
        artifacts = ?report.artifacts,
        output = ?cli.output,
        "Code generation complete"
    );

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn generate(
    database: &Database,
    config: &DbConfig,
    generator: &dyn CodeGenerator,
    run_config: &RunConfig,
) -> Result<GenerationReport> {
    match database {
        Database::Postgres => generate_postgres(config, generator, run_config),
    }
}

#[cfg(feature = "postgres")]
fn generate_postgres(
    config: &DbConfig,
    generator: &dyn CodeGenerator,
    run_config: &RunConfig,
) -> Result<GenerationReport> {
    use daoforge::{connect_postgres, PostgresCatalog};

    let mut client = connect_postgres(config).context("Failed to open catalog connection")?;

    let mut catalog = PostgresCatalog::new(&mut client);
    let report = daoforge::pipeline::run(&mut catalog, generator, run_config)
        .context("Code generation failed")?;

    Ok(report)
}

#[cfg(not(feature = "postgres"))]
fn generate_postgres(
    _config: &DbConfig,
    _generator: &dyn CodeGenerator,
    _run_config: &RunConfig,
) -> Result<GenerationReport> {
    bail!("PostgreSQL support not enabled. Rebuild with --features postgres")
}
