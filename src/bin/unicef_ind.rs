use std::fs::File;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use unicef_indicators::app::{App, RetrievalRequest};
use unicef_indicators::catalog::CatalogKind;
use unicef_indicators::config::{ConfigLoader, ResolvedConfig, sex_filter};
use unicef_indicators::domain::{CountryCode, DataflowId, IndicatorCode, MetadataField, OutputFormat};
use unicef_indicators::error::IndicatorError;
use unicef_indicators::lookup::{self, IndicatorQuery};
use unicef_indicators::output::{CsvOutput, JsonOutput, LogSink};
use unicef_indicators::pipeline::TransformOptions;
use unicef_indicators::sdmx::SdmxHttpClient;
use unicef_indicators::store::Store;
use unicef_indicators::table::Table;
use unicef_indicators::versioning::create_data_version;
use unicef_indicators::vintage::VintageStore;

#[derive(Parser)]
#[command(name = "unicef-ind")]
#[command(about = "Retrieve and reshape UNICEF SDMX indicators with a vintage-tracked metadata cache")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch one or more indicators")]
    Get(GetArgs),
    #[command(about = "List known indicators, SDG targets or categories")]
    Indicators(IndicatorsArgs),
    #[command(about = "Manage the local metadata cache")]
    Metadata(MetadataArgs),
    #[command(about = "Check a downloaded CSV against cached metadata")]
    Validate(ValidateArgs),
    #[command(about = "Print a version record for a downloaded CSV")]
    Version(VersionArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputKind {
    Csv,
    Json,
}

#[derive(Args)]
struct GetArgs {
    /// Indicator codes; read from the manifest when omitted.
    indicators: Vec<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, value_delimiter = ',')]
    countries: Vec<String>,

    #[arg(long)]
    start_year: Option<i32>,

    #[arg(long)]
    end_year: Option<i32>,

    #[arg(long)]
    dataflow: Option<String>,

    /// Sex disaggregation to keep, or ALL.
    #[arg(long)]
    sex: Option<String>,

    #[arg(long)]
    max_retries: Option<usize>,

    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    #[arg(long)]
    latest: bool,

    #[arg(long)]
    mrv: Option<usize>,

    #[arg(long, value_enum, value_delimiter = ',')]
    add_metadata: Vec<MetadataField>,

    #[arg(long)]
    dropna: bool,

    #[arg(long)]
    simplify: bool,

    #[arg(long)]
    allow_duplicates: bool,

    /// Keep source column names and raw values.
    #[arg(long)]
    raw: bool,

    #[arg(long)]
    no_country_names: bool,

    #[arg(long, value_enum, default_value = "csv")]
    output: OutputKind,

    #[arg(long)]
    cache_dir: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndicatorListing {
    Indicators,
    SdgTargets,
    Categories,
}

#[derive(Args)]
struct IndicatorsArgs {
    /// Case-insensitive text matched against codes and names.
    search: Option<String>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    sdg_goal: Option<String>,

    #[arg(long)]
    sdg_target: Option<String>,

    #[arg(long)]
    dataflow: Option<String>,

    /// Code prefix such as CME or NT.
    #[arg(long)]
    prefix: Option<String>,

    #[arg(long, value_enum, default_value = "indicators")]
    list: IndicatorListing,

    #[arg(long)]
    codes_only: bool,
}

#[derive(Args)]
struct MetadataArgs {
    #[arg(long, global = true)]
    cache_dir: Option<String>,

    #[command(subcommand)]
    command: MetadataCommand,
}

#[derive(Subcommand)]
enum MetadataCommand {
    #[command(about = "Download all catalogs now")]
    Sync,
    #[command(about = "Sync only when the cache is missing or stale")]
    Ensure {
        #[arg(long)]
        max_age_days: Option<i64>,
    },
    #[command(about = "Show cache state and sync history")]
    Status {
        #[arg(long)]
        max_age_days: Option<i64>,
    },
    #[command(about = "List dated vintages, newest first")]
    Vintages,
    #[command(about = "Compare a vintage with another vintage or current")]
    Diff { from: String, to: Option<String> },
    #[command(about = "Print one cached catalog: dataflows, indicators or codelists")]
    Show {
        catalog: String,

        #[arg(long)]
        vintage: Option<String>,
    },
}

#[derive(Args)]
struct ValidateArgs {
    indicator: String,

    #[arg(long)]
    input: String,

    #[arg(long)]
    strict: bool,

    #[arg(long)]
    cache_dir: Option<String>,
}

#[derive(Args)]
struct VersionArgs {
    indicator: String,

    #[arg(long)]
    input: String,

    #[arg(long)]
    version_id: Option<String>,

    #[arg(long)]
    notes: Option<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<IndicatorError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &IndicatorError) -> u8 {
    match error {
        IndicatorError::InvalidIndicatorCode(_)
        | IndicatorError::InvalidDataflowId(_)
        | IndicatorError::InvalidCountryCode(_)
        | IndicatorError::InvalidFormat(_)
        | IndicatorError::InvalidMetadataField(_)
        | IndicatorError::InvalidOptions(_)
        | IndicatorError::InvalidYearRange { .. }
        | IndicatorError::NoIndicators
        | IndicatorError::DuplicateRows { .. }
        | IndicatorError::InvalidCatalog(_)
        | IndicatorError::VintageNotFound(_)
        | IndicatorError::MissingConfig
        | IndicatorError::ConfigParse(_) => 2,
        IndicatorError::Fetch { .. }
        | IndicatorError::HttpClient(_)
        | IndicatorError::SyncFailed { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Get(args) => run_get(args),
        Commands::Indicators(args) => run_indicators(args),
        Commands::Metadata(args) => run_metadata(args),
        Commands::Validate(args) => run_validate(args),
        Commands::Version(args) => run_version(args),
    }
}

fn open_store(cache_dir: Option<&str>) -> Result<Store, IndicatorError> {
    match cache_dir {
        Some(dir) => Ok(Store::new_with_root(Utf8PathBuf::from(dir))),
        None => Store::new(),
    }
}

fn max_age(days: Option<i64>) -> Option<Duration> {
    days.map(Duration::days)
}

fn run_get(args: GetArgs) -> miette::Result<ExitCode> {
    let resolved = if args.indicators.is_empty() {
        Some(ConfigLoader::resolve(args.config.as_deref())?)
    } else {
        None
    };
    let (request, options) = build_request(&args, resolved.as_ref())?;
    let metadata = resolved
        .as_ref()
        .map(|config| config.metadata.clone())
        .unwrap_or_default();

    let client = SdmxHttpClient::new()?;
    let mut app = App::new(client.clone());
    if options.country_names {
        let cache_dir = args.cache_dir.as_deref().or(metadata.cache_dir.as_deref());
        let vintages = VintageStore::new(open_store(cache_dir)?, client);
        if metadata.max_age_days.is_some() {
            vintages.ensure_synced(max_age(metadata.max_age_days))?;
        }
        if let Some(names) = vintages.load(None)?.country_names() {
            app = app.with_country_names(names);
        }
    }

    let result = app.retrieve(&request, &options, &LogSink)?;
    match args.output {
        OutputKind::Csv => CsvOutput::print_table(&result.table)?,
        OutputKind::Json => JsonOutput::print_retrieval(&result).into_diagnostic()?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Command-line values override the manifest.
fn build_request(
    args: &GetArgs,
    resolved: Option<&ResolvedConfig>,
) -> Result<(RetrievalRequest, TransformOptions), IndicatorError> {
    let (mut request, mut options) = match resolved {
        Some(config) => (config.request.clone(), config.options.clone()),
        None => {
            let codes = args
                .indicators
                .iter()
                .map(|value| value.parse::<IndicatorCode>())
                .collect::<Result<Vec<_>, _>>()?;
            (RetrievalRequest::new(codes), TransformOptions::default())
        }
    };

    if let Some(dataflow) = &args.dataflow {
        request = request.with_dataflow(dataflow.parse::<DataflowId>()?);
    }
    if !args.countries.is_empty() {
        request.countries = args
            .countries
            .iter()
            .map(|value| value.parse::<CountryCode>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    if args.start_year.is_some() {
        request.start_year = args.start_year;
    }
    if args.end_year.is_some() {
        request.end_year = args.end_year;
    }
    if let Some(sex) = &args.sex {
        request.sex = sex_filter(sex);
    }
    if let Some(retries) = args.max_retries {
        request.max_retries = retries;
    }

    if let Some(format) = args.format {
        options.format = format;
    }
    if args.mrv.is_some() {
        options.mrv = args.mrv;
    }
    if !args.add_metadata.is_empty() {
        options.add_metadata = args.add_metadata.clone();
    }
    options.latest |= args.latest;
    options.dropna |= args.dropna;
    options.simplify |= args.simplify;
    options.allow_duplicates |= args.allow_duplicates;
    if args.raw {
        options.normalize_columns = false;
    }
    if args.no_country_names {
        options.country_names = false;
    }

    request.validate()?;
    options.validate()?;
    Ok((request, options))
}

fn run_indicators(args: IndicatorsArgs) -> miette::Result<ExitCode> {
    match args.list {
        IndicatorListing::SdgTargets => {
            JsonOutput::print_json(&lookup::sdg_targets()).into_diagnostic()?;
        }
        IndicatorListing::Categories => {
            JsonOutput::print_json(&lookup::categories()).into_diagnostic()?;
        }
        IndicatorListing::Indicators => {
            let query = IndicatorQuery {
                category: args.category,
                sdg_goal: args.sdg_goal,
                sdg_target: args.sdg_target,
                dataflow: args.dataflow,
                prefix: args.prefix,
                text: args.search,
            };
            if args.codes_only {
                JsonOutput::print_json(&query.codes()).into_diagnostic()?;
            } else {
                JsonOutput::print_json(&query.matches()).into_diagnostic()?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_metadata(args: MetadataArgs) -> miette::Result<ExitCode> {
    let store = open_store(args.cache_dir.as_deref())?;
    let vintages = VintageStore::new(store, SdmxHttpClient::new()?);

    match args.command {
        MetadataCommand::Sync => {
            let summary = vintages.sync_all()?;
            JsonOutput::print_json(&summary).into_diagnostic()?;
        }
        MetadataCommand::Ensure { max_age_days } => {
            let synced = vintages.ensure_synced(max_age(max_age_days))?;
            JsonOutput::print_json(&serde_json::json!({ "synced": synced })).into_diagnostic()?;
        }
        MetadataCommand::Status { max_age_days } => {
            let state = vintages.state(max_age(max_age_days))?;
            let history = vintages.history()?;
            JsonOutput::print_json(&serde_json::json!({
                "root": vintages.store().root().as_str(),
                "state": state,
                "vintages": vintages.list_vintages()?,
                "history": history,
            }))
            .into_diagnostic()?;
        }
        MetadataCommand::Vintages => {
            JsonOutput::print_json(&vintages.list_vintages()?).into_diagnostic()?;
        }
        MetadataCommand::Diff { from, to } => {
            let comparison = vintages.compare_vintages(&from, to.as_deref())?;
            JsonOutput::print_json(&comparison).into_diagnostic()?;
        }
        MetadataCommand::Show { catalog, vintage } => {
            let kind: CatalogKind = catalog.parse()?;
            let contents = vintages.load_catalog(kind, vintage.as_deref())?;
            JsonOutput::print_json(&contents).into_diagnostic()?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_table(path: &str) -> Result<Table, IndicatorError> {
    let file = File::open(path).map_err(|err| IndicatorError::Filesystem(format!("{path}: {err}")))?;
    Table::from_csv_reader(file)
}

fn run_validate(args: ValidateArgs) -> miette::Result<ExitCode> {
    let indicator: IndicatorCode = args.indicator.parse()?;
    let table = read_table(&args.input)?;
    let store = open_store(args.cache_dir.as_deref())?;
    let vintages = VintageStore::new(store, SdmxHttpClient::new()?);
    let report = vintages.validate(&table, &indicator, args.strict)?;
    JsonOutput::print_json(&report).into_diagnostic()?;
    if report.valid {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

fn run_version(args: VersionArgs) -> miette::Result<ExitCode> {
    let indicator: IndicatorCode = args.indicator.parse()?;
    let table = read_table(&args.input)?;
    let version = create_data_version(&table, &indicator, args.version_id, args.notes, Utc::now())?;
    JsonOutput::print_json(&version).into_diagnostic()?;
    Ok(ExitCode::SUCCESS)
}
