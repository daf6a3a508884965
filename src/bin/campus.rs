//! Campus CLI - Command-line interface for Smart Campus
//!
//! Commands:
//! - serve: Run the HTTP ingest API
//! - generate: Send synthetic telemetry to a running API
//! - simulate: Run synthetic telemetry through an in-process pipeline
//! - ingest: Run payload files through the pipeline
//! - validate: Validate telemetry payloads
//! - encode: Convert a payload between JSON and CBOR
//! - monitor: Print the latest readings, forecast and alert
//! - dataset: Build the offline mold dataset
//! - evaluate: Score the baseline mold forecaster
//! - doctor: Diagnose configuration and store health
//! - schema: Print payload schema information

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use smart_campus::config::{store_path_from_str, Settings};
use smart_campus::dataset::{build_dataset, evaluate_baseline, time_split, write_csv};
use smart_campus::generator::{Generator, HttpSink, ProcessorSink};
use smart_campus::monitor::{run_console, HttpSource, MonitorSource, StoreSource};
use smart_campus::schema::{
    PayloadAdapter, PayloadCodec, Scenario, TelemetryPayload, OPTIONAL_MEASUREMENTS,
    REQUIRED_MEASUREMENTS, SCHEMA_VERSION,
};
use smart_campus::store::TelemetryStore;
use smart_campus::{ApiServer, IngestProcessor, TelemetryError, PRODUCER_NAME, VERSION};

/// Campus - Air and water telemetry ingest and analytics
#[derive(Parser)]
#[command(name = "campus")]
#[command(version = VERSION)]
#[command(about = "Ingest, quality-check and forecast campus sensor telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP ingest API
    Serve {
        /// Listen address (overrides CAMPUS_BIND)
        #[arg(long)]
        bind: Option<String>,

        /// Store snapshot path, or :memory: (overrides CAMPUS_STORE_PATH)
        #[arg(long)]
        store: Option<String>,
    },

    /// Send synthetic telemetry to a running API
    Generate {
        /// Base URL of the ingest API
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        api_url: String,

        /// Scenario (NORMAL, MOLD_EPISODE, WATER_EVENT, SENSOR_FAULT)
        #[arg(long, default_value = "NORMAL")]
        scenario: String,

        /// Seconds between payloads
        #[arg(long, default_value = "1.0")]
        rate_sec: f64,

        /// Payloads to send (0 runs until interrupted)
        #[arg(long, default_value = "0")]
        count: u64,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Send CBOR instead of JSON
        #[arg(long)]
        cbor: bool,
    },

    /// Run synthetic telemetry through an in-process pipeline
    Simulate {
        #[arg(long, default_value = "MOLD_EPISODE")]
        scenario: String,

        #[arg(long, default_value = "120")]
        count: u64,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Store snapshot path, or :memory:
        #[arg(long)]
        store: Option<String>,
    },

    /// Run payload files through the pipeline
    Ingest {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Store snapshot path, or :memory:
        #[arg(long)]
        store: Option<String>,
    },

    /// Validate telemetry payloads
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a single payload between JSON and CBOR
    Encode {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Encoding of the input
        #[arg(long, default_value = "json")]
        from: Encoding,

        /// Encoding of the output
        #[arg(long, default_value = "cbor")]
        to: Encoding,
    },

    /// Print the latest readings, forecast and alert
    Monitor {
        /// Poll a running API instead of the store file
        #[arg(long)]
        api_url: Option<String>,

        /// Store snapshot path (defaults to CAMPUS_STORE_PATH)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Seconds between polls
        #[arg(long, default_value = "2.0")]
        interval: f64,

        /// Number of polls (default: until interrupted)
        #[arg(long)]
        iterations: Option<u64>,
    },

    /// Build the offline mold dataset as CSV
    Dataset {
        #[arg(short, long, default_value = "data/mold_dataset.csv")]
        out: PathBuf,

        /// Hours per scenario episode
        #[arg(long, default_value = "12")]
        hours: u32,

        #[arg(long, default_value = "60")]
        horizon_min: usize,

        #[arg(long, default_value = "60")]
        window_min: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Score the baseline mold forecaster on a generated dataset
    Evaluate {
        /// Write per-row predictions to this CSV
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long, default_value = "12")]
        hours: u32,

        #[arg(long, default_value = "60")]
        horizon_min: usize,

        #[arg(long, default_value = "60")]
        window_min: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Mold index threshold for lead time
        #[arg(long, default_value = "0.6")]
        threshold: f64,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and store health
    Doctor {
        /// Store snapshot to check (defaults to CAMPUS_STORE_PATH)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print payload schema information
    Schema {
        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one payload per line)
    Ndjson,
    /// JSON array of payloads
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one response per line)
    Ndjson,
    /// JSON array of responses
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum Encoding {
    Json,
    Cbor,
}

impl From<Encoding> for PayloadCodec {
    fn from(e: Encoding) -> Self {
        match e {
            Encoding::Json => PayloadCodec::Json,
            Encoding::Cbor => PayloadCodec::Cbor,
        }
    }
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CampusCliError> {
    match cli.command {
        Commands::Serve { bind, store } => cmd_serve(bind, store),

        Commands::Generate {
            api_url,
            scenario,
            rate_sec,
            count,
            seed,
            cbor,
        } => cmd_generate(&api_url, &scenario, rate_sec, count, seed, cbor),

        Commands::Simulate {
            scenario,
            count,
            seed,
            store,
        } => cmd_simulate(&scenario, count, seed, store),

        Commands::Ingest {
            input,
            input_format,
            output_format,
            store,
        } => cmd_ingest(&input, input_format, output_format, store),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Encode {
            input,
            output,
            from,
            to,
        } => cmd_encode(&input, &output, from, to),

        Commands::Monitor {
            api_url,
            store,
            interval,
            iterations,
        } => cmd_monitor(api_url, store, interval, iterations),

        Commands::Dataset {
            out,
            hours,
            horizon_min,
            window_min,
            seed,
        } => cmd_dataset(&out, hours, horizon_min, window_min, seed),

        Commands::Evaluate {
            out,
            hours,
            horizon_min,
            window_min,
            seed,
            threshold,
            json,
        } => cmd_evaluate(out.as_deref(), hours, horizon_min, window_min, seed, threshold, json),

        Commands::Doctor { store, json } => cmd_doctor(store, json),

        Commands::Schema { json_schema } => cmd_schema(json_schema),
    }
}

/// Settings from the environment with an optional `--store` override
fn load_settings(store: Option<String>) -> Result<Settings, CampusCliError> {
    let mut settings = Settings::from_env()?;
    if let Some(store) = store {
        settings.store_path = store_path_from_str(&store);
    }
    Ok(settings)
}

fn cmd_serve(bind: Option<String>, store: Option<String>) -> Result<(), CampusCliError> {
    let mut settings = load_settings(store)?;
    if let Some(bind) = bind {
        settings.bind = bind;
    }
    let bind = settings.bind.clone();

    let processor = IngestProcessor::open(settings)?;
    let mut server = ApiServer::new(processor);
    server.serve(&bind)?;
    Ok(())
}

fn cmd_generate(
    api_url: &str,
    scenario: &str,
    rate_sec: f64,
    count: u64,
    seed: u64,
    cbor: bool,
) -> Result<(), CampusCliError> {
    let scenario: Scenario = scenario.parse()?;
    let codec = if cbor { PayloadCodec::Cbor } else { PayloadCodec::Json };
    let mut sink = HttpSink::new(api_url, codec);
    let mut generator = Generator::starting_now(scenario, seed, seconds(rate_sec)?);

    let count = if count == 0 { None } else { Some(count) };
    let summary = generator.run(&mut sink, count)?;
    println!("Sent {} payloads, {} alerts raised", summary.sent, summary.alerts);
    Ok(())
}

fn cmd_simulate(
    scenario: &str,
    count: u64,
    seed: u64,
    store: Option<String>,
) -> Result<(), CampusCliError> {
    let scenario: Scenario = scenario.parse()?;
    let settings = load_settings(store)?;
    let mut processor = IngestProcessor::open(settings)?;

    let mut generator = Generator::starting_now(scenario, seed, Duration::ZERO);
    let summary = generator.run(&mut ProcessorSink::new(&mut processor), Some(count))?;

    println!("Simulated {} {} payloads", summary.sent, scenario);
    println!("Alerts raised: {}", summary.alerts);
    for alert in processor.store().alerts(5) {
        println!(
            "  - {} {} {} [{}]",
            alert.ts.to_rfc3339(),
            alert.severity,
            alert.message,
            alert.reason_codes.join(", ")
        );
    }
    Ok(())
}

fn cmd_ingest(
    input: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    store: Option<String>,
) -> Result<(), CampusCliError> {
    let payloads = read_payloads(input, &input_format)?;
    if payloads.is_empty() {
        return Err(CampusCliError::NoPayloads);
    }

    let settings = load_settings(store)?;
    let mut processor = IngestProcessor::open(settings)?;

    let mut responses = Vec::with_capacity(payloads.len());
    let mut failed = 0usize;
    for (index, result) in processor.ingest_all(payloads).into_iter().enumerate() {
        match result {
            Ok(response) => responses.push(response),
            Err(e) => {
                failed += 1;
                log::warn!("payload {index} rejected: {e}");
            }
        }
    }

    print!("{}", format_output(&responses, &output_format)?);

    if failed > 0 {
        Err(CampusCliError::IngestFailed(failed))
    } else {
        Ok(())
    }
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), CampusCliError> {
    let payloads = read_payloads(input, &input_format)?;
    let results = PayloadAdapter::validate_payloads(&payloads);

    let report = ValidationReport {
        total_payloads: payloads.len(),
        valid_payloads: payloads.len() - results.len(),
        invalid_payloads: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                air_node_id: r.air_node_id.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total payloads:   {}", report.total_payloads);
        println!("Valid payloads:   {}", report.valid_payloads);
        println!("Invalid payloads: {}", report.invalid_payloads);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                let node = if err.air_node_id.is_empty() {
                    "unknown"
                } else {
                    err.air_node_id.as_str()
                };
                println!("  - Node {} (index {}): {}", node, err.index, err.error);
            }
        }
    }

    if report.invalid_payloads > 0 {
        Err(CampusCliError::ValidationFailed(report.invalid_payloads))
    } else {
        Ok(())
    }
}

fn cmd_encode(input: &Path, output: &Path, from: Encoding, to: Encoding) -> Result<(), CampusCliError> {
    let bytes = read_input_bytes(input)?;
    let payload = PayloadCodec::from(from).decode(&bytes)?;
    payload.validate()?;
    let encoded = PayloadCodec::from(to).encode(&payload)?;

    if is_stdio(output) {
        let mut stdout = io::stdout();
        stdout.write_all(&encoded)?;
        stdout.flush()?;
    } else {
        fs::write(output, encoded)?;
    }
    Ok(())
}

fn cmd_monitor(
    api_url: Option<String>,
    store: Option<PathBuf>,
    interval: f64,
    iterations: Option<u64>,
) -> Result<(), CampusCliError> {
    let mut source: Box<dyn MonitorSource> = match api_url {
        Some(url) => Box::new(HttpSource::new(&url)),
        None => {
            let path = match store {
                Some(path) => path,
                None => Settings::from_env()?
                    .store_path
                    .ok_or(CampusCliError::NoStore)?,
            };
            Box::new(StoreSource::new(path))
        }
    };

    let mut stdout = io::stdout();
    run_console(source.as_mut(), &mut stdout, seconds(interval)?, iterations)?;
    Ok(())
}

fn cmd_dataset(
    out: &Path,
    hours: u32,
    horizon_min: usize,
    window_min: usize,
    seed: u64,
) -> Result<(), CampusCliError> {
    let scenarios = [Scenario::Normal, Scenario::MoldEpisode];
    let rows = build_dataset(&scenarios, hours, horizon_min, window_min, seed);
    let (train, val, test) = time_split(&rows, 0.7, 0.15);

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    write_csv(&rows, out)?;
    println!("Wrote dataset to {} (rows={})", out.display(), rows.len());
    println!(
        "Split: train={} val={} test={}",
        train.len(),
        val.len(),
        test.len()
    );
    Ok(())
}

fn cmd_evaluate(
    out: Option<&Path>,
    hours: u32,
    horizon_min: usize,
    window_min: usize,
    seed: u64,
    threshold: f64,
    json: bool,
) -> Result<(), CampusCliError> {
    let scenarios = [Scenario::Normal, Scenario::MoldEpisode];
    let rows = build_dataset(&scenarios, hours, horizon_min, window_min, seed);
    let report = evaluate_baseline(&rows, horizon_min, threshold);

    if let Some(path) = out {
        report.write_predictions_csv(path)?;
    }

    if json {
        let summary = EvaluationSummary {
            rows: report.rows.len(),
            mae: report.mae,
            rmse: report.rmse,
            lead_time_minutes: report
                .lead_time_minutes
                .iter()
                .map(|(scenario, lead)| (scenario.as_str().to_string(), *lead))
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Baseline Evaluation");
        println!("===================");
        println!("Rows: {}", report.rows.len());
        println!("MAE:  {:.4}", report.mae);
        println!("RMSE: {:.4}", report.rmse);
        for (scenario, lead) in &report.lead_time_minutes {
            match lead {
                Some(minutes) => println!("Lead time ({scenario}): {minutes} min"),
                None => println!("Lead time ({scenario}): no crossing"),
            }
        }
        if let Some(path) = out {
            println!("Wrote predictions to {}", path.display());
        }
    }
    Ok(())
}

fn cmd_doctor(store: Option<PathBuf>, json: bool) -> Result<(), CampusCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "campus_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Smart Campus version {}", VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Payload schema: {}", SCHEMA_VERSION),
    });

    let settings = match Settings::from_env() {
        Ok(settings) => {
            checks.push(DoctorCheck {
                name: "settings".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "horizon {} min, alert threshold {} x{}, bind {}",
                    settings.forecast_horizon_minutes,
                    settings.alert_threshold,
                    settings.alert_consecutive,
                    settings.bind
                ),
            });
            Some(settings)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "settings".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            });
            None
        }
    };

    let store_path = store.or_else(|| settings.and_then(|s| s.store_path));
    match store_path {
        None => checks.push(DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Ok,
            message: "In-memory store (nothing persisted)".to_string(),
        }),
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Warning,
            message: format!("Store {} does not exist yet", path.display()),
        }),
        Some(path) => match TelemetryStore::open(&path) {
            Ok(store) => {
                let counts = store.counts();
                checks.push(DoctorCheck {
                    name: "store".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Store valid ({} raw, {} predictions, {} alerts)",
                        counts.raw, counts.predictions, counts.alerts
                    ),
                });
            }
            Err(e) => checks.push(DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read store {}: {}", path.display(), e),
            }),
        },
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ingest - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Campus Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CampusCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(json_schema: bool) -> Result<(), CampusCliError> {
    if json_schema {
        println!("{}", payload_json_schema());
        return Ok(());
    }

    println!("Payload Schema: {}", SCHEMA_VERSION);
    println!();
    println!("Encodings: JSON (application/json) or CBOR (application/cbor)");
    println!();
    println!("Required:");
    println!("  - ts (RFC 3339, UTC)");
    println!("  - building_id, air_node_id, water_node_id");
    for name in REQUIRED_MEASUREMENTS {
        println!("  - {name}");
    }
    println!("  - scenario: NORMAL | MOLD_EPISODE | WATER_EVENT | SENSOR_FAULT");
    println!("  - data_source: LIVE | EMULATED");
    println!();
    println!("Optional:");
    for name in OPTIONAL_MEASUREMENTS {
        println!("  - {name}");
    }
    Ok(())
}

// Helper functions

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_input_bytes(input: &Path) -> Result<Vec<u8>, CampusCliError> {
    if is_stdio(input) {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read(input)?)
    }
}

fn read_payloads(input: &Path, format: &InputFormat) -> Result<Vec<TelemetryPayload>, CampusCliError> {
    let input_data = if is_stdio(input) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let payloads = match format {
        InputFormat::Ndjson => PayloadAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => PayloadAdapter::parse_array(&input_data)?,
    };
    Ok(payloads)
}

fn seconds(value: f64) -> Result<Duration, CampusCliError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CampusCliError::Usage(format!("invalid duration: {value} seconds")))
}

fn format_output<T: Serialize>(items: &[T], format: &OutputFormat) -> Result<String, CampusCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for item in items {
                lines.push(serde_json::to_string(item)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(items)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(items)? + "\n"),
    }
}

fn payload_json_schema() -> String {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "ts".to_string(),
        serde_json::json!({
            "type": "string",
            "description": "RFC 3339 time; without an offset it is read as UTC"
        }),
    );
    for id in ["building_id", "air_node_id", "water_node_id"] {
        properties.insert(id.to_string(), serde_json::json!({ "type": "string", "minLength": 1 }));
    }
    for name in REQUIRED_MEASUREMENTS {
        properties.insert(
            name.to_string(),
            serde_json::json!({ "type": ["number", "null"], "description": "null marks a missing reading" }),
        );
    }
    for name in OPTIONAL_MEASUREMENTS {
        properties.insert(name.to_string(), serde_json::json!({ "type": "number" }));
    }
    properties.insert(
        "scenario".to_string(),
        serde_json::json!({
            "type": "string",
            "enum": Scenario::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>()
        }),
    );
    properties.insert(
        "data_source".to_string(),
        serde_json::json!({ "type": "string", "enum": ["LIVE", "EMULATED"] }),
    );

    let mut required = vec!["ts", "building_id", "air_node_id", "water_node_id"];
    required.extend(REQUIRED_MEASUREMENTS);
    required.extend(["scenario", "data_source"]);

    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SCHEMA_VERSION,
        "description": "Smart campus air and water telemetry payload",
        "type": "object",
        "required": required,
        "properties": properties
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum CampusCliError {
    Io(io::Error),
    Telemetry(TelemetryError),
    Json(serde_json::Error),
    Validation(smart_campus::schema::ValidationError),
    NoPayloads,
    NoStore,
    IngestFailed(usize),
    ValidationFailed(usize),
    DoctorFailed,
    Usage(String),
}

impl From<io::Error> for CampusCliError {
    fn from(e: io::Error) -> Self {
        CampusCliError::Io(e)
    }
}

impl From<TelemetryError> for CampusCliError {
    fn from(e: TelemetryError) -> Self {
        CampusCliError::Telemetry(e)
    }
}

impl From<serde_json::Error> for CampusCliError {
    fn from(e: serde_json::Error) -> Self {
        CampusCliError::Json(e)
    }
}

impl From<smart_campus::schema::ValidationError> for CampusCliError {
    fn from(e: smart_campus::schema::ValidationError) -> Self {
        CampusCliError::Validation(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CampusCliError> for CliError {
    fn from(e: CampusCliError) -> Self {
        match e {
            CampusCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CampusCliError::Telemetry(e) => {
                let (code, hint) = match &e {
                    TelemetryError::Config(_) => ("CONFIG_ERROR", "Check environment variables and .env"),
                    TelemetryError::Transport(_) => ("TRANSPORT_ERROR", "Is the API running? Check --api-url"),
                    TelemetryError::StoreError(_) => ("STORE_ERROR", "Run 'campus doctor' to inspect the store"),
                    TelemetryError::UnknownScenario(_) => (
                        "UNKNOWN_SCENARIO",
                        "Use NORMAL, MOLD_EPISODE, WATER_EVENT or SENSOR_FAULT",
                    ),
                    _ => ("PARSE_ERROR", "Ensure input matches campus.telemetry.v1"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CampusCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CampusCliError::Validation(e) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'campus validate' for details".to_string()),
            },
            CampusCliError::NoPayloads => CliError {
                code: "NO_PAYLOADS".to_string(),
                message: "No payloads found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            CampusCliError::NoStore => CliError {
                code: "NO_STORE".to_string(),
                message: "Store is in-memory; nothing to monitor".to_string(),
                hint: Some("Pass --store or --api-url".to_string()),
            },
            CampusCliError::IngestFailed(count) => CliError {
                code: "INGEST_FAILED".to_string(),
                message: format!("{} payloads were rejected", count),
                hint: Some("Run 'campus validate' on the input".to_string()),
            },
            CampusCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} payloads failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            CampusCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            CampusCliError::Usage(msg) => CliError {
                code: "USAGE_ERROR".to_string(),
                message: msg,
                hint: Some("Run with --help".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_payloads: usize,
    valid_payloads: usize,
    invalid_payloads: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    air_node_id: String,
    error: String,
}

#[derive(Serialize)]
struct EvaluationSummary {
    rows: usize,
    mae: f64,
    rmse: f64,
    lead_time_minutes: Vec<(String, Option<i64>)>,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
