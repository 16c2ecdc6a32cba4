use binlog_rollback::binlog::JsonLinesSource;
use binlog_rollback::config::ConfigOverrides;
use binlog_rollback::pipeline::FileSink;
use binlog_rollback::{Config, Error, Result, RollbackGenerator};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "binlog-rollback")]
#[command(about = "Generate rollback SQL from MySQL binlog row events", long_about = None)]
#[command(after_help = "Example:\n  binlog-rollback --events events.jsonl --binlog-file mysql-bin.000124 \\\n    --only-tables t1 --only-operation delete \\\n    --start-time \"2023-07-06 10:00:00\" --end-time \"2023-07-06 22:00:00\"")]
struct Args {
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Decoded row events, one JSON object per line")]
    events: Option<String>,

    #[arg(long)]
    binlog_file: Option<String>,

    #[arg(long, help = "Binlog position to start after (default 4)")]
    binlog_pos: Option<u64>,

    #[arg(long, help = "Server binlog_format, checked before the run")]
    binlog_format: Option<String>,

    #[arg(long, help = "Server binlog_row_image, checked before the run")]
    binlog_row_image: Option<String>,

    #[arg(long = "only-tables", value_delimiter = ',', help = "Tables to recover, comma separated")]
    only_tables: Option<Vec<String>>,

    #[arg(long = "only-operation", help = "insert, update or delete")]
    only_operation: Option<String>,

    #[arg(long, help = "YYYY-MM-DD HH:MM:SS")]
    start_time: Option<String>,

    #[arg(long, help = "YYYY-MM-DD HH:MM:SS")]
    end_time: Option<String>,

    #[arg(long, help = "UTC offset of the start/end times, e.g. +08:00")]
    utc_offset: Option<String>,

    #[arg(long, help = "Number of windows and synthesis workers (default 4)")]
    max_workers: Option<usize>,

    #[arg(long = "print", help = "Echo generated SQL to the terminal")]
    print_output: bool,

    #[arg(long = "replace", help = "Also write REPLACE-based rollbacks for updates")]
    replace_output: bool,

    #[arg(long, value_name = "DIR")]
    output_dir: Option<String>,

    #[arg(long, value_name = "FILE")]
    checkpoint_file: Option<String>,

    #[arg(long, help = "Start after the position stored in the checkpoint file")]
    resume: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            events_path: self.events.clone(),
            binlog_file: self.binlog_file.clone(),
            binlog_pos: self.binlog_pos,
            binlog_format: self.binlog_format.clone(),
            binlog_row_image: self.binlog_row_image.clone(),
            tables: self.only_tables.clone(),
            operation: self.only_operation.clone(),
            start: self.start_time.clone(),
            end: self.end_time.clone(),
            utc_offset: self.utc_offset.clone(),
            worker_count: self.max_workers,
            emit_alternate_reverse: self.replace_output,
            echo_to_console: self.print_output,
            output_dir: self.output_dir.clone(),
            checkpoint_file: self.checkpoint_file.clone(),
            resume_from_checkpoint: self.resume,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting binlog-rollback");

    let config = match Config::load(args.config.as_deref(), &args.overrides()) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(Error::ConfigLoad(e));
        }
    };

    let settings = config.validate().map_err(|e| {
        error!("{}", e);
        e
    })?;

    info!(
        events = ?settings.events_path,
        resume_position = %settings.resume_position,
        tables = ?settings.tables,
        operation = ?settings.operation,
        workers = settings.worker_count,
        output_dir = ?settings.output_dir,
        "Configuration summary"
    );

    let source = JsonLinesSource::new(&settings.events_path, settings.tables.clone());
    let stamp = chrono::Utc::now()
        .with_timezone(&settings.utc_offset)
        .format("%Y-%m-%d_%H-%M-%S")
        .to_string();
    let sink = FileSink::new(&settings.output_dir, stamp);
    let precondition = settings.replication.clone();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current window");
            on_signal.cancel();
        }
    });

    let generator = RollbackGenerator::new(settings);
    let report = generator
        .run_with_cancel(source, &precondition, sink, cancel)
        .await
        .map_err(|e| {
            error!("{}", e);
            e
        })?;

    info!(
        windows = report.windows_completed,
        scanned = report.events_scanned,
        statements = report.statements_emitted,
        replace_statements = report.alternates_emitted,
        malformed = report.malformed.len(),
        resume_position = %report.final_position,
        "Done"
    );

    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("binlog_rollback=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("binlog_rollback=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
