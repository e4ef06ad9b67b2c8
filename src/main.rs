use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uwb_positioning::api::{EstimateSink, Estimator, JsonLinesSink, LogSink};
use uwb_positioning::network::{IngestionWorker, WorkerSettings};
use uwb_positioning::processing::RangeStore;
use uwb_positioning::utils::{Config, Shutdown};
use uwb_positioning::StartupError;

/// Estimate a UWB tag position from streamed anchor ranges
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingestion port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address (overrides the config file)
    #[arg(long)]
    bind: Option<String>,

    /// Estimation period in milliseconds (overrides the config file)
    #[arg(long)]
    cadence_ms: Option<u64>,

    /// Write each estimate as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<Config, StartupError> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = &args.bind {
        config.bind_address = bind.clone();
    }
    if let Some(cadence_ms) = args.cadence_ms {
        config.cadence_ms = cadence_ms;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<(), StartupError> {
    let config = load_config(&args)?;

    let layout = Arc::new(config.build_layout()?);
    for (id, position) in layout.iter() {
        info!(anchor = %id, x = position.x, y = position.y, "anchor");
    }

    let store = RangeStore::new();
    let worker = IngestionWorker::bind(
        &config.listen_address(),
        layout.clone(),
        store.clone(),
        WorkerSettings::from(&config),
    )?;

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            shutdown.trigger();
        })?;
    }

    let ingestion = {
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("ingestion".to_string())
            .spawn(move || {
                let result = worker.run(&shutdown);
                // Stop the estimator too once ingestion is over (single session, accept failure)
                shutdown.trigger();
                result
            })
            .map_err(StartupError::Spawn)?
    };

    let mut sink: Box<dyn EstimateSink> = if args.json {
        Box::new(JsonLinesSink::new(io::stdout()))
    } else {
        Box::new(LogSink::new())
    };

    let mut estimator = Estimator::from_config(&config, layout, store);
    estimator.run(sink.as_mut(), config.cadence(), &shutdown);

    match ingestion.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "ingestion stopped with an error"),
        Err(_) => return Err(StartupError::IngestionPanicked),
    }

    info!("shutdown complete");
    Ok(())
}

fn main() -> Result<(), StartupError> {
    let args = Args::parse();
    init_logging(args.verbose);

    run(args).map_err(|e| {
        error!(error = %e, "fatal");
        e
    })
}
