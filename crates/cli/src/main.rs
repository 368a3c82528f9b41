mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiorip_core::{
    load_config_or_default, validate_config, FfmpegEngine, FinalArtifact, InputFile, JobEvent,
    JobSpecification, PipelineOrchestrator,
};

use cli::{build_cli, CliArgs};

/// Buffer size for the job event channel
const EVENT_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging; stdout is reserved for results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::from_matches(&build_cli().get_matches());

    // Load configuration
    match &args.config {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }
    let config = load_config_or_default(args.config.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let options = args.job_options(&config.job);
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());
    info!("ffmpeg: {:?}", config.engine.ffmpeg_path);
    info!("Output directory: {:?}", output_dir);

    let inputs = read_inputs(&args.inputs).await?;
    let spec = JobSpecification::new(inputs, options);

    // Start the engine
    let engine = Arc::new(
        FfmpegEngine::load(config.engine.clone())
            .await
            .context("Failed to start ffmpeg engine")?,
    );
    let orchestrator = PipelineOrchestrator::with_engine(Arc::clone(&engine));

    // Forward job events to the terminal
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let printer = tokio::spawn(print_events(events_rx, args.json));

    // Cancel at the next stage boundary on Ctrl+C
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current stage");
                cancel.cancel();
            }
        })
    };

    let result = orchestrator
        .run_with_cancellation(spec, Some(events_tx), cancel)
        .await;
    interrupt.abort();
    if let Err(e) = printer.await {
        warn!("Event printer stopped unexpectedly: {}", e);
    }

    // Shutdown the engine
    drop(orchestrator);
    match Arc::try_unwrap(engine) {
        Ok(engine) => {
            if let Err(e) = engine.shutdown().await {
                warn!("Engine shutdown failed: {}", e);
            }
        }
        Err(_) => warn!("Engine still in use, skipping shutdown"),
    }

    let output = result.context("Extraction failed")?;

    let paths = write_artifacts(&output_dir, &output.artifacts).await?;
    for (path, artifact) in paths.iter().zip(&output.artifacts) {
        if args.json {
            println!(
                "{}",
                serde_json::json!({
                    "artifact": path,
                    "bytes": artifact.size(),
                })
            );
        } else {
            println!("{}", path.display());
        }
    }

    info!(
        "Wrote {} file(s), {} bytes in {} ms",
        paths.len(),
        output.total_bytes(),
        output.elapsed_ms
    );
    Ok(())
}

/// Reads every input into memory, named after its file name.
async fn read_inputs(paths: &[PathBuf]) -> Result<Vec<InputFile>> {
    let mut inputs = Vec::with_capacity(paths.len());

    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("Input path has no file name: {:?}", path))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read input {:?}", path))?;

        info!("Loaded {} ({} bytes)", name, bytes.len());
        inputs.push(InputFile::new(name, bytes));
    }

    Ok(inputs)
}

async fn write_artifacts(dir: &Path, artifacts: &[FinalArtifact]) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;

    let mut paths = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = dir.join(&artifact.name);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        paths.push(path);
    }

    Ok(paths)
}

async fn print_events(mut events: mpsc::Receiver<JobEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
            continue;
        }

        match event {
            JobEvent::Progress { percent, label } => info!("[{:>3}%] {}", percent, label),
            JobEvent::Log { line } => debug!("ffmpeg: {}", line),
            JobEvent::State { state } => debug!("State: {:?}", state),
        }
    }
}
