//! viewer-pool-sim: drives the viewer pool with a synthetic chat feed and a
//! fake theater.

mod theater;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use rand::seq::IndexedRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use viewer_pool::{
    ChatIngest, ChatMessage, IngestOutcome, LifecycleHandler, PoolConfig, SharedConfig,
    Simulation, SystemClock, ViewerPoolService,
};

use crate::theater::{Theater, TheaterEvent};

#[derive(Debug, Clone, PartialEq)]
struct Options {
    config: Option<PathBuf>,
    duration: Option<Duration>,
    viewers: usize,
    capacity: usize,
    tick: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: None,
            duration: None,
            viewers: 40,
            capacity: 12,
            tick: Duration::from_millis(250),
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let options = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: viewer-pool-sim [--config <file>] [--duration-secs <n>] [--viewers <n>]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --config <file>        JSON pool configuration [default: built-in + VIEWER_POOL_* env]");
            eprintln!("  --duration-secs <n>    Stop after n seconds [default: run until Ctrl+C]");
            eprintln!("  --viewers <n>          Distinct synthetic chatters [default: 40]");
            eprintln!("  --capacity <n>         Maximum theater population [default: 12]");
            eprintln!("  --tick-ms <n>          Simulation tick period [default: 250]");
            process::exit(2);
        }
    };

    viewer_pool::telemetry::init_tracing();

    if let Err(e) = run(options).await {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                options.config = Some(PathBuf::from(
                    args.get(i).ok_or("--config requires a value")?,
                ));
            }
            "--duration-secs" => {
                i += 1;
                let secs: u64 = parse_number(args.get(i), "--duration-secs")?;
                options.duration = Some(Duration::from_secs(secs));
            }
            "--viewers" => {
                i += 1;
                options.viewers = parse_number(args.get(i), "--viewers")?;
            }
            "--capacity" => {
                i += 1;
                options.capacity = parse_number(args.get(i), "--capacity")?;
            }
            "--tick-ms" => {
                i += 1;
                let ms: u64 = parse_number(args.get(i), "--tick-ms")?;
                if ms == 0 {
                    return Err("--tick-ms must be greater than zero".to_string());
                }
                options.tick = Duration::from_millis(ms);
            }
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    if options.viewers == 0 {
        return Err("--viewers must be greater than zero".to_string());
    }
    Ok(options)
}

fn parse_number<T: std::str::FromStr>(value: Option<&String>, flag: &str) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .parse()
        .map_err(|_| format!("{flag} expects a number, got '{value}'"))
}

async fn run(options: Options) -> anyhow::Result<()> {
    let config = match &options.config {
        Some(path) => PoolConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PoolConfig::from_env().context("loading configuration from environment")?,
    };
    tracing::info!(
        selection = %config.selection,
        max_pool_size = config.max_pool_size,
        immediate_spawn = config.immediate_spawn,
        "Starting viewer pool simulation"
    );

    let service = Arc::new(
        ViewerPoolService::from_config(SharedConfig::new(config), Arc::new(SystemClock))
            .context("loading predefined names")?,
    );
    let (theater, events) = Theater::new(options.capacity);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, shutting down...");
            shutdown.cancel();
        }
    });
    if let Some(duration) = options.duration {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            deadline.cancel();
        });
    }

    let summary = simulate(service, theater, events, &options, cancel).await;
    tracing::info!(
        summary = %serde_json::to_string(&summary.outcomes).unwrap_or_default(),
        ticks = summary.ticks,
        spawned = summary.spawned,
        swept = summary.swept,
        "Simulation finished"
    );
    Ok(())
}

/// Counters collected over one run.
#[derive(Debug, Default)]
struct Summary {
    outcomes: BTreeMap<&'static str, u64>,
    ticks: u64,
    spawned: u64,
    swept: usize,
}

fn outcome_label(outcome: &IngestOutcome) -> &'static str {
    match outcome {
        IngestOutcome::NotACommand => "not_a_command",
        IngestOutcome::UnknownCommand(_) => "unknown_command",
        IngestOutcome::Denied { .. } => "denied",
        IngestOutcome::OnCooldown { .. } => "on_cooldown",
        IngestOutcome::Admitted => "admitted",
        IngestOutcome::Rejected(_) => "rejected",
        IngestOutcome::OverwroteIdle(_) => "overwrote_idle",
        IngestOutcome::Invalid => "invalid",
    }
}

fn synthetic_message(viewers: usize) -> ChatMessage {
    const LINES: &[&str] = &["!visit", "!VISIT", "hello chat", "!dance", "!visit pls", "lol"];

    let mut rng = rand::rng();
    let username = format!("viewer{}", rng.random_range(0..viewers));
    let text = LINES.choose(&mut rng).copied().unwrap_or("!visit");
    let mut message = ChatMessage::new(username, text);
    if rng.random_bool(0.2) {
        message = message.with_badge("subscriber");
    }
    message
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(20..200))
}

/// Producer context: feed chat into the ingest path until cancelled.
async fn chat_producer(
    ingest: ChatIngest,
    viewers: usize,
    cancel: CancellationToken,
) -> BTreeMap<&'static str, u64> {
    let mut outcomes = BTreeMap::new();
    loop {
        let message = synthetic_message(viewers);
        let outcome = ingest.handle(&message);
        *outcomes.entry(outcome_label(&outcome)).or_insert(0) += 1;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(jitter()) => {}
        }
    }
    outcomes
}

fn dispatch(handler: &LifecycleHandler, event: TheaterEvent) {
    match event {
        TheaterEvent::Created(entity) => {
            handler.on_entity_created(entity);
        }
        TheaterEvent::BecameInteractive(entity) => {
            handler.on_entity_became_interactive(entity);
        }
        TheaterEvent::Left(entity) => {
            handler.on_entity_released(entity);
        }
    }
}

/// Consumer context: one loop owns the theater's hooks and the tick.
async fn simulate(
    service: Arc<ViewerPoolService>,
    theater: Arc<Theater>,
    mut events: mpsc::UnboundedReceiver<TheaterEvent>,
    options: &Options,
    cancel: CancellationToken,
) -> Summary {
    let simulation: Arc<dyn Simulation> = theater.clone();
    let handler = LifecycleHandler::new(Arc::clone(&service), Arc::clone(&simulation));
    let ingest = ChatIngest::new(Arc::clone(&service), simulation);

    let producer = tokio::spawn(chat_producer(ingest, options.viewers, cancel.clone()));

    let mut summary = Summary::default();
    let mut tick = tokio::time::interval(options.tick);
    let mut status = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(event) = events.recv() => dispatch(&handler, event),
            _ = tick.tick() => {
                summary.ticks += 1;
                theater.step();
                if !service.config().snapshot().immediate_spawn {
                    theater.walk_in();
                }
                let report = handler.on_tick();
                summary.swept += report.swept.unwrap_or(0);
                if report.spawned.is_some() {
                    summary.spawned += 1;
                }
            }
            _ = status.tick() => {
                let snapshot = service.snapshot();
                tracing::info!(
                    snapshot = %serde_json::to_string(&snapshot).unwrap_or_default(),
                    population = theater.population(),
                    "Pool status"
                );
            }
        }
    }

    // Deliver whatever the theater emitted before the stop.
    while let Ok(event) = events.try_recv() {
        dispatch(&handler, event);
    }

    match producer.await {
        Ok(outcomes) => summary.outcomes = outcomes,
        Err(e) => tracing::error!(error = %e, "Chat producer task failed"),
    }

    handler.shutdown();
    summary
}
