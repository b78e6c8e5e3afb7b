use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use queuesim_engine::{
    ControllerSettings, QueueSnapshot, RunState, SimulationConfig, SimulationController,
    SimulationTelemetry, StartOutcome, Statistics,
};
use serde::Serialize;
use shared_event_bus::{EventRecord, FileEventPublisher, MemoryEventBus};
use shared_logging::LogLevel;
use tokio::sync::broadcast::{error::RecvError, Receiver};

#[derive(Parser, Debug)]
#[command(name = "queuesim", version, about = "Multi-cashier queue simulation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs one simulation to completion and prints the final statistics.
    Run(SimArgs),
    /// Drives the simulation from line commands on stdin.
    Interactive(SimArgs),
}

#[derive(Parser, Debug, Clone)]
struct SimArgs {
    /// TOML file with cashier_count, max_service_time_ms, max_generation_time_ms, customer_count.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    cashiers: usize,
    #[arg(long, default_value_t = 50)]
    max_service_ms: u64,
    #[arg(long, default_value_t = 20)]
    max_generation_ms: u64,
    #[arg(long, default_value_t = 100)]
    customers: u64,
    /// Makes every delay stream reproducible.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 250)]
    report_interval_ms: u64,
    #[arg(long, default_value_t = 5)]
    tick_ms: u64,
    /// JSON-lines log file.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Include debug records in the log.
    #[arg(long)]
    verbose: bool,
    /// JSON-lines lifecycle event file.
    #[arg(long)]
    event_log: Option<PathBuf>,
}

impl SimArgs {
    fn simulation_config(&self) -> Result<SimulationConfig> {
        if let Some(path) = &self.config {
            return SimulationConfig::load(path);
        }
        let config = SimulationConfig::new(
            self.cashiers,
            self.max_service_ms,
            self.max_generation_ms,
            self.customers,
        );
        config.validate().context("invalid simulation flags")?;
        Ok(config)
    }

    fn controller(&self, bus: Option<Arc<MemoryEventBus>>) -> Result<SimulationController> {
        let mut settings = ControllerSettings {
            tick_period_ms: self.tick_ms.max(1),
            ..ControllerSettings::default()
        };
        if let Some(seed) = self.seed {
            settings = settings.with_seed(seed);
        }
        Ok(SimulationController::with_settings(
            settings,
            self.telemetry(bus)?,
        ))
    }

    fn telemetry(&self, bus: Option<Arc<MemoryEventBus>>) -> Result<Option<SimulationTelemetry>> {
        if self.log.is_none() && self.event_log.is_none() && bus.is_none() {
            return Ok(None);
        }
        let level = if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };
        let mut builder = SimulationTelemetry::builder("controller").min_level(level);
        if let Some(path) = &self.log {
            builder = builder.log_path(path);
        }
        if let Some(path) = &self.event_log {
            let publisher = FileEventPublisher::new(path)
                .with_context(|| format!("opening event log {}", path.display()))?;
            builder = builder.event_publisher(Arc::new(publisher));
        }
        if let Some(bus) = bus {
            builder = builder.event_publisher(bus);
        }
        builder.build().map(Some)
    }
}

#[derive(Debug, Serialize)]
struct Averages {
    wait_ms: f64,
    service_ms: f64,
    idle_ms: f64,
}

impl From<&Statistics> for Averages {
    fn from(stats: &Statistics) -> Self {
        Self {
            wait_ms: stats.average_wait_ms(),
            service_ms: stats.average_service_ms(),
            idle_ms: stats.average_idle_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueueReport {
    index: usize,
    length: usize,
    statistics: Statistics,
    averages: Averages,
}

#[derive(Debug, Serialize)]
struct FinalReport {
    state: Option<RunState>,
    config: Option<SimulationConfig>,
    generated: u64,
    elapsed_ms: u128,
    aggregate: Statistics,
    averages: Averages,
    queues: Vec<QueueReport>,
}

impl FinalReport {
    fn collect(controller: &SimulationController, elapsed: Duration) -> Self {
        let snapshot = controller.snapshot();
        let aggregate = controller.aggregate_statistics();
        Self {
            state: controller.run_state(),
            config: controller.config(),
            generated: controller.generated_count(),
            elapsed_ms: elapsed.as_millis(),
            averages: Averages::from(&aggregate),
            aggregate,
            queues: snapshot.queues.iter().map(queue_report).collect(),
        }
    }
}

fn queue_report(queue: &QueueSnapshot) -> QueueReport {
    QueueReport {
        index: queue.index,
        length: queue.length,
        statistics: queue.statistics,
        averages: Averages::from(&queue.statistics),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Interactive(args) => handle_interactive(&args),
    }
}

fn handle_run(args: &SimArgs) -> Result<()> {
    let config = args.simulation_config()?;
    let controller = args.controller(None)?;
    let started = Instant::now();
    controller.start(config).context("starting simulation")?;

    let interval = Duration::from_millis(args.report_interval_ms.max(1));
    while !controller.wait_until_complete(interval) {
        println!("{}", progress_line(&controller));
    }
    println!("{}", progress_line(&controller));

    let report = FinalReport::collect(&controller, started.elapsed());
    println!("{}", serde_json::to_string_pretty(&report)?);
    controller.shutdown();
    Ok(())
}

fn progress_line(controller: &SimulationController) -> String {
    let stats = controller.aggregate_statistics();
    format!(
        "{} | generated {} | served {} | lengths {:?}",
        Utc::now().format("%H:%M:%S%.3f"),
        controller.generated_count(),
        stats.customers_served,
        controller.queue_lengths(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start(SimulationConfig),
    Go,
    Pause,
    Resume,
    Kill,
    Inspect(usize),
    Stats,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let args: Vec<&str> = words.collect();
        let expect_args = |n: usize| -> Result<()> {
            if args.len() == n {
                Ok(())
            } else {
                bail!("`{verb}` takes {n} argument(s), got {}", args.len())
            }
        };
        match verb {
            "start" => {
                expect_args(4)?;
                let config = SimulationConfig::new(
                    parse_number(args[0], "cashiers")?,
                    parse_number(args[1], "max service ms")?,
                    parse_number(args[2], "max generation ms")?,
                    parse_number(args[3], "customers")?,
                );
                config.validate()?;
                Ok(Self::Start(config))
            }
            "inspect" => {
                expect_args(1)?;
                Ok(Self::Inspect(parse_number(args[0], "queue index")?))
            }
            "go" | "pause" | "resume" | "kill" | "stats" | "help" | "quit" | "exit" => {
                expect_args(0)?;
                Ok(match verb {
                    "go" => Self::Go,
                    "pause" => Self::Pause,
                    "resume" => Self::Resume,
                    "kill" => Self::Kill,
                    "stats" => Self::Stats,
                    "help" => Self::Help,
                    _ => Self::Quit,
                })
            }
            other => bail!("unknown command `{other}` (try `help`)"),
        }
    }
}

fn parse_number<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("{what}: `{raw}` is not a valid number"))
}

const HELP: &str = "\
commands:
  start C S G N   cashiers, max service ms, max generation ms, customers
  go              start with the last configuration (resumes if unchanged)
  pause | resume | kill
  inspect I       select queue I for detailed statistics
  stats           print the current snapshot
  quit";

fn handle_interactive(args: &SimArgs) -> Result<()> {
    let mut config = args.simulation_config()?;
    let bus = Arc::new(MemoryEventBus::new(64));
    watch_completions(bus.subscribe())?;
    let controller = args.controller(Some(bus))?;
    println!("{HELP}");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                println!("error: {err:#}");
                continue;
            }
        };
        match command {
            Command::Start(next) => {
                config = next;
                report_start(&controller, config);
            }
            Command::Go => report_start(&controller, config),
            Command::Pause => controller.pause(),
            Command::Resume => controller.resume(),
            Command::Kill => controller.kill(),
            Command::Inspect(index) => match controller.select_queue_for_inspection(index) {
                Ok(()) => println!(
                    "queue {index}: {}",
                    serde_json::to_string(&controller.inspected_statistics())?
                ),
                Err(err) => println!("error: {err}"),
            },
            Command::Stats => {
                println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
        println!("{}", progress_line(&controller));
        stdout.flush()?;
    }
    controller.shutdown();
    Ok(())
}

/// Prints the final totals whenever a run completes, without waiting for input.
fn watch_completions(mut events: Receiver<EventRecord>) -> Result<()> {
    thread::Builder::new()
        .name("completion-watcher".into())
        .spawn(move || loop {
            match events.blocking_recv() {
                Ok(event) if event.event_type == "simulation.completed" => {
                    println!("{}", completion_message(&event));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        })
        .context("spawning completion watcher")?;
    Ok(())
}

fn completion_message(event: &EventRecord) -> String {
    let statistics = serde_json::to_string_pretty(&event.payload["statistics"])
        .unwrap_or_else(|_| event.payload["statistics"].to_string());
    format!("simulation complete\n{statistics}")
}

fn report_start(controller: &SimulationController, config: SimulationConfig) {
    match controller.start(config) {
        Ok(StartOutcome::Rebuilt) => println!("started {config:?}"),
        Ok(StartOutcome::Resumed) => println!("resumed"),
        Err(err) => println!("error: {err}"),
    }
}
