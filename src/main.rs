use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mimic::config::{PointerConfig, SimulationConfig};
use mimic::logging::{init_logging, LogConfig, LogFormat};
use mimic::model::{ModeFlags, Point, WorkflowMessage};
use mimic::sim::{self, RecordingObserver, ResponseScript, SimSurface};
use mimic::simulator::plan_move;
use mimic::timing::Lcg;
use mimic::trace::TraceObserver;
use mimic::Orchestrator;

#[derive(Debug, Parser)]
#[command(name = "mimic")]
#[command(about = "Human-like input simulation and workflow rehearsal", long_about = None)]
struct Cli {
    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rehearse a full workflow against the in-memory surface and print the result (JSON)
    Run {
        /// Message text file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: PathBuf,

        /// Fallback message file, submitted once if the first response never arrives
        #[arg(long, value_name = "PATH")]
        fallback: Option<PathBuf>,

        /// Simulation config (JSON); unspecified fields keep their defaults
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Seed for the run's random sequence
        #[arg(long)]
        seed: Option<u32>,

        /// Sample at which the simulated response becomes ready.
        ///
        /// Omit to simulate a response that never arrives.
        #[arg(long, value_name = "N")]
        ready_on_sample: Option<u32>,

        /// Text of the simulated response
        #[arg(long, default_value = "Simulated response.")]
        response: String,

        /// Don't click "new session" first
        #[arg(long)]
        skip_reset: bool,

        /// Commit the message in one go instead of typing it
        #[arg(long)]
        force_bulk: bool,

        /// Maybe pause (with idle pointer jitter) before clicking submit
        #[arg(long)]
        think_before_submit: bool,

        /// Disable the typing trace
        #[arg(long)]
        no_trace: bool,
    },

    /// Print the trajectory a pointer move would follow, detours included (JSON)
    Path {
        /// Start point as X,Y
        #[arg(long, value_parser = parse_point)]
        from: Point,

        /// End point as X,Y
        #[arg(long, value_parser = parse_point)]
        to: Point,

        #[arg(long)]
        seed: Option<u32>,

        /// Straight line, no target jitter or detours
        #[arg(long)]
        direct: bool,
    },

    /// Print the default simulation config (JSON)
    Config,
}

fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad X {x:?}: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad Y {y:?}: {e}"))?;
    Ok(Point::new(x, y))
}

fn read_input(path: &PathBuf) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(path: Option<&PathBuf>, seed: Option<u32>) -> Result<SimulationConfig> {
    let mut cfg = match path {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if seed.is_some() {
        cfg.seed = seed;
    }
    Ok(cfg)
}

fn rng_from_seed(seed: Option<u32>) -> Lcg {
    match seed {
        Some(seed) => Lcg::new(seed),
        None => Lcg::from_entropy(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.log_json || cfg!(feature = "json-logs") {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(LogConfig {
        format,
        ..LogConfig::default()
    })?;

    match cli.command {
        Command::Run {
            input,
            fallback,
            config,
            seed,
            ready_on_sample,
            response,
            skip_reset,
            force_bulk,
            think_before_submit,
            no_trace,
        } => {
            let content = read_input(&input)?;
            let fallback_content = fallback.as_ref().map(read_input).transpose()?;
            let cfg = load_config(config.as_ref(), seed)?;

            let script = match ready_on_sample {
                Some(k) => ResponseScript::ready_on(k, response),
                None => ResponseScript::never(),
            };
            let surface = Arc::new(SimSurface::new().respond_with(script));
            let recorder = Arc::new(RecordingObserver::default());

            let mut orchestrator =
                Orchestrator::new(surface.clone(), cfg).with_observer(recorder.clone());
            if !no_trace {
                orchestrator = orchestrator.with_observer(Arc::new(TraceObserver::new()));
            }

            let cancel = orchestrator.cancellation_token();
            ctrlc::set_handler(move || cancel.cancel())
                .context("failed to install Ctrl+C handler")?;

            let message = WorkflowMessage {
                content,
                fallback_content,
                mode_flags: ModeFlags {
                    skip_reset,
                    force_bulk,
                    think_before_submit,
                },
            };

            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            let result = runtime.block_on(orchestrator.run(message));

            let stats = sim::stats(&recorder.events());
            eprintln!(
                "Simulated: {} pointer events, {} key events, {} samples, ~{:.1} s of waits, {} submission(s)",
                stats.pointer_events,
                stats.key_events,
                stats.samples,
                (stats.total_wait_ms as f64) / 1000.0,
                surface.submissions().len()
            );

            let json =
                serde_json::to_string_pretty(&result).context("failed to serialize result")?;
            println!("{json}");

            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Path {
            from,
            to,
            seed,
            direct,
        } => {
            let cfg = if direct {
                PointerConfig::direct()
            } else {
                PointerConfig::default()
            };
            let mut rng = rng_from_seed(seed);
            let steps = plan_move(from, to, &cfg, &mut rng);
            let json = serde_json::to_string_pretty(&steps).context("failed to serialize path")?;
            println!("{json}");
        }
        Command::Config => {
            let json = serde_json::to_string_pretty(&SimulationConfig::default())
                .context("failed to serialize config")?;
            println!("{json}");
        }
    }

    Ok(())
}
