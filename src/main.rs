#![forbid(unsafe_code)]

//! `cogdir` runs directional-thought sessions in a terminal, previews
//! schedules and analyzes recorded sessions.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use cogdir_core::Mode;
use cogdir_experiment::sequencer::{generate_attention_checks, generate_sequence};
use cogdir_experiment::{Credentials, ExperimentConfig, SessionController, SessionStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod answers;
mod console;
mod simulated;

use console::ConsolePresenter;
use simulated::SimulatedHeadset;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum AnswerSource {
    /// Answer every check correctly after a short delay.
    Auto,
    /// Read answers and commands from stdin.
    Stdin,
}

#[derive(Debug, Parser)]
#[command(name = "cogdir", about = "Directional-thought experiment runner", version)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one session.
    Run {
        /// inner-speech, visualized or pronounced.
        #[arg(long)]
        mode: Mode,
        /// TOML experiment configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for session files.
        #[arg(long, default_value = "data/raw")]
        data_dir: PathBuf,
        /// Record from the simulated headset.
        #[arg(long)]
        simulate: bool,
        #[arg(long, value_enum, default_value_t = AnswerSource::Stdin)]
        answers: AnswerSource,
    },
    /// Compute per-direction band statistics for a session file.
    Analyze { file: PathBuf },
    /// Print a generated direction sequence and attention-check schedule.
    Schedule {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(dispatch(cli.command));
    // stdin reads park a blocking thread that would otherwise hold shutdown
    runtime.shutdown_background();
    result
}

async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run {
            mode,
            config,
            data_dir,
            simulate,
            answers,
        } => run(mode, load_config(config)?, data_dir, simulate, answers).await,
        Command::Analyze { file } => {
            let (report, out) = cogdir_analysis::analyze_file(&file)
                .with_context(|| format!("failed to analyze {}", file.display()))?;
            println!("{}", cogdir_analysis::render_report(&report));
            println!("Analysis results saved to: {}", out.display());
            Ok(())
        }
        Command::Schedule { config } => schedule(&load_config(config)?),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ExperimentConfig> {
    let config = match path {
        Some(path) => ExperimentConfig::from_path(&path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

async fn run(
    mode: Mode,
    config: ExperimentConfig,
    data_dir: PathBuf,
    simulate: bool,
    answers: AnswerSource,
) -> Result<()> {
    let seed = config.seed;
    let controller = SessionController::builder(config)
        .presenter(ConsolePresenter)
        .store(SessionStore::new(&data_dir))
        .build()?;

    if simulate {
        let credentials =
            Credentials::from_env().unwrap_or_else(|| Credentials::new("simulated", "", ""));
        controller
            .connect_device(Box::new(SimulatedHeadset::new(seed)), &credentials)
            .await
            .context("failed to connect the simulated headset")?;
    } else if Credentials::from_env().is_some() {
        warn!("device credentials found but no hardware adapter is available; recording trial log only");
    }

    controller.start_with(mode).await?;
    info!(%mode, data_dir = %data_dir.display(), "session running");

    let input = match answers {
        AnswerSource::Auto => tokio::spawn(answers::auto_answer(
            controller.clone(),
            Duration::from_millis(600),
        )),
        AnswerSource::Stdin => {
            println!("Commands: u/d/l/r answer, p pause, s start/resume, q stop");
            tokio::spawn(answers::stdin_commands(controller.clone()))
        }
    };

    let report = tokio::select! {
        report = controller.wait_finished() => report,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
            controller.stop().await;
            controller.last_report()
        }
    };
    input.abort();

    let Some(report) = report else {
        bail!("session ended without a report");
    };
    let session = &report.session;
    println!(
        "\n{} of {} trials completed ({:?})",
        report.stop.completed_trials, session.total_trials, report.stop.reason
    );
    if let Some(accuracy) = session.attention_accuracy() {
        println!("Attention accuracy: {:.0}%", accuracy * 100.0);
    }
    if let Some(err) = &report.stop.error {
        println!("Warning: data may not be saved ({err})");
    }
    Ok(())
}

fn schedule(config: &ExperimentConfig) -> Result<()> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let total = config.total_trials();
    let checks = generate_attention_checks(total, config.attention.check_probability, &mut rng);
    let sequence = generate_sequence(&config.paradigm, &mut rng);
    let out = serde_json::json!({
        "totalTrials": total,
        "sequence": sequence,
        "attentionChecks": checks,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))?,
    }
    Ok(())
}
