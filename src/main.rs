use burn::backend::Autodiff;
use burn::optim::AdamConfig;
use burn_ndarray::NdArray;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trader_dqn::cli::{load_config, Cli, Commands};
use trader_dqn::config::{AppConfig, LoggingConfig};
use trader_dqn::error::{Result, TraderError};
use trader_dqn::{DqnTrainer, QNetwork, QNetworkConfig, TradingEnvironment, TrainingSummary};

type TrainingBackend = Autodiff<NdArray<f32>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            config,
            episodes,
            seed,
        } => {
            let mut config = load_config(config.as_ref())?;
            if seed.is_some() {
                config.seed = seed;
            }
            init_logging(&config.logging);
            run_training(config, episodes).await?;
        }
        Commands::Config { config } => {
            init_logging_simple();
            let config = load_config(config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_training(config: AppConfig, episodes: usize) -> Result<()> {
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("invalid configuration: {}", e);
        }
        return Err(TraderError::InvalidConfig(errors.join("; ")));
    }

    let device = Default::default();
    // Market noise gets its own stream so it is not correlated with exploration
    let environment =
        TradingEnvironment::new(config.market.clone(), config.seed.map(|s| s.wrapping_add(1)))?;
    let network = QNetworkConfig::new(environment.observation_dim())
        .with_hidden_dim(config.network.hidden_dim)
        .init::<TrainingBackend>(&device);
    let optimizer = AdamConfig::new().init::<TrainingBackend, QNetwork<TrainingBackend>>();

    let mut trainer = DqnTrainer::new(
        network,
        optimizer,
        environment,
        config.trainer.clone(),
        config.policy.clone(),
        config.seed,
        device,
    )?;

    info!(
        episodes,
        batch_size = config.trainer.batch_size,
        target_update = config.trainer.target_update,
        seed = ?config.seed,
        "starting training"
    );

    let stop = trainer.stop_signal();
    let mut training = tokio::task::spawn_blocking(move || trainer.train(episodes));

    let joined = tokio::select! {
        result = &mut training => result,
        _ = signal::ctrl_c() => {
            warn!("Ctrl+C received, stopping after the current episode");
            stop.request_stop();
            training.await
        }
    };
    let summary = joined.map_err(|e| anyhow::anyhow!("training task failed: {e}"))??;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    println!("Episodes:            {}", summary.episodes);
    println!("Steps:               {}", summary.total_steps);
    println!("Optimization steps:  {}", summary.optimization_steps);
    println!("Target syncs:        {}", summary.target_syncs);
    println!("Average reward:      {:.4}", summary.average_reward());
    if let Some(last) = summary.reports.last() {
        println!("Final epsilon:       {:.4}", last.epsilon);
    }
    if summary.stopped_early {
        println!("Stopped early on request");
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
