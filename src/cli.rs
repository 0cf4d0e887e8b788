use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "trader-dqn")]
#[command(version = "0.1.0")]
#[command(about = "Deep Q-learning trainer for a simulated trading agent", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the Q-network on the simulated market
    Train {
        /// Config file (defaults to layered config/ plus TRADER_* variables)
        #[arg(short, long, env = "TRADER_CONFIG")]
        config: Option<PathBuf>,
        /// Number of training episodes
        #[arg(short, long, default_value = "500")]
        episodes: usize,
        /// Seed override for every random generator
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the effective configuration as JSON
    Config {
        /// Config file (defaults to layered config/ plus TRADER_* variables)
        #[arg(short, long, env = "TRADER_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Load from an explicit file when given, otherwise from the `config` directory
pub fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_file(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}
