//! Trading Environment for RL Training
//!
//! Long/flat single-asset environment over a [`SimulatedMarket`]. The agent
//! either holds a fixed-size long position or is flat; reward is the change in
//! portfolio value per step, net of transaction costs, in percent of the
//! initial capital.

use serde::{Deserialize, Serialize};

use super::market::{MarketConfig, SimulatedMarket};
use super::{Environment, StepResult};
use crate::core::TradingAction;
use crate::error::{Result, TraderError};

/// Trading environment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingEnvConfig {
    /// Price process parameters
    pub price_model: MarketConfig,
    /// Initial capital
    pub initial_capital: f64,
    /// Shares bought on each entry
    pub position_size: f64,
    /// Transaction cost (fraction of traded notional)
    pub transaction_cost: f64,
    /// Maximum steps per episode
    pub max_steps: usize,
    /// Number of past returns in each observation
    pub window: usize,
}

impl Default for TradingEnvConfig {
    fn default() -> Self {
        Self {
            price_model: MarketConfig::default(),
            initial_capital: 1000.0,
            position_size: 5.0,
            transaction_cost: 0.001,
            max_steps: 200,
            window: 10,
        }
    }
}

impl TradingEnvConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.price_model.initial_price > 0.0) {
            errors.push("market.price_model.initial_price must be positive".to_string());
        }
        if !(self.price_model.mean_price > 0.0) {
            errors.push("market.price_model.mean_price must be positive".to_string());
        }
        if self.price_model.volatility < 0.0 {
            errors.push("market.price_model.volatility must be non-negative".to_string());
        }
        if !(self.initial_capital > 0.0) {
            errors.push("market.initial_capital must be positive".to_string());
        }
        if !(self.position_size > 0.0) {
            errors.push("market.position_size must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.transaction_cost) {
            errors.push("market.transaction_cost must be in [0, 1)".to_string());
        }
        if self.max_steps == 0 {
            errors.push("market.max_steps must be positive".to_string());
        }
        if self.window == 0 {
            errors.push("market.window must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Per-step diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingInfo {
    /// Current price
    pub price: f64,
    /// Cash plus position value
    pub portfolio_value: f64,
    /// Round trips completed this episode
    pub num_trades: usize,
    /// Whether a position is open after the step
    pub in_position: bool,
}

/// Open long position
#[derive(Debug, Clone, Copy)]
struct Position {
    shares: f64,
    entry_price: f64,
}

/// Trading environment for RL training
pub struct TradingEnvironment {
    config: TradingEnvConfig,
    market: SimulatedMarket,
    position: Option<Position>,
    cash: f64,
    step_count: usize,
    num_trades: usize,
}

impl TradingEnvironment {
    /// Create a new trading environment
    pub fn new(config: TradingEnvConfig, seed: Option<u64>) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| TraderError::InvalidConfig(errors.join("; ")))?;

        let market = SimulatedMarket::new(config.price_model.clone(), seed);
        let cash = config.initial_capital;

        Ok(Self {
            config,
            market,
            position: None,
            cash,
            step_count: 0,
            num_trades: 0,
        })
    }

    /// Width of the observation vector
    pub fn observation_dim(&self) -> usize {
        self.config.window + 3
    }

    pub fn config(&self) -> &TradingEnvConfig {
        &self.config
    }

    fn portfolio_value(&self) -> f64 {
        let price = self.market.state().price;
        self.cash + self.position.map_or(0.0, |p| p.shares * price)
    }

    /// Observation layout: `window` most recent returns (percent, zero padded),
    /// position flag, unrealized PnL (percent), fraction of episode remaining.
    fn observation(&self) -> Vec<f32> {
        let state = self.market.state();
        let history = &state.price_history;
        let window = self.config.window;

        let mut obs = vec![0.0f32; self.observation_dim()];
        let returns: Vec<f32> = history
            .windows(2)
            .map(|w| ((w[1] - w[0]) / w[0] * 100.0) as f32)
            .collect();
        let recent = &returns[returns.len().saturating_sub(window)..];
        let offset = window - recent.len();
        obs[offset..window].copy_from_slice(recent);

        if let Some(position) = self.position {
            obs[window] = 1.0;
            obs[window + 1] =
                ((state.price - position.entry_price) / position.entry_price * 100.0) as f32;
        }
        let remaining = self.config.max_steps.saturating_sub(self.step_count);
        obs[window + 2] = remaining as f32 / self.config.max_steps as f32;

        obs
    }

    /// Execute trading action at the current price
    fn execute_action(&mut self, action: TradingAction) {
        let price = self.market.state().price;

        match (action, self.position) {
            (TradingAction::Buy, None) => {
                let shares = self.config.position_size;
                let fee = shares * price * self.config.transaction_cost;
                self.cash -= shares * price + fee;
                self.position = Some(Position {
                    shares,
                    entry_price: price,
                });
            }
            (TradingAction::Sell, Some(position)) => {
                let fee = position.shares * price * self.config.transaction_cost;
                self.cash += position.shares * price - fee;
                self.position = None;
                self.num_trades += 1;
            }
            _ => {}
        }
    }
}

impl Environment for TradingEnvironment {
    type Info = TradingInfo;

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.market.reset();
        self.position = None;
        self.cash = self.config.initial_capital;
        self.step_count = 0;
        self.num_trades = 0;

        Ok(self.observation())
    }

    fn step(&mut self, action: TradingAction) -> Result<StepResult<TradingInfo>> {
        if !self.valid_moves().contains(&action) {
            return Err(TraderError::Environment(format!(
                "{action:?} is not allowed {}",
                if self.position.is_some() { "while long" } else { "while flat" }
            )));
        }

        let value_before = self.portfolio_value();
        self.execute_action(action);
        self.market.step();
        self.step_count += 1;
        let value_after = self.portfolio_value();

        let reward = ((value_after - value_before) / self.config.initial_capital * 100.0) as f32;

        Ok(StepResult {
            observation: self.observation(),
            reward,
            done: self.step_count >= self.config.max_steps,
            info: TradingInfo {
                price: self.market.state().price,
                portfolio_value: value_after,
                num_trades: self.num_trades,
                in_position: self.position.is_some(),
            },
        })
    }

    fn valid_moves(&self) -> Vec<TradingAction> {
        match self.position {
            None => vec![TradingAction::Hold, TradingAction::Buy],
            Some(_) => vec![TradingAction::Hold, TradingAction::Sell],
        }
    }
}
