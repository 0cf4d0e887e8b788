//! Simulated Market for Price Generation
//!
//! Mean-reverting random walk with optional drift.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Market simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Initial price
    pub initial_price: f64,
    /// Price volatility (std dev of per-step returns)
    pub volatility: f64,
    /// Mean reversion strength (0 = random walk, 1 = strong reversion)
    pub mean_reversion: f64,
    /// Long-term mean price
    pub mean_price: f64,
    /// Drift per step, in units of volatility
    pub trend: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            initial_price: 100.0,
            volatility: 0.01,
            mean_reversion: 0.05,
            mean_price: 100.0,
            trend: 0.0,
        }
    }
}

/// Current market state
#[derive(Debug, Clone)]
pub struct MarketState {
    /// Current price
    pub price: f64,
    /// Price history (most recent last)
    pub price_history: Vec<f64>,
    /// Current step
    pub step: usize,
}

impl MarketState {
    fn initial(price: f64) -> Self {
        Self {
            price,
            price_history: vec![price],
            step: 0,
        }
    }
}

/// Keep this many prices in the history
const HISTORY_LEN: usize = 60;

/// Simulated market for generating prices
pub struct SimulatedMarket {
    config: MarketConfig,
    state: MarketState,
    rng: StdRng,
}

impl SimulatedMarket {
    /// Create a new simulated market
    pub fn new(config: MarketConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            state: MarketState::initial(config.initial_price),
            config,
            rng,
        }
    }

    /// Generate a sample from standard normal distribution (Box-Muller transform)
    fn sample_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(0.0001..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Reset market to initial state
    pub fn reset(&mut self) -> &MarketState {
        self.state = MarketState::initial(self.config.initial_price);
        &self.state
    }

    /// Step the market forward one time step
    pub fn step(&mut self) -> &MarketState {
        self.state.step += 1;

        let price = self.state.price;
        let random_return = self.sample_normal() * self.config.volatility;
        let reversion =
            self.config.mean_reversion * (self.config.mean_price - price) / self.config.mean_price;
        let trend_component = self.config.trend * self.config.volatility;

        let total_return = random_return + reversion + trend_component;
        self.state.price = (price * (1.0 + total_return)).max(f64::EPSILON);

        self.state.price_history.push(self.state.price);
        if self.state.price_history.len() > HISTORY_LEN {
            self.state.price_history.remove(0);
        }

        &self.state
    }

    /// Get current market state
    pub fn state(&self) -> &MarketState {
        &self.state
    }

    /// Get configuration
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_step_and_reset() {
        let mut market = SimulatedMarket::new(MarketConfig::default(), Some(1));

        for _ in 0..100 {
            market.step();
        }
        assert_eq!(market.state().step, 100);
        assert_eq!(market.state().price_history.len(), HISTORY_LEN);
        assert!(market.state().price > 0.0);

        market.reset();
        assert_eq!(market.state().step, 0);
        assert_eq!(market.state().price_history.len(), 1);
        assert!((market.state().price - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_markets_agree() {
        let mut a = SimulatedMarket::new(MarketConfig::default(), Some(9));
        let mut b = SimulatedMarket::new(MarketConfig::default(), Some(9));
        for _ in 0..20 {
            assert_eq!(a.step().price, b.step().price);
        }
    }
}
