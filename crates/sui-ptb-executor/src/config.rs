//! Executor configuration.
//!
//! Defaults match a pool that can keep 50 transactions in flight with coins of
//! 0.2 SUI each. Every field can be overridden with `with_*` setters or from
//! `SUI_EXECUTOR_*` environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `SUI_EXECUTOR_MAX_POOL_SIZE` | `max_pool_size` |
//! | `SUI_EXECUTOR_COIN_BATCH_SIZE` | `coin_batch_size` |
//! | `SUI_EXECUTOR_INITIAL_COIN_BALANCE` | `initial_coin_balance` |
//! | `SUI_EXECUTOR_MINIMUM_COIN_BALANCE` | `minimum_coin_balance` |
//! | `SUI_EXECUTOR_DEFAULT_GAS_BUDGET` | `default_gas_budget` |
//! | `SUI_EXECUTOR_EPOCH_BOUNDARY_WINDOW_MS` | `epoch_boundary_window` |
//! | `SUI_EXECUTOR_GAS_MODE` | `gas_mode` (`coins` or `address-balance`) |
//! | `SUI_EXECUTOR_SOURCE_COINS` | `source_coins` (comma-separated ids) |

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use sui_ptb_types::encoding::parse_address;
use sui_ptb_types::env_utils::{env_list, env_var, env_var_or};
use sui_ptb_types::ObjectId;

pub const DEFAULT_MAX_POOL_SIZE: usize = 50;
pub const DEFAULT_COIN_BATCH_SIZE: usize = 20;
pub const DEFAULT_INITIAL_COIN_BALANCE: u64 = 200_000_000;
pub const DEFAULT_MINIMUM_COIN_BALANCE: u64 = 50_000_000;
pub const DEFAULT_SERIAL_GAS_BUDGET: u64 = 50_000_000;
pub const DEFAULT_EPOCH_BOUNDARY_WINDOW: Duration = Duration::from_secs(60);

/// How transactions pay for gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasMode {
    /// Owned SUI coins, one per in-flight transaction.
    #[default]
    Coins,
    /// The sender's SUI address balance, with an empty gas payment.
    AddressBalance,
}

impl FromStr for GasMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "coins" => Ok(GasMode::Coins),
            "address-balance" | "addressBalance" | "address_balance" => {
                Ok(GasMode::AddressBalance)
            }
            other => Err(anyhow!(
                "Unknown gas mode '{}', expected 'coins' or 'address-balance'",
                other
            )),
        }
    }
}

impl fmt::Display for GasMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasMode::Coins => f.write_str("coins"),
            GasMode::AddressBalance => f.write_str("address-balance"),
        }
    }
}

fn env_gas_mode(default: GasMode) -> Result<GasMode> {
    match std::env::var("SUI_EXECUTOR_GAS_MODE") {
        Ok(value) => value.parse(),
        Err(_) => Ok(default),
    }
}

/// Configuration of [`ParallelTransactionExecutor`](crate::ParallelTransactionExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelExecutorConfig {
    /// Most transactions in flight at once; also the most gas coins the pool holds.
    pub max_pool_size: usize,
    /// Coins created per refill transaction.
    pub coin_batch_size: usize,
    /// Balance of each coin a refill creates.
    pub initial_coin_balance: u64,
    /// Coins left with less than this after a transaction are retired.
    pub minimum_coin_balance: u64,
    /// Budget for transactions that set none; `minimum_coin_balance` when unset.
    pub default_gas_budget: Option<u64>,
    /// Epoch info is refetched this long before the epoch ends.
    pub epoch_boundary_window: Duration,
    pub gas_mode: GasMode,
    /// Coins funding refills. All owned SUI coins when `None`.
    pub source_coins: Option<Vec<ObjectId>>,
}

impl Default for ParallelExecutorConfig {
    fn default() -> Self {
        Self {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            coin_batch_size: DEFAULT_COIN_BATCH_SIZE,
            initial_coin_balance: DEFAULT_INITIAL_COIN_BALANCE,
            minimum_coin_balance: DEFAULT_MINIMUM_COIN_BALANCE,
            default_gas_budget: None,
            epoch_boundary_window: DEFAULT_EPOCH_BOUNDARY_WINDOW,
            gas_mode: GasMode::Coins,
            source_coins: None,
        }
    }
}

impl ParallelExecutorConfig {
    /// Defaults overlaid with `SUI_EXECUTOR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let source_coins = env_list("SUI_EXECUTOR_SOURCE_COINS")
            .iter()
            .map(|id| parse_address(id, "source coin"))
            .collect::<Result<Vec<_>>>()
            .context("Invalid SUI_EXECUTOR_SOURCE_COINS")?;
        Ok(Self {
            max_pool_size: env_var_or("SUI_EXECUTOR_MAX_POOL_SIZE", defaults.max_pool_size),
            coin_batch_size: env_var_or("SUI_EXECUTOR_COIN_BATCH_SIZE", defaults.coin_batch_size),
            initial_coin_balance: env_var_or(
                "SUI_EXECUTOR_INITIAL_COIN_BALANCE",
                defaults.initial_coin_balance,
            ),
            minimum_coin_balance: env_var_or(
                "SUI_EXECUTOR_MINIMUM_COIN_BALANCE",
                defaults.minimum_coin_balance,
            ),
            default_gas_budget: env_var("SUI_EXECUTOR_DEFAULT_GAS_BUDGET"),
            epoch_boundary_window: env_var("SUI_EXECUTOR_EPOCH_BOUNDARY_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.epoch_boundary_window),
            gas_mode: env_gas_mode(defaults.gas_mode)?,
            source_coins: (!source_coins.is_empty()).then_some(source_coins),
        })
    }

    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    pub fn with_coin_batch_size(mut self, coin_batch_size: usize) -> Self {
        self.coin_batch_size = coin_batch_size;
        self
    }

    pub fn with_initial_coin_balance(mut self, balance: u64) -> Self {
        self.initial_coin_balance = balance;
        self
    }

    pub fn with_minimum_coin_balance(mut self, balance: u64) -> Self {
        self.minimum_coin_balance = balance;
        self
    }

    pub fn with_default_gas_budget(mut self, budget: u64) -> Self {
        self.default_gas_budget = Some(budget);
        self
    }

    pub fn with_epoch_boundary_window(mut self, window: Duration) -> Self {
        self.epoch_boundary_window = window;
        self
    }

    pub fn with_gas_mode(mut self, gas_mode: GasMode) -> Self {
        self.gas_mode = gas_mode;
        self
    }

    pub fn with_source_coins(mut self, coins: Vec<ObjectId>) -> Self {
        self.source_coins = Some(coins);
        self
    }

    /// Budget applied to transactions that set none.
    pub fn gas_budget(&self) -> u64 {
        self.default_gas_budget.unwrap_or(self.minimum_coin_balance)
    }

    /// Reject settings the executor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(anyhow!("max_pool_size must be at least 1"));
        }
        if self.gas_mode == GasMode::Coins && self.coin_batch_size == 0 {
            return Err(anyhow!("coin_batch_size must be at least 1 in coin mode"));
        }
        Ok(())
    }
}

/// Configuration of [`SerialTransactionExecutor`](crate::SerialTransactionExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialExecutorConfig {
    pub default_gas_budget: u64,
    pub epoch_boundary_window: Duration,
    pub gas_mode: GasMode,
}

impl Default for SerialExecutorConfig {
    fn default() -> Self {
        Self {
            default_gas_budget: DEFAULT_SERIAL_GAS_BUDGET,
            epoch_boundary_window: DEFAULT_EPOCH_BOUNDARY_WINDOW,
            gas_mode: GasMode::Coins,
        }
    }
}

impl SerialExecutorConfig {
    /// Defaults overlaid with `SUI_EXECUTOR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            default_gas_budget: env_var_or(
                "SUI_EXECUTOR_DEFAULT_GAS_BUDGET",
                defaults.default_gas_budget,
            ),
            epoch_boundary_window: env_var("SUI_EXECUTOR_EPOCH_BOUNDARY_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.epoch_boundary_window),
            gas_mode: env_gas_mode(defaults.gas_mode)?,
        })
    }

    pub fn with_default_gas_budget(mut self, budget: u64) -> Self {
        self.default_gas_budget = budget;
        self
    }

    pub fn with_epoch_boundary_window(mut self, window: Duration) -> Self {
        self.epoch_boundary_window = window;
        self
    }

    pub fn with_gas_mode(mut self, gas_mode: GasMode) -> Self {
        self.gas_mode = gas_mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_defaults() {
        let config = ParallelExecutorConfig::default();
        assert_eq!(config.max_pool_size, 50);
        assert_eq!(config.coin_batch_size, 20);
        assert_eq!(config.initial_coin_balance, 200_000_000);
        assert_eq!(config.gas_budget(), 50_000_000);
        assert_eq!(
            config.with_minimum_coin_balance(7).gas_budget(),
            7,
            "budget follows the minimum coin balance until set"
        );
        assert_eq!(SerialExecutorConfig::default().default_gas_budget, 50_000_000);
    }

    #[test]
    fn test_gas_mode_parsing() {
        assert_eq!("coins".parse::<GasMode>().unwrap(), GasMode::Coins);
        assert_eq!(
            "addressBalance".parse::<GasMode>().unwrap(),
            GasMode::AddressBalance
        );
        assert_eq!(
            "address-balance".parse::<GasMode>().unwrap(),
            GasMode::AddressBalance
        );
        assert!("gasless".parse::<GasMode>().is_err());
        assert_eq!(GasMode::AddressBalance.to_string(), "address-balance");
    }

    #[test]
    fn test_from_env_overlay() {
        std::env::set_var("SUI_EXECUTOR_MAX_POOL_SIZE", "8");
        std::env::set_var("SUI_EXECUTOR_GAS_MODE", "address-balance");
        std::env::set_var("SUI_EXECUTOR_SOURCE_COINS", "0x1, 0x2");
        let config = ParallelExecutorConfig::from_env().unwrap();
        std::env::remove_var("SUI_EXECUTOR_MAX_POOL_SIZE");
        std::env::remove_var("SUI_EXECUTOR_GAS_MODE");
        std::env::remove_var("SUI_EXECUTOR_SOURCE_COINS");

        assert_eq!(config.max_pool_size, 8);
        assert_eq!(config.gas_mode, GasMode::AddressBalance);
        assert_eq!(config.source_coins.map(|c| c.len()), Some(2));
        assert_eq!(config.coin_batch_size, DEFAULT_COIN_BATCH_SIZE);
    }

    #[test]
    fn test_validate() {
        assert!(ParallelExecutorConfig::default().validate().is_ok());
        assert!(ParallelExecutorConfig::default()
            .with_max_pool_size(0)
            .validate()
            .is_err());
    }
}
