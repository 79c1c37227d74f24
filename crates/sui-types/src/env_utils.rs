//! Environment variable parsing utilities.
//!
//! Executor configuration is overlaid from `SUI_EXECUTOR_*` variables; these
//! helpers keep that overlay free of repeated parse-or-default boilerplate.
//!
//! # Example
//!
//! ```
//! use sui_ptb_types::env_utils::{env_var, env_var_or};
//!
//! let pool: usize = env_var_or("SUI_EXECUTOR_MAX_POOL_SIZE", 50);
//! let budget: Option<u64> = env_var("SUI_EXECUTOR_DEFAULT_GAS_BUDGET");
//! ```

use std::str::FromStr;

/// Parse an environment variable into a type that implements `FromStr`.
///
/// Returns `None` if the variable is not set or cannot be parsed.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable with a default value.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Parse a comma-separated environment variable into a vector.
///
/// Returns an empty vector if the variable is not set. Empty items are skipped.
pub fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_parsing() {
        std::env::set_var("SUI_PTB_TEST_U64", " 42 ");
        let val: Option<u64> = env_var("SUI_PTB_TEST_U64");
        assert_eq!(val, Some(42));

        let missing: Option<u64> = env_var("SUI_PTB_TEST_MISSING_1");
        assert_eq!(missing, None);

        std::env::remove_var("SUI_PTB_TEST_U64");
    }

    #[test]
    fn test_env_var_or() {
        std::env::set_var("SUI_PTB_TEST_WITH_DEFAULT", "not-a-number");
        let val: u64 = env_var_or("SUI_PTB_TEST_WITH_DEFAULT", 50);
        assert_eq!(val, 50);
        std::env::remove_var("SUI_PTB_TEST_WITH_DEFAULT");
    }

    #[test]
    fn test_env_list() {
        std::env::set_var("SUI_PTB_TEST_LIST", "0x1, 0x2,,0x3 ");
        assert_eq!(env_list("SUI_PTB_TEST_LIST"), vec!["0x1", "0x2", "0x3"]);
        assert!(env_list("SUI_PTB_TEST_MISSING_3").is_empty());
        std::env::remove_var("SUI_PTB_TEST_LIST");
    }
}
