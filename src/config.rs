//! Process-wide defaults, read once from the environment.
use std::{str::FromStr, sync::LazyLock};

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct VmConfig {
    pub max_stack_size: usize,
    pub max_call_depth: usize,
    pub max_op_count: u64,
}

fn parse_env_opt<T>(key: &str) -> Option<T>
where
    T: FromStr, <T as FromStr>::Err: std::fmt::Display
{
    let val = std::env::var(key).ok()?;
    if val.is_empty() {
        return None;
    }
    match val.parse::<T>() {
        Ok(v) => Some(v),
        Err(err) => {
            warn!("Failed to parse env var {key} with value {val}: {err}, using the default");
            None
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr, <T as FromStr>::Err: std::fmt::Display
{
    parse_env_opt(key).unwrap_or(default)
}

fn create_config() -> VmConfig {
    VmConfig {
        max_stack_size: parse_env("STACKLANG_MAX_STACK_SIZE", 1 << 20),
        max_call_depth: parse_env("STACKLANG_MAX_CALL_DEPTH", 64),
        max_op_count: parse_env("STACKLANG_MAX_OP_COUNT", u64::MAX),
    }
}

static CELL: LazyLock<VmConfig> = LazyLock::new(create_config);

pub fn get_config() -> &'static VmConfig {
    &CELL
}
