//! Protocol constants and the configuration surface consumed by the core.

use std::path::PathBuf;
use std::time::Duration;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Maximum number of bytes a header's extra-data section may carry.
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 32;

/// Minimum gas limit any block may declare.
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Gas limit may drift by at most parent.gas_limit / this per block.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1_024;

/// Hard cap on the gas limit field.
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Blocks timestamped further than this into the future are rejected.
pub const ALLOWED_FUTURE_BLOCK_TIME: Duration = Duration::from_secs(15);

/// Bound divisor of difficulty: the per-block adjustment step.
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2_048;

/// Exponential difficulty period (the ice-age step width).
pub const EXP_DIFF_PERIOD: u64 = 100_000;

/// Lower clamp of the timestamp adjustment factor.
pub const DIFFICULTY_MINUS_99: i64 = -99;

/// The ice-age clock is delayed by this many blocks.
pub const BOMB_DELAY_BLOCKS: u64 = 2_999_999;

/// Maximum number of uncles allowed in a single block.
pub const MAX_UNCLES: usize = 2;

/// Uncle ancestry is checked this many generations deep.
pub const UNCLE_ANCESTRY_DEPTH: u64 = 7;

/// Pictures selected per inference task.
pub const AI_PICTURE_COUNT: usize = 16;

/// Size of the picture library the index draw ranges over.
pub const AI_PICTURE_MAX: usize = 64_000;

/// Minimum difficulty installed by the AI-mine governance switch.
pub fn minimum_difficulty() -> U256 {
    U256::from(131_072u64)
}

/// Chain-level configuration: fork gating and timing rules. The node loads
/// this once at startup; the core only ever reads it through `ChainReader`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Height at which the Homestead difficulty rules activate.
    pub homestead_block: Option<u64>,
    /// Height at which the Byzantium difficulty rules activate.
    pub byzantium_block: Option<u64>,
    /// Governance-version activation heights. State switches apply one block
    /// before each of these.
    pub gamma_height: u64,
    pub delta_height: u64,
    pub aimine_height: u64,
    /// Target block spacing divisor used by the difficulty adjustment below
    /// the Gamma version.
    pub duration_limit: u64,
    /// Replacement spacing divisor once the chain version reaches Gamma.
    pub version_gamma_duration_limit: u64,
}

impl ChainConfig {
    pub fn is_homestead(&self, number: u64) -> bool {
        self.homestead_block.map_or(false, |h| number >= h)
    }

    pub fn is_byzantium(&self, number: u64) -> bool {
        self.byzantium_block.map_or(false, |h| number >= h)
    }

    /// Config with every fork active from genesis. Test networks use this.
    pub fn dev() -> Self {
        Self {
            homestead_block: Some(0),
            byzantium_block: Some(0),
            gamma_height: 10,
            delta_height: 20,
            aimine_height: 30,
            duration_limit: 9,
            version_gamma_duration_limit: 6,
        }
    }
}

/// How the proof-of-work behaves. Anything but `Normal` is test plumbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowMode {
    /// Full dual-proof sealing and verification.
    Normal,
    /// Seal instantly with an arbitrary nonce, verify with optional delay
    /// and scripted failure.
    Fake,
    /// Accept everything, including headers and uncles.
    FullFake,
    /// Delegate seal verification to a shared engine instance.
    Shared,
}

/// Engine-level configuration: pow mode, test knobs, and the AI-stage paths.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub pow_mode: PowMode,
    /// Sleep injected into fake seal verification.
    pub fake_delay: Duration,
    /// Block number at which fake verification reports an invalid PoW.
    pub fake_fail: Option<u64>,
    /// Directory holding the picture library (`test_<i>.jpg`).
    pub picture_store_path: PathBuf,
    /// Directory holding classifier weights, model config and class names.
    pub weights_dir: PathBuf,
    /// Pictures selected per task; the protocol value is [`AI_PICTURE_COUNT`].
    pub picture_count: usize,
    /// Index range of the picture draw; the protocol value is [`AI_PICTURE_MAX`].
    pub picture_max: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pow_mode: PowMode::Normal,
            fake_delay: Duration::ZERO,
            fake_fail: None,
            picture_store_path: PathBuf::from("picture_store"),
            weights_dir: PathBuf::from("ai_config"),
            picture_count: AI_PICTURE_COUNT,
            picture_max: AI_PICTURE_MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_gating() {
        let cfg = ChainConfig::dev();
        assert!(cfg.is_byzantium(0));
        assert!(cfg.is_homestead(5));

        let frontier = ChainConfig {
            homestead_block: None,
            byzantium_block: None,
            ..ChainConfig::dev()
        };
        assert!(!frontier.is_byzantium(1_000_000));
        assert!(!frontier.is_homestead(1_000_000));
    }

    #[test]
    fn default_engine_config_is_normal() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pow_mode, PowMode::Normal);
        assert_eq!(cfg.picture_count, 16);
        assert_eq!(cfg.picture_max, 64_000);
    }
}
