//! Governance state consumed and mutated by the consensus core: reward and
//! interest schedules, leader timing, slash policy, calculator selectors,
//! and the minimum mining difficulty.
//!
//! The state-processor hands the switch hooks a mutable snapshot taken at
//! the block being processed; the caller commits the snapshot with the block
//! or throws it away if the block is discarded, which is what makes the
//! switch mutations atomic with the state transition.

pub mod switches;

pub use switches::process_version_switch;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Election engine selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectPlug {
    Stock,
    /// Layered BSS elector, installed by the Gamma switch.
    LayeredBss,
}

/// Reward / interest / slash calculator revisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalcVersion {
    Stock,
    Gamma,
    Delta,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectConfig {
    pub validator_num: u16,
    pub back_validator: u16,
    pub elect_plug: ElectPlug,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderConfig {
    pub parent_mining_time: u64,
    pub pos_out_time: u64,
    pub reelect_out_time: u64,
    pub reelect_handle_interval: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProduceSlashConfig {
    pub switcher: bool,
    pub low_threshold: u16,
    pub prohibit_cycle_num: u16,
}

/// Reward split, in thousandths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRateConfig {
    pub miner_out_rate: u64,
    pub elected_miner_rate: u64,
    pub foundation_miner_rate: u64,
    pub leader_rate: u64,
    pub elected_validators_rate: u64,
    pub foundation_validator_rate: u64,
    pub origin_elect_offline_rate: u64,
    pub backup_reward_rate: u64,
}

/// Block reward schedule. Amounts carry a 1000x scale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRewardConfig {
    pub miner_mount: u64,
    pub miner_attenuation_rate: u16,
    pub miner_attenuation_num: u64,
    pub validator_mount: u64,
    pub validator_attenuation_rate: u16,
    pub validator_attenuation_num: u64,
    pub reward_rate: RewardRateConfig,
}

/// Interest schedule. Amounts carry a 1000x scale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestConfig {
    pub reward_mount: u64,
    pub attenuation_rate: u16,
    pub attenuation_period: u64,
    pub pay_interval: u64,
}

/// The governance snapshot the switch hooks operate on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceState {
    pub elect: ElectConfig,
    pub leader: LeaderConfig,
    pub produce_slash: BlockProduceSlashConfig,
    pub block_reward: BlockRewardConfig,
    pub interest: InterestConfig,
    pub block_reward_calc: CalcVersion,
    pub interest_calc: CalcVersion,
    pub slash_calc: CalcVersion,
    /// Deposit-contract revision, stamped with a block time on upgrade.
    pub deposit_version: u64,
    pub min_difficulty: U256,
}

impl Default for GovernanceState {
    fn default() -> Self {
        GovernanceState {
            elect: ElectConfig {
                validator_num: 19,
                back_validator: 5,
                elect_plug: ElectPlug::Stock,
            },
            leader: LeaderConfig {
                parent_mining_time: 40,
                pos_out_time: 20,
                reelect_out_time: 40,
                reelect_handle_interval: 3,
            },
            produce_slash: BlockProduceSlashConfig {
                switcher: true,
                low_threshold: 2,
                prohibit_cycle_num: 2,
            },
            block_reward: BlockRewardConfig {
                miner_mount: 3_200,
                miner_attenuation_rate: 80,
                miner_attenuation_num: 1_000_000,
                validator_mount: 5_300,
                validator_attenuation_rate: 80,
                validator_attenuation_num: 1_000_000,
                reward_rate: RewardRateConfig {
                    miner_out_rate: 4_000,
                    elected_miner_rate: 5_000,
                    foundation_miner_rate: 1_000,
                    leader_rate: 2_500,
                    elected_validators_rate: 6_500,
                    foundation_validator_rate: 1_000,
                    origin_elect_offline_rate: 5_000,
                    backup_reward_rate: 5_000,
                },
            },
            interest: InterestConfig {
                reward_mount: 2_100,
                attenuation_rate: 80,
                attenuation_period: 1_000_000,
                pay_interval: 3_600,
            },
            block_reward_calc: CalcVersion::Stock,
            interest_calc: CalcVersion::Stock,
            slash_calc: CalcVersion::Stock,
            deposit_version: 0,
            min_difficulty: U256::one(),
        }
    }
}
