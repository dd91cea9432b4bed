//! Governance-state switches applied one block before each version
//! activation, so the new rules are in place the moment the version goes
//! live. Each switch is a fixed delta over the snapshot; fields it does not
//! name are carried over unchanged.

use tracing::info;

use crate::params::{self, ChainConfig};
use crate::state::{CalcVersion, ElectPlug, GovernanceState, RewardRateConfig};

/// Apply the switch scheduled for `number`, if any. `time` is the block's
/// timestamp; the Delta switch stamps it into the deposit contract version.
pub fn process_version_switch(
    config: &ChainConfig,
    number: u64,
    time: u64,
    state: &mut GovernanceState,
) {
    if number + 1 == config.gamma_height {
        info!(target: "state", number, "applying gamma governance switch");
        switch_gamma(state);
    } else if number + 1 == config.delta_height {
        info!(target: "state", number, "applying delta governance switch");
        switch_delta(state, time);
    } else if number + 1 == config.aimine_height {
        info!(target: "state", number, "applying ai-mine governance switch");
        switch_aimine(state);
    }
}

fn switch_gamma(state: &mut GovernanceState) {
    state.elect.elect_plug = ElectPlug::LayeredBss;

    state.leader.parent_mining_time = 20;
    state.leader.pos_out_time = 40;
    state.leader.reelect_out_time = 40;

    state.produce_slash.prohibit_cycle_num = 10;

    let reward = &mut state.block_reward;
    reward.miner_mount = 4_800;
    reward.miner_attenuation_num = 3_000_000;
    reward.validator_mount = 8_000;
    reward.validator_attenuation_num = 3_000_000;
    reward.reward_rate = RewardRateConfig {
        miner_out_rate: 4_000,
        elected_miner_rate: 5_000,
        foundation_miner_rate: 1_000,
        leader_rate: 2_500,
        elected_validators_rate: 6_500,
        foundation_validator_rate: 1_000,
        origin_elect_offline_rate: reward.reward_rate.origin_elect_offline_rate,
        backup_reward_rate: reward.reward_rate.backup_reward_rate,
    };

    state.interest.reward_mount = 3_200;
    state.interest.attenuation_period = 3_000_000;

    state.block_reward_calc = CalcVersion::Gamma;
    state.interest_calc = CalcVersion::Gamma;
}

fn switch_delta(state: &mut GovernanceState, time: u64) {
    state.interest_calc = CalcVersion::Delta;
    state.slash_calc = CalcVersion::Delta;
    state.deposit_version = time;
}

fn switch_aimine(state: &mut GovernanceState) {
    state.min_difficulty = params::minimum_difficulty();
    state.leader.parent_mining_time = 50;
    state.leader.pos_out_time = 40;
    state.leader.reelect_out_time = 40;
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;

    fn cfg() -> ChainConfig {
        ChainConfig::dev() // gamma 10, delta 20, aimine 30
    }

    #[test]
    fn no_switch_off_schedule() {
        let mut state = GovernanceState::default();
        let before = state.clone();
        process_version_switch(&cfg(), 5, 1_000, &mut state);
        process_version_switch(&cfg(), 10, 1_000, &mut state); // activation height itself
        assert_eq!(state, before);
    }

    #[test]
    fn gamma_switch_applies_one_block_early() {
        let mut state = GovernanceState::default();
        let kept_interval = state.leader.reelect_handle_interval;
        let kept_offline_rate = state.block_reward.reward_rate.origin_elect_offline_rate;

        process_version_switch(&cfg(), 9, 1_000, &mut state);

        assert_eq!(state.elect.elect_plug, ElectPlug::LayeredBss);
        assert_eq!(state.leader.parent_mining_time, 20);
        assert_eq!(state.leader.reelect_handle_interval, kept_interval);
        assert_eq!(state.produce_slash.prohibit_cycle_num, 10);
        assert_eq!(state.block_reward.miner_mount, 4_800);
        assert_eq!(state.block_reward.validator_mount, 8_000);
        assert_eq!(state.block_reward.miner_attenuation_num, 3_000_000);
        assert_eq!(
            state.block_reward.reward_rate.origin_elect_offline_rate,
            kept_offline_rate
        );
        assert_eq!(state.interest.reward_mount, 3_200);
        assert_eq!(state.interest.attenuation_period, 3_000_000);
        assert_eq!(state.block_reward_calc, CalcVersion::Gamma);
        assert_eq!(state.interest_calc, CalcVersion::Gamma);
        // slash calculator untouched until delta
        assert_eq!(state.slash_calc, CalcVersion::Stock);
    }

    #[test]
    fn delta_switch_stamps_block_time() {
        let mut state = GovernanceState::default();
        process_version_switch(&cfg(), 19, 1_234_567, &mut state);
        assert_eq!(state.interest_calc, CalcVersion::Delta);
        assert_eq!(state.slash_calc, CalcVersion::Delta);
        assert_eq!(state.deposit_version, 1_234_567);
    }

    #[test]
    fn aimine_switch_floors_difficulty_and_slows_leader() {
        let mut state = GovernanceState::default();
        assert_eq!(state.min_difficulty, U256::one());

        process_version_switch(&cfg(), 29, 1_000, &mut state);
        assert_eq!(state.min_difficulty, params::minimum_difficulty());
        assert_eq!(state.leader.parent_mining_time, 50);
        assert_eq!(state.leader.pos_out_time, 40);
    }

    #[test]
    fn discarded_snapshot_leaves_no_trace() {
        let committed = GovernanceState::default();
        let mut snapshot = committed.clone();
        process_version_switch(&cfg(), 9, 1_000, &mut snapshot);
        assert_ne!(snapshot, committed);
        // the block was discarded: the snapshot is dropped, the committed
        // state never saw the switch
        drop(snapshot);
        assert_eq!(committed, GovernanceState::default());
    }
}
