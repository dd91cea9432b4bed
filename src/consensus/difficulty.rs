//! Difficulty adjustment. Three formula families are in service, selected by
//! the chain config, with the minimum-difficulty floor read from governance
//! state at the parent block. The ice-age term lands after the floor, so a
//! floored chain still feels the bomb.

use primitive_types::U256;

use crate::params::{
    ChainConfig, BOMB_DELAY_BLOCKS, DIFFICULTY_BOUND_DIVISOR, DIFFICULTY_MINUS_99, EXP_DIFF_PERIOD,
};
use crate::types::{Header, EMPTY_UNCLE_HASH};
use crate::version::Version;

/// Difficulty a block created at `time` on top of `parent` must carry.
pub fn calc_difficulty(
    config: &ChainConfig,
    version: Version,
    time: u64,
    parent: &Header,
    min_difficulty: U256,
) -> U256 {
    let next = parent.number + 1;
    if config.is_byzantium(next) {
        calc_difficulty_byzantium(config, version, time, parent, min_difficulty)
    } else if config.is_homestead(next) {
        calc_difficulty_homestead(time, parent, min_difficulty)
    } else {
        calc_difficulty_frontier(config, time, parent, min_difficulty)
    }
}

/// Timestamp quotients above this all clamp to the same factor, so cap the
/// intermediate before it leaves u64 range.
const QUOTIENT_CAP: u64 = 1_000;

fn adjustment_quotient(dt: u64, duration_limit: u64) -> i64 {
    (dt / duration_limit.max(1)).min(QUOTIENT_CAP) as i64
}

fn calc_difficulty_byzantium(
    config: &ChainConfig,
    version: Version,
    time: u64,
    parent: &Header,
    min_difficulty: U256,
) -> U256 {
    // diff = parent_diff
    //      + parent_diff / 2048 * max((2 if uncles else 1) - (time - parent.time) // L, -99)
    //      + 2^(period_count - 2)
    let duration_limit = if version >= Version::Gamma {
        config.version_gamma_duration_limit
    } else {
        config.duration_limit
    };

    let dt = time.saturating_sub(parent.time);
    let uncle_bonus: i64 = if parent.uncle_hash == *EMPTY_UNCLE_HASH {
        1
    } else {
        2
    };
    let mut factor = uncle_bonus - adjustment_quotient(dt, duration_limit);
    if factor < DIFFICULTY_MINUS_99 {
        factor = DIFFICULTY_MINUS_99;
    }

    let mut step = parent.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
    if step.is_zero() {
        step = U256::one();
    }

    let mut x = apply_factor(parent.difficulty, step, factor);
    if x < min_difficulty {
        x = min_difficulty;
    }

    // ice age: the delay window moves the effective block number back
    let fake_number = parent.number.saturating_sub(BOMB_DELAY_BLOCKS);
    add_bomb(&mut x, fake_number / EXP_DIFF_PERIOD);
    x
}

fn calc_difficulty_homestead(time: u64, parent: &Header, min_difficulty: U256) -> U256 {
    // diff = parent_diff + parent_diff / 2048 * max(1 - (time - parent.time) // 10, -99)
    //      + 2^(period_count - 2)
    let dt = time.saturating_sub(parent.time);
    let mut factor = 1 - adjustment_quotient(dt, 10);
    if factor < DIFFICULTY_MINUS_99 {
        factor = DIFFICULTY_MINUS_99;
    }

    let step = parent.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
    let mut x = apply_factor(parent.difficulty, step, factor);
    if x < min_difficulty {
        x = min_difficulty;
    }

    add_bomb(&mut x, (parent.number + 1) / EXP_DIFF_PERIOD);
    x
}

fn calc_difficulty_frontier(
    config: &ChainConfig,
    time: u64,
    parent: &Header,
    min_difficulty: U256,
) -> U256 {
    let adjust = parent.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
    let dt = time.saturating_sub(parent.time);

    let mut diff = if dt < config.duration_limit {
        parent.difficulty.saturating_add(adjust)
    } else {
        parent.difficulty.saturating_sub(adjust)
    };
    if diff < min_difficulty {
        diff = min_difficulty;
    }

    let period = (parent.number + 1) / EXP_DIFF_PERIOD;
    if period > 1 {
        add_bomb(&mut diff, period);
        if diff < min_difficulty {
            diff = min_difficulty;
        }
    }
    diff
}

fn apply_factor(parent_difficulty: U256, step: U256, factor: i64) -> U256 {
    if factor >= 0 {
        parent_difficulty.saturating_add(step.saturating_mul(U256::from(factor as u64)))
    } else {
        parent_difficulty.saturating_sub(step.saturating_mul(U256::from((-factor) as u64)))
    }
}

fn add_bomb(x: &mut U256, period_count: u64) {
    if period_count > 1 {
        let exp = period_count - 2;
        if exp < 256 {
            *x = x.saturating_add(U256::one() << exp);
        } else {
            *x = U256::MAX;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Hash;

    fn parent(number: u64, time: u64, difficulty: u64) -> Header {
        Header {
            number,
            time,
            difficulty: U256::from(difficulty),
            uncle_hash: *EMPTY_UNCLE_HASH,
            ..Default::default()
        }
    }

    fn byz(version: Version, time: u64, parent: &Header, min: u64) -> U256 {
        calc_difficulty(
            &ChainConfig::dev(),
            version,
            time,
            parent,
            U256::from(min),
        )
    }

    #[test]
    fn byzantium_fast_block_raises_difficulty() {
        let p = parent(100, 1_000, 131_072);
        // dt=1 below the 9s limit: factor 1, step 64
        assert_eq!(byz(Version::Delta, 1_001, &p, 1), U256::from(131_136u64));
    }

    #[test]
    fn byzantium_on_target_block_holds_difficulty() {
        let p = parent(100, 1_000, 131_072);
        // dt=9: quotient 1, factor 0
        assert_eq!(byz(Version::Delta, 1_009, &p, 1), U256::from(131_072u64));
    }

    #[test]
    fn byzantium_slow_block_lowers_difficulty() {
        let p = parent(100, 1_000, 131_072);
        // dt=18: quotient 2, factor -1
        assert_eq!(byz(Version::Delta, 1_018, &p, 1), U256::from(131_008u64));
    }

    #[test]
    fn byzantium_uncle_bonus() {
        let mut p = parent(100, 1_000, 131_072);
        p.uncle_hash = Hash::repeat_byte(0x11);
        // dt=1 with uncles: factor 2
        assert_eq!(byz(Version::Delta, 1_001, &p, 1), U256::from(131_200u64));
    }

    #[test]
    fn byzantium_factor_clamps_at_minus_99() {
        let p = parent(100, 1_000, 131_072);
        // enormous dt: factor would be far below -99
        assert_eq!(
            byz(Version::Delta, 1_000_000, &p, 1),
            U256::from(131_072u64 - 64 * 99)
        );
    }

    #[test]
    fn gamma_versions_use_their_own_duration_limit() {
        let p = parent(100, 1_000, 131_072);
        // dev config: limit 9 below Gamma, 6 from Gamma on. dt=6 is
        // on-target for Gamma and still fast for Beta.
        assert_eq!(byz(Version::Gamma, 1_006, &p, 1), U256::from(131_072u64));
        assert_eq!(byz(Version::Beta, 1_006, &p, 1), U256::from(131_136u64));
    }

    #[test]
    fn floor_applies_before_the_bomb() {
        // computed difficulty sits on the floor, then the bomb adds 2^0
        let p = parent(3_199_999, 1_000, 131_072);
        assert_eq!(
            byz(Version::Delta, 1_009, &p, 200_000),
            U256::from(200_001u64)
        );
    }

    #[test]
    fn bomb_starts_after_the_delay_window() {
        let p = parent(3_099_999, 1_000, 131_072);
        // fake number 100_000: period 1, no bomb yet
        assert_eq!(byz(Version::Delta, 1_009, &p, 1), U256::from(131_072u64));

        let p = parent(3_299_999, 1_000, 131_072);
        // fake number 300_000: period 3, adds 2^1
        assert_eq!(byz(Version::Delta, 1_009, &p, 1), U256::from(131_074u64));
    }

    #[test]
    fn homestead_branch() {
        let cfg = ChainConfig {
            byzantium_block: None,
            ..ChainConfig::dev()
        };
        let p = parent(100, 1_000, 131_072);
        // dt=1: factor 1
        assert_eq!(
            calc_difficulty(&cfg, Version::Beta, 1_001, &p, U256::one()),
            U256::from(131_136u64)
        );
        // dt=25: factor 1 - 2 = -1
        assert_eq!(
            calc_difficulty(&cfg, Version::Beta, 1_025, &p, U256::one()),
            U256::from(131_008u64)
        );
    }

    #[test]
    fn frontier_branch() {
        let cfg = ChainConfig {
            homestead_block: None,
            byzantium_block: None,
            ..ChainConfig::dev()
        };
        let p = parent(100, 1_000, 131_072);
        assert_eq!(
            calc_difficulty(&cfg, Version::Alpha, 1_001, &p, U256::one()),
            U256::from(131_136u64)
        );
        assert_eq!(
            calc_difficulty(&cfg, Version::Alpha, 1_020, &p, U256::one()),
            U256::from(131_008u64)
        );
    }

    #[test]
    fn tiny_parent_difficulty_still_moves() {
        // step rounds to zero and is bumped to one
        let p = parent(100, 1_000, 100);
        assert_eq!(byz(Version::Delta, 1_001, &p, 1), U256::from(101u64));
    }
}
