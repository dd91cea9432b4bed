//! The dual-proof engine: header verification, seal verification, uncle
//! rules, and the constructors wiring the classic (single-stage) and AI
//! (dual-stage) variants. The sealing pipeline itself lives in
//! `consensus::sealer`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use primitive_types::U256;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::consensus::{
    batch, difficulty, BatchVerify, ChainReader, Engine, Error, Role,
};
use crate::digger::driver::DiggerDriver;
use crate::digger::{self, select, Digger};
use crate::miner::stats::HashrateMeter;
use crate::params::{
    EngineConfig, PowMode, ALLOWED_FUTURE_BLOCK_TIME, GAS_LIMIT_BOUND_DIVISOR, MAX_GAS_LIMIT,
    MAXIMUM_EXTRA_DATA_SIZE, MAX_UNCLES, MIN_GAS_LIMIT, UNCLE_ANCESTRY_DEPTH,
};
use crate::pow;
use crate::types::{Address, Block, Hash, Header};
use crate::version::Version;
use crate::vrf;

pub struct AiPow {
    pub(crate) config: EngineConfig,
    /// Classifier handle; engines without one fall back to the process
    /// global at first use.
    pub(crate) digger: Option<Arc<Digger>>,
    /// Whether sealing and verification run the inference stage.
    pub(crate) ai_enabled: bool,
    /// Delegation target for `PowMode::Shared`.
    pub(crate) shared: Option<Arc<AiPow>>,
    pub(crate) threads: AtomicUsize,
    /// Bumped on reconfiguration; in-flight seals observe and restart.
    pub(crate) update_gen: AtomicU64,
    /// Nonce-start source, seeded once from OS entropy.
    pub(crate) rand: Mutex<Option<StdRng>>,
    pub(crate) hashrate: HashrateMeter,
}

impl AiPow {
    fn with_parts(
        config: EngineConfig,
        digger: Option<Arc<Digger>>,
        ai_enabled: bool,
        shared: Option<Arc<AiPow>>,
    ) -> AiPow {
        AiPow {
            config,
            digger,
            ai_enabled,
            shared,
            threads: AtomicUsize::new(0),
            update_gen: AtomicU64::new(0),
            rand: Mutex::new(None),
            hashrate: HashrateMeter::default(),
        }
    }

    /// Full dual-proof engine: inference stage plus nonce search.
    pub fn dual(config: EngineConfig, digger: Arc<Digger>) -> AiPow {
        Self::with_parts(config, Some(digger), true, None)
    }

    /// Single-stage engine for pre-AI versions.
    pub fn classic(config: EngineConfig) -> AiPow {
        Self::with_parts(config, None, false, None)
    }

    /// Fake engine for tests: instant seals, scripted verification.
    pub fn fake(config: EngineConfig) -> AiPow {
        debug_assert!(matches!(config.pow_mode, PowMode::Fake | PowMode::FullFake));
        Self::with_parts(config, None, false, None)
    }

    /// Engine delegating seal verification to `inner`.
    pub fn shared(mut config: EngineConfig, inner: Arc<AiPow>) -> AiPow {
        config.pow_mode = PowMode::Shared;
        let ai = inner.ai_enabled;
        Self::with_parts(config, None, ai, Some(inner))
    }

    pub(crate) fn digger(&self) -> Result<Arc<Digger>, Error> {
        match &self.digger {
            Some(d) => Ok(d.clone()),
            None => digger::global().map_err(Error::from),
        }
    }

    /// Start the inference task for a header and hand back its driver.
    pub(crate) fn start_ai_task(&self, header: &Header) -> Result<DiggerDriver, Error> {
        let digger = self.digger()?;
        let value = vrf::vrf_value_section(&header.vrf_value);
        let seed = select::derive_seed(value, &header.coinbase);
        let indices = select::pick_indices(seed, self.config.picture_max, self.config.picture_count);
        let pictures = select::picture_paths(&self.config.picture_store_path, &indices);
        debug!(
            target: "engine",
            number = header.number,
            seed,
            pictures = pictures.len(),
            "inference task started"
        );
        Ok(DiggerDriver::start(digger, seed, pictures))
    }

    /// Replay the inference stage for a header, blocking until done.
    pub fn compute_ai_digest(&self, header: &Header) -> Result<Hash, Error> {
        let driver = self.start_ai_task(header)?;
        let digest = driver.wait()?;
        Ok(Hash::from(digest))
    }

    pub(crate) fn verify_header_inner(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parent: &Header,
        uncle: bool,
        seal: bool,
    ) -> Result<(), Error> {
        if header.extra.len() > MAXIMUM_EXTRA_DATA_SIZE {
            return Err(Error::ExtraTooLong {
                have: header.extra.len(),
                max: MAXIMUM_EXTRA_DATA_SIZE,
            });
        }

        if !uncle {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            if header.time > now + ALLOWED_FUTURE_BLOCK_TIME.as_secs() {
                return Err(Error::FutureBlock);
            }
        }
        if header.time <= parent.time {
            return Err(Error::ZeroBlockTime);
        }

        // super headers are injected by governance, their difficulty is taken
        // as-is
        if !header.is_super_header() {
            let expected = self.calc_difficulty(chain, &header.version, header.time, parent)?;
            if expected != header.difficulty {
                return Err(Error::InvalidDifficulty {
                    have: header.difficulty,
                    want: expected,
                });
            }
        }

        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(Error::InvalidGasLimit {
                have: header.gas_limit,
                parent: parent.gas_limit,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(Error::InvalidGasUsed {
                have: header.gas_used,
                limit: header.gas_limit,
            });
        }
        let drift = header.gas_limit.abs_diff(parent.gas_limit);
        let bound = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
        if drift >= bound || header.gas_limit < MIN_GAS_LIMIT {
            return Err(Error::InvalidGasLimit {
                have: header.gas_limit,
                parent: parent.gas_limit,
            });
        }

        if header.number != parent.number + 1 {
            return Err(Error::InvalidNumber);
        }

        if seal {
            self.verify_seal(chain, header)?;
        }
        Ok(())
    }

    fn verify_coinbase_role(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
    ) -> Result<(), Error> {
        let (topology, _elect) = chain.graph_by_hash(header.parent_hash).map_err(|e| {
            warn!(target: "engine", %e, "topology graph lookup failed");
            Error::InvalidCoinbase
        })?;
        if topology.check_account_role(&header.coinbase, Role::Miner) {
            return Ok(());
        }

        let inner_miners = chain.inner_miner_accounts(header.parent_hash).map_err(|e| {
            warn!(target: "engine", %e, "inner miner lookup failed");
            Error::InvalidCoinbase
        })?;
        if inner_miners.contains(&header.coinbase) {
            return Ok(());
        }
        Err(Error::InvalidCoinbase)
    }

    pub(crate) fn verify_seal_impl(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
    ) -> Result<(), Error> {
        self.verify_coinbase_role(chain, header)?;

        match self.config.pow_mode {
            PowMode::Fake | PowMode::FullFake => {
                if !self.config.fake_delay.is_zero() {
                    thread::sleep(self.config.fake_delay);
                }
                if self.config.fake_fail == Some(header.number) {
                    return Err(Error::InvalidPow);
                }
                return Ok(());
            }
            PowMode::Shared => {
                if let Some(shared) = &self.shared {
                    return shared.verify_seal(chain, header);
                }
            }
            PowMode::Normal => {}
        }

        if self.ai_enabled {
            let recomputed = self.compute_ai_digest(header)?;
            if recomputed != header.ai_hash {
                warn!(
                    target: "engine",
                    number = header.number,
                    have = %header.ai_hash,
                    want = %recomputed,
                    "inference digest mismatch"
                );
                return Err(Error::InvalidAiMine);
            }
        }

        if header.difficulty.is_zero() {
            return Err(Error::NonPositiveDifficulty);
        }
        let target =
            pow::target_from_difficulty(header.difficulty).ok_or(Error::NonPositiveDifficulty)?;

        let payload =
            pow::mining_payload(&header.hash_no_nonce(), &header.ai_hash, header.nonce.to_u64());
        let share = pow::share_from_digest(&pow::x11_hash(&payload));
        if share > target {
            return Err(Error::InvalidPow);
        }
        Ok(())
    }

    fn verify_uncles_impl(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), Error> {
        if self.config.pow_mode == PowMode::FullFake {
            return Ok(());
        }
        if block.uncles().len() > MAX_UNCLES {
            return Err(Error::TooManyUncles);
        }

        // gather the uncle and ancestor sets over the last seven generations
        let mut uncles: HashSet<Hash> = HashSet::new();
        let mut ancestors: HashMap<Hash, Header> = HashMap::new();

        let mut parent = block.parent_hash();
        let mut number = block.number().wrapping_sub(1);
        for _ in 0..UNCLE_ANCESTRY_DEPTH {
            let Some(ancestor) = chain.get_block(parent, number) else {
                break;
            };
            ancestors.insert(ancestor.hash(), ancestor.header().clone());
            for uncle in ancestor.uncles() {
                uncles.insert(uncle.hash());
            }
            parent = ancestor.parent_hash();
            number = number.wrapping_sub(1);
        }
        ancestors.insert(block.hash(), block.header().clone());
        uncles.insert(block.hash());

        for uncle in block.uncles() {
            let hash = uncle.hash();
            if !uncles.insert(hash) {
                return Err(Error::DuplicateUncle);
            }
            if ancestors.contains_key(&hash) {
                return Err(Error::UncleIsAncestor);
            }
            let Some(uncle_parent) = ancestors.get(&uncle.parent_hash) else {
                return Err(Error::DanglingUncle);
            };
            if uncle.parent_hash == block.parent_hash() {
                return Err(Error::DanglingUncle);
            }
            self.verify_header_inner(chain, uncle, uncle_parent, true, true)?;
        }
        Ok(())
    }
}

impl Engine for AiPow {
    fn author(&self, header: &Header) -> Address {
        header.coinbase
    }

    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<(), Error> {
        let parent = chain
            .get_header(header.parent_hash, header.number.wrapping_sub(1))
            .ok_or(Error::UnknownAncestor)?;
        header.difficulty = self.calc_difficulty(chain, &header.version, header.time, &parent)?;
        Ok(())
    }

    fn calc_difficulty(
        &self,
        chain: &dyn ChainReader,
        version: &[u8],
        time: u64,
        parent: &Header,
    ) -> Result<U256, Error> {
        let version = Version::parse(version).ok_or(Error::UnknownVersion)?;
        let min_difficulty = chain.min_difficulty(parent.hash())?;
        Ok(difficulty::calc_difficulty(
            chain.config(),
            version,
            time,
            parent,
            min_difficulty,
        ))
    }

    fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), Error> {
        if self.config.pow_mode == PowMode::FullFake {
            return Ok(());
        }
        // short circuit if the header is already known
        if chain.get_header(header.hash(), header.number).is_some() {
            return Ok(());
        }
        let parent = chain
            .get_header(header.parent_hash, header.number.wrapping_sub(1))
            .ok_or(Error::UnknownAncestor)?;
        self.verify_header_inner(chain, header, &parent, false, seal)
    }

    fn verify_headers(
        self: Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> BatchVerify {
        if self.config.pow_mode == PowMode::FullFake || headers.is_empty() {
            return BatchVerify::immediate(vec![Ok(()); headers.len()]);
        }
        batch::run(self, chain, headers, seals)
    }

    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), Error> {
        self.verify_uncles_impl(chain, block)
    }

    fn verify_seal(&self, chain: &dyn ChainReader, header: &Header) -> Result<(), Error> {
        self.verify_seal_impl(chain, header)
    }

    fn seal(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        stop: Arc<std::sync::atomic::AtomicBool>,
        is_broadcast: bool,
    ) -> Result<Option<Header>, Error> {
        self.seal_impl(chain, header, stop, is_broadcast)
    }

    fn set_threads(&self, threads: usize) {
        self.threads.store(threads, Ordering::Relaxed);
        // wake up any in-flight seal so it restarts with the new layout
        self.update_gen.fetch_add(1, Ordering::SeqCst);
    }

    fn hashrate(&self) -> f64 {
        self.hashrate.rate()
    }
}
