//! Consensus engine surface: the `Engine` trait implemented per chain
//! version, the `ChainReader` the engines pull ancestry and governance data
//! through, and the typed error set every verification path reports.

pub mod batch;
pub mod difficulty;
pub mod engine;
pub mod registry;
pub mod sealer;

pub use batch::BatchVerify;
pub use engine::AiPow;
pub use registry::EngineRegistry;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use primitive_types::U256;
use thiserror::Error;

use crate::digger::DiggerError;
use crate::params::ChainConfig;
use crate::types::{Address, Block, Hash, Header};

/// Errors surfaced by header and seal verification. Every variant is final
/// for the header it was reported on; nothing in the core retries.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("unknown ancestor")]
    UnknownAncestor,
    #[error("block in the future")]
    FutureBlock,
    #[error("invalid block number")]
    InvalidNumber,
    #[error("extra-data too long: {have} > {max}")]
    ExtraTooLong { have: usize, max: usize },
    #[error("timestamp too big")]
    LargeBlockTime,
    #[error("timestamp equals parent's")]
    ZeroBlockTime,
    #[error("too many uncles")]
    TooManyUncles,
    #[error("duplicate uncle")]
    DuplicateUncle,
    #[error("uncle is ancestor")]
    UncleIsAncestor,
    #[error("uncle's parent is not ancestor")]
    DanglingUncle,
    #[error("invalid difficulty: have {have}, want {want}")]
    InvalidDifficulty { have: U256, want: U256 },
    #[error("non-positive difficulty")]
    NonPositiveDifficulty,
    #[error("invalid gas limit: have {have}, parent {parent}")]
    InvalidGasLimit { have: u64, parent: u64 },
    #[error("invalid gas used: have {have}, limit {limit}")]
    InvalidGasUsed { have: u64, limit: u64 },
    #[error("invalid proof-of-work")]
    InvalidPow,
    #[error("invalid ai mine result")]
    InvalidAiMine,
    #[error("invalid coinbase")]
    InvalidCoinbase,
    #[error("unknown chain version")]
    UnknownVersion,
    #[error("ai bridge failure: {0}")]
    AiBridge(#[from] DiggerError),
    #[error("chain state read failed: {0}")]
    StateRead(String),
}

/// Network roles an account can hold in the topology graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Nothing,
    Miner,
    Validator,
    BackupMiner,
    BackupValidator,
}

#[derive(Clone, Debug, Default)]
pub struct TopologyNode {
    pub account: Address,
    pub role: Role,
}

/// Snapshot of the network topology at a given block.
#[derive(Clone, Debug, Default)]
pub struct TopologyGraph {
    pub number: u64,
    pub nodes: Vec<TopologyNode>,
}

impl TopologyGraph {
    pub fn check_account_role(&self, account: &Address, role: Role) -> bool {
        self.nodes
            .iter()
            .any(|n| n.account == *account && n.role == role)
    }
}

/// Election results carried alongside the topology.
#[derive(Clone, Debug, Default)]
pub struct ElectGraph {
    pub number: u64,
    pub elected: Vec<Address>,
}

/// Read access to the chain the engines validate against. Implemented by the
/// blockchain database outside this crate; tests use in-memory fakes.
pub trait ChainReader: Send + Sync {
    fn config(&self) -> &ChainConfig;

    fn get_header(&self, hash: Hash, number: u64) -> Option<Header>;

    fn get_block(&self, hash: Hash, number: u64) -> Option<Block>;

    fn has_block(&self, hash: Hash, number: u64) -> bool;

    /// Governance minimum difficulty as of the given block.
    fn min_difficulty(&self, parent_hash: Hash) -> Result<U256, Error>;

    /// Topology and election graphs as of the given block.
    fn graph_by_hash(&self, hash: Hash) -> Result<(TopologyGraph, ElectGraph), Error>;

    /// Accounts allowed to mine regardless of the topology graph.
    fn inner_miner_accounts(&self, hash: Hash) -> Result<Vec<Address>, Error>;
}

/// A block sealing and verification engine. One instance exists per chain
/// version family; the registry dispatches on the header's version bytes.
pub trait Engine: Send + Sync {
    /// The verified author of the block.
    fn author(&self, header: &Header) -> Address {
        header.coinbase
    }

    /// Initialize the difficulty field of a header under construction.
    fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<(), Error>;

    /// Difficulty a block at `time` on top of `parent` must carry.
    fn calc_difficulty(
        &self,
        chain: &dyn ChainReader,
        version: &[u8],
        time: u64,
        parent: &Header,
    ) -> Result<U256, Error>;

    /// Check one header against its parent and, optionally, its seal.
    fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), Error>;

    /// Verify a batch of headers concurrently. Results arrive in submission
    /// order on the returned handle.
    fn verify_headers(
        self: Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> BatchVerify;

    /// Enforce the uncle rules for a block.
    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), Error>;

    /// Recompute both proofs of a sealed header.
    fn verify_seal(&self, chain: &dyn ChainReader, header: &Header) -> Result<(), Error>;

    /// Run the sealing pipeline. Returns `Ok(None)` when stopped by the
    /// caller before a seal was found.
    fn seal(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        stop: Arc<AtomicBool>,
        is_broadcast: bool,
    ) -> Result<Option<Header>, Error>;

    /// Reconfigure worker threads; tears down and restarts in-flight seals.
    fn set_threads(&self, threads: usize);

    /// Local nonce-search rate in hashes per second.
    fn hashrate(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_role_check() {
        let account = Address::repeat_byte(7);
        let graph = TopologyGraph {
            number: 1,
            nodes: vec![
                TopologyNode {
                    account,
                    role: Role::Miner,
                },
                TopologyNode {
                    account: Address::repeat_byte(8),
                    role: Role::Validator,
                },
            ],
        };
        assert!(graph.check_account_role(&account, Role::Miner));
        assert!(!graph.check_account_role(&account, Role::Validator));
        assert!(!graph.check_account_role(&Address::repeat_byte(9), Role::Miner));
    }
}
