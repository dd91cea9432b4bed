//! Dual-proof sealing and verification core.
//!
//! A block is sealed in two stages: a deterministic AI-inference stage that
//! commits to a 32-byte digest over a seed-selected picture set, followed by a
//! classical nonce search against an x11-style chained hash. This crate owns
//! the sealing engine, the mirror-image verifier, the inference bridge, and
//! the pull/submit protocol served to external miners. Everything else (chain
//! database, tx pool, p2p, RPC front-end) talks to this core through the
//! `ChainReader` and `Engine` traits in [`consensus`].

pub mod consensus;
pub mod digger;
pub mod miner;
pub mod params;
pub mod pow;
pub mod routes;
pub mod state;
pub mod types;
pub mod version;
pub mod vrf;

pub use consensus::{ChainReader, Engine, Error};
pub use params::{ChainConfig, EngineConfig, PowMode};
pub use types::{Address, BlockNonce, Hash, Header, Signature};
pub use version::Version;
