//! Mining-side plumbing around the consensus engines: the remote-miner
//! agent serving pull/submit work to external hashers, and the hashrate
//! meter local workers report into.

pub mod remote;
pub mod stats;

pub use remote::{AgentError, AgentTiming, RemoteAgent, Work};
pub use stats::HashrateMeter;
