//! HTTP surface of the core: the external-miner protocol endpoints. The
//! node's full RPC front-end mounts this router alongside its own.

pub mod miner_api;

pub use miner_api::miner_api_router;
