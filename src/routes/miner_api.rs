//! External miner endpoints: pull a work package, push a solution, report a
//! hashrate. Thin JSON bindings over the remote-miner agent; all policy
//! lives in the agent and the engines.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::miner::RemoteAgent;
use crate::types::Hash;

#[derive(Debug, Deserialize)]
pub struct SubmitWorkRequest {
    pub nonce: String,
    pub ai_hash: String,
    pub header_hash: String,
    pub miner: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitHashrateRequest {
    /// Reporter id, 32 bytes hex.
    pub id: String,
    pub hashrate: u64,
}

/// GET /miner/getwork
async fn get_work(
    State(agent): State<Arc<RemoteAgent>>,
) -> Result<Json<[String; 3]>, (StatusCode, String)> {
    agent
        .get_work()
        .map(Json)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))
}

/// POST /miner/submitwork
async fn submit_work(
    State(agent): State<Arc<RemoteAgent>>,
    Json(req): Json<SubmitWorkRequest>,
) -> Json<bool> {
    // seal verification replays the inference stage; keep it off the
    // async workers
    let accepted = tokio::task::spawn_blocking(move || {
        agent.submit_work(&req.nonce, &req.ai_hash, &req.header_hash, &req.miner)
    })
    .await
    .unwrap_or(false);
    Json(accepted)
}

/// POST /miner/submithashrate
async fn submit_hashrate(
    State(agent): State<Arc<RemoteAgent>>,
    Json(req): Json<SubmitHashrateRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let stripped = req.id.strip_prefix("0x").unwrap_or(&req.id);
    let bytes = hex::decode(stripped)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("bad reporter id: {e}")))?;
    if bytes.len() != 32 {
        return Err((StatusCode::BAD_REQUEST, "reporter id must be 32 bytes".into()));
    }
    agent.submit_hashrate(Hash::from_slice(&bytes), req.hashrate);
    Ok(Json(json!(true)))
}

/// Router for the external miner protocol.
pub fn miner_api_router(agent: Arc<RemoteAgent>) -> Router {
    Router::new()
        .route("/miner/getwork", get(get_work))
        .route("/miner/submitwork", post(submit_work))
        .route("/miner/submithashrate", post(submit_hashrate))
        .with_state(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{
        AiPow, ChainReader, ElectGraph, EngineRegistry, Error, TopologyGraph,
    };
    use crate::params::{ChainConfig, EngineConfig, PowMode};
    use crate::types::{Address, Block, Header};
    use primitive_types::U256;

    struct NullChain {
        config: ChainConfig,
    }

    impl ChainReader for NullChain {
        fn config(&self) -> &ChainConfig {
            &self.config
        }

        fn get_header(&self, _hash: Hash, _number: u64) -> Option<Header> {
            None
        }

        fn get_block(&self, _hash: Hash, _number: u64) -> Option<Block> {
            None
        }

        fn has_block(&self, _hash: Hash, _number: u64) -> bool {
            false
        }

        fn min_difficulty(&self, _parent_hash: Hash) -> Result<U256, Error> {
            Ok(U256::one())
        }

        fn graph_by_hash(&self, _hash: Hash) -> Result<(TopologyGraph, ElectGraph), Error> {
            Ok((TopologyGraph::default(), ElectGraph::default()))
        }

        fn inner_miner_accounts(&self, _hash: Hash) -> Result<Vec<Address>, Error> {
            Ok(vec![])
        }
    }

    fn test_agent() -> Arc<RemoteAgent> {
        let chain: Arc<dyn ChainReader> = Arc::new(NullChain {
            config: ChainConfig::dev(),
        });
        let fake = Arc::new(AiPow::fake(EngineConfig {
            pow_mode: PowMode::Fake,
            ..EngineConfig::default()
        }));
        let registry = Arc::new(EngineRegistry::standard(fake.clone(), fake));
        Arc::new(RemoteAgent::new(chain, registry))
    }

    #[tokio::test]
    async fn empty_agent_has_no_work() {
        let agent = test_agent();
        assert!(get_work(State(agent)).await.is_err());
    }

    #[tokio::test]
    async fn hashrate_report_validates_reporter_ids() {
        let agent = test_agent();
        let req = SubmitHashrateRequest {
            id: format!("0x{}", "ab".repeat(32)),
            hashrate: 5,
        };
        assert!(submit_hashrate(State(agent.clone()), Json(req)).await.is_ok());
        assert_eq!(agent.total_hashrate(), 5);

        let bad = SubmitHashrateRequest {
            id: "0x1234".into(),
            hashrate: 5,
        };
        assert!(submit_hashrate(State(agent), Json(bad)).await.is_err());
    }
}
