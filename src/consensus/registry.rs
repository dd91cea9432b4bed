//! Version-to-engine dispatch. Pre-AI versions share the single-stage
//! engine; AiMine gets the dual-proof engine. The remote-miner agent looks
//! engines up here with the version bytes carried by submitted headers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::consensus::Engine;
use crate::version::Version;

#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<Version, Arc<dyn Engine>>,
}

impl EngineRegistry {
    pub fn new() -> EngineRegistry {
        EngineRegistry {
            engines: HashMap::new(),
        }
    }

    /// The canonical wiring: every pre-AI version runs `classic`, AiMine
    /// runs `ai`.
    pub fn standard(classic: Arc<dyn Engine>, ai: Arc<dyn Engine>) -> EngineRegistry {
        let mut registry = EngineRegistry::new();
        for version in [Version::Alpha, Version::Beta, Version::Gamma, Version::Delta] {
            registry.insert(version, classic.clone());
        }
        registry.insert(Version::AiMine, ai);
        registry
    }

    pub fn insert(&mut self, version: Version, engine: Arc<dyn Engine>) {
        self.engines.insert(version, engine);
    }

    pub fn engine(&self, version: Version) -> Option<Arc<dyn Engine>> {
        self.engines.get(&version).cloned()
    }

    /// Look up by the raw version bytes a header carries.
    pub fn engine_for(&self, version_bytes: &[u8]) -> Option<Arc<dyn Engine>> {
        Version::parse(version_bytes).and_then(|v| self.engine(v))
    }
}
