//! Remote-miner agent: publishes work packages to external hashers, takes
//! their solutions back through full seal verification, and keeps a decaying
//! book of reported hashrates.
//!
//! Work entries are only removed when a solution is accepted; the periodic
//! tick exists solely to expire hashrate reporters that stopped pinging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consensus::{ChainReader, EngineRegistry};
use crate::pow;
use crate::types::{Address, BlockNonce, Hash, Header};
use crate::vrf;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("no work available yet")]
    NoWork,
}

/// A candidate block published to external miners.
#[derive(Clone, Debug)]
pub struct Work {
    pub header: Header,
    pub created_at: Instant,
}

impl Work {
    pub fn new(header: Header) -> Work {
        Work {
            header,
            created_at: Instant::now(),
        }
    }
}

#[derive(Clone, Debug)]
struct HashrateEntry {
    ping: Instant,
    rate: u64,
}

/// Housekeeping cadence and reporter expiry. Production values are the
/// protocol's; tests shrink them to keep wall clocks short.
#[derive(Clone, Copy, Debug)]
pub struct AgentTiming {
    pub tick: Duration,
    pub reporter_ttl: Duration,
}

impl Default for AgentTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            reporter_ttl: Duration::from_secs(10),
        }
    }
}

#[derive(Default)]
struct WorkBook {
    current: Option<Work>,
    pending: HashMap<Hash, Work>,
}

pub struct RemoteAgent {
    chain: Arc<dyn ChainReader>,
    engines: Arc<EngineRegistry>,
    timing: AgentTiming,

    work: Mutex<WorkBook>,
    hashrate: RwLock<HashMap<Hash, HashrateEntry>>,

    running: AtomicBool,
    work_tx: Mutex<Option<mpsc::Sender<Work>>>,
    return_tx: Mutex<Option<mpsc::Sender<Header>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteAgent {
    pub fn new(chain: Arc<dyn ChainReader>, engines: Arc<EngineRegistry>) -> RemoteAgent {
        Self::with_timing(chain, engines, AgentTiming::default())
    }

    pub fn with_timing(
        chain: Arc<dyn ChainReader>,
        engines: Arc<EngineRegistry>,
        timing: AgentTiming,
    ) -> RemoteAgent {
        RemoteAgent {
            chain,
            engines,
            timing,
            work: Mutex::new(WorkBook::default()),
            hashrate: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            work_tx: Mutex::new(None),
            return_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    /// Channel accepted solutions are forwarded on.
    pub fn set_return_channel(&self, tx: mpsc::Sender<Header>) {
        *self.return_tx.lock() = Some(tx);
    }

    /// Sender for fresh work packages; `None` while the agent is stopped.
    pub fn work_sender(&self) -> Option<mpsc::Sender<Work>> {
        self.work_tx.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let (tx, rx) = mpsc::channel();
        *self.work_tx.lock() = Some(tx);

        let agent = self.clone();
        let handle = thread::spawn(move || agent.event_loop(rx));
        *self.loop_handle.lock() = Some(handle);
        info!(target: "remote_agent", "agent started");
    }

    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        // dropping the sender disconnects the loop
        *self.work_tx.lock() = None;
        if let Some(handle) = self.loop_handle.lock().take() {
            let _ = handle.join();
        }
        info!(target: "remote_agent", "agent stopped");
    }

    /// The agent's event loop: swallow incoming work, expire silent
    /// hashrate reporters on every tick.
    fn event_loop(&self, rx: mpsc::Receiver<Work>) {
        let mut next_tick = Instant::now() + self.timing.tick;
        loop {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match rx.recv_timeout(timeout) {
                Ok(work) => {
                    debug!(
                        target: "remote_agent",
                        number = work.header.number,
                        "current work updated"
                    );
                    self.work.lock().current = Some(work);
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.expire_reporters();
                    next_tick += self.timing.tick;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn expire_reporters(&self) {
        let ttl = self.timing.reporter_ttl;
        let mut rates = self.hashrate.write();
        let before = rates.len();
        rates.retain(|_, entry| entry.ping.elapsed() <= ttl);
        let dropped = before - rates.len();
        if dropped > 0 {
            debug!(target: "remote_agent", dropped, "expired hashrate reporters");
        }
    }

    /// Work package for external miners: the no-nonce header hash, the vrf
    /// seed, and the boundary target, all hex encoded.
    pub fn get_work(&self) -> Result<[String; 3], AgentError> {
        let mut book = self.work.lock();
        let Some(work) = book.current.clone() else {
            return Err(AgentError::NoWork);
        };

        let header = &work.header;
        let no_nonce = header.hash_no_nonce();
        let seed = vrf::vrf_value_section(&header.vrf_value);
        let target = pow::target_from_difficulty(header.difficulty).unwrap_or_default();
        let mut target_bytes = [0u8; 32];
        target.to_big_endian(&mut target_bytes);

        let package = [
            format!("0x{}", hex::encode(no_nonce.as_bytes())),
            format!("0x{}", hex::encode(seed)),
            format!("0x{}", hex::encode(target_bytes)),
        ];

        book.pending.insert(no_nonce, work);
        Ok(package)
    }

    /// Take a solution from an external miner. Returns whether it was
    /// accepted; any reason for rejection comes back as `false`.
    pub fn submit_work(
        &self,
        nonce_hex: &str,
        ai_hash_hex: &str,
        header_hash_hex: &str,
        miner_addr: &str,
    ) -> bool {
        if !self.is_running() {
            warn!(target: "remote_agent", "solution submitted while agent stopped");
            return false;
        }
        if header_hash_hex.len() != 66 || ai_hash_hex.len() != 66 {
            warn!(
                target: "remote_agent",
                header_hash = header_hash_hex,
                ai_hash = ai_hash_hex,
                "submitted hash length wrong"
            );
            return false;
        }
        if nonce_hex.len() > 10 {
            warn!(target: "remote_agent", nonce = nonce_hex, "submitted nonce too long");
            return false;
        }

        let Some(header_hash) = parse_hash(header_hash_hex) else {
            return false;
        };
        let Some(ai_hash) = parse_hash(ai_hash_hex) else {
            return false;
        };
        let Some(nonce) = parse_nonce(nonce_hex) else {
            warn!(target: "remote_agent", nonce = nonce_hex, "submitted nonce undecodable");
            return false;
        };
        let Some(coinbase) = parse_currency_address(miner_addr) else {
            warn!(target: "remote_agent", miner = miner_addr, "miner address undecodable");
            return false;
        };

        // one guard across lookup, verification, and removal: a given work
        // entry can be accepted at most once, even under concurrent submits
        let mut book = self.work.lock();
        let Some(work) = book.pending.get(&header_hash) else {
            info!(target: "remote_agent", hash = %header_hash, "work submitted but none pending");
            return false;
        };

        // rebuild the sealed header the submission claims
        let mut result = work.header.clone();
        result.nonce = BlockNonce::from_u64(nonce);
        result.ai_hash = ai_hash;
        result.coinbase = coinbase;

        let Some(engine) = self.engines.engine_for(&result.version) else {
            warn!(
                target: "remote_agent",
                version = %String::from_utf8_lossy(&result.version),
                "no engine for submitted header version"
            );
            return false;
        };

        if let Err(e) = engine.verify_seal(&*self.chain, &result) {
            warn!(target: "remote_agent", hash = %header_hash, %e, "invalid solution submitted");
            return false;
        }

        if let Some(tx) = self.return_tx.lock().as_ref() {
            if tx.send(result).is_err() {
                warn!(target: "remote_agent", "solution accepted but return channel closed");
            }
        }
        book.pending.remove(&header_hash);
        info!(target: "remote_agent", hash = %header_hash, "solution accepted");
        true
    }

    /// Record a reporter's hashrate claim. The node trusts the reporter.
    pub fn submit_hashrate(&self, id: Hash, rate: u64) {
        self.hashrate.write().insert(
            id,
            HashrateEntry {
                ping: Instant::now(),
                rate,
            },
        );
    }

    /// Sum of all live reporter rates.
    pub fn total_hashrate(&self) -> u64 {
        self.hashrate
            .read()
            .values()
            .map(|entry| entry.rate)
            .fold(0u64, u64::saturating_add)
    }

    #[cfg(test)]
    pub(crate) fn reporter_count(&self) -> usize {
        self.hashrate.read().len()
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.work.lock().pending.len()
    }
}

fn parse_hash(hex_str: &str) -> Option<Hash> {
    let stripped = hex_str.strip_prefix("0x")?;
    let bytes = hex::decode(stripped).ok()?;
    (bytes.len() == 32).then(|| Hash::from_slice(&bytes))
}

fn parse_nonce(nonce_hex: &str) -> Option<u64> {
    let stripped = nonce_hex.strip_prefix("0x").unwrap_or(nonce_hex);
    u64::from_str_radix(stripped, 16).ok()
}

/// Miner addresses arrive currency-prefixed: `<currency>.<base58 payload>`,
/// the payload being the 20 address bytes.
fn parse_currency_address(addr: &str) -> Option<Address> {
    let (currency, payload) = addr.split_once('.')?;
    if currency.is_empty() || payload.is_empty() {
        return None;
    }
    let bytes = bs58::decode(payload).into_vec().ok()?;
    (bytes.len() == 20).then(|| Address::from_slice(&bytes))
}
