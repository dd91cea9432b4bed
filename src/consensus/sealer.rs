//! The sealing pipeline: inference stage first, then a parallel nonce search
//! over the 80-byte payload. Stop requests, engine reconfiguration, and a
//! found seal all tear the attempt down through one abort flag; workers
//! observe it within one attempt window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use primitive_types::U256;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::consensus::engine::AiPow;
use crate::consensus::{ChainReader, Error};
use crate::digger::driver::DriverPoll;
use crate::params::PowMode;
use crate::pow;
use crate::types::{BlockNonce, Hash, Header};

/// Hash-rate contributions are flushed every this many attempts.
const HASHRATE_MARK_INTERVAL: u64 = 1 << 15;

/// Cadence of the orchestrator's stop/update/found checks.
const EVENT_POLL: Duration = Duration::from_millis(10);

enum AiStage {
    Stopped,
    Restart,
    Digest(Hash),
}

enum SealOutcome {
    Stopped,
    Restart,
    Found(Header),
}

impl AiPow {
    /// Fresh 63-bit nonce start from the engine's shared entropy source.
    pub(crate) fn next_seed(&self) -> u64 {
        let mut guard = self.rand.lock();
        let rng = guard.get_or_insert_with(StdRng::from_entropy);
        rng.gen::<u64>() >> 1
    }

    pub(crate) fn seal_impl(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        stop: Arc<AtomicBool>,
        is_broadcast: bool,
    ) -> Result<Option<Header>, Error> {
        info!(target: "sealer", number = header.number, "sealing started");

        match self.config.pow_mode {
            PowMode::Fake | PowMode::FullFake => {
                let mut sealed = header.clone();
                sealed.nonce = BlockNonce::from_u64(self.next_seed());
                return Ok(Some(sealed));
            }
            PowMode::Shared => {
                if let Some(shared) = &self.shared {
                    return shared.seal_impl(chain, header, stop, is_broadcast);
                }
            }
            PowMode::Normal => {}
        }

        loop {
            let generation = self.update_gen.load(Ordering::SeqCst);
            let mut current = header.clone();

            if self.ai_enabled && !is_broadcast {
                match self.ai_stage(&current, &stop, generation)? {
                    AiStage::Stopped => {
                        info!(target: "sealer", number = header.number, "sealing stopped in inference stage");
                        return Ok(None);
                    }
                    AiStage::Restart => continue,
                    AiStage::Digest(digest) => current.ai_hash = digest,
                }
            }

            let target = if is_broadcast {
                pow::max_target()
            } else {
                pow::target_from_difficulty(current.difficulty)
                    .ok_or(Error::NonPositiveDifficulty)?
            };
            let threads = if is_broadcast { 1 } else { num_cpus::get().max(1) };

            debug!(
                target: "sealer",
                number = current.number,
                threads,
                difficulty = %current.difficulty,
                is_broadcast,
                "nonce search started"
            );

            // the abort flag and the found channel outlive the worker scope
            let abort = AtomicBool::new(false);
            let (found_tx, found_rx) = mpsc::channel::<Header>();

            let outcome = thread::scope(|scope| {
                for id in 0..threads {
                    let worker_header = current.clone();
                    let tx = found_tx.clone();
                    let abort = &abort;
                    let seed = self.next_seed();
                    scope.spawn(move || self.mine(worker_header, id, seed, target, abort, tx));
                }
                drop(found_tx);

                loop {
                    if stop.load(Ordering::Relaxed) {
                        abort.store(true, Ordering::Relaxed);
                        break SealOutcome::Stopped;
                    }
                    if self.update_gen.load(Ordering::SeqCst) != generation {
                        abort.store(true, Ordering::Relaxed);
                        break SealOutcome::Restart;
                    }
                    match found_rx.recv_timeout(EVENT_POLL) {
                        Ok(sealed) => {
                            abort.store(true, Ordering::Relaxed);
                            break SealOutcome::Found(sealed);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            // all workers exited without a find
                            break SealOutcome::Stopped;
                        }
                    }
                }
                // the scope joins every worker before returning
            });

            match outcome {
                SealOutcome::Found(sealed) => {
                    info!(
                        target: "sealer",
                        number = sealed.number,
                        nonce = sealed.nonce.to_u64(),
                        "seal found"
                    );
                    return Ok(Some(sealed));
                }
                SealOutcome::Stopped => {
                    info!(target: "sealer", number = header.number, "sealing stopped");
                    return Ok(None);
                }
                SealOutcome::Restart => {
                    debug!(target: "sealer", number = header.number, "sealing restarted on reconfigure");
                    continue;
                }
            }
        }
    }

    /// Run the inference stage, multiplexing stop and reconfigure signals
    /// against the driver.
    fn ai_stage(
        &self,
        header: &Header,
        stop: &AtomicBool,
        generation: u64,
    ) -> Result<AiStage, Error> {
        let driver = self.start_ai_task(header)?;
        loop {
            if stop.load(Ordering::Relaxed) {
                driver.stop();
                return Ok(AiStage::Stopped);
            }
            if self.update_gen.load(Ordering::SeqCst) != generation {
                driver.stop();
                return Ok(AiStage::Restart);
            }
            match driver.poll(EVENT_POLL) {
                DriverPoll::Ready(digest) => {
                    debug!(target: "sealer", number = header.number, "inference digest ready");
                    return Ok(AiStage::Digest(Hash::from(digest)));
                }
                DriverPoll::Failed(e) => {
                    warn!(target: "sealer", number = header.number, %e, "inference stage failed");
                    return Err(e.into());
                }
                DriverPoll::Pending => {}
            }
        }
    }

    /// One nonce-search worker. Exits on abort or after publishing a seal.
    fn mine(
        &self,
        mut header: Header,
        id: usize,
        seed: u64,
        target: U256,
        abort: &AtomicBool,
        found: mpsc::Sender<Header>,
    ) {
        // the no-nonce hash is nonce-independent, freeze it once
        let hash_no_nonce = header.hash_no_nonce();
        let mut nonce = seed;
        let mut attempts: u64 = 0;
        trace!(target: "sealer", miner = id, seed, "worker started");

        loop {
            if abort.load(Ordering::Relaxed) {
                self.hashrate.mark(attempts);
                trace!(target: "sealer", miner = id, "worker aborted");
                return;
            }

            attempts += 1;
            if attempts % HASHRATE_MARK_INTERVAL == 0 {
                self.hashrate.mark(attempts);
                attempts = 0;
            }

            let payload = pow::mining_payload(&hash_no_nonce, &header.ai_hash, nonce);
            let share = pow::share_from_digest(&pow::x11_hash(&payload));
            if share <= target {
                header.nonce = BlockNonce::from_u64(nonce);
                match found.send(header) {
                    Ok(()) => trace!(target: "sealer", miner = id, nonce, "seal found and reported"),
                    Err(_) => trace!(target: "sealer", miner = id, nonce, "seal found but discarded"),
                }
                return;
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}
