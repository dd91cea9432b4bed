//! Parallel header verification with ordered result delivery.
//!
//! A pool of workers claims header indices from a shared counter; a
//! coordinator re-sequences their completions so the caller sees results in
//! exactly the order the headers were submitted, whatever the scheduling.
//! Aborting tears down the coordinator, and the workers drain on their own.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::consensus::engine::AiPow;
use crate::consensus::{ChainReader, Error};
use crate::types::Header;

/// Handle on an in-flight batch verification.
pub struct BatchVerify {
    abort: Arc<AtomicBool>,
    rx: mpsc::Receiver<Result<(), Error>>,
}

impl BatchVerify {
    /// Next result in submission order; `None` once the batch is done or
    /// aborted.
    pub fn recv(&self) -> Option<Result<(), Error>> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Result<(), Error>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Stop producing results. Workers finish their current header and exit.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// A handle whose results are already known.
    pub(crate) fn immediate(results: Vec<Result<(), Error>>) -> BatchVerify {
        let (tx, rx) = mpsc::channel();
        for r in results {
            let _ = tx.send(r);
        }
        BatchVerify {
            abort: Arc::new(AtomicBool::new(false)),
            rx,
        }
    }
}

struct BatchShared {
    engine: Arc<AiPow>,
    chain: Arc<dyn ChainReader>,
    headers: Vec<Header>,
    seals: Vec<bool>,
    next: AtomicUsize,
}

impl BatchShared {
    fn verify_at(&self, index: usize) -> Result<(), Error> {
        let header = &self.headers[index];

        // inside a batch a header's parent is its predecessor; only the
        // first header goes to the chain
        let parent = if index == 0 {
            self.chain
                .get_header(header.parent_hash, header.number.wrapping_sub(1))
        } else if self.headers[index - 1].hash() == header.parent_hash {
            Some(self.headers[index - 1].clone())
        } else {
            None
        };
        let Some(parent) = parent else {
            return Err(Error::UnknownAncestor);
        };

        if self
            .chain
            .get_header(header.hash(), header.number)
            .is_some()
        {
            return Ok(()); // known block
        }

        let seal = self.seals.get(index).copied().unwrap_or(false);
        self.engine
            .verify_header_inner(&*self.chain, header, &parent, false, seal)
    }
}

pub(crate) fn run(
    engine: Arc<AiPow>,
    chain: Arc<dyn ChainReader>,
    headers: Vec<Header>,
    seals: Vec<bool>,
) -> BatchVerify {
    let len = headers.len();
    let abort = Arc::new(AtomicBool::new(false));
    let (out_tx, out_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<(usize, Result<(), Error>)>();

    let shared = Arc::new(BatchShared {
        engine,
        chain,
        headers,
        seals,
        next: AtomicUsize::new(0),
    });

    let workers = num_cpus::get().clamp(1, len);
    for _ in 0..workers {
        let shared = shared.clone();
        let done = done_tx.clone();
        let abort = abort.clone();
        thread::spawn(move || loop {
            if abort.load(Ordering::SeqCst) {
                return;
            }
            let index = shared.next.fetch_add(1, Ordering::Relaxed);
            if index >= shared.headers.len() {
                return;
            }
            let result = shared.verify_at(index);
            if done.send((index, result)).is_err() {
                return;
            }
        });
    }
    drop(done_tx);

    let abort_flag = abort.clone();
    thread::spawn(move || {
        let mut pending: Vec<Option<Result<(), Error>>> = vec![None; len];
        let mut emitted = 0usize;
        while emitted < len {
            match done_rx.recv_timeout(Duration::from_millis(50)) {
                Ok((index, result)) => {
                    pending[index] = Some(result);
                    while emitted < len {
                        let Some(result) = pending[emitted].take() else {
                            break;
                        };
                        if out_tx.send(result).is_err() {
                            return;
                        }
                        emitted += 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if abort_flag.load(Ordering::SeqCst) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    });

    BatchVerify { abort, rx: out_rx }
}
