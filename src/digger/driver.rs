//! Polling driver around a single digging task.
//!
//! The sealer does not poll the classifier handle directly; it starts a
//! driver, which owns exactly one task and one polling thread. The thread
//! checks the task every 100 ms and delivers either the digest or the first
//! native error. Stopping the driver cancels the task before the thread
//! exits, so no task ever outlives its driver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::digger::{DigPoll, Digger, DiggerError};

/// Cadence of `result` polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a driver poll from the consumer side.
pub enum DriverPoll {
    /// Task still running.
    Pending,
    /// Inference finished with this digest.
    Ready([u8; 32]),
    /// Native failure; the driver is finished.
    Failed(DiggerError),
}

pub struct DiggerDriver {
    stop: Arc<AtomicBool>,
    rx: mpsc::Receiver<Result<[u8; 32], DiggerError>>,
}

impl DiggerDriver {
    /// Start a digging task and the thread that polls it.
    pub fn start(digger: Arc<Digger>, seed: i64, pictures: Vec<PathBuf>) -> DiggerDriver {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let task = digger.dig(seed, &pictures);
        let stop_flag = stop.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 32];
            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    if let Err(e) = digger.cancel(task) {
                        warn!(target: "digger", task, %e, "cancel on stop failed");
                    }
                    debug!(target: "digger", task, "driver stopped, task cancelled");
                    return;
                }
                match digger.result(task, &mut buf) {
                    Ok(DigPoll::Ready) => {
                        let _ = tx.send(Ok(buf));
                        return;
                    }
                    Ok(DigPoll::Pending) => thread::sleep(POLL_INTERVAL),
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }
        });

        DiggerDriver { stop, rx }
    }

    /// Wait up to `timeout` for the task to finish.
    pub fn poll(&self, timeout: Duration) -> DriverPoll {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(digest)) => DriverPoll::Ready(digest),
            Ok(Err(e)) => DriverPoll::Failed(e),
            Err(RecvTimeoutError::Timeout) => DriverPoll::Pending,
            // polling thread gone without a message: it observed the stop flag
            Err(RecvTimeoutError::Disconnected) => DriverPoll::Pending,
        }
    }

    /// Block until the task finishes one way or the other.
    pub fn wait(&self) -> Result<[u8; 32], DiggerError> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(DiggerError::Native("digger driver stopped".into())),
        }
    }

    /// Ask the driver to stop; the polling thread cancels the task.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, Arc<Digger>, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("weights.bin"), b"w").unwrap();
        fs::write(dir.path().join("model.cfg"), b"m").unwrap();
        fs::write(dir.path().join("class.names"), b"n").unwrap();
        let pic = dir.path().join("test_0.jpg");
        fs::write(&pic, b"jpeg-ish").unwrap();
        let digger = Arc::new(Digger::open(dir.path(), &[]).unwrap());
        (dir, digger, vec![pic])
    }

    #[test]
    fn driver_delivers_the_digest() {
        let (_dir, digger, pics) = fixture();
        let driver = DiggerDriver::start(digger, 42, pics);
        let digest = driver.wait().unwrap();
        assert_ne!(digest, [0u8; 32]);
    }

    #[test]
    fn driver_surfaces_native_errors() {
        let (_dir, digger, _) = fixture();
        let driver = DiggerDriver::start(digger, 42, vec![PathBuf::from("/missing/test_0.jpg")]);
        assert!(matches!(driver.wait(), Err(DiggerError::Native(_))));
    }

    #[test]
    fn stopped_driver_cancels_its_task() {
        let (_dir, digger, pics) = fixture();
        let driver = DiggerDriver::start(digger.clone(), 42, pics);
        driver.stop();
        // the polling thread exits within one poll interval; afterwards the
        // task is gone from the handle
        thread::sleep(POLL_INTERVAL + Duration::from_millis(50));
        let mut buf = [0u8; 32];
        assert!(digger.result(1, &mut buf).is_err());
    }
}
