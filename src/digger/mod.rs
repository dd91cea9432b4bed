//! Stateful handle into the image-classification stage of sealing.
//!
//! The handle is created once per process from a model directory, lives for
//! the node's lifetime, and hands out cancellable per-task digging jobs. The
//! three task operations (`dig`, `result`, `cancel`) are the only way in;
//! callers never touch the classifier state directly.
//!
//! A digging task folds the model fingerprint, the 63-bit seed and the
//! selected picture files into a 32-byte digest. Two nodes sharing the same
//! model directory and picture store always produce identical digests for
//! the same seed, which is what lets verifiers replay the inference stage.

pub mod driver;
pub mod select;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use sha3::{Digest, Keccak256};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Identifier of an in-flight digging task.
pub type TaskId = i64;

/// Files expected inside the model directory.
const WEIGHTS_FILE: &str = "weights.bin";
const MODEL_FILE: &str = "model.cfg";
const NAMES_FILE: &str = "class.names";

/// Inference mixing rounds folded on top of the picture data.
const MIX_ROUNDS: usize = 4_096;
const CANCEL_CHECK_EVERY: usize = 256;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DiggerError {
    #[error("classifier handle not initialized")]
    NotInitialized,
    #[error("unknown digging task {0}")]
    UnknownTask(TaskId),
    #[error("classifier error: {0}")]
    Native(String),
}

/// Poll outcome of [`Digger::result`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigPoll {
    Pending,
    Ready,
}

enum TaskState {
    Running,
    Ready([u8; 32]),
    Failed(String),
}

struct TaskSlot {
    cancelled: AtomicBool,
    state: Mutex<TaskState>,
}

/// The long-lived classifier handle.
pub struct Digger {
    model_fingerprint: [u8; 32],
    tasks: Mutex<HashMap<TaskId, Arc<TaskSlot>>>,
    next_id: AtomicI64,
}

static GLOBAL: OnceCell<Arc<Digger>> = OnceCell::new();

/// One-shot process-global initialization. Later calls are no-ops; the first
/// failure is returned to the caller, which treats it as fatal.
pub fn init_global(config_dir: &Path, preload: &[PathBuf]) -> Result<(), DiggerError> {
    GLOBAL
        .get_or_try_init(|| Digger::open(config_dir, preload).map(Arc::new))
        .map(|_| ())
}

/// The process-global handle, if [`init_global`] has run.
pub fn global() -> Result<Arc<Digger>, DiggerError> {
    GLOBAL.get().cloned().ok_or(DiggerError::NotInitialized)
}

impl Digger {
    /// Load classifier weights, model config and class names from
    /// `config_dir` and warm the cache with `preload` pictures. Any
    /// unreadable file aborts the open.
    pub fn open(config_dir: &Path, preload: &[PathBuf]) -> Result<Digger, DiggerError> {
        let mut fp = Keccak256::new();
        for file in [WEIGHTS_FILE, MODEL_FILE, NAMES_FILE] {
            let path = config_dir.join(file);
            let bytes = fs::read(&path)
                .map_err(|e| DiggerError::Native(format!("load {}: {e}", path.display())))?;
            fp.update((bytes.len() as u64).to_be_bytes());
            fp.update(&bytes);
        }

        for picture in preload {
            fs::read(picture)
                .map_err(|e| DiggerError::Native(format!("preload {}: {e}", picture.display())))?;
        }

        let mut model_fingerprint = [0u8; 32];
        model_fingerprint.copy_from_slice(&fp.finalize());
        info!(
            target: "digger",
            dir = %config_dir.display(),
            preloaded = preload.len(),
            "classifier handle ready"
        );

        Ok(Digger {
            model_fingerprint,
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        })
    }

    /// Start an asynchronous digging task over `pictures`, keyed by `seed`.
    pub fn dig(&self, seed: i64, pictures: &[PathBuf]) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(TaskSlot {
            cancelled: AtomicBool::new(false),
            state: Mutex::new(TaskState::Running),
        });
        self.tasks.lock().insert(id, slot.clone());

        let fingerprint = self.model_fingerprint;
        let pictures = pictures.to_vec();
        debug!(target: "digger", task = id, seed, pictures = pictures.len(), "digging task started");
        thread::spawn(move || {
            match run_inference(&fingerprint, seed, &pictures, &slot.cancelled) {
                Ok(Some(digest)) => *slot.state.lock() = TaskState::Ready(digest),
                Ok(None) => debug!(target: "digger", task = id, "digging task cancelled"),
                Err(msg) => *slot.state.lock() = TaskState::Failed(msg),
            }
        });
        id
    }

    /// Poll a task. `Ready` fills `out` and releases the task; a failed task
    /// is released and its error returned.
    pub fn result(&self, task: TaskId, out: &mut [u8; 32]) -> Result<DigPoll, DiggerError> {
        let slot = self
            .tasks
            .lock()
            .get(&task)
            .cloned()
            .ok_or(DiggerError::UnknownTask(task))?;

        let snapshot = {
            let state = slot.state.lock();
            match &*state {
                TaskState::Running => None,
                TaskState::Ready(digest) => Some(Ok(*digest)),
                TaskState::Failed(msg) => Some(Err(DiggerError::Native(msg.clone()))),
            }
        };
        match snapshot {
            None => Ok(DigPoll::Pending),
            Some(Ok(digest)) => {
                out.copy_from_slice(&digest);
                self.tasks.lock().remove(&task);
                Ok(DigPoll::Ready)
            }
            Some(Err(err)) => {
                self.tasks.lock().remove(&task);
                Err(err)
            }
        }
    }

    /// Cancel a task and release its resources.
    pub fn cancel(&self, task: TaskId) -> Result<(), DiggerError> {
        let slot = self
            .tasks
            .lock()
            .remove(&task)
            .ok_or(DiggerError::UnknownTask(task))?;
        slot.cancelled.store(true, Ordering::Relaxed);
        debug!(target: "digger", task, "digging task cancelled by caller");
        Ok(())
    }

    #[cfg(test)]
    fn open_tasks(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// The deterministic inference kernel. Returns `Ok(None)` when cancelled.
fn run_inference(
    fingerprint: &[u8; 32],
    seed: i64,
    pictures: &[PathBuf],
    cancelled: &AtomicBool,
) -> Result<Option<[u8; 32]>, String> {
    let mut hasher = Keccak256::new();
    hasher.update(fingerprint);
    hasher.update(seed.to_be_bytes());

    for picture in pictures {
        if cancelled.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let bytes = fs::read(picture).map_err(|e| {
            warn!(target: "digger", picture = %picture.display(), %e, "picture read failed");
            format!("read {}: {e}", picture.display())
        })?;
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(&bytes);
    }

    let mut state: [u8; 32] = hasher.finalize().into();
    for round in 0..MIX_ROUNDS {
        if round % CANCEL_CHECK_EVERY == 0 && cancelled.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let mut h = Keccak256::new();
        h.update(state);
        h.update((round as u64).to_be_bytes());
        state = h.finalize().into();
    }
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn model_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WEIGHTS_FILE), b"weights-v1").unwrap();
        fs::write(dir.path().join(MODEL_FILE), b"[net]\nlayers=3\n").unwrap();
        fs::write(dir.path().join(NAMES_FILE), b"cat\ndog\n").unwrap();
        dir
    }

    fn picture(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, content).unwrap();
        p
    }

    fn wait_ready(digger: &Digger, task: TaskId) -> [u8; 32] {
        let mut out = [0u8; 32];
        for _ in 0..200 {
            match digger.result(task, &mut out).unwrap() {
                DigPoll::Ready => return out,
                DigPoll::Pending => thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("digging task never completed");
    }

    #[test]
    fn open_requires_model_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Digger::open(dir.path(), &[]),
            Err(DiggerError::Native(_))
        ));
    }

    #[test]
    fn digests_are_deterministic_across_handles() {
        let model = model_dir();
        let pics_dir = tempfile::tempdir().unwrap();
        let pics = vec![
            picture(pics_dir.path(), "test_0.jpg", b"pixels-a"),
            picture(pics_dir.path(), "test_1.jpg", b"pixels-b"),
        ];

        let a = Digger::open(model.path(), &pics).unwrap();
        let b = Digger::open(model.path(), &[]).unwrap();

        let da = wait_ready(&a, a.dig(987_654_321, &pics));
        let db = wait_ready(&b, b.dig(987_654_321, &pics));
        assert_eq!(da, db);

        // a different seed or picture set moves the digest
        let dc = wait_ready(&a, a.dig(987_654_322, &pics));
        assert_ne!(da, dc);
        let dd = wait_ready(&a, a.dig(987_654_321, &pics[..1]));
        assert_ne!(da, dd);
    }

    #[test]
    fn completed_tasks_are_released() {
        let model = model_dir();
        let digger = Digger::open(model.path(), &[]).unwrap();
        let pics_dir = tempfile::tempdir().unwrap();
        let pics = vec![picture(pics_dir.path(), "test_0.jpg", b"x")];

        let task = digger.dig(1, &pics);
        wait_ready(&digger, task);
        assert_eq!(digger.open_tasks(), 0);
        let mut out = [0u8; 32];
        assert_eq!(
            digger.result(task, &mut out),
            Err(DiggerError::UnknownTask(task))
        );
    }

    #[test]
    fn missing_picture_fails_the_task() {
        let model = model_dir();
        let digger = Digger::open(model.path(), &[]).unwrap();
        let task = digger.dig(1, &[PathBuf::from("/nonexistent/test_0.jpg")]);

        let mut out = [0u8; 32];
        let err = loop {
            match digger.result(task, &mut out) {
                Ok(DigPoll::Pending) => thread::sleep(Duration::from_millis(5)),
                Ok(DigPoll::Ready) => panic!("task should fail"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, DiggerError::Native(_)));
        assert_eq!(digger.open_tasks(), 0);
    }

    #[test]
    fn cancel_releases_the_slot() {
        let model = model_dir();
        let digger = Digger::open(model.path(), &[]).unwrap();
        let pics_dir = tempfile::tempdir().unwrap();
        let pics = vec![picture(pics_dir.path(), "test_0.jpg", b"x")];

        let task = digger.dig(1, &pics);
        digger.cancel(task).unwrap();
        assert_eq!(digger.open_tasks(), 0);
        assert_eq!(digger.cancel(task), Err(DiggerError::UnknownTask(task)));
    }
}
