/// The in-memory config plus its background save worker.
///
/// `update` merges a patch under the lock and re-arms the debounce deadline;
/// the worker sleeps on its command channel until that deadline and then
/// writes one snapshot covering every patch merged so far. The worker is the
/// only writer of the file, so saves never overlap.
use super::persist;
use super::{AppConfig, ConfigError, ConfigPatch, StoreOptions};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type SaveResult = Result<(), ConfigError>;

/// Resolves with the outcome of the save that covers one `update`.
#[derive(Debug)]
pub struct SaveHandle {
    rx: Receiver<SaveResult>,
}

impl SaveHandle {
    /// Block until the covering save has finished.
    pub fn wait(self) -> SaveResult {
        self.rx.recv().unwrap_or(Err(ConfigError::WorkerGone))
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning `None`.
    pub fn wait_timeout(self, timeout: Duration) -> Option<SaveResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(ConfigError::WorkerGone)),
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────────────

/// Debounce bookkeeping for patches not yet on disk.
struct Pending {
    /// Union of the patches merged since the last save, for logging.
    patch: ConfigPatch,
    deadline: Instant,
    waiters: Vec<Sender<SaveResult>>,
}

struct State {
    config: AppConfig,
    pending: Option<Pending>,
    subscribers: Vec<Sender<AppConfig>>,
}

struct Shared {
    path: PathBuf,
    state: Mutex<State>,
}

enum Command {
    /// The deadline moved; recompute how long to sleep.
    Rearm,
    /// Save now and report the result.
    Flush(Sender<SaveResult>),
    /// Save anything pending, then exit.
    Shutdown,
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Owner of the configuration file at one path.
///
/// Readers get copies. Dropping the store writes any pending patch before
/// the worker exits.
pub struct ConfigStore {
    shared: Arc<Shared>,
    options: StoreOptions,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl ConfigStore {
    /// Load the config at `path` (see [`persist::load`]) and start the save
    /// worker.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = persist::load(&path);
        let shared = Arc::new(Shared {
            path,
            state: Mutex::new(State {
                config,
                pending: None,
                subscribers: Vec::new(),
            }),
        });

        let (commands, rx) = unbounded();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("posturecheck-config".into())
            .spawn(move || run_worker(&worker_shared, &rx))
            .map_err(|e| ConfigError::WorkerSpawn(Arc::new(e)))?;

        Ok(Self {
            shared,
            options,
            commands,
            worker: Some(worker),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Copy of the current in-memory config, including unsaved patches.
    pub fn get(&self) -> AppConfig {
        self.shared.state.lock().config.clone()
    }

    /// Merge `patch` now and schedule a save `save_delay` from now. An update
    /// inside the window pushes the deadline back instead of adding a write.
    pub fn update(&self, patch: ConfigPatch) -> SaveHandle {
        let (tx, rx) = bounded(1);
        {
            let mut state = self.shared.state.lock();
            state.config.apply(&patch);
            let deadline = Instant::now() + self.options.save_delay;
            match state.pending.as_mut() {
                Some(pending) => {
                    pending.patch.merge(patch);
                    pending.deadline = deadline;
                    pending.waiters.push(tx);
                }
                None => {
                    state.pending = Some(Pending {
                        patch,
                        deadline,
                        waiters: vec![tx],
                    })
                }
            }
        }
        if self.commands.send(Command::Rearm).is_err() {
            warn!("config: save worker has stopped; update kept in memory only");
        }
        SaveHandle { rx }
    }

    pub fn set_keep_in_background(&self, value: bool) -> SaveHandle {
        self.update(ConfigPatch::keep_in_background(value))
    }

    pub fn record_report(&self, at: chrono::DateTime<chrono::Utc>) -> SaveHandle {
        self.update(ConfigPatch::last_report_date(at))
    }

    /// Receive a copy of the config after every successful save.
    pub fn subscribe(&self) -> Receiver<AppConfig> {
        let (tx, rx) = unbounded();
        self.shared.state.lock().subscribers.push(tx);
        rx
    }

    /// Write any pending patch immediately. `Ok` when nothing was pending.
    pub fn flush(&self) -> SaveResult {
        let (tx, rx) = bounded(1);
        self.commands
            .send(Command::Flush(tx))
            .map_err(|_| ConfigError::WorkerGone)?;
        rx.recv().unwrap_or(Err(ConfigError::WorkerGone))
    }
}

impl Drop for ConfigStore {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("config: save worker panicked");
            }
        }
    }
}

// ── Worker ──────────────────────────────────────────────────────────────────

fn run_worker(shared: &Shared, commands: &Receiver<Command>) {
    debug!("config: save worker started for {}", shared.path.display());
    loop {
        let deadline = shared.state.lock().pending.as_ref().map(|p| p.deadline);
        let received = match deadline {
            Some(deadline) => commands.recv_deadline(deadline),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Rearm) => {}
            Ok(Command::Flush(ack)) => {
                let _ = ack.send(save_pending(shared));
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                let _ = save_pending(shared);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                // An update may have moved the deadline while we slept.
                let due = shared
                    .state
                    .lock()
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.deadline <= Instant::now());
                if due {
                    let _ = save_pending(shared);
                }
            }
        }
    }
    debug!("config: save worker stopped");
}

/// Write the current snapshot if anything is pending. Subscribers are
/// notified before waiters are resolved.
fn save_pending(shared: &Shared) -> SaveResult {
    let (pending, snapshot) = {
        let mut state = shared.state.lock();
        match state.pending.take() {
            Some(pending) => (pending, state.config.clone()),
            None => return Ok(()),
        }
    };

    let result = persist::save_atomic(&shared.path, &snapshot);
    match &result {
        Ok(()) => info!(
            "config: saved {} ({} update(s), {:?})",
            shared.path.display(),
            pending.waiters.len(),
            pending.patch
        ),
        Err(e) => error!("config: failed to save {}: {}", shared.path.display(), e),
    }

    if result.is_ok() {
        shared
            .state
            .lock()
            .subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
    }

    for waiter in pending.waiters {
        let _ = waiter.send(result.clone());
    }
    result
}
