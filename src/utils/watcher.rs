//! Config file watcher driving hot reconfiguration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, SystemTime};
use std::{io, thread};

use calloop::channel::SyncSender;
use glaze_config::ConfigPath;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls the config file on a helper thread and reports each change.
///
/// The thread exits on the next poll after the watcher is dropped.
pub struct ConfigWatcher {
    should_stop: Arc<AtomicBool>,
}

/// What identifies one version of the watched file.
#[derive(Debug, PartialEq, Eq)]
struct Stamp {
    mtime: SystemTime,
    // Symlinked configs can switch targets without an mtime change.
    target: PathBuf,
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }
}

impl ConfigWatcher {
    /// Starts watching `path`, calling `load` on the watcher thread for every change and sending
    /// its result into `changed`.
    pub fn spawn<T: Send + 'static>(
        path: ConfigPath,
        load: impl FnMut(&ConfigPath) -> T + Send + 'static,
        changed: SyncSender<T>,
    ) -> anyhow::Result<Self> {
        Self::spawn_inner(path, load, changed, None)
    }

    fn spawn_inner<T: Send + 'static>(
        path: ConfigPath,
        mut load: impl FnMut(&ConfigPath) -> T + Send + 'static,
        changed: SyncSender<T>,
        started: Option<mpsc::SyncSender<()>>,
    ) -> anyhow::Result<Self> {
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = should_stop.clone();

        thread::Builder::new()
            .name(String::from("Config Watcher"))
            .spawn(move || {
                let mut last = stamp(&path).ok();
                if let Some(started) = started {
                    let _ = started.send(());
                }

                while !stop.load(Ordering::SeqCst) {
                    thread::sleep(POLL_INTERVAL);

                    let Ok(current) = stamp(&path) else {
                        continue;
                    };
                    if last.as_ref() == Some(&current) {
                        continue;
                    }

                    debug!("config file changed: {:?}", current.target);
                    if changed.send(load(&path)).is_err() {
                        break;
                    }
                    last = Some(current);
                }

                trace!("config watcher thread exiting");
            })?;

        Ok(Self { should_stop })
    }
}

fn stamp_file(path: &Path) -> io::Result<Stamp> {
    let target = path.canonicalize()?;
    let mtime = target.metadata()?.modified()?;
    Ok(Stamp { mtime, target })
}

fn stamp(path: &ConfigPath) -> io::Result<Stamp> {
    match path {
        ConfigPath::Explicit(path) => stamp_file(path),
        ConfigPath::Regular {
            user_path,
            system_path,
        } => stamp_file(user_path).or_else(|_| stamp_file(system_path)),
    }
}
