//! GPU freeze detection.
//!
//! Every finished frame pets the watchdog. If no frame finishes for the whole timeout while a
//! frame is pending, the GPU is considered frozen: the unsafe-GL flag is written so the next start
//! skips the GL backend, and the process terminates so it can be restarted clean.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context as _;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use directories::ProjectDirs;

use super::get_monotonic_time;

#[derive(Debug, Clone)]
pub struct Watchdog {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Debug)]
struct Inner {
    timeout: Duration,
    last_pet: Duration,
    /// Whether a frame has been queued and not finished yet.
    waiting: bool,
    expired: bool,
}

impl Watchdog {
    pub fn new(timeout: Duration, now: Duration) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                timeout,
                last_pet: now,
                waiting: false,
                expired: false,
            })),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.borrow().timeout
    }

    /// Marks the start of a frame that must finish within the timeout.
    pub fn frame_started(&self, now: Duration) {
        let mut inner = self.inner.borrow_mut();
        if !inner.waiting {
            inner.waiting = true;
            inner.last_pet = now;
        }
    }

    /// Marks that a frame finished.
    pub fn pet(&self, now: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.last_pet = now;
        inner.waiting = false;
    }

    /// Checks for expiry at `now`, returns `true` the first time the watchdog expires.
    pub fn check(&self, now: Duration) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.expired || !inner.waiting {
            return false;
        }

        if now.saturating_sub(inner.last_pet) >= inner.timeout {
            inner.expired = true;
            return true;
        }

        false
    }

    pub fn is_expired(&self) -> bool {
        self.inner.borrow().expired
    }

    /// Inserts a polling timer into the event loop that calls `on_expire` on expiry.
    pub fn arm<D: 'static>(
        &self,
        handle: &LoopHandle<'static, D>,
        mut on_expire: impl FnMut(&mut D) + 'static,
    ) -> anyhow::Result<RegistrationToken> {
        let interval = (self.timeout() / 4).max(Duration::from_millis(100));
        let this = self.clone();
        handle
            .insert_source(Timer::from_duration(interval), move |_, _, state| {
                if this.check(get_monotonic_time()) {
                    error!(
                        "no frame finished in {} ms, the GPU seems frozen",
                        this.timeout().as_millis()
                    );
                    on_expire(state);
                    return TimeoutAction::Drop;
                }
                TimeoutAction::ToDuration(interval)
            })
            .map_err(|err| anyhow::anyhow!("error inserting watchdog timer: {err}"))
    }
}

/// Marker file that disables the GL backend on the next start.
#[derive(Debug, Clone)]
pub struct UnsafeGlFlag {
    path: PathBuf,
}

impl UnsafeGlFlag {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Flag file in the user state directory.
    pub fn in_state_dir() -> Option<Self> {
        let dirs = ProjectDirs::from("", "", "glaze")?;
        let dir = dirs.state_dir().unwrap_or_else(|| dirs.cache_dir());
        Some(Self::new(dir.join("opengl-unsafe")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    pub fn set(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("error creating directory {parent:?}"))?;
        }
        fs::write(&self.path, b"1\n")
            .with_context(|| format!("error writing {:?}", self.path))?;
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("error removing {:?}", self.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn idle_watchdog_never_expires() {
        let w = Watchdog::new(15 * SECOND, Duration::ZERO);
        assert!(!w.check(100 * SECOND));
    }

    #[test]
    fn stuck_frame_expires_once() {
        let w = Watchdog::new(15 * SECOND, Duration::ZERO);
        w.frame_started(SECOND);
        assert!(!w.check(15 * SECOND));
        assert!(w.check(16 * SECOND));
        assert!(!w.check(17 * SECOND));
        assert!(w.is_expired());
    }

    #[test]
    fn pet_resets() {
        let w = Watchdog::new(15 * SECOND, Duration::ZERO);
        w.frame_started(SECOND);
        w.pet(10 * SECOND);
        w.frame_started(11 * SECOND);
        assert!(!w.check(25 * SECOND));
        assert!(w.check(26 * SECOND));
    }

    #[test]
    fn flag_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("glaze-flag-test-{}", std::process::id()));
        let flag = UnsafeGlFlag::new(dir.join("opengl-unsafe"));
        assert!(!flag.is_set());
        flag.set().unwrap();
        assert!(flag.is_set());
        flag.clear().unwrap();
        assert!(!flag.is_set());
        flag.clear().unwrap();
        let _ = fs::remove_dir_all(dir);
    }
}
