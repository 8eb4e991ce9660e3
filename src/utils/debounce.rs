//! Debounced persistence of small pieces of runtime state.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context as _;
use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use directories::ProjectDirs;

/// Value that settles `delay` after its last change.
#[derive(Debug)]
pub struct Debounce<T> {
    delay: Duration,
    pending: Option<(Duration, T)>,
}

impl<T> Debounce<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Replaces the pending value, pushing its deadline to `now + delay`.
    pub fn schedule(&mut self, now: Duration, value: T) -> Duration {
        let deadline = now + self.delay;
        self.pending = Some((deadline, value));
        deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the pending value if its deadline has passed.
    pub fn take_due(&mut self, now: Duration) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.pending.take().map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn take(&mut self) -> Option<T> {
        self.pending.take().map(|(_, v)| v)
    }
}

/// One value stored as text under the user state directory.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_state_dir(name: &str) -> Option<Self> {
        let dirs = ProjectDirs::from("", "", "glaze")?;
        let dir = dirs.state_dir().unwrap_or_else(|| dirs.cache_dir());
        Some(Self::new(dir.join(name)))
    }

    pub fn read_f64(&self) -> Option<f64> {
        let text = fs::read_to_string(&self.path).ok()?;
        match text.trim().parse() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("ignoring malformed state file {:?}: {err}", self.path);
                None
            }
        }
    }

    pub fn write_f64(&self, value: f64) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("error creating directory {parent:?}"))?;
        }
        fs::write(&self.path, format!("{value}\n"))
            .with_context(|| format!("error writing {:?}", self.path))
    }
}

/// A [`Debounce`] flushed into a [`StateFile`] by an event loop timer.
#[derive(Debug, Clone)]
pub struct DebouncedSave {
    inner: Rc<RefCell<Debounce<f64>>>,
    file: Option<StateFile>,
    token: Rc<RefCell<Option<RegistrationToken>>>,
}

impl DebouncedSave {
    pub fn new(delay: Duration, file: Option<StateFile>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Debounce::new(delay))),
            file,
            token: Rc::new(RefCell::new(None)),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().is_pending()
    }

    /// Schedules `value` to be saved; restarts the timer when an event loop is available.
    pub fn schedule<D: 'static>(
        &self,
        now: Duration,
        value: f64,
        handle: Option<&LoopHandle<'static, D>>,
    ) {
        let deadline = self.inner.borrow_mut().schedule(now, value);

        let Some(handle) = handle else {
            return;
        };

        if let Some(token) = self.token.borrow_mut().take() {
            handle.remove(token);
        }

        let this = self.clone();
        let timer = Timer::from_duration(deadline.saturating_sub(now));
        match handle.insert_source(timer, move |_, _, _| {
            this.token.borrow_mut().take();
            this.flush();
            TimeoutAction::Drop
        }) {
            Ok(token) => *self.token.borrow_mut() = Some(token),
            Err(err) => warn!("error inserting save timer: {err}"),
        }
    }

    /// Writes the pending value out if its deadline passed, returns what was written.
    pub fn flush_due(&self, now: Duration) -> Option<f64> {
        let value = self.inner.borrow_mut().take_due(now)?;
        self.write(value);
        Some(value)
    }

    /// Writes the pending value out regardless of its deadline.
    pub fn flush(&self) -> Option<f64> {
        let value = self.inner.borrow_mut().take()?;
        self.write(value);
        Some(value)
    }

    fn write(&self, value: f64) {
        if let Some(file) = &self.file {
            if let Err(err) = file.write_f64(value) {
                warn!("error saving state: {err:?}");
            }
        }
    }
}
