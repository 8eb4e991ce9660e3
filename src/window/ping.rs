use std::collections::HashMap;
use std::time::Duration;

use smithay::utils::Serial;

use super::WindowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pong {
    /// Answered in time.
    Ok(WindowId),
    /// Answered after the timeout, discarded.
    Late(WindowId),
    /// No such ping outstanding.
    Unknown,
}

/// Outstanding pings to clients.
#[derive(Debug)]
pub struct PingTracker {
    timeout: Duration,
    pending: HashMap<u32, (WindowId, Duration)>,
}

impl PingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn ping(&mut self, window: WindowId, serial: Serial, now: Duration) {
        self.pending.insert(u32::from(serial), (window, now));
    }

    pub fn pong(&mut self, serial: Serial, now: Duration) -> Pong {
        let Some((window, sent)) = self.pending.remove(&u32::from(serial)) else {
            return Pong::Unknown;
        };

        if now.saturating_sub(sent) > self.timeout {
            debug!("discarding late pong from {window}");
            Pong::Late(window)
        } else {
            Pong::Ok(window)
        }
    }

    /// Drops pings older than the timeout, returning the windows that did not answer.
    pub fn expire(&mut self, now: Duration) -> Vec<WindowId> {
        let timeout = self.timeout;
        let mut expired = Vec::new();
        self.pending.retain(|_, (window, sent)| {
            if now.saturating_sub(*sent) > timeout {
                expired.push(*window);
                false
            } else {
                true
            }
        });
        expired.sort();
        expired.dedup();
        expired
    }

    /// Forgets pings to a window that went away.
    pub fn forget(&mut self, window: WindowId) {
        self.pending.retain(|_, (w, _)| *w != window);
    }

    pub fn is_pending(&self, window: WindowId) -> bool {
        self.pending.values().any(|(w, _)| *w == window)
    }
}
