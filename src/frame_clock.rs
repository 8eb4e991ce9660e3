use std::num::NonZeroU64;
use std::time::Duration;

/// Predicts presentation times of an output from its refresh rate.
#[derive(Debug)]
pub struct FrameClock {
    last_presentation_time: Option<Duration>,
    refresh_interval_ns: Option<NonZeroU64>,
}

impl FrameClock {
    /// Creates a frame clock for a refresh rate in mHz, zero meaning unknown.
    pub fn new(refresh_mhz: u32) -> Self {
        let refresh_interval_ns = if refresh_mhz == 0 {
            None
        } else {
            NonZeroU64::new(1_000_000_000_000 / u64::from(refresh_mhz))
        };

        Self {
            last_presentation_time: None,
            refresh_interval_ns,
        }
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ns
            .map(|ns| Duration::from_nanos(ns.get()))
    }

    pub fn last_presentation_time(&self) -> Option<Duration> {
        self.last_presentation_time
    }

    pub fn presented(&mut self, presentation_time: Duration) {
        if presentation_time.is_zero() {
            // Not interested in these.
            return;
        }

        self.last_presentation_time = Some(presentation_time);
    }

    /// Next vblank strictly after `now`, or `now` when the clock has no history.
    pub fn next_presentation_time(&self, now: Duration) -> Duration {
        let (Some(interval), Some(last)) = (self.refresh_interval_ns, self.last_presentation_time)
        else {
            return now;
        };
        let interval = interval.get();

        if now < last {
            // Early vblank, the frame after it is the next one.
            return last + Duration::from_nanos(interval);
        }

        let since_last = (now - last).as_nanos() as u64;
        let frames = since_last / interval + 1;
        last + Duration::from_nanos(frames * interval)
    }
}
