use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Time-driven debouncer. The caller feeds values with [`Debouncer::submit`]
/// and drains trailing values with [`Debouncer::poll`]; nothing here sleeps.
///
/// A burst is a run of submissions less than `wait` apart. With `leading`
/// the first value of a burst is released immediately; with `trailing` the
/// last value is released once the burst has been quiet for `wait`.
#[derive(Debug)]
pub struct Debouncer<T> {
    wait: Duration,
    leading: bool,
    trailing: bool,
    last_call: Option<Instant>,
    pending: Option<T>,
}

impl<T> Debouncer<T> {
    pub fn new(wait: Duration, leading: bool, trailing: bool) -> Self {
        Self {
            wait,
            leading,
            trailing,
            last_call: None,
            pending: None,
        }
    }

    pub fn submit(&mut self, value: T, now: Instant) -> Option<T> {
        let burst_open = self
            .last_call
            .is_some_and(|last| now.saturating_duration_since(last) < self.wait);
        self.last_call = Some(now);

        if !burst_open && self.leading {
            self.pending = None;
            return Some(value);
        }
        if self.trailing {
            self.pending = Some(value);
        }
        None
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let last = self.last_call?;
        if now.saturating_duration_since(last) < self.wait {
            return None;
        }
        self.last_call = None;
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.last_call = None;
        self.pending = None;
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::Debouncer;
    use std::time::{Duration, Instant};

    #[test]
    fn leading_edge_fires_once_per_burst() {
        let mut debouncer = Debouncer::default();
        let start = Instant::now();

        assert_eq!(debouncer.submit("w", start), Some("w"));
        assert_eq!(debouncer.submit("wx", start + Duration::from_millis(40)), None);
        assert_eq!(debouncer.submit("wxx", start + Duration::from_millis(120)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(300)), None);
        assert_eq!(debouncer.submit("a", start + Duration::from_millis(400)), Some("a"));
    }

    #[test]
    fn trailing_edge_releases_last_value() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100), false, true);
        let start = Instant::now();

        assert_eq!(debouncer.submit(1, start), None);
        assert_eq!(debouncer.submit(2, start + Duration::from_millis(50)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(100)), None);
        assert_eq!(debouncer.poll(start + Duration::from_millis(150)), Some(2));
        assert!(!debouncer.has_pending());
    }
}
