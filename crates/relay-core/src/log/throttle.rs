use std::time::Duration;

use tokio::time::Instant;

/// Leading-edge throttle: at most one start per window, no trailing fire.
#[derive(Debug, Clone)]
pub struct Throttle {
    window: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns `true` and records `now` if a new start is allowed.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last
            && now.saturating_duration_since(last) < self.window
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_start_per_window() {
        let t0 = Instant::now();
        let mut t = Throttle::new(Duration::from_secs(10));

        assert!(t.try_begin(t0));
        assert!(!t.try_begin(t0 + Duration::from_secs(3)));
        assert!(!t.try_begin(t0 + Duration::from_millis(9_999)));
        assert!(t.try_begin(t0 + Duration::from_secs(10)));
        assert!(!t.try_begin(t0 + Duration::from_secs(15)));
    }
}
