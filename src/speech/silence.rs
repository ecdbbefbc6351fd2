//! Silence auto-stop as a debounce
//!
//! A deadline is armed on the first quiet level and disarmed by any level at
//! or above the threshold. It fires once when quiet has lasted `hold`.

use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_SILENCE_THRESHOLD: f32 = 10.0;
pub const DEFAULT_SILENCE_HOLD: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct SilenceDetector {
    threshold: f32,
    hold: Duration,
    quiet_since: Option<Instant>,
    fired: bool,
}

impl SilenceDetector {
    pub fn new(threshold: f32, hold: Duration) -> Self {
        Self {
            threshold,
            hold,
            quiet_since: None,
            fired: false,
        }
    }

    /// Record a level on the 0-255 scale.
    ///
    /// Returns `true` exactly once, on the observation that completes the
    /// hold period.
    pub fn observe(&mut self, level: f32, now: Instant) -> bool {
        if self.fired {
            return false;
        }

        if level >= self.threshold {
            self.quiet_since = None;
            return false;
        }

        let since = *self.quiet_since.get_or_insert(now);
        self.check(since, now)
    }

    /// Check the armed deadline without a new level
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.quiet_since {
            Some(since) if !self.fired => self.check(since, now),
            _ => false,
        }
    }

    /// When the auto-stop will fire if nothing breaks the silence
    pub fn deadline(&self) -> Option<Instant> {
        if self.fired {
            return None;
        }
        self.quiet_since.map(|since| since + self.hold)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn reset(&mut self) {
        self.quiet_since = None;
        self.fired = false;
    }

    fn check(&mut self, since: Instant, now: Instant) -> bool {
        if now.duration_since(since) >= self.hold {
            self.fired = true;
        }
        self.fired
    }
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SILENCE_THRESHOLD, DEFAULT_SILENCE_HOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(1);

    /// Feed `quiet_ms` of silence one millisecond at a time, then one loud
    /// level; returns how many times the detector fired
    fn run_feed(quiet_ms: u64) -> usize {
        let mut detector = SilenceDetector::default();
        let start = Instant::now();
        let mut fired = 0;

        for ms in 0..=quiet_ms {
            if detector.observe(0.0, start + Duration::from_millis(ms)) {
                fired += 1;
            }
        }
        if detector.observe(200.0, start + Duration::from_millis(quiet_ms) + TICK) {
            fired += 1;
        }
        for ms in 1..=2000 {
            let now = start + Duration::from_millis(quiet_ms + ms);
            if detector.observe(200.0, now) || detector.poll(now) {
                fired += 1;
            }
        }
        fired
    }

    #[test]
    fn test_999ms_of_silence_does_not_fire() {
        assert_eq!(run_feed(999), 0);
    }

    #[test]
    fn test_1001ms_of_silence_fires_once() {
        assert_eq!(run_feed(1001), 1);
    }

    #[test]
    fn test_loud_level_rearms_deadline() {
        let mut detector = SilenceDetector::default();
        let start = Instant::now();

        detector.observe(3.0, start);
        assert_eq!(detector.deadline(), Some(start + DEFAULT_SILENCE_HOLD));

        detector.observe(10.0, start + Duration::from_millis(600));
        assert_eq!(detector.deadline(), None);

        detector.observe(3.0, start + Duration::from_millis(700));
        assert!(!detector.poll(start + Duration::from_millis(1500)));
        assert!(detector.poll(start + Duration::from_millis(1700)));
        assert!(detector.has_fired());
        assert_eq!(detector.deadline(), None);
    }

    #[test]
    fn test_threshold_is_inclusive_for_sound() {
        let mut detector = SilenceDetector::new(10.0, Duration::from_millis(100));
        let start = Instant::now();
        assert!(!detector.observe(10.0, start));
        assert!(!detector.observe(10.0, start + Duration::from_millis(200)));
        assert!(!detector.has_fired());
    }

    #[test]
    fn test_reset() {
        let mut detector = SilenceDetector::new(10.0, Duration::from_millis(100));
        let start = Instant::now();
        detector.observe(0.0, start);
        assert!(detector.observe(0.0, start + Duration::from_millis(100)));
        detector.reset();
        assert!(!detector.has_fired());
        assert!(!detector.observe(0.0, start + Duration::from_millis(150)));
    }
}
