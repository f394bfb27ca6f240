use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Last-seen bookkeeping for connected devices.
///
/// Eviction is coarse on purpose: the sweep only acts once per window, and a
/// device survives as long as any frame from it arrived within the window.
pub struct LivenessTracker {
    last_seen: HashMap<String, Instant>,
    window: Duration,
    last_sweep: Instant,
}

impl LivenessTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            window,
            last_sweep: Instant::now(),
        }
    }

    /// Record traffic from a device. Returns true when the device was not
    /// known before this frame.
    pub fn touch(&mut self, device_id: &str, now: Instant) -> bool {
        self.last_seen.insert(device_id.to_string(), now).is_none()
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.last_seen.keys().map(String::as_str)
    }

    /// Evict devices silent for longer than the window. Acts only once the
    /// window has elapsed since the previous sweep; returns the evicted ids.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        if now.duration_since(self.last_sweep) <= self.window {
            return Vec::new();
        }

        let window = self.window;
        let evicted: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) > window)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &evicted {
            self.last_seen.remove(id);
        }

        self.last_sweep = now;
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(40);

    #[test]
    fn first_touch_reports_new_device() {
        let mut tracker = LivenessTracker::new(WINDOW);
        let now = Instant::now();
        assert!(tracker.touch("porch", now));
        assert!(!tracker.touch("porch", now));
    }

    #[test]
    fn sweep_waits_for_the_window_to_elapse() {
        let mut tracker = LivenessTracker::new(WINDOW);
        let start = Instant::now();
        tracker.touch("porch", start);

        // Well past the device's age threshold but inside the sweep period.
        assert!(tracker.sweep(start + Duration::from_secs(39)).is_empty());
        assert_eq!(tracker.device_ids().count(), 1);
    }

    #[test]
    fn stale_devices_are_evicted_and_fresh_ones_kept() {
        let mut tracker = LivenessTracker::new(WINDOW);
        let start = Instant::now();
        tracker.touch("porch", start);
        tracker.touch("garage", start + Duration::from_secs(30));

        let evicted = tracker.sweep(start + Duration::from_secs(41));
        assert_eq!(evicted, vec!["porch".to_string()]);
        assert_eq!(tracker.device_ids().collect::<Vec<_>>(), vec!["garage"]);
    }

    #[test]
    fn sweep_clock_resets_after_acting() {
        let mut tracker = LivenessTracker::new(WINDOW);
        let start = Instant::now();
        tracker.touch("porch", start);

        let first = start + Duration::from_secs(41);
        assert_eq!(tracker.sweep(first).len(), 1);

        // A device appearing right after the sweep is safe for a full window.
        tracker.touch("garage", first);
        assert!(tracker.sweep(first + Duration::from_secs(40)).is_empty());
        assert_eq!(tracker.sweep(first + Duration::from_secs(81)).len(), 1);
    }
}
