//! Sliding order-rate windows.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Order timestamps over the last minute and the last hour.
#[derive(Debug, Default)]
pub struct OrderRateWindow {
    minute: VecDeque<DateTime<Utc>>,
    hour: VecDeque<DateTime<Utc>>,
}

impl OrderRateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let minute_ago = now - Duration::minutes(1);
        while self.minute.front().is_some_and(|t| *t <= minute_ago) {
            self.minute.pop_front();
        }
        let hour_ago = now - Duration::hours(1);
        while self.hour.front().is_some_and(|t| *t <= hour_ago) {
            self.hour.pop_front();
        }
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.prune(now);
        self.minute.push_back(now);
        self.hour.push_back(now);
    }

    /// Orders in the last minute and the last hour.
    pub fn counts(&mut self, now: DateTime<Utc>) -> (u32, u32) {
        self.prune(now);
        (self.minute.len() as u32, self.hour.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_slide() {
        let mut window = OrderRateWindow::new();
        let t0 = Utc::now();
        for i in 0..5 {
            window.record(t0 + Duration::seconds(i));
        }
        assert_eq!(window.counts(t0 + Duration::seconds(10)), (5, 5));
        assert_eq!(window.counts(t0 + Duration::seconds(62)), (2, 5));
        assert_eq!(window.counts(t0 + Duration::minutes(61)), (0, 0));
    }
}
