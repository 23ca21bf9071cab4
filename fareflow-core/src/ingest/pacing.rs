//! Blocking waits between upstream requests.
//!
//! The fetcher never calls `std::thread::sleep` directly; it goes through a
//! [`Sleeper`] so retry timing can be asserted without waiting on the clock.

use std::sync::Mutex;
use std::time::Duration;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Never blocks; records every requested wait in order.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn total(&self) -> Duration {
        self.waits().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        match self.waits.lock() {
            Ok(mut w) => w.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sleeper_keeps_order() {
        let s = RecordingSleeper::new();
        s.sleep(Duration::from_millis(5));
        s.sleep(Duration::from_millis(1));
        assert_eq!(
            s.waits(),
            vec![Duration::from_millis(5), Duration::from_millis(1)]
        );
        assert_eq!(s.total(), Duration::from_millis(6));
    }

    #[test]
    fn thread_sleeper_skips_zero() {
        let start = std::time::Instant::now();
        ThreadSleeper.sleep(Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
