use std::time::{Duration, Instant};

/// Gates an action to fire at most once per `interval`, tracked against a
/// monotonic clock. Used to pace TCP reconnect/rebind attempts without a
/// dedicated scheduler thread.
#[derive(Clone, Copy, Debug)]
pub struct Repeater {
    interval: Duration,
    last_acted: Instant,
}

impl Repeater {
    #[inline]
    pub fn every(interval: Duration) -> Self {
        Self { interval, last_acted: Instant::now() - interval }
    }

    #[inline]
    pub fn maybe<F>(&mut self, mut f: F)
    where
        F: FnMut(Duration),
    {
        let el = self.last_acted.elapsed();
        if el >= self.interval {
            f(el);
            self.last_acted = Instant::now();
        }
    }

    #[inline]
    pub fn fired(&mut self) -> bool {
        let el = self.last_acted.elapsed();
        if el >= self.interval {
            self.last_acted = Instant::now();
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn reset(&mut self) {
        self.last_acted = Instant::now();
    }

    pub fn force_fire(&mut self) {
        self.last_acted = Instant::now() - self.interval;
    }
}
