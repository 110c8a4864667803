use std::time::{Duration, Instant};

/// Single-slot cache with an explicit time-to-live.
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    value: Option<T>,
    fetched_at: Option<Instant>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            value: None,
            fetched_at: None,
            ttl,
        }
    }

    pub fn get(&self) -> Option<T> {
        self.get_at(Instant::now())
    }

    fn get_at(&self, now: Instant) -> Option<T> {
        let fetched_at = self.fetched_at?;
        if now.duration_since(fetched_at) >= self.ttl {
            return None;
        }
        self.value.clone()
    }

    pub fn put(&mut self, value: T) {
        self.value = Some(value);
        self.fetched_at = Some(Instant::now());
    }

    /// Must be called after any write that could change the cached value.
    pub fn invalidate(&mut self) {
        self.value = None;
        self.fetched_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_within_ttl() {
        let mut c = TtlCache::new(Duration::from_secs(60));
        assert_eq!(c.get(), None::<u8>);
        c.put(3u8);
        assert_eq!(c.get(), Some(3));
    }

    #[test]
    fn expires_after_ttl() {
        let mut c = TtlCache::new(Duration::from_secs(10));
        c.put("x");
        let later = Instant::now() + Duration::from_secs(11);
        assert_eq!(c.get_at(later), None);
    }

    #[test]
    fn zero_ttl_never_hits() {
        let mut c = TtlCache::new(Duration::ZERO);
        c.put(1);
        assert_eq!(c.get(), None);
    }

    #[test]
    fn invalidate_clears() {
        let mut c = TtlCache::new(Duration::from_secs(60));
        c.put(1);
        c.invalidate();
        assert_eq!(c.get(), None);
    }
}
