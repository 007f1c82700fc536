use parking_lot::Mutex;

/// Monotonically increasing 64-bit nonce derived from wall-clock microseconds (§4.A).
///
/// Guarded by a mutex so concurrent signed calls on the same venue account
/// never observe an equal or decreasing value, even when two callers land in
/// the same microsecond.
pub struct NonceGenerator {
    last: Mutex<u64>,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self { last: Mutex::new(0) }
    }

    pub fn next(&self) -> u64 {
        let mut last = self.last.lock();
        let now = now_micros();
        let next = if now > *last { now } else { *last + 1 };
        *last = next;
        next
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_micros() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before UNIX_EPOCH")
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn strictly_increases_within_one_thread() {
        let generator = NonceGenerator::new();
        let mut previous = generator.next();
        for _ in 0..1000 {
            let next = generator.next();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn strictly_increases_under_concurrent_burst() {
        let generator = Arc::new(NonceGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                thread::spawn(move || (0..200).map(|_| generator.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all_nonces: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("nonce thread panicked"))
            .collect();

        all_nonces.sort_unstable();
        let unique_count = {
            let mut deduped = all_nonces.clone();
            deduped.dedup();
            deduped.len()
        };

        assert_eq!(unique_count, all_nonces.len());
    }
}
