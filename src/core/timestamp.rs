// src/core/timestamp.rs

//! A monotonically increasing, wall-clock-seeded timestamp source.
//!
//! The command log requires timestamps that monotonically increase within a
//! single process (spec.md §3: "Timestamps monotonically increase within a
//! process"). Two appends issued in the same wall-clock second must still
//! compare distinctly so cursor math (`timestamp > last_sync`) never stalls.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST: AtomicI64 = AtomicI64::new(0);

/// Returns the current time in whole seconds since the epoch, guaranteed to
/// be strictly greater than any value previously returned by this process.
pub fn now() -> i64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    loop {
        let last = LAST.load(Ordering::Acquire);
        let next = if wall > last { wall } else { last + 1 };
        if LAST
            .compare_exchange(last, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let mut prev = now();
        for _ in 0..1000 {
            let n = now();
            assert!(n > prev);
            prev = n;
        }
    }
}
