//! Cached `Date` header formatting.
//!
//! A thread-local one-second cache avoids reformatting the current time
//! on every response; built on `httpdate` rather than the `time` crate,
//! which this crate does not otherwise need (see `DESIGN.md`).

use std::cell::RefCell;
use std::time::{Duration, SystemTime};

// "Sun, 06 Nov 1994 08:49:37 GMT".len()
pub const DATE_VALUE_LENGTH: usize = 29;

thread_local!(static CACHED: RefCell<CachedDate> = RefCell::new(CachedDate::new()));

struct CachedDate {
    value: String,
    next_update: SystemTime,
}

impl CachedDate {
    fn new() -> Self {
        let mut cache = CachedDate {
            value: String::new(),
            next_update: SystemTime::UNIX_EPOCH,
        };
        cache.update(SystemTime::now());
        cache
    }

    fn check(&mut self) {
        let now = SystemTime::now();
        if now > self.next_update {
            self.update(now);
        }
    }

    fn update(&mut self, now: SystemTime) {
        self.value = httpdate::fmt_http_date(now);
        debug_assert_eq!(self.value.len(), DATE_VALUE_LENGTH);
        self.next_update = now + Duration::from_secs(1);
    }
}

/// The current `Date` header value, refreshed at most once per second.
pub fn now() -> String {
    CACHED.with(|cache| {
        let mut cache = cache.borrow_mut();
        cache.check();
        cache.value.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_value_has_rfc1123_length() {
        let value = now();
        assert_eq!(value.len(), DATE_VALUE_LENGTH);
    }

    #[test]
    fn date_value_ends_in_gmt() {
        let value = now();
        assert!(value.ends_with("GMT"));
    }
}
