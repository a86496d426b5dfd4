use chrono::prelude::*;

pub static SECONDS_IN_HOUR: u64 = 3600;

pub fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// True when `created` (unix millis) is older than `ttl_seconds` at `at` (unix millis).
pub fn is_expired(created: i64, ttl_seconds: u64, at: i64) -> bool {
    at.saturating_sub(created) > (ttl_seconds as i64).saturating_mul(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry() {
        let created = now_millis();
        assert!(!is_expired(created, SECONDS_IN_HOUR, created + 1000));
        assert!(is_expired(created, SECONDS_IN_HOUR, created + (SECONDS_IN_HOUR as i64 + 1) * 1000));
        assert!(now().timestamp_millis() >= created);
    }
}
