// Atomic counter scripts
//
// KEYS[1] = queued counter, KEYS[2] = active counter
// Every mutation refreshes the TTL of the key it touches so counters held by
// a crashed process decay on their own.

use redis::Script;

/// Expiry applied to both counters on every mutation
pub const COUNTER_TTL_SECS: u64 = 3600;

/// ARGV[1] = max queue depth, ARGV[2] = ttl. Returns 1 when admitted, 0 when full.
const TRY_ENQUEUE: &str = r#"
local queued = tonumber(redis.call('GET', KEYS[1]) or '0')
if queued >= tonumber(ARGV[1]) then
  return 0
end
redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[2])
return 1
"#;

/// ARGV[1] = max concurrency, ARGV[2] = ttl. Returns 1 when granted.
const TRY_ACQUIRE: &str = r#"
local queued = tonumber(redis.call('GET', KEYS[1]) or '0')
local active = tonumber(redis.call('GET', KEYS[2]) or '0')
if queued <= 0 or active >= tonumber(ARGV[1]) then
  return 0
end
redis.call('DECR', KEYS[1])
redis.call('INCR', KEYS[2])
redis.call('EXPIRE', KEYS[1], ARGV[2])
redis.call('EXPIRE', KEYS[2], ARGV[2])
return 1
"#;

/// ARGV[1] = ttl. Returns 1 when a slot was released, 0 on an empty counter.
const RELEASE: &str = r#"
local active = tonumber(redis.call('GET', KEYS[2]) or '0')
if active <= 0 then
  return 0
end
redis.call('DECR', KEYS[2])
redis.call('EXPIRE', KEYS[2], ARGV[1])
return 1
"#;

/// ARGV[1] = ttl. Moves one slot from active back to queued; depth is not
/// checked because the slot was admitted earlier.
const REQUEUE: &str = r#"
local active = tonumber(redis.call('GET', KEYS[2]) or '0')
if active > 0 then
  redis.call('DECR', KEYS[2])
  redis.call('EXPIRE', KEYS[2], ARGV[1])
end
redis.call('INCR', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[1])
return 1
"#;

/// Loaded scripts, shared by every throttle of a backend
pub(crate) struct Scripts {
    pub try_enqueue: Script,
    pub try_acquire: Script,
    pub release: Script,
    pub requeue: Script,
}

impl Scripts {
    pub fn new() -> Self {
        Self {
            try_enqueue: Script::new(TRY_ENQUEUE),
            try_acquire: Script::new(TRY_ACQUIRE),
            release: Script::new(RELEASE),
            requeue: Script::new(REQUEUE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_have_distinct_hashes() {
        let scripts = Scripts::new();
        assert_ne!(scripts.try_enqueue.get_hash(), scripts.try_acquire.get_hash());
        assert_ne!(scripts.try_acquire.get_hash(), scripts.release.get_hash());
        assert_ne!(scripts.release.get_hash(), scripts.requeue.get_hash());
    }

    #[test]
    fn test_release_only_touches_active_key() {
        assert!(!RELEASE.contains("KEYS[1]"));
        assert!(RELEASE.contains("KEYS[2]"));
    }

    #[test]
    fn test_requeue_skips_the_depth_check() {
        assert!(!REQUEUE.contains("ARGV[2]"));
        assert!(REQUEUE.contains("'INCR', KEYS[1]"));
    }
}
