// Proctor Infrastructure - Redis Adapter
// Implements: ThrottlePort, ThrottleBackend

mod connection;
mod scripts;
mod throttle;

pub use connection::connect;
pub use scripts::COUNTER_TTL_SECS;
pub use throttle::{RedisThrottle, RedisThrottleBackend};

// Note: redis::RedisError conversion is handled by map_redis_error
// (orphan rules prevent From<RedisError> for ThrottleError here)
