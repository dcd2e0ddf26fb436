// Redis Connection Setup

use crate::throttle::map_redis_error;
use proctor_core::port::ThrottleError;
use redis::aio::ConnectionManager;
use tracing::info;

/// Open a reconnecting connection to the shared store
///
/// The manager is cheap to clone; every clone multiplexes over the same
/// connection and reconnects after a drop.
pub async fn connect(url: &str) -> Result<ConnectionManager, ThrottleError> {
    let client = redis::Client::open(url).map_err(map_redis_error)?;
    let manager = client
        .get_connection_manager()
        .await
        .map_err(map_redis_error)?;

    info!(
        addr = %client.get_connection_info().addr,
        "Connected to throttle store"
    );
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let err = connect("not-a-redis-url").await.err().unwrap();
        assert!(matches!(
            err,
            ThrottleError::Unavailable(_) | ThrottleError::Script(_)
        ));
    }
}
