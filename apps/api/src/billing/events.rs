use async_trait::async_trait;
use redis::Client as RedisClient;

use crate::errors::AppError;

/// Remembers which processor events have already been handled so a
/// redelivered event is acknowledged without being applied again.
#[async_trait]
pub trait ProcessedEvents: Send + Sync {
    /// True the first time `event_id` is seen within the retention window.
    async fn first_delivery(&self, event_id: &str) -> Result<bool, AppError>;

    /// Releases `event_id` so a redelivery is processed again. Used when
    /// applying the event failed.
    async fn forget(&self, event_id: &str) -> Result<(), AppError>;
}

pub struct RedisProcessedEvents {
    client: RedisClient,
    ttl_secs: u64,
}

impl RedisProcessedEvents {
    pub fn new(client: RedisClient, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }
}

#[async_trait]
impl ProcessedEvents for RedisProcessedEvents {
    async fn first_delivery(&self, event_id: &str) -> Result<bool, AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("folio:webhook:{event_id}");
        // SET NX answers OK for the first writer and nil for everyone after.
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    async fn forget(&self, event_id: &str) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("DEL")
            .arg(format!("folio:webhook:{event_id}"))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashSet;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryProcessedEvents {
        seen: Mutex<HashSet<String>>,
        unavailable: bool,
    }

    impl MemoryProcessedEvents {
        pub fn unavailable() -> Self {
            Self {
                unavailable: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ProcessedEvents for MemoryProcessedEvents {
        async fn first_delivery(&self, event_id: &str) -> Result<bool, AppError> {
            if self.unavailable {
                return Err(AppError::Internal(anyhow::anyhow!("event log unavailable")));
            }
            Ok(self.seen.lock().await.insert(event_id.to_string()))
        }

        async fn forget(&self, event_id: &str) -> Result<(), AppError> {
            self.seen.lock().await.remove(event_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_second_delivery_is_detected() {
        let events = MemoryProcessedEvents::default();
        assert!(events.first_delivery("evt_1").await.unwrap());
        assert!(!events.first_delivery("evt_1").await.unwrap());
        assert!(events.first_delivery("evt_2").await.unwrap());
    }

    #[tokio::test]
    async fn test_forgotten_event_is_delivered_again() {
        let events = MemoryProcessedEvents::default();
        assert!(events.first_delivery("evt_1").await.unwrap());
        events.forget("evt_1").await.unwrap();
        assert!(events.first_delivery("evt_1").await.unwrap());
    }
}
