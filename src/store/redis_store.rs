use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, Cmd, FromRedisValue};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

use super::{KvStore, StoreError};
use crate::config::StoreConfig;

/// Redis access through a bounded connection pool.
///
/// At most `max_connections` commands are in flight at once. A connection is
/// taken from the idle set (or dialed) per command and handed back when the
/// command succeeds; a connection that saw an error is dropped so the next
/// caller dials a fresh one.
pub struct RedisStore {
    client: redis::Client,
    slots: Semaphore,
    idle: Mutex<Vec<MultiplexedConnection>>,
    dial_timeout: Duration,
    round_trip_timeout: Duration,
}

impl RedisStore {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::new(format!("OPEN {}", config.url), e))?;
        Ok(Self {
            client,
            slots: Semaphore::new(config.max_connections),
            idle: Mutex::new(Vec::with_capacity(config.max_connections)),
            dial_timeout: config.dial_timeout(),
            round_trip_timeout: config.round_trip_timeout(),
        })
    }

    /// Refuse new commands and drop idle connections. In-flight commands
    /// finish on the connections they hold.
    pub async fn close(&self) {
        self.slots.close();
        let dropped = {
            let mut idle = self.idle.lock().await;
            std::mem::take(&mut *idle).len()
        };
        tracing::info!("redis pool closed, dropped {dropped} idle connections");
    }

    /// The client's own connect and response timeouts are switched off so
    /// `dial_timeout` and `round_trip_timeout` are the only limits.
    async fn dial(&self, operation: &str) -> Result<MultiplexedConnection, StoreError> {
        let unbounded = AsyncConnectionConfig::new()
            .set_connection_timeout(None)
            .set_response_timeout(None);
        match tokio::time::timeout(
            self.dial_timeout,
            self.client.get_multiplexed_async_connection_with_config(&unbounded),
        )
        .await
        {
            Ok(Ok(conn)) => {
                tracing::debug!("dialed new redis connection");
                Ok(conn)
            }
            Ok(Err(e)) => Err(StoreError::new(operation, format!("dial: {e}"))),
            Err(_) => Err(StoreError::new(
                operation,
                format!("dial timed out after {:?}", self.dial_timeout),
            )),
        }
    }

    async fn execute<T: FromRedisValue + Send>(
        &self,
        operation: String,
        cmd: Cmd,
    ) -> Result<T, StoreError> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| StoreError::new(&operation, "connection pool closed"))?;

        let pooled = self.idle.lock().await.pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.dial(&operation).await?,
        };

        match tokio::time::timeout(self.round_trip_timeout, cmd.query_async::<T>(&mut conn)).await {
            Ok(Ok(reply)) => {
                self.idle.lock().await.push(conn);
                Ok(reply)
            }
            Ok(Err(e)) => Err(StoreError::new(operation, e)),
            Err(_) => Err(StoreError::new(
                operation,
                format!("timed out after {:?}", self.round_trip_timeout),
            )),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.execute(format!("GET {key}"), cmd).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        self.execute(format!("KEYS {pattern}"), cmd).await
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let mut cmd = redis::cmd("LRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.execute(format!("LRANGE {key} {start} {stop}"), cmd).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let reply: String = self.execute("PING".to_string(), redis::cmd("PING")).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::new("PING", format!("unexpected reply {reply:?}")))
        }
    }
}
