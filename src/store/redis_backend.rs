//! Redis store backend

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;

use super::Store;
use crate::error::Result;

/// Conditional increment: `-1` when the counter already reached the ceiling,
/// otherwise the incremented value. The expiry is attached when the key is created.
const INCREMENT_BELOW_CEILING: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return -1
end
local updated = redis.call('INCR', KEYS[1])
if updated == 1 and tonumber(ARGV[2]) > 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return updated
"#;

/// Store backed by a Redis server over a multiplexed connection
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    increment_script: Script,
}

impl RedisStore {
    /// Connect to the given `redis://` URL
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;

        Ok(Self {
            conn,
            increment_script: Script::new(INCREMENT_BELOW_CEILING),
        })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn atomic_increment_with_expiry(
        &self,
        key: &str,
        ceiling: u64,
        ttl_secs: u64,
    ) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        let updated: i64 = self
            .increment_script
            .key(key)
            .arg(ceiling)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        Ok(u64::try_from(updated).ok())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
