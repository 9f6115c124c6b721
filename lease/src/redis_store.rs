use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tracing::debug;

use crate::{storage::LeaseStore, Error, Result, Token};

/// Delete KEYS[1] only while it still holds ARGV[1]; runs atomically on the server.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Lease store backed by a single Redis server.
///
/// Acquire is `SET key token NX PX ttl`; release is a compare-and-delete
/// Lua script. The connection manager reconnects on its own, so one
/// `RedisStore` can be cloned and shared by every contender in a process.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    release: Script,
    url: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("url", &self.url).finish()
    }
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|err| Error::InvalidConfig(format!("bad lease store url {url:?}: {err}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|err| Error::StoreUnavailable(err.to_string()))?;
        debug!(url, "connected to redis lease store");
        Ok(Self {
            conn,
            release: Script::new(RELEASE_SCRIPT),
            url: url.to_string(),
        })
    }

    /// Unconditionally delete `key`, whoever holds it.
    ///
    /// Administrative cleanup only; the lock protocol never calls this.
    pub async fn clear(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}

fn ttl_millis(ttl: Duration) -> Result<u64> {
    let ms = u64::try_from(ttl.as_millis())
        .map_err(|_| Error::InvalidConfig(format!("ttl {ttl:?} is too large")))?;
    if ms == 0 {
        return Err(Error::InvalidConfig(format!(
            "ttl {ttl:?} is below the store's 1ms expiry granularity"
        )));
    }
    Ok(ms)
}

#[async_trait]
impl LeaseStore for RedisStore {
    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> Result<bool> {
        let ttl_ms = ttl_millis(ttl)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.to_string())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn try_release(&self, key: &str, token: &Token) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release
            .key(key)
            .arg(token.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}
