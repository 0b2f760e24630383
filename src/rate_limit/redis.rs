use super::lua_scripts::FIXED_WINDOW_ALLOW_SCRIPT;
use super::store::DecisionStore;
use super::types::{RateKey, COUNTER_WINDOW};
use crate::error::Result;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis-backed decision store shared by every limiter instance
#[derive(Clone)]
pub struct RedisStore {
    /// Redis connection manager (reconnects on its own, cheap to clone)
    connection: ConnectionManager,
    /// Prefix applied to every counter and ban key
    key_prefix: String,
    /// How long a ban marker lives
    ban_duration: Duration,
    /// Pre-hashed allow script
    allow_script: Script,
}

impl RedisStore {
    /// Connect to Redis. The connection is opened once and shared.
    pub async fn connect(
        redis_url: &str,
        key_prefix: impl Into<String>,
        ban_duration: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        let store = Self {
            connection,
            key_prefix: key_prefix.into(),
            ban_duration,
            allow_script: Script::new(FIXED_WINDOW_ALLOW_SCRIPT),
        };

        info!(
            url = %redact_url(redis_url),
            prefix = %store.key_prefix,
            ban_secs = store.ban_secs(),
            "Connected to Redis decision store"
        );

        Ok(store)
    }

    /// Test Redis connection
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Drop every key in the Redis server, not just limiter keys
    pub async fn flush_all(&self) -> Result<()> {
        warn!("Flushing all keys from the Redis decision store");
        let mut conn = self.connection.clone();
        redis::cmd("FLUSHALL").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    fn counter_key(&self, key: &RateKey) -> String {
        format!("{}{}", self.key_prefix, key.as_str())
    }

    fn ban_key(&self, key: &RateKey) -> String {
        format!("{}{}", self.key_prefix, key.ban_key())
    }

    /// Ban TTL in whole seconds, never zero
    fn ban_secs(&self) -> u64 {
        self.ban_duration.as_secs().max(1)
    }
}

/// Mask credentials in a Redis URL so it can be logged.
///
/// The password in `user:password@` becomes `***`. A bare userinfo without a
/// colon is masked whole, and `password`/`pass` query values (used by
/// `redis+unix://` URLs) are masked too.
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(scheme_end);

    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };

    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);

    let mut redacted = String::with_capacity(url.len());
    redacted.push_str(scheme);
    match authority.rsplit_once('@') {
        Some((userinfo, host)) => {
            match userinfo.split_once(':') {
                Some((user, _)) => {
                    redacted.push_str(user);
                    redacted.push_str(":***");
                }
                None => redacted.push_str("***"),
            }
            redacted.push('@');
            redacted.push_str(host);
        }
        None => redacted.push_str(authority),
    }
    redacted.push_str(path);

    if let Some(query) = query {
        let params: Vec<String> = query
            .split('&')
            .map(|param| match param.split_once('=') {
                Some((name, _)) if name == "password" || name == "pass" => {
                    format!("{}=***", name)
                }
                _ => param.to_string(),
            })
            .collect();
        redacted.push('?');
        redacted.push_str(&params.join("&"));
    }

    redacted
}

#[async_trait]
impl DecisionStore for RedisStore {
    async fn allow(&self, key: &RateKey, limit: u32) -> Result<bool> {
        let redis_key = self.counter_key(key);
        let mut conn = self.connection.clone();

        let result = self
            .allow_script
            .key(&redis_key)
            .arg(limit)
            .arg(COUNTER_WINDOW.as_secs())
            .invoke_async::<_, Vec<i64>>(&mut conn)
            .await?;

        let allowed = result.first().copied() == Some(1);
        let current = result.get(1).copied().unwrap_or_default();

        debug!(
            "Fixed window check for key {}: allowed={}, count={}, limit={}",
            redis_key, allowed, current, limit
        );

        Ok(allowed)
    }

    async fn block(&self, key: &RateKey) -> Result<()> {
        let redis_key = self.ban_key(key);
        let mut conn = self.connection.clone();

        redis::cmd("SET")
            .arg(&redis_key)
            .arg(1)
            .arg("EX")
            .arg(self.ban_secs())
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!("Ban marker set for key {} ({}s)", redis_key, self.ban_secs());
        Ok(())
    }

    async fn is_blocked(&self, key: &RateKey) -> Result<bool> {
        let redis_key = self.ban_key(key);
        let mut conn = self.connection.clone();

        let exists: i64 = redis::cmd("EXISTS")
            .arg(&redis_key)
            .query_async(&mut conn)
            .await?;

        Ok(exists > 0)
    }
}
