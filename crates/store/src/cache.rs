use async_trait::async_trait;
use common::OwnerId;
use domain::Cart;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::{Result, store::CartStore};

/// Redis-backed cart store.
///
/// Each cart is a JSON blob under `cart:{owner}` with no expiry.
#[derive(Clone)]
pub struct RedisCartStore {
    conn: ConnectionManager,
}

impl RedisCartStore {
    /// Creates a store on an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connects to Redis at the given URL (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    fn key(owner: &OwnerId) -> String {
        format!("cart:{owner}")
    }
}

#[async_trait]
impl CartStore for RedisCartStore {
    #[tracing::instrument(skip(self))]
    async fn read(&self, owner: &OwnerId) -> Result<Option<Cart>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(Self::key(owner)).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, cart), fields(lines = cart.len()))]
    async fn replace(&self, owner: &OwnerId, cart: Cart) -> Result<()> {
        let payload = serde_json::to_string(&cart)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(Self::key(owner), payload).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, owner: &OwnerId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(owner)).await?;
        Ok(())
    }
}
