//! Live fan-out of chat messages to subscribed sockets.
//!
//! Every room maps to the channel `chat.room.{id}`. Sockets subscribe to
//! channels through the process-local [`ConnectionRegistry`]. With a Redis URL
//! configured, messages are published to Redis and a [`spawn_relay`] task
//! feeds every instance's registry from a pattern subscription; otherwise the
//! registry is fed directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{MessageId, MessageView, RoomId};

pub const ROOM_CHANNEL_PREFIX: &str = "chat.room.";
pub const ROOM_CHANNEL_PATTERN: &str = "chat.room.*";

const RELAY_RETRY: Duration = Duration::from_secs(5);

/// Channel name for a room's live subscribers
pub fn room_channel(room_id: RoomId) -> String {
    format!("{}{}", ROOM_CHANNEL_PREFIX, room_id)
}

/// Inverse of [`room_channel`]
pub fn room_from_channel(channel: &str) -> Option<RoomId> {
    channel.strip_prefix(ROOM_CHANNEL_PREFIX)?.parse().ok()
}

/// Errors raised while publishing
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Frames pushed to live clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Message {
        channel: String,
        message: MessageView,
    },
    #[serde(rename_all = "camelCase")]
    Ack {
        action: String,
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerFrame {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Unique identifier for one channel subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

/// Process-local registry of channel subscribers
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // channel -> live subscribers
    inner: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a channel; frames arrive on the returned receiver
    pub async fn add_subscriber(&self, channel: &str) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        let subscribers = guard.entry(channel.to_string()).or_default();
        subscribers.push(Subscriber {
            id: subscriber_id,
            sender: tx,
        });

        tracing::debug!(
            channel,
            subscribers = subscribers.len(),
            "added subscriber {:?}",
            subscriber_id
        );

        (subscriber_id, rx)
    }

    /// Remove one subscription; empty channels are dropped
    pub async fn remove_subscriber(&self, channel: &str, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(channel) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(channel);
            }
        }
    }

    /// Send a payload to every live subscriber of a channel
    ///
    /// Dead senders are pruned. Returns the number of deliveries.
    pub async fn broadcast(&self, channel: &str, payload: &str) -> usize {
        let mut guard = self.inner.write().await;
        let Some(subscribers) = guard.get_mut(channel) else {
            return 0;
        };

        let before = subscribers.len();
        subscribers.retain(|s| s.sender.send(payload.to_string()).is_ok());
        let delivered = subscribers.len();

        if before != delivered {
            tracing::debug!(channel, dropped = before - delivered, "pruned dead subscribers");
        }
        if subscribers.is_empty() {
            guard.remove(channel);
        }

        delivered
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .read()
            .await
            .get(channel)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

/// Best-effort delivery of a stored message to a room's live subscribers
#[async_trait]
pub trait RealtimeBroadcaster: Send + Sync {
    async fn publish(&self, room_id: RoomId, message: &MessageView) -> Result<(), BroadcastError>;
}

fn message_payload(room_id: RoomId, message: &MessageView) -> Result<(String, String), BroadcastError> {
    let channel = room_channel(room_id);
    let payload = ServerFrame::Message {
        channel: channel.clone(),
        message: message.clone(),
    }
    .encode()?;
    Ok((channel, payload))
}

/// Fans out through this process's registry only
pub struct LocalBroadcaster {
    registry: ConnectionRegistry,
}

impl LocalBroadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RealtimeBroadcaster for LocalBroadcaster {
    async fn publish(&self, room_id: RoomId, message: &MessageView) -> Result<(), BroadcastError> {
        let (channel, payload) = message_payload(room_id, message)?;
        let delivered = self.registry.broadcast(&channel, &payload).await;
        tracing::debug!(room_id, delivered, "published message locally");
        Ok(())
    }
}

/// Publishes to Redis; [`spawn_relay`] delivers to local sockets
pub struct RedisBroadcaster {
    redis: Arc<Mutex<ConnectionManager>>,
}

impl RedisBroadcaster {
    pub async fn connect(client: &redis::Client) -> Result<Self, BroadcastError> {
        let redis = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            redis: Arc::new(Mutex::new(redis)),
        })
    }
}

#[async_trait]
impl RealtimeBroadcaster for RedisBroadcaster {
    async fn publish(&self, room_id: RoomId, message: &MessageView) -> Result<(), BroadcastError> {
        let (channel, payload) = message_payload(room_id, message)?;

        let mut conn = self.redis.lock().await;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        tracing::debug!(room_id, receivers, "published message to redis");
        Ok(())
    }
}

async fn relay(client: &redis::Client, registry: &ConnectionRegistry) -> redis::RedisResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(ROOM_CHANNEL_PATTERN).await?;
    tracing::info!(pattern = ROOM_CHANNEL_PATTERN, "realtime relay subscribed");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "dropping undecodable relay payload");
                continue;
            }
        };
        if room_from_channel(&channel).is_some() {
            registry.broadcast(&channel, &payload).await;
        }
    }
    Ok(())
}

/// Forward `chat.room.*` traffic from Redis into the local registry, reconnecting on failure
pub fn spawn_relay(client: redis::Client, registry: ConnectionRegistry) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match relay(&client, &registry).await {
                Ok(()) => tracing::warn!("realtime relay stream ended, reconnecting"),
                Err(e) => tracing::error!(error = %e, "realtime relay failed, reconnecting"),
            }
            tokio::time::sleep(RELAY_RETRY).await;
        }
    })
}

/// Pick the broadcaster for this instance
///
/// Falls back to local fan-out when no Redis URL is set or Redis is unreachable.
pub async fn build_broadcaster(
    redis_url: Option<&str>,
    registry: ConnectionRegistry,
) -> Arc<dyn RealtimeBroadcaster> {
    let Some(url) = redis_url.filter(|u| !u.trim().is_empty()) else {
        tracing::info!("realtime fan-out: local only");
        return Arc::new(LocalBroadcaster::new(registry));
    };

    let connected = match redis::Client::open(url) {
        Ok(client) => RedisBroadcaster::connect(&client)
            .await
            .map(|broadcaster| (client, broadcaster)),
        Err(e) => Err(e.into()),
    };

    match connected {
        Ok((client, broadcaster)) => {
            spawn_relay(client, registry);
            tracing::info!("realtime fan-out: redis");
            Arc::new(broadcaster)
        }
        Err(e) => {
            tracing::warn!(error = %e, "redis unreachable, realtime fan-out falls back to local");
            Arc::new(LocalBroadcaster::new(registry))
        }
    }
}
