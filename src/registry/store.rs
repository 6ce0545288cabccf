//! Channel registry implementation
//!
//! The process-wide directory of channels and the entry point the transport
//! uses to bind a new connection to a channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::channel::{Channel, ChannelStats};
use super::error::RegistryError;
use crate::session::{Connection, Upstream};

/// Longest accepted channel name, in bytes
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Central registry of channels
///
/// Channels are created on first use and live as long as the registry.
/// The map is read-locked for lookups and write-locked only to insert a new
/// channel; each channel serializes its own members separately.
pub struct ChannelRegistry {
    /// Server name, the origin of every server frame
    servername: Arc<str>,

    /// Map of canonical channel name to channel
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new(servername: impl Into<String>) -> Self {
        Self {
            servername: Arc::from(servername.into()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Server name
    pub fn server_name(&self) -> &str {
        &self.servername
    }

    /// Validate a channel name and return its canonical (lowercase) form
    pub fn canonical_channel_name(name: &str) -> Result<String, RegistryError> {
        let valid = !name.is_empty()
            && name.len() <= MAX_CHANNEL_NAME_LEN
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');

        if valid {
            Ok(name.to_ascii_lowercase())
        } else {
            Err(RegistryError::InvalidChannelName(name.to_owned()))
        }
    }

    /// Create a new unregistered connection on a channel
    ///
    /// The channel is created if it does not exist yet.
    pub async fn connection(
        &self,
        channel_name: &str,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Connection, RegistryError> {
        let canonical = Self::canonical_channel_name(channel_name)?;
        let channel = self.get_or_create(canonical).await;
        let conn = channel.connection(upstream);

        tracing::debug!(
            channel = %channel.name(),
            conn_id = %conn.id(),
            "Connection bound to channel"
        );

        Ok(conn)
    }

    /// Look up an existing channel
    pub async fn channel(&self, channel_name: &str) -> Option<Arc<Channel>> {
        let canonical = Self::canonical_channel_name(channel_name).ok()?;
        self.channels.read().await.get(&canonical).cloned()
    }

    /// Get member statistics for a channel
    pub async fn channel_stats(&self, channel_name: &str) -> Option<ChannelStats> {
        let channel = self.channel(channel_name).await?;
        Some(channel.stats().await)
    }

    /// Get total number of channels
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    async fn get_or_create(&self, canonical: String) -> Arc<Channel> {
        if let Some(channel) = self.channels.read().await.get(&canonical) {
            return Arc::clone(channel);
        }

        let mut channels = self.channels.write().await;
        // Another session may have created it between the two locks.
        let channel = channels.entry(canonical).or_insert_with_key(|name| {
            tracing::info!(channel = %name, "Channel created");
            Arc::new(Channel::new(name.clone(), Arc::clone(&self.servername)))
        });

        Arc::clone(channel)
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("servername", &self.servername)
            .finish_non_exhaustive()
    }
}
