//! Chat Channel Router
//!
//! Named channels, each holding an ordered history capped at the most recent
//! 500 entries. Appending beyond the cap evicts the oldest entry (FIFO).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Maximum entries retained per channel
pub const CHANNEL_HISTORY_CAP: usize = 500;

/// Maximum message length; longer input is truncated
pub const MAX_MESSAGE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    World,
    Public,
    Friends,
    Group,
    Npc,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::World,
        Channel::Public,
        Channel::Friends,
        Channel::Group,
        Channel::Npc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::World => "world",
            Channel::Public => "public",
            Channel::Friends => "friends",
            Channel::Group => "group",
            Channel::Npc => "npc",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "world" => Some(Channel::World),
            "public" => Some(Channel::Public),
            "friends" => Some(Channel::Friends),
            "group" => Some(Channel::Group),
            "npc" => Some(Channel::Npc),
            _ => None,
        }
    }
}

/// One chat line as stored and returned over HTTP
#[derive(Debug, Clone, Serialize)]
pub struct ChatEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub channel: Channel,
    pub author: String,
    pub text: String,
}

/// Router holding the capped history for every channel
pub struct ChatRouter {
    channels: DashMap<Channel, VecDeque<ChatEntry>>,
}

impl ChatRouter {
    pub fn new() -> Self {
        let channels = DashMap::new();
        for channel in Channel::ALL {
            channels.insert(channel, VecDeque::with_capacity(CHANNEL_HISTORY_CAP));
        }
        Self { channels }
    }

    /// Trim, length-cap, and append a message. Returns the stored entry, or
    /// None for an empty message.
    pub fn send(&self, channel: Channel, author: &str, text: &str) -> Option<ChatEntry> {
        let sanitized = text.trim().chars().take(MAX_MESSAGE_LEN).collect::<String>();
        if sanitized.is_empty() {
            return None;
        }

        let entry = ChatEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            channel,
            author: author.to_string(),
            text: sanitized,
        };

        let mut history = self
            .channels
            .entry(channel)
            .or_insert_with(|| VecDeque::with_capacity(CHANNEL_HISTORY_CAP));
        if history.len() >= CHANNEL_HISTORY_CAP {
            history.pop_front();
        }
        history.push_back(entry.clone());

        Some(entry)
    }

    /// Oldest-to-newest history for a channel
    pub fn history(&self, channel: Channel) -> Vec<ChatEntry> {
        self.channels
            .get(&channel)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.channels.get(&channel).map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for ChatRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parsing() {
        assert_eq!(Channel::from_str("world"), Some(Channel::World));
        assert_eq!(Channel::from_str("NPC"), Some(Channel::Npc));
        assert_eq!(Channel::from_str("trade"), None);
    }

    #[test]
    fn test_send_and_history_order() {
        let router = ChatRouter::new();
        router.send(Channel::World, "p1", "first").unwrap();
        router.send(Channel::World, "p2", "second").unwrap();

        let history = router.history(Channel::World);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text, "first");
        assert_eq!(history[1].text, "second");

        // Other channels are untouched
        assert!(router.history(Channel::Friends).is_empty());
    }

    #[test]
    fn test_empty_message_rejected() {
        let router = ChatRouter::new();
        assert!(router.send(Channel::Public, "p1", "   ").is_none());
        assert_eq!(router.len(Channel::Public), 0);
    }

    #[test]
    fn test_long_message_truncated() {
        let router = ChatRouter::new();
        let long = "x".repeat(MAX_MESSAGE_LEN * 2);
        let entry = router.send(Channel::Public, "p1", &long).unwrap();
        assert_eq!(entry.text.chars().count(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let router = ChatRouter::new();
        for i in 0..CHANNEL_HISTORY_CAP + 1 {
            router.send(Channel::Group, "p1", &format!("msg {}", i)).unwrap();
        }

        let history = router.history(Channel::Group);
        assert_eq!(history.len(), CHANNEL_HISTORY_CAP);
        // "msg 0" was evicted; the newest entry survives
        assert_eq!(history[0].text, "msg 1");
        assert_eq!(history[CHANNEL_HISTORY_CAP - 1].text, format!("msg {}", CHANNEL_HISTORY_CAP));
    }
}
