//! Websocket push messages
//!
//! Messages exchanged with the live-update channel of the analytics API.
//! Incoming events only carry the channel they were published on; the
//! payload itself is never cached, it just marks cached queries stale.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::DomainKind;

// =============================================================================
// Outgoing
// =============================================================================

#[derive(Debug, Serialize)]
pub struct AuthMessage<'a> {
    pub r#type: &'static str,
    pub api_key: &'a str,
}

impl<'a> AuthMessage<'a> {
    pub fn new(api_key: &'a str) -> Self {
        Self {
            r#type: "auth",
            api_key,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscribeMessage<'a> {
    pub r#type: &'static str,
    pub channel: &'a str,
}

impl<'a> SubscribeMessage<'a> {
    pub fn new(channel: &'a str) -> Self {
        Self {
            r#type: "subscribe",
            channel,
        }
    }
}

// =============================================================================
// Incoming
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// What a push event invalidates: a whole domain, or the queries of one
/// chain / exchange / portfolio / symbol inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub domain: DomainKind,
    pub identifier: Option<String>,
}

impl PushEvent {
    pub fn target(&self) -> Option<PushTarget> {
        let channel = self.channel.as_deref().or(self.topic.as_deref())?;
        let (domain, identifier) = match channel.split_once(':') {
            Some((domain, identifier)) => (domain, Some(identifier)),
            None => (channel, None),
        };

        let domain = DomainKind::from_str(domain.trim()).ok()?;
        let identifier = identifier
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_owned);

        Some(PushTarget { domain, identifier })
    }
}

pub fn channel_name(domain: DomainKind, identifier: Option<&str>) -> String {
    match identifier {
        Some(id) => format!("{}:{}", domain, id),
        None => domain.to_string(),
    }
}
