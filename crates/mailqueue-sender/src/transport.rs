//! The delivery collaborator and the message handed to it.

use crate::TransportResult;
use async_trait::async_trait;
use mailqueue_core::{Config, SenderProfile, DEFAULT_PROFILE};
use mailqueue_database::{EmailFormat, EmailQueueItem, JsonMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A queue item with its rendering identifiers resolved for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub queue_id: String,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Vec<String>,
    pub subject: String,
    pub headers: JsonMap,
    pub template: String,
    pub layout: String,
    pub config: String,
    pub theme: String,
    pub format: EmailFormat,
    pub template_vars: JsonMap,
}

impl OutgoingEmail {
    /// Build from a claimed item using already-resolved identifiers.
    pub fn from_item(item: &EmailQueueItem, template: String, layout: String, config: String) -> Self {
        Self {
            queue_id: item.id.clone(),
            from_email: item.from_email.clone(),
            from_name: item.from_name.clone(),
            to: item.to.clone(),
            cc: item.cc.clone(),
            bcc: item.bcc.clone(),
            reply_to: item.reply_to.clone(),
            subject: item.subject.clone(),
            headers: item.headers.clone(),
            template,
            layout,
            config,
            theme: item.theme.clone(),
            format: item.format,
            template_vars: item.template_vars.clone(),
        }
    }
}

/// What the transport reports back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub from_email: String,
    pub from_name: String,
}

/// Delivers one message.
///
/// Implementations must not touch the queue; the worker records the
/// outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &OutgoingEmail) -> TransportResult<SendReceipt>;
}

/// Sender identities keyed by email config name.
#[derive(Debug, Clone, Default)]
pub struct SenderProfiles {
    profiles: BTreeMap<String, SenderProfile>,
}

impl SenderProfiles {
    pub fn new(profiles: BTreeMap<String, SenderProfile>) -> Self {
        Self { profiles }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.profiles.clone())
    }

    /// Identity for a message: its own from fields when set, else the
    /// profile for its config, else the default profile.
    pub fn resolve(&self, message: &OutgoingEmail) -> SendReceipt {
        let profile = self
            .profiles
            .get(&message.config)
            .or_else(|| self.profiles.get(DEFAULT_PROFILE))
            .cloned()
            .unwrap_or_default();

        SendReceipt {
            from_email: message
                .from_email
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or(profile.from_email),
            from_name: message
                .from_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or(profile.from_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(config: &str) -> OutgoingEmail {
        OutgoingEmail {
            queue_id: "q-1".to_string(),
            from_email: None,
            from_name: None,
            to: vec!["a@example.com".to_string()],
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: "Hi".to_string(),
            headers: JsonMap::new(),
            template: "default".to_string(),
            layout: "default".to_string(),
            config: config.to_string(),
            theme: String::new(),
            format: EmailFormat::Both,
            template_vars: JsonMap::new(),
        }
    }

    fn profiles() -> SenderProfiles {
        let mut map = BTreeMap::new();
        map.insert(DEFAULT_PROFILE.to_string(), SenderProfile::default());
        map.insert(
            "billing".to_string(),
            SenderProfile {
                from_email: "billing@example.com".to_string(),
                from_name: "Billing".to_string(),
            },
        );
        SenderProfiles::new(map)
    }

    #[test]
    fn resolve_uses_named_profile() {
        let receipt = profiles().resolve(&message("billing"));
        assert_eq!(receipt.from_email, "billing@example.com");
        assert_eq!(receipt.from_name, "Billing");
    }

    #[test]
    fn resolve_falls_back_to_default_profile() {
        let receipt = profiles().resolve(&message("unknown"));
        assert_eq!(receipt, SendReceipt {
            from_email: SenderProfile::default().from_email,
            from_name: SenderProfile::default().from_name,
        });
    }

    #[test]
    fn resolve_prefers_item_identity() {
        let mut msg = message("billing");
        msg.from_email = Some("me@example.com".to_string());
        let receipt = profiles().resolve(&msg);
        assert_eq!(receipt.from_email, "me@example.com");
        assert_eq!(receipt.from_name, "Billing");
    }

    #[test]
    fn resolve_with_no_profiles() {
        let receipt = SenderProfiles::default().resolve(&message("default"));
        assert_eq!(receipt.from_email, "no-reply@localhost");
    }
}
