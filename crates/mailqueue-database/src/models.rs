//! Queue model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured key/value payload (template variables, headers).
pub type JsonMap = Map<String, Value>;

/// Separator used when recipient lists are persisted.
pub const ADDRESS_SEPARATOR: char = ',';

/// Email body format requested from the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailFormat {
    Html,
    Text,
    #[default]
    Both,
}

impl EmailFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "text",
            Self::Both => "both",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "html" => Self::Html,
            "text" => Self::Text,
            _ => Self::Both,
        }
    }
}

/// An ordered list of addresses.
///
/// Producers may hand over a single address or a list; both normalize to a
/// list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipients(Vec<String>);

impl Recipients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Delimited form used by the `email_queue` table; `None` when empty.
    pub fn to_column(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join(","))
        }
    }

    /// Parse the delimited column form.
    pub fn from_column(column: Option<&str>) -> Self {
        let addresses = column
            .unwrap_or_default()
            .split(ADDRESS_SEPARATOR)
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        Self(addresses)
    }
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Self(vec![address.to_string()])
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        Self(vec![address])
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addresses: Vec<String>) -> Self {
        Self(addresses)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addresses: Vec<&str>) -> Self {
        Self(addresses.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Recipients {
    fn from(addresses: &[&str]) -> Self {
        Self(addresses.iter().map(|a| a.to_string()).collect())
    }
}

/// Recipient sets for one enqueued email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailRecipients {
    pub to: Recipients,
    pub cc: Recipients,
    pub bcc: Recipients,
    pub reply_to: Recipients,
}

impl EmailRecipients {
    pub fn to(to: impl Into<Recipients>) -> Self {
        Self {
            to: to.into(),
            ..Default::default()
        }
    }

    pub fn with_cc(mut self, cc: impl Into<Recipients>) -> Self {
        self.cc = cc.into();
        self
    }

    pub fn with_bcc(mut self, bcc: impl Into<Recipients>) -> Self {
        self.bcc = bcc.into();
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<Recipients>) -> Self {
        self.reply_to = reply_to.into();
        self
    }
}

/// Recognized enqueue options. `Default` carries the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnqueueOptions {
    pub subject: String,
    /// When the email becomes due; `None` means now.
    pub send_at: Option<DateTime<Utc>>,
    pub template: String,
    pub layout: String,
    pub theme: String,
    pub format: EmailFormat,
    pub headers: JsonMap,
    pub config: String,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            subject: String::new(),
            send_at: None,
            template: "default".to_string(),
            layout: "default".to_string(),
            theme: String::new(),
            format: EmailFormat::Both,
            headers: JsonMap::new(),
            config: "default".to_string(),
        }
    }
}

/// A row ready to be inserted into `email_queue`.
#[derive(Debug, Clone)]
pub struct NewEmailQueueItem {
    pub id: String,
    pub recipients: EmailRecipients,
    pub template_vars: JsonMap,
    pub options: EnqueueOptions,
    pub send_at: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

/// A queued email as stored. Carries no persistence behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailQueueItem {
    pub id: String,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Vec<String>,
    pub subject: String,
    pub config: String,
    pub template: String,
    pub layout: String,
    pub theme: String,
    pub format: EmailFormat,
    pub template_vars: JsonMap,
    pub headers: JsonMap,
    pub sent: bool,
    pub locked: bool,
    pub send_retries: u32,
    pub send_at: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Row counts by queue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: u64,
    /// Claimable right now.
    pub ready: u64,
    /// Unsent and unlocked but `send_at` is in the future.
    pub scheduled: u64,
    pub locked: u64,
    pub sent: u64,
    /// Unsent with more failures than the retry ceiling; never claimed again.
    pub exhausted: u64,
}

/// A lock that has not been touched for a while, likely left by a dead worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleLock {
    pub id: String,
    pub send_retries: u32,
    pub modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_address_normalizes_to_list() {
        let r: Recipients = "a@example.com".into();
        assert_eq!(r.as_slice(), ["a@example.com".to_string()]);

        let r: Recipients = vec!["a@example.com", "b@example.com"].into();
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_recipient_column_form() {
        let r: Recipients = vec!["a@example.com", "b@example.com"].into();
        let column = r.to_column();
        assert_eq!(column.as_deref(), Some("a@example.com,b@example.com"));
        assert_eq!(Recipients::from_column(column.as_deref()), r);

        assert_eq!(Recipients::new().to_column(), None);
        assert!(Recipients::from_column(None).is_empty());
        assert!(Recipients::from_column(Some("")).is_empty());
    }

    #[test]
    fn test_email_format_parsing() {
        assert_eq!(EmailFormat::from_str("HTML"), EmailFormat::Html);
        assert_eq!(EmailFormat::from_str("text"), EmailFormat::Text);
        assert_eq!(EmailFormat::from_str("both"), EmailFormat::Both);
        assert_eq!(EmailFormat::from_str("weird"), EmailFormat::Both);
        assert_eq!(EmailFormat::Html.as_str(), "html");
    }

    #[test]
    fn test_enqueue_option_defaults() {
        let options = EnqueueOptions::default();
        assert_eq!(options.subject, "");
        assert!(options.send_at.is_none());
        assert_eq!(options.template, "default");
        assert_eq!(options.layout, "default");
        assert_eq!(options.theme, "");
        assert_eq!(options.format, EmailFormat::Both);
        assert!(options.headers.is_empty());
        assert_eq!(options.config, "default");
    }

    #[test]
    fn test_enqueue_options_partial_json() {
        let options: EnqueueOptions =
            serde_json::from_str(r#"{"subject": "Hi", "format": "text"}"#).unwrap();
        assert_eq!(options.subject, "Hi");
        assert_eq!(options.format, EmailFormat::Text);
        assert_eq!(options.template, "default");
    }

    #[test]
    fn test_email_recipients_builder() {
        let recipients = EmailRecipients::to("a@example.com")
            .with_cc(vec!["c@example.com"])
            .with_reply_to("r@example.com");
        assert_eq!(recipients.to.len(), 1);
        assert_eq!(recipients.cc.len(), 1);
        assert!(recipients.bcc.is_empty());
        assert_eq!(recipients.reply_to.len(), 1);
    }
}
