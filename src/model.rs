use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

const USER_ID_PREFIX: &str = "fbid:";

/// A user id as delivered by the gateway, with any `fbid:` prefix removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        Self(raw.strip_prefix(USER_ID_PREFIX).unwrap_or(raw).to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(value) => UserId::new(value),
            StringOrNumber::Number(value) => UserId::new(value.to_string()),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(i64),
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Option::<StringOrNumber>::deserialize(deserializer)? {
        None => Ok(0),
        Some(StringOrNumber::Number(value)) => Ok(value),
        Some(StringOrNumber::String(value)) => value
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid timestamp {value:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    #[serde(rename = "userID", alias = "userId")]
    pub user_id: UserId,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    #[serde(rename = "threadID", alias = "threadId")]
    pub thread_id: String,
    #[serde(rename = "participantIDs", alias = "participants", default)]
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub friends: Vec<Friend>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
}

impl Thread {
    /// Recomputes `snippet` and `timestamp` from the last loaded message.
    pub(crate) fn refresh_from_last_message(&mut self) {
        let Some(last) = self.messages.as_ref().and_then(|messages| messages.last()) else {
            return;
        };
        self.snippet = last.body.clone().unwrap_or_default();
        self.timestamp = last.timestamp;
    }

    pub fn message_count(&self) -> usize {
        self.messages.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "messageID", alias = "messageId")]
    pub message_id: String,
    #[serde(rename = "threadID", alias = "threadId", default)]
    pub thread_id: String,
    #[serde(rename = "senderID", alias = "senderId")]
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
}

impl Message {
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Status events (joins, renames, ...) carry neither text nor media.
    pub fn is_printable(&self) -> bool {
        !self.body_text().is_empty() || !self.attachments.is_empty()
    }
}

/// Where an attachment's image lives, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "camelCase")]
pub enum AttachmentSource {
    PreviewUrl(String),
    DirectUrl(String),
    InlineImage(String),
}

impl AttachmentSource {
    pub fn url(&self) -> &str {
        match self {
            AttachmentSource::PreviewUrl(url)
            | AttachmentSource::DirectUrl(url)
            | AttachmentSource::InlineImage(url) => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireAttachment")]
pub struct Attachment {
    pub source: Option<AttachmentSource>,
    pub description: Option<String>,
}

impl Attachment {
    pub fn url(&self) -> Option<&str> {
        self.source.as_ref().map(AttachmentSource::url)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAttachment {
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    facebook_url: Option<String>,
}

impl From<WireAttachment> for Attachment {
    fn from(wire: WireAttachment) -> Self {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
        let source = non_empty(wire.preview_url)
            .map(AttachmentSource::PreviewUrl)
            .or_else(|| non_empty(wire.url).map(AttachmentSource::DirectUrl))
            .or_else(|| non_empty(wire.image).map(AttachmentSource::InlineImage));
        Attachment {
            source,
            description: non_empty(wire.description).or_else(|| non_empty(wire.facebook_url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_strips_prefix() {
        assert_eq!(UserId::new("fbid:1234"), UserId::new("1234"));
        let parsed: UserId = serde_json::from_str("1234").expect("numeric id");
        assert_eq!(parsed.to_string(), "1234");
    }

    #[test]
    fn attachment_source_follows_precedence() {
        let attachment: Attachment = serde_json::from_str(
            r#"{"previewUrl": "", "url": "http://x/full.jpg", "image": "http://x/inline.jpg"}"#,
        )
        .expect("attachment");
        assert_eq!(
            attachment.source,
            Some(AttachmentSource::DirectUrl("http://x/full.jpg".to_string()))
        );

        let attachment: Attachment =
            serde_json::from_str(r#"{"previewUrl": "http://x/p.jpg", "url": "http://x/u.jpg"}"#)
                .expect("attachment");
        assert_eq!(attachment.url(), Some("http://x/p.jpg"));

        let attachment: Attachment =
            serde_json::from_str(r#"{"facebookUrl": "http://fb/post"}"#).expect("attachment");
        assert_eq!(attachment.source, None);
        assert_eq!(attachment.description.as_deref(), Some("http://fb/post"));
    }

    #[test]
    fn message_accepts_gateway_field_names() {
        let message: Message = serde_json::from_str(
            r#"{"messageID": "m1", "threadID": "t1", "senderID": "fbid:42", "body": "hi", "timestamp": "1700000000000"}"#,
        )
        .expect("message");
        assert_eq!(message.sender_id.to_string(), "42");
        assert_eq!(message.timestamp, 1_700_000_000_000);
        assert!(message.attachments.is_empty());
        assert!(message.is_printable());
    }

    #[test]
    fn empty_message_is_not_printable() {
        let message: Message =
            serde_json::from_str(r#"{"messageID": "m1", "senderID": "1", "body": "", "attachments": []}"#)
                .expect("message");
        assert!(!message.is_printable());
    }
}
