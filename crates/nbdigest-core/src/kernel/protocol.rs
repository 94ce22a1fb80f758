//! Jupyter messaging protocol framing.
//!
//! A message on the wire is a multipart ZeroMQ message:
//!
//! ```text
//! [identities...] <IDS|MSG> signature header parent_header metadata content [buffers...]
//! ```
//!
//! The signature is the hex HMAC-SHA256 over the four JSON frames.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

/// Frame separating routing identities from the message body.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Messaging protocol version we speak.
pub const PROTOCOL_VERSION: &str = "5.3";

type HmacSha256 = Hmac<Sha256>;

/// Message header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub msg_type: String,
    #[serde(default)]
    pub version: String,
}

/// A decoded protocol message.
///
/// `parent_header` stays untyped because it is `{}` on unsolicited messages.
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub parent_header: serde_json::Value,
    pub metadata: serde_json::Value,
    pub content: serde_json::Value,
}

impl Message {
    /// Build a request for `session`.
    pub fn request(session: &str, msg_type: &str, content: serde_json::Value) -> Self {
        Self {
            header: Header {
                msg_id: uuid::Uuid::new_v4().to_string(),
                session: session.to_string(),
                username: env!("CARGO_PKG_NAME").to_string(),
                date: chrono::Utc::now().to_rfc3339(),
                msg_type: msg_type.to_string(),
                version: PROTOCOL_VERSION.to_string(),
            },
            parent_header: serde_json::json!({}),
            metadata: serde_json::json!({}),
            content,
        }
    }

    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// `msg_id` of the request this message answers, if any.
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.get("msg_id")?.as_str()
    }

    /// Whether this message was produced in response to `msg_id`.
    pub fn is_reply_to(&self, msg_id: &str) -> bool {
        self.parent_msg_id() == Some(msg_id)
    }

    /// Encode into signed frames (no identities, as sent from a DEALER).
    pub fn to_frames(&self, signer: &Signer) -> Result<Vec<Bytes>> {
        let header = serde_json::to_vec(&self.header)?;
        let parent = serde_json::to_vec(&self.parent_header)?;
        let metadata = serde_json::to_vec(&self.metadata)?;
        let content = serde_json::to_vec(&self.content)?;
        let signature = signer.sign(&[&header, &parent, &metadata, &content])?;

        Ok(vec![
            Bytes::from_static(DELIMITER),
            Bytes::from(signature),
            Bytes::from(header),
            Bytes::from(parent),
            Bytes::from(metadata),
            Bytes::from(content),
        ])
    }

    /// Decode signed frames, skipping any routing identities.
    pub fn from_frames(frames: &[Bytes], signer: &Signer) -> Result<Self> {
        let delimiter = frames
            .iter()
            .position(|frame| frame.as_ref() == DELIMITER)
            .ok_or_else(|| Error::Protocol("message has no <IDS|MSG> delimiter".to_string()))?;

        let body = &frames[delimiter + 1..];
        if body.len() < 5 {
            return Err(Error::Protocol(format!(
                "expected at least 5 frames after delimiter, got {}",
                body.len()
            )));
        }

        let signature = std::str::from_utf8(&body[0])
            .map_err(|_| Error::Protocol("signature is not UTF-8".to_string()))?;
        signer.verify(signature, &[&body[1], &body[2], &body[3], &body[4]])?;

        Ok(Self {
            header: serde_json::from_slice(&body[1])?,
            parent_header: serde_json::from_slice(&body[2])?,
            metadata: serde_json::from_slice(&body[3])?,
            content: serde_json::from_slice(&body[4])?,
        })
    }
}

/// HMAC signer keyed by the connection file key.
///
/// An empty key disables signing, as the protocol allows.
#[derive(Clone)]
pub struct Signer {
    key: Option<Vec<u8>>,
}

impl Signer {
    pub fn new(key: &str) -> Self {
        Self {
            key: (!key.is_empty()).then(|| key.as_bytes().to_vec()),
        }
    }

    /// Hex signature over `parts`.
    pub fn sign(&self, parts: &[&[u8]]) -> Result<String> {
        let Some(key) = &self.key else {
            return Ok(String::new());
        };

        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| Error::Protocol(format!("invalid signing key: {e}")))?;
        for part in parts {
            mac.update(part);
        }
        Ok(format!("{:x}", mac.finalize().into_bytes()))
    }

    /// Check `signature` against `parts`.
    pub fn verify(&self, signature: &str, parts: &[&[u8]]) -> Result<()> {
        if self.key.is_none() {
            return Ok(());
        }
        if self.sign(parts)? == signature {
            Ok(())
        } else {
            Err(Error::Protocol("invalid message signature".to_string()))
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("signed", &self.key.is_some())
            .finish()
    }
}
