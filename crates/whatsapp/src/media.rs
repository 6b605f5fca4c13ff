use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    serde::{Deserialize, Serialize},
};

const FALLBACK_MIMETYPE: &str = "application/octet-stream";

/// Media attachment in the shape the messaging client expects: declared MIME
/// type, base64 payload, and an optional filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMedia {
    pub mimetype: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl MessageMedia {
    /// Build from raw bytes. An empty MIME type falls back to
    /// `application/octet-stream`.
    pub fn from_bytes(mimetype: &str, bytes: &[u8], filename: Option<String>) -> Self {
        let mimetype = match mimetype.trim() {
            "" => FALLBACK_MIMETYPE.to_string(),
            m => m.to_string(),
        };
        Self {
            mimetype,
            data: STANDARD.encode(bytes),
            filename,
        }
    }

    /// Decoded payload size in bytes.
    pub fn len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        (self.data.len() / 4) * 3 - padding
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_payload_as_base64() {
        let media = MessageMedia::from_bytes("image/png", b"\x89PNG", Some("a.png".into()));
        assert_eq!(media.mimetype, "image/png");
        assert_eq!(media.data, "iVBORw==");
        assert_eq!(media.filename.as_deref(), Some("a.png"));
        assert_eq!(media.len(), 4);
    }

    #[test]
    fn blank_mimetype_falls_back() {
        let media = MessageMedia::from_bytes("  ", b"abc", None);
        assert_eq!(media.mimetype, FALLBACK_MIMETYPE);
        assert_eq!(media.len(), 3);
    }

    #[test]
    fn filename_is_omitted_when_absent() {
        let media = MessageMedia::from_bytes("text/plain", b"hi", None);
        let json = serde_json::to_value(&media).unwrap();
        assert!(json.get("filename").is_none());
    }
}
