//! Attachment tokens: `<base64-payload>.<maintype>.<subtype>`.
//!
//! Filters produce tokens inside rendered front matter; the assembler turns
//! them back into bytes plus a MIME type. Standard base64 never contains `.`,
//! so the split is unambiguous.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::ComposeError;

/// A decoded attachment token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentToken {
    pub bytes: Vec<u8>,
    pub maintype: String,
    pub subtype: String,
}

/// Encode `bytes` as a token with the given MIME type.
pub fn encode(bytes: &[u8], maintype: &str, subtype: &str) -> String {
    format!("{}.{maintype}.{subtype}", STANDARD.encode(bytes))
}

/// Decode a token. `name` is only used in error messages.
pub fn decode(token: &str, name: &str) -> Result<AttachmentToken, ComposeError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    let [payload, maintype, subtype] = segments.as_slice() else {
        return Err(ComposeError::AttachmentFormat {
            name: name.to_string(),
            segments: segments.len(),
        });
    };
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ComposeError::AttachmentDecode {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    Ok(AttachmentToken {
        bytes,
        maintype: maintype.to_string(),
        subtype: subtype.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_payload_survives() {
        let bytes: Vec<u8> = (0..=255).collect();
        let token = encode(&bytes, "application", "octet-stream");
        let decoded = decode(&token, "blob.bin").unwrap();
        assert_eq!(decoded.bytes, bytes);
        assert_eq!(decoded.maintype, "application");
        assert_eq!(decoded.subtype, "octet-stream");
    }

    #[test]
    fn empty_payload() {
        let decoded = decode(&encode(b"", "text", "plain"), "empty.txt").unwrap();
        assert!(decoded.bytes.is_empty());
    }

    #[test]
    fn two_segments_rejected() {
        let err = decode("aGVsbG8=.png", "qr.png").unwrap_err();
        assert!(matches!(
            err,
            ComposeError::AttachmentFormat { segments: 2, .. }
        ));
    }

    #[test]
    fn four_segments_rejected() {
        let err = decode("aGVsbG8=.image.png.extra", "qr.png").unwrap_err();
        assert!(matches!(
            err,
            ComposeError::AttachmentFormat { segments: 4, .. }
        ));
    }

    #[test]
    fn bad_base64_rejected() {
        let err = decode("!!!!.text.plain", "x.txt").unwrap_err();
        assert!(matches!(err, ComposeError::AttachmentDecode { .. }));
    }
}
