//! Front-matter documents: a YAML metadata block at the top of rendered text.
//!
//! ```text
//! ---
//! subject: Welcome aboard
//! alternative:
//!   html: welcome/template.html
//! attach:
//!   - name: vmess.png
//!     content: iVBORw0KGgo....image.png
//! ---
//! Plain-text body starts here.
//! ```
//!
//! Parsing is total: text without a block, or with a block that does not
//! describe metadata, yields empty metadata and keeps the text as body.

use serde::Deserialize;
use serde_yaml::Value as YamlValue;

const DELIMITER: &str = "---";

/// An attachment declared in front matter. `content` is an attachment token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttachmentDescriptor {
    pub content: String,
    pub name: String,
}

/// Typed front-matter metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub subject: Option<String>,
    /// `(MIME subtype, template path)` in declaration order.
    pub alternative: Vec<(String, String)>,
    pub attach: Vec<AttachmentDescriptor>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.alternative.is_empty() && self.attach.is_empty()
    }
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub metadata: DocumentMetadata,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    subject: Option<YamlValue>,
    #[serde(default)]
    alternative: Option<serde_yaml::Mapping>,
    #[serde(default)]
    attach: Option<Vec<AttachmentDescriptor>>,
}

fn scalar_text(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl TryFrom<RawMetadata> for DocumentMetadata {
    type Error = String;

    fn try_from(raw: RawMetadata) -> Result<Self, Self::Error> {
        let subject = match raw.subject {
            None | Some(YamlValue::Null) => None,
            Some(value) => Some(scalar_text(&value).ok_or("subject must be a scalar")?),
        };
        let alternative = raw
            .alternative
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| match (scalar_text(k), v.as_str()) {
                (Some(subtype), Some(path)) => Ok((subtype, path.to_string())),
                _ => Err("alternative entries must map a subtype to a template path".to_string()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            subject,
            alternative,
            attach: raw.attach.unwrap_or_default(),
        })
    }
}

/// Split `text` into its metadata block and body.
fn split_block(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim_start();
    let mut lines = rest.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != DELIMITER {
        return None;
    }
    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let block = &rest[block_start..offset];
            let body = &rest[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

/// Parse rendered text. Never fails.
pub fn parse(text: &str) -> Document {
    let Some((block, body)) = split_block(text) else {
        return Document {
            metadata: DocumentMetadata::default(),
            body: text.to_string(),
        };
    };

    let metadata = if block.trim().is_empty() {
        Ok(DocumentMetadata::default())
    } else {
        serde_yaml::from_str::<RawMetadata>(block)
            .map_err(|e| e.to_string())
            .and_then(DocumentMetadata::try_from)
    };

    match metadata {
        Ok(metadata) => Document {
            metadata,
            body: body.trim_start_matches(['\r', '\n']).to_string(),
        },
        Err(reason) => {
            tracing::warn!("Ignoring malformed front matter: {reason}");
            Document {
                metadata: DocumentMetadata::default(),
                body: text.to_string(),
            }
        }
    }
}
