//! Client identity derivation and the proxy-client descriptors built from it.
//!
//! Identities are UUID v5 values (SHA-1 over namespace bytes followed by the
//! email's UTF-8 bytes), so re-running `init` on the same roster always yields
//! the same account ids.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::dataset::Contact;
use crate::error::IdentityError;

/// Proxy client access level written into the client list.
pub const CLIENT_LEVEL: u32 = 0;
/// Alternate id count written into the client list.
pub const CLIENT_ALTER_ID: u32 = 4;

const VMESS_SCHEME: &str = "vmess://";

/// Parse a namespace string.
pub fn parse_namespace(value: &str) -> Result<Uuid, IdentityError> {
    Uuid::parse_str(value.trim()).map_err(|e| IdentityError::InvalidNamespace {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Derive the identity for `email` under `namespace`.
pub fn derive(namespace: &Uuid, email: &str) -> Uuid {
    Uuid::new_v5(namespace, email.as_bytes())
}

/// Parse `namespace` and derive in one step.
pub fn derive_str(namespace: &str, email: &str) -> Result<Uuid, IdentityError> {
    Ok(derive(&parse_namespace(namespace)?, email))
}

/// One entry in the proxy client list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientEntry {
    pub email: String,
    pub id: String,
    pub level: u32,
    #[serde(rename = "alterId")]
    pub alter_id: u32,
}

impl ClientEntry {
    pub fn new(email: impl Into<String>, id: &Uuid) -> Self {
        Self {
            email: email.into(),
            id: id.to_string(),
            level: CLIENT_LEVEL,
            alter_id: CLIENT_ALTER_ID,
        }
    }
}

/// Build client entries for every contact, in dataset order.
pub fn client_entries(namespace: &Uuid, contacts: &[Contact]) -> Vec<ClientEntry> {
    contacts
        .iter()
        .map(|contact| ClientEntry::new(contact.email(), &derive(namespace, contact.email())))
        .collect()
}

/// Render the client list as the pretty-printed JSON array consumed by the proxy.
pub fn client_list_json(entries: &[ClientEntry]) -> Result<String, IdentityError> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// `vmess://` connection URI for `id`, using `v2` as the client template.
pub fn vmess_url(v2: Option<&Map<String, Value>>, id: &str) -> Result<String, IdentityError> {
    let mut client = v2.cloned().unwrap_or_default();
    client.insert("id".into(), Value::String(id.to_string()));
    let encoded = serde_json::to_string(&Value::Object(client))?;
    Ok(format!("{VMESS_SCHEME}{}", STANDARD.encode(encoded)))
}
