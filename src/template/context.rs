//! Per-render template context.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::dataset::Contact;

/// Run-wide values shared by every render: config globals plus the contact list.
#[derive(Debug, Clone, Default)]
pub struct GlobalContext {
    values: Arc<Map<String, Value>>,
}

impl GlobalContext {
    pub fn new(mut globals: Map<String, Value>, contacts: &[Contact]) -> Self {
        globals.insert(
            "contacts".into(),
            Value::Array(contacts.iter().map(Contact::to_value).collect()),
        );
        Self {
            values: Arc::new(globals),
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Context for rendering on behalf of `contact`.
    pub fn for_contact(&self, contact: &Contact) -> RenderContext {
        RenderContext {
            globals: Arc::clone(&self.values),
            overrides: contact.fields().clone(),
        }
    }
}

/// Immutable context for one render call. Overrides win over globals.
#[derive(Debug, Clone)]
pub struct RenderContext {
    globals: Arc<Map<String, Value>>,
    overrides: Map<String, Value>,
}

impl RenderContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.overrides.get(key).or_else(|| self.globals.get(key))
    }

    /// Flattened view, globals first.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut merged = (*self.globals).clone();
        for (k, v) in &self.overrides {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    pub(crate) fn to_tera(&self) -> tera::Result<tera::Context> {
        tera::Context::from_value(Value::Object(self.to_map()))
    }
}
