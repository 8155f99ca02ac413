//! Content filters exposed to templates, and the registry that installs them.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::attachment;
use crate::identity;
use crate::qr::QrEncoder;

/// Keyword arguments passed to a filter.
pub type FilterArgs = HashMap<String, Value>;

/// Error raised by a filter. Surfaces as a template render error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("filter {filter}: {reason}")]
pub struct FilterError {
    pub filter: String,
    pub reason: String,
}

impl FilterError {
    fn new(filter: &str, reason: impl Into<String>) -> Self {
        Self {
            filter: filter.to_string(),
            reason: reason.into(),
        }
    }
}

/// A named, side-effect-free transformation usable as `{{ value | name(...) }}`.
pub trait ContentFilter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, value: &Value, args: &FilterArgs) -> Result<Value, FilterError>;
}

/// Text view of a value: strings as-is, everything else as compact JSON.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_arg<'a>(filter: &str, args: &'a FilterArgs, key: &str) -> Result<Option<&'a str>, FilterError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(FilterError::new(
            filter,
            format!("argument {key:?} must be a string, got {other}"),
        )),
    }
}

/// `uuid5(namespace=...)`: identity derivation. Falls back to the configured namespace.
pub struct Uuid5Filter {
    default_namespace: Option<Uuid>,
}

impl Uuid5Filter {
    pub fn new(default_namespace: Option<Uuid>) -> Self {
        Self { default_namespace }
    }
}

impl ContentFilter for Uuid5Filter {
    fn name(&self) -> &str {
        "uuid5"
    }

    fn apply(&self, value: &Value, args: &FilterArgs) -> Result<Value, FilterError> {
        let namespace = match string_arg(self.name(), args, "namespace")? {
            Some(raw) => identity::parse_namespace(raw)
                .map_err(|e| FilterError::new(self.name(), e.to_string()))?,
            None => self
                .default_namespace
                .ok_or_else(|| FilterError::new(self.name(), "no namespace given or configured"))?,
        };
        Ok(Value::String(
            identity::derive(&namespace, &text_of(value)).to_string(),
        ))
    }
}

/// `to_json`: compact JSON, keys in their given order.
pub struct ToJsonFilter;

impl ContentFilter for ToJsonFilter {
    fn name(&self) -> &str {
        "to_json"
    }

    fn apply(&self, value: &Value, _args: &FilterArgs) -> Result<Value, FilterError> {
        serde_json::to_string(value)
            .map(Value::String)
            .map_err(|e| FilterError::new(self.name(), e.to_string()))
    }
}

/// `to_base64`: standard base64 of the UTF-8 text.
pub struct ToBase64Filter;

impl ContentFilter for ToBase64Filter {
    fn name(&self) -> &str {
        "to_base64"
    }

    fn apply(&self, value: &Value, _args: &FilterArgs) -> Result<Value, FilterError> {
        Ok(Value::String(STANDARD.encode(text_of(value))))
    }
}

/// `txt_file`: a plain-text attachment token.
pub struct TxtFileFilter;

impl ContentFilter for TxtFileFilter {
    fn name(&self) -> &str {
        "txt_file"
    }

    fn apply(&self, value: &Value, _args: &FilterArgs) -> Result<Value, FilterError> {
        Ok(Value::String(attachment::encode(
            text_of(value).as_bytes(),
            "text",
            "plain",
        )))
    }
}

/// `dump_qr`: a PNG QR-code attachment token.
pub struct DumpQrFilter {
    encoder: Arc<dyn QrEncoder>,
}

impl DumpQrFilter {
    pub fn new(encoder: Arc<dyn QrEncoder>) -> Self {
        Self { encoder }
    }
}

impl ContentFilter for DumpQrFilter {
    fn name(&self) -> &str {
        "dump_qr"
    }

    fn apply(&self, value: &Value, _args: &FilterArgs) -> Result<Value, FilterError> {
        let png = self
            .encoder
            .encode(&text_of(value))
            .map_err(|reason| FilterError::new(self.name(), reason))?;
        Ok(Value::String(attachment::encode(&png, "image", "png")))
    }
}

/// `update(other=..., key=value...)`: shallow merge onto a copy of the input mapping.
///
/// Entries of `other` override the input; remaining keyword arguments are
/// applied last, so `v2 | update(id=uuid)` works without map literals.
pub struct UpdateFilter;

impl ContentFilter for UpdateFilter {
    fn name(&self) -> &str {
        "update"
    }

    fn apply(&self, value: &Value, args: &FilterArgs) -> Result<Value, FilterError> {
        let mut merged = match value {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(FilterError::new(
                    self.name(),
                    format!("expected a mapping, got {other}"),
                ));
            }
        };
        match args.get("other") {
            None | Some(Value::Null) => {}
            Some(Value::Object(other)) => {
                merged.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(other) => {
                return Err(FilterError::new(
                    self.name(),
                    format!("argument \"other\" must be a mapping, got {other}"),
                ));
            }
        }
        let mut extra: Vec<_> = args.iter().filter(|(k, _)| k.as_str() != "other").collect();
        extra.sort_by(|a, b| a.0.cmp(b.0));
        for (key, v) in extra {
            merged.insert(key.clone(), v.clone());
        }
        Ok(Value::Object(merged))
    }
}

/// `vmess_url(id=...)`: connection URI for the client template given as input.
pub struct VmessUrlFilter;

impl ContentFilter for VmessUrlFilter {
    fn name(&self) -> &str {
        "vmess_url"
    }

    fn apply(&self, value: &Value, args: &FilterArgs) -> Result<Value, FilterError> {
        let id = string_arg(self.name(), args, "id")?
            .ok_or_else(|| FilterError::new(self.name(), "missing argument \"id\""))?;
        let template = match value {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(FilterError::new(
                    self.name(),
                    format!("expected a mapping, got {other}"),
                ));
            }
        };
        identity::vmess_url(template, id)
            .map(Value::String)
            .map_err(|e| FilterError::new(self.name(), e.to_string()))
    }
}

/// Registry of filters available to the template environment.
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn ContentFilter>>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// The standard filter set.
    pub fn with_defaults(namespace: Option<Uuid>, qr: Arc<dyn QrEncoder>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Uuid5Filter::new(namespace)));
        registry.register(Arc::new(ToJsonFilter));
        registry.register(Arc::new(ToBase64Filter));
        registry.register(Arc::new(TxtFileFilter));
        registry.register(Arc::new(DumpQrFilter::new(qr)));
        registry.register(Arc::new(UpdateFilter));
        registry.register(Arc::new(VmessUrlFilter));
        registry
    }

    /// Register a filter, replacing any previous filter of the same name.
    pub fn register(&mut self, filter: Arc<dyn ContentFilter>) {
        let name = filter.name().to_string();
        if self.filters.insert(name.clone(), filter).is_some() {
            tracing::warn!(filter = %name, "Replaced previously registered filter");
        } else {
            tracing::debug!("Registered filter: {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentFilter>> {
        self.filters.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.filters.len()
    }

    /// Install every filter into a tera instance.
    pub(crate) fn install(&self, tera: &mut tera::Tera) {
        for (name, filter) in &self.filters {
            tera.register_filter(name, TeraFilter(Arc::clone(filter)));
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridges a [`ContentFilter`] to tera's filter trait.
struct TeraFilter(Arc<dyn ContentFilter>);

impl tera::Filter for TeraFilter {
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        self.0
            .apply(value, args)
            .map_err(|e| tera::Error::msg(e.to_string()))
    }
}
