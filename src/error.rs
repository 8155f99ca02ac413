//! Error types for roster-mail.

use std::path::PathBuf;

/// Top-level error type for a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Usage stats error: {0}")]
    Stats(#[from] StatsError),
}

impl Error {
    /// Whether this error is the operator declining a confirmation.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, Error::Dispatch(DispatchError::UserAborted { .. }))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity derivation errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid namespace {value:?}: {reason}")]
    InvalidNamespace { value: String, reason: String },

    #[error("Failed to encode client identity: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Contact dataset errors.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Dataset not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Dataset {} has no {column:?} column", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("Malformed CSV in {}: {reason}", .path.display())]
    Csv { path: PathBuf, reason: String },

    #[error("Invalid auxiliary data pattern: {0}")]
    Pattern(String),
}

/// Template loading and rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Failed to render template {path}: {cause}")]
    Render { path: String, cause: String },
}

/// Errors while turning a rendered document into a message.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Template {template} has no subject in its front matter")]
    MissingSubject { template: String },

    #[error("Malformed attachment {name:?}: expected payload.maintype.subtype, got {segments} segment(s)")]
    AttachmentFormat { name: String, segments: usize },

    #[error("Attachment {name:?} payload is not valid base64: {reason}")]
    AttachmentDecode { name: String, reason: String },

    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Contact has no email")]
    MissingEmail,

    #[error("Failed to build MIME message: {0}")]
    Build(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {server}:{port}: {reason}")]
    Connect {
        server: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {user}: {reason}")]
    Auth { user: String, reason: String },

    #[error("Failed to send message to {to}: {reason}")]
    Send { to: String, reason: String },

    #[error("Transport used before login")]
    NotAuthenticated,
}

/// Dispatch control-flow errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Aborted by operator at contact {index} ({email}); nothing was sent")]
    UserAborted { index: usize, email: String },

    #[error("Failed to compose message for contact {index} ({email}): {source}")]
    Compose {
        index: usize,
        email: String,
        #[source]
        source: ComposeError,
    },

    #[error("Failed to open transport session: {0}")]
    Session(#[source] TransportError),

    #[error("Sending stopped at message {first_unsent} ({sent} sent): {source}")]
    SendFailed {
        first_unsent: usize,
        sent: usize,
        #[source]
        source: TransportError,
    },

    #[error("Cannot send before every message is confirmed (state: {state})")]
    NotConfirmed { state: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Traffic statistics conversion errors.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("Failed to parse stats document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unexpected stat name {0:?}: expected user>>>email>>>traffic>>>uplink|downlink")]
    InvalidName(String),

    #[error("Stat {name:?} has a non-numeric value: {value}")]
    InvalidValue { name: String, value: String },

    #[error("Failed to write usage CSV: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for roster-mail.
pub type Result<T> = std::result::Result<T, Error>;
