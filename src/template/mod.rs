//! Template rendering: filter registry, render context, and the tera-backed environment.

pub mod context;
pub mod environment;
pub mod filters;

pub use context::{GlobalContext, RenderContext};
pub use environment::TemplateEnvironment;
pub use filters::{ContentFilter, FilterError, FilterRegistry};
