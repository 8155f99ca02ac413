//! Template environment: tera over a directory root, with the filter registry installed.

use std::error::Error as _;
use std::fs;
use std::path::{Path, PathBuf};

use tera::Tera;

use crate::error::TemplateError;
use crate::template::context::RenderContext;
use crate::template::filters::FilterRegistry;

/// Extensions rendered with HTML escaping. Everything else renders raw.
const ESCAPED_EXTENSIONS: &[&str] = &[".html", ".htm"];

/// Name of the entry template inside a template directory.
pub const ENTRY_TEMPLATE: &str = "template.txt";

/// Renders templates addressed by path relative to a root directory.
pub struct TemplateEnvironment {
    root: PathBuf,
    tera: Tera,
}

impl TemplateEnvironment {
    /// Load every text template under `root` and install `filters`.
    ///
    /// Files that are not UTF-8 (images, other assets) are skipped.
    pub fn new(root: &Path, filters: &FilterRegistry) -> Result<Self, TemplateError> {
        if !root.is_dir() {
            return Err(TemplateError::NotFound(root.display().to_string()));
        }
        let load_err = |cause: String| TemplateError::Render {
            path: root.display().to_string(),
            cause,
        };

        let mut tera = Tera::default();
        tera.autoescape_on(ESCAPED_EXTENSIONS.to_vec());
        filters.install(&mut tera);
        let sources = template_sources(root).map_err(load_err)?;
        tera.add_raw_templates(sources)
            .map_err(|e| load_err(error_chain(&e)))?;

        tracing::debug!(
            root = %root.display(),
            templates = tera.get_template_names().count(),
            filters = filters.count(),
            "Template environment ready"
        );
        Ok(Self {
            root: root.to_path_buf(),
            tera,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_template(&self, path: &str) -> bool {
        self.tera.get_template_names().any(|name| name == path)
    }

    /// Resolve a CLI template argument: a file path as-is, or a directory's entry template.
    pub fn resolve_entry(&self, name: &str) -> String {
        let trimmed = name.trim_end_matches('/');
        if self.has_template(trimmed) {
            return trimmed.to_string();
        }
        let entry = format!("{trimmed}/{ENTRY_TEMPLATE}");
        if self.has_template(&entry) {
            entry
        } else {
            trimmed.to_string()
        }
    }

    /// Render `path` against `context`.
    pub fn render(&self, path: &str, context: &RenderContext) -> Result<String, TemplateError> {
        if !self.has_template(path) {
            return Err(TemplateError::NotFound(path.to_string()));
        }
        let ctx = context.to_tera().map_err(|e| TemplateError::Render {
            path: path.to_string(),
            cause: error_chain(&e),
        })?;
        let rendered = self.tera.render(path, &ctx).map_err(|e| match e.kind {
            tera::ErrorKind::TemplateNotFound(ref name) => TemplateError::NotFound(name.clone()),
            _ => TemplateError::Render {
                path: path.to_string(),
                cause: error_chain(&e),
            },
        })?;
        tracing::debug!(template = %path, bytes = rendered.len(), "Rendered template");
        Ok(rendered)
    }
}

/// `(name, source)` of every UTF-8 file under `root`, named by `/`-joined relative path.
fn template_sources(root: &Path) -> Result<Vec<(String, String)>, String> {
    let root = root
        .canonicalize()
        .map_err(|e| format!("{}: {e}", root.display()))?;
    let pattern = root.join("**").join("*");
    let paths = glob::glob(&pattern.to_string_lossy()).map_err(|e| e.to_string())?;

    let mut sources = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| e.to_string())?;
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(&root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = fs::read(&path).map_err(|e| format!("{}: {e}", path.display()))?;
        match String::from_utf8(bytes) {
            Ok(text) => sources.push((name, text)),
            Err(_) => tracing::debug!(file = %name, "Skipping non-text file in template root"),
        }
    }
    Ok(sources)
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
