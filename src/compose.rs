//! Per-contact composition: render the entry template, parse its front matter,
//! render alternatives, and assemble the message.

use std::sync::Arc;

use crate::cli::Paths;
use crate::config::Config;
use crate::dataset::{self, Contact, ContactFilter, Dataset};
use crate::document::{self, Document};
use crate::error::ComposeError;
use crate::message::{ComposedMessage, MessageAssembler};
use crate::qr::PngQrEncoder;
use crate::template::{FilterRegistry, GlobalContext, TemplateEnvironment};

/// Composes messages for contacts from one entry template.
pub struct Composer {
    env: TemplateEnvironment,
    globals: GlobalContext,
    assembler: MessageAssembler,
}

impl Composer {
    pub fn new(env: TemplateEnvironment, globals: GlobalContext, assembler: MessageAssembler) -> Self {
        Self {
            env,
            globals,
            assembler,
        }
    }

    pub fn environment(&self) -> &TemplateEnvironment {
        &self.env
    }

    /// Render `template` for `contact` without interpreting front matter.
    pub fn render(&self, template: &str, contact: &Contact) -> Result<String, ComposeError> {
        let ctx = self.globals.for_contact(contact);
        Ok(self.env.render(template, &ctx)?)
    }

    /// Render and parse `template` for `contact`.
    pub fn document(&self, template: &str, contact: &Contact) -> Result<Document, ComposeError> {
        Ok(document::parse(&self.render(template, contact)?))
    }

    /// Build the full message for `contact`.
    pub fn compose(&self, template: &str, contact: &Contact) -> Result<ComposedMessage, ComposeError> {
        let ctx = self.globals.for_contact(contact);
        let doc = document::parse(&self.env.render(template, &ctx)?);
        let message = self.assembler.assemble(
            contact,
            &doc.metadata,
            &doc.body,
            template,
            |path| Ok(self.env.render(path, &ctx)?),
        )?;
        tracing::debug!(
            to = %contact.email(),
            parts = message.parts.len(),
            attachments = message.attachments.len(),
            "Composed message"
        );
        Ok(message)
    }
}

/// Load the selected contacts with their derived `uuid` and build a composer over them.
pub fn prepare(
    config: &Config,
    paths: &Paths,
    filter: &ContactFilter,
) -> crate::Result<(Composer, Dataset)> {
    let namespace = config.namespace()?;

    let auxiliary = dataset::discover_auxiliary(&paths.data)?;
    let mut dataset = Dataset::load(&paths.contacts, &auxiliary, filter)?;
    dataset.assign_identities(&namespace);

    let filters = FilterRegistry::with_defaults(Some(namespace), Arc::new(PngQrEncoder::new()));
    let env = TemplateEnvironment::new(&paths.templates, &filters)?;
    let globals = GlobalContext::new(config.template_globals(), dataset.contacts());
    let assembler = MessageAssembler::new(&config.smtp.name, &config.smtp.user)?;
    Ok((Composer::new(env, globals, assembler), dataset))
}
