//! Message assembly: front-matter document + contact → multi-part message.

use std::fmt::Write as _;

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

use crate::attachment;
use crate::dataset::Contact;
use crate::document::DocumentMetadata;
use crate::error::ComposeError;

/// An alternative rendering of the body, e.g. `html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativePart {
    pub subtype: String,
    pub content: String,
}

/// A decoded binary attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttachment {
    pub bytes: Vec<u8>,
    pub maintype: String,
    pub subtype: String,
    pub filename: String,
}

impl MessageAttachment {
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.maintype, self.subtype)
    }
}

/// A fully composed message held in memory until the batch send.
///
/// The MIME form is built during assembly, so a confirmed message can always
/// be handed to the transport as-is.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    pub subject: String,
    pub from: Mailbox,
    pub to: Mailbox,
    pub body: String,
    pub parts: Vec<AlternativePart>,
    pub attachments: Vec<MessageAttachment>,
    mime: Message,
}

fn parse_address(address: &str) -> Result<lettre::Address, ComposeError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| ComposeError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn content_type(mime: &str) -> Result<ContentType, ComposeError> {
    ContentType::parse(mime).map_err(|e| ComposeError::Build(format!("{mime}: {e}")))
}

/// Build the MIME structure handed to the transport.
///
/// - body only: `text/plain`
/// - with alternatives: `multipart/alternative`, plain part first
/// - with attachments: `multipart/mixed` wrapping the body part
fn build_mime(
    from: &Mailbox,
    to: &Mailbox,
    subject: &str,
    body: &str,
    parts: &[AlternativePart],
    attachments: &[MessageAttachment],
) -> Result<Message, ComposeError> {
    let builder = Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(subject);

    let plain = SinglePart::builder()
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string());

    let message = match (parts.is_empty(), attachments.is_empty()) {
        (true, true) => builder.singlepart(plain),
        (parts_empty, _) => {
            let mut attached = Vec::with_capacity(attachments.len());
            for a in attachments {
                attached.push(
                    Attachment::new(a.filename.clone())
                        .body(a.bytes.clone(), content_type(&a.mime_type())?),
                );
            }

            let mixed = if parts_empty {
                MultiPart::mixed().singlepart(plain)
            } else {
                let mut alternative = MultiPart::alternative().singlepart(plain);
                for part in parts {
                    let ct = content_type(&format!("text/{}; charset=utf-8", part.subtype))?;
                    alternative = alternative
                        .singlepart(SinglePart::builder().header(ct).body(part.content.clone()));
                }
                if attached.is_empty() {
                    return builder
                        .multipart(alternative)
                        .map_err(|e| ComposeError::Build(e.to_string()));
                }
                MultiPart::mixed().multipart(alternative)
            };
            let mixed = attached
                .into_iter()
                .fold(mixed, |multipart, part| multipart.singlepart(part));
            builder.multipart(mixed)
        }
    };
    message.map_err(|e| ComposeError::Build(e.to_string()))
}

impl ComposedMessage {
    /// The MIME message handed to the transport.
    pub fn mime(&self) -> &Message {
        &self.mime
    }

    /// Human-readable preview for the confirmation prompt.
    pub fn preview(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "From:    {}", self.from);
        let _ = writeln!(out, "To:      {}", self.to);
        let _ = writeln!(out, "Subject: {}", self.subject);
        if self.parts.is_empty() && self.attachments.is_empty() {
            let _ = writeln!(out);
            out.push_str(&self.body);
            if !self.body.ends_with('\n') {
                out.push('\n');
            }
            return out;
        }
        let _ = writeln!(out, "\n[text/plain]");
        out.push_str(&self.body);
        if !self.body.ends_with('\n') {
            out.push('\n');
        }
        for part in &self.parts {
            let _ = writeln!(out, "\n[text/{}] {} bytes", part.subtype, part.content.len());
        }
        for a in &self.attachments {
            let _ = writeln!(
                out,
                "\n[attachment {}] {} ({} bytes)",
                a.mime_type(),
                a.filename,
                a.bytes.len()
            );
        }
        out
    }
}

/// Builds [`ComposedMessage`]s for one sender.
#[derive(Debug, Clone)]
pub struct MessageAssembler {
    sender: Mailbox,
}

impl MessageAssembler {
    /// `name` and `address` are the configured sender identity.
    pub fn new(name: &str, address: &str) -> Result<Self, ComposeError> {
        let name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        Ok(Self {
            sender: Mailbox::new(name, parse_address(address)?),
        })
    }

    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    /// Assemble a message. `render_alternative` renders a template path with the
    /// same per-contact context as the body; it is called in declaration order.
    pub fn assemble<F>(
        &self,
        contact: &Contact,
        metadata: &DocumentMetadata,
        body: &str,
        template: &str,
        mut render_alternative: F,
    ) -> Result<ComposedMessage, ComposeError>
    where
        F: FnMut(&str) -> Result<String, ComposeError>,
    {
        let subject = metadata
            .subject
            .clone()
            .ok_or_else(|| ComposeError::MissingSubject {
                template: template.to_string(),
            })?;

        if contact.email().trim().is_empty() {
            return Err(ComposeError::MissingEmail);
        }
        let to = Mailbox::new(
            contact.display_name().map(str::to_string),
            parse_address(contact.email())?,
        );

        let mut parts = Vec::with_capacity(metadata.alternative.len());
        for (subtype, path) in &metadata.alternative {
            parts.push(AlternativePart {
                subtype: subtype.clone(),
                content: render_alternative(path)?,
            });
        }

        let attachments = metadata
            .attach
            .iter()
            .map(|descriptor| {
                let token = attachment::decode(&descriptor.content, &descriptor.name)?;
                Ok(MessageAttachment {
                    bytes: token.bytes,
                    maintype: token.maintype,
                    subtype: token.subtype,
                    filename: descriptor.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, ComposeError>>()?;

        let mime = build_mime(&self.sender, &to, &subject, body, &parts, &attachments)?;
        Ok(ComposedMessage {
            subject,
            from: self.sender.clone(),
            to,
            body: body.to_string(),
            parts,
            attachments,
            mime,
        })
    }
}

#[cfg(test)]
mod tests {
    use mail_parser::{MessageParser, MimeHeaders};

    use super::*;
    use crate::document::{self, AttachmentDescriptor};

    fn assembler() -> MessageAssembler {
        MessageAssembler::new("Ops Team", "ops@example.com").unwrap()
    }

    fn ann() -> Contact {
        Contact::from_pairs([("email", "ann@example.com"), ("english_name", "Ann Lee")])
    }

    fn no_alternatives(path: &str) -> Result<String, ComposeError> {
        panic!("unexpected alternative render: {path}")
    }

    // ── Assembly ────────────────────────────────────────────────────

    #[test]
    fn plain_message() {
        let doc = document::parse("---\nsubject: Hello\n---\nHi Ann\n");
        let msg = assembler()
            .assemble(&ann(), &doc.metadata, &doc.body, "t.txt", no_alternatives)
            .unwrap();
        assert_eq!(msg.subject, "Hello");
        assert_eq!(msg.to.email.to_string(), "ann@example.com");
        assert_eq!(msg.to.name.as_deref(), Some("Ann Lee"));
        assert_eq!(msg.from.name.as_deref(), Some("Ops Team"));
        assert_eq!(msg.body, "Hi Ann\n");
        assert!(msg.parts.is_empty() && msg.attachments.is_empty());
    }

    #[test]
    fn missing_subject() {
        let doc = document::parse("Just a body");
        let err = assembler()
            .assemble(&ann(), &doc.metadata, &doc.body, "t.txt", no_alternatives)
            .unwrap_err();
        assert!(matches!(err, ComposeError::MissingSubject { template } if template == "t.txt"));
    }

    #[test]
    fn alternatives_render_in_declared_order() {
        let doc = document::parse(
            "---\nsubject: S\nalternative:\n  html: a.html\n  enriched: b.rtf\n---\nbody",
        );
        let mut seen = Vec::new();
        let msg = assembler()
            .assemble(&ann(), &doc.metadata, &doc.body, "t.txt", |path| {
                seen.push(path.to_string());
                Ok(format!("rendered {path}"))
            })
            .unwrap();
        assert_eq!(seen, vec!["a.html", "b.rtf"]);
        assert_eq!(msg.parts[0].subtype, "html");
        assert_eq!(msg.parts[1].content, "rendered b.rtf");
    }

    #[test]
    fn attachments_are_decoded() {
        let metadata = DocumentMetadata {
            subject: Some("S".into()),
            alternative: vec![],
            attach: vec![AttachmentDescriptor {
                content: attachment::encode(b"\x00\x01binary", "image", "png"),
                name: "qr.png".into(),
            }],
        };
        let msg = assembler()
            .assemble(&ann(), &metadata, "body", "t.txt", no_alternatives)
            .unwrap();
        assert_eq!(msg.attachments[0].bytes, b"\x00\x01binary");
        assert_eq!(msg.attachments[0].mime_type(), "image/png");
        assert_eq!(msg.attachments[0].filename, "qr.png");
    }

    #[test]
    fn malformed_attachment_token() {
        let metadata = DocumentMetadata {
            subject: Some("S".into()),
            alternative: vec![],
            attach: vec![AttachmentDescriptor {
                content: "aGk=.text".into(),
                name: "hi.txt".into(),
            }],
        };
        let err = assembler()
            .assemble(&ann(), &metadata, "body", "t.txt", no_alternatives)
            .unwrap_err();
        assert!(matches!(err, ComposeError::AttachmentFormat { segments: 2, .. }));
    }

    #[test]
    fn unusable_mime_type_fails_at_assembly() {
        let metadata = DocumentMetadata {
            subject: Some("S".into()),
            alternative: vec![],
            attach: vec![AttachmentDescriptor {
                content: "aGk=..plain".into(),
                name: "hi.txt".into(),
            }],
        };
        let err = assembler()
            .assemble(&ann(), &metadata, "body", "t.txt", no_alternatives)
            .unwrap_err();
        assert!(matches!(err, ComposeError::Build(_)), "{err:?}");
    }

    #[test]
    fn invalid_recipient_address() {
        let doc = document::parse("---\nsubject: S\n---\nbody");
        let contact = Contact::from_pairs([("email", "not an address")]);
        let err = assembler()
            .assemble(&contact, &doc.metadata, &doc.body, "t.txt", no_alternatives)
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidAddress { .. }));
    }

    #[test]
    fn recipient_without_name() {
        let doc = document::parse("---\nsubject: S\n---\nbody");
        let contact = Contact::from_pairs([("email", "b@x.com"), ("english_name", " ")]);
        let msg = assembler()
            .assemble(&contact, &doc.metadata, &doc.body, "t.txt", no_alternatives)
            .unwrap();
        assert!(msg.to.name.is_none());
    }

    // ── MIME ────────────────────────────────────────────────────────

    fn full_message() -> ComposedMessage {
        let metadata = DocumentMetadata {
            subject: Some("Your access".into()),
            alternative: vec![("html".into(), "a.html".into())],
            attach: vec![AttachmentDescriptor {
                content: attachment::encode(b"vmess://abc", "text", "plain"),
                name: "vmess.txt".into(),
            }],
        };
        assembler()
            .assemble(&ann(), &metadata, "plain body", "t.txt", |_| {
                Ok("<p>html body</p>".into())
            })
            .unwrap()
    }

    fn trimmed(body: Option<std::borrow::Cow<'_, str>>) -> String {
        body.map(|b| b.trim_end().to_string()).unwrap_or_default()
    }

    #[test]
    fn mime_structure_with_alternative_and_attachment() {
        let raw = full_message().mime().formatted();
        let parsed = MessageParser::default().parse(&raw).unwrap();

        assert_eq!(parsed.subject(), Some("Your access"));
        assert_eq!(trimmed(parsed.body_text(0)), "plain body");
        assert_eq!(trimmed(parsed.body_html(0)), "<p>html body</p>");

        let attachment = parsed.attachments().next().unwrap();
        assert_eq!(attachment.attachment_name(), Some("vmess.txt"));
        assert_eq!(attachment.contents().trim_ascii_end(), b"vmess://abc");
    }

    #[test]
    fn mime_plain_only() {
        let doc = document::parse("---\nsubject: S\n---\nonly text");
        let msg = assembler()
            .assemble(&ann(), &doc.metadata, &doc.body, "t.txt", no_alternatives)
            .unwrap();
        let raw = msg.mime().formatted();
        let parsed = MessageParser::default().parse(&raw).unwrap();
        assert_eq!(trimmed(parsed.body_text(0)), "only text");
        assert_eq!(parsed.attachment_count(), 0);
    }

    #[test]
    fn preview_lists_parts() {
        let preview = full_message().preview();
        assert!(preview.contains("Subject: Your access"));
        assert!(preview.contains("[text/plain]\nplain body"));
        assert!(preview.contains("[text/html]"));
        assert!(preview.contains("[attachment text/plain] vmess.txt (11 bytes)"));
    }
}
