//! Confirm-then-dispatch control flow.
//!
//! Every contact is built and confirmed before any transport is opened. A single
//! declined confirmation aborts the run with nothing sent; once all contacts
//! are confirmed, one session is opened, authenticated once, and the batch is
//! sent in confirmation order.

use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, Write};

use secrecy::SecretString;

use crate::dataset::Contact;
use crate::error::{ComposeError, DispatchError, TransportError};
use crate::message::ComposedMessage;
use crate::transport::MailTransport;

/// The only answer that confirms a contact (case-insensitive).
pub const ACCEPT_TOKEN: &str = "y";

/// Decides whether a contact's message may go out.
pub trait Confirmer {
    fn confirm(&mut self, contact: &Contact) -> bool;
}

/// Interactive confirmation: prompts on `output`, reads one line from `input`.
pub struct PromptConfirmer<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirmer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirmer for PromptConfirmer<R, W> {
    fn confirm(&mut self, _contact: &Contact) -> bool {
        if write!(self.output, "Resume (y/N): ").and_then(|_| self.output.flush()).is_err() {
            return false;
        }
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => line.trim().eq_ignore_ascii_case(ACCEPT_TOKEN),
        }
    }
}

/// Non-interactive confirmation from a fixed list of answers.
/// Declines once the answers run out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfirmer {
    answers: VecDeque<bool>,
    asked: Vec<String>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    /// Approve every contact.
    pub fn approve_all(count: usize) -> Self {
        Self::new(std::iter::repeat_n(true, count))
    }

    /// Emails of the contacts asked about, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&mut self, contact: &Contact) -> bool {
        self.asked.push(contact.email().to_string());
        self.answers.pop_front().unwrap_or(false)
    }
}

/// Dispatch state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    /// Building and previewing contact `i`.
    Building(usize),
    /// Waiting for the decision on contact `i`.
    Confirming(usize),
    Aborted(usize),
    AllConfirmed,
    Sending,
    Sent,
    SendFailed(usize),
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchState::Idle => write!(f, "idle"),
            DispatchState::Building(i) => write!(f, "building({i})"),
            DispatchState::Confirming(i) => write!(f, "confirming({i})"),
            DispatchState::Aborted(i) => write!(f, "aborted({i})"),
            DispatchState::AllConfirmed => write!(f, "all_confirmed"),
            DispatchState::Sending => write!(f, "sending"),
            DispatchState::Sent => write!(f, "sent"),
            DispatchState::SendFailed(i) => write!(f, "send_failed({i})"),
        }
    }
}

/// Outcome of a completed dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
}

/// Drives confirmation and sending for one run.
pub struct DispatchController<C, W> {
    confirmer: C,
    preview: W,
    state: DispatchState,
}

impl<C: Confirmer, W: Write> DispatchController<C, W> {
    /// `preview` receives the per-contact preview shown before each confirmation.
    pub fn new(confirmer: C, preview: W) -> Self {
        Self {
            confirmer,
            preview,
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn confirmer(&self) -> &C {
        &self.confirmer
    }

    fn transition(&mut self, next: DispatchState) {
        tracing::debug!(from = %self.state, to = %next, "Dispatch state");
        self.state = next;
    }

    /// Build, preview and confirm every contact in order.
    ///
    /// Returns the confirmed batch, or `UserAborted` at the first decline.
    pub fn confirm_all<F>(
        &mut self,
        contacts: &[Contact],
        mut build: F,
    ) -> Result<Vec<ComposedMessage>, DispatchError>
    where
        F: FnMut(&Contact) -> Result<ComposedMessage, ComposeError>,
    {
        let mut batch = Vec::with_capacity(contacts.len());
        for (index, contact) in contacts.iter().enumerate() {
            self.transition(DispatchState::Building(index));
            let message = build(contact).map_err(|source| DispatchError::Compose {
                index,
                email: contact.email().to_string(),
                source,
            })?;
            self.write_preview(index, contacts.len(), contact, &message)?;

            self.transition(DispatchState::Confirming(index));
            if !self.confirmer.confirm(contact) {
                self.transition(DispatchState::Aborted(index));
                tracing::warn!(index, email = %contact.email(), "Dispatch aborted by operator");
                return Err(DispatchError::UserAborted {
                    index,
                    email: contact.email().to_string(),
                });
            }
            batch.push(message);
        }
        self.transition(DispatchState::AllConfirmed);
        tracing::info!(count = batch.len(), "All messages confirmed");
        Ok(batch)
    }

    fn write_preview(
        &mut self,
        index: usize,
        total: usize,
        contact: &Contact,
        message: &ComposedMessage,
    ) -> Result<(), DispatchError> {
        writeln!(self.preview, "── [{}/{}] {} ──", index + 1, total, contact.email())?;
        for (column, value) in contact.fields() {
            writeln!(
                self.preview,
                "{column:>16}: {}",
                value.as_str().unwrap_or_default()
            )?;
        }
        writeln!(self.preview)?;
        write!(self.preview, "{}", message.preview())?;
        self.preview.flush()?;
        Ok(())
    }

    /// Send a confirmed batch over one session opened by `connect`.
    pub fn send_all<T, F>(
        &mut self,
        batch: &[ComposedMessage],
        connect: F,
        user: &str,
        password: &SecretString,
    ) -> Result<DispatchReport, DispatchError>
    where
        T: MailTransport,
        F: FnOnce() -> Result<T, TransportError>,
    {
        if self.state != DispatchState::AllConfirmed {
            tracing::warn!(state = %self.state, "Refusing to send before every message is confirmed");
            return Err(DispatchError::NotConfirmed {
                state: self.state.to_string(),
            });
        }
        self.transition(DispatchState::Sending);

        let mut transport = connect().map_err(|e| self.session_failed(e))?;
        transport.login(user, password).map_err(|e| self.session_failed(e))?;

        for (index, message) in batch.iter().enumerate() {
            if let Err(source) = transport.send(message) {
                self.transition(DispatchState::SendFailed(index));
                tracing::error!(index, sent = index, "Send failed: {source}");
                return Err(DispatchError::SendFailed {
                    first_unsent: index,
                    sent: index,
                    source,
                });
            }
        }

        self.transition(DispatchState::Sent);
        tracing::info!(sent = batch.len(), "Dispatch complete");
        Ok(DispatchReport { sent: batch.len() })
    }

    fn session_failed(&mut self, error: TransportError) -> DispatchError {
        self.transition(DispatchState::SendFailed(0));
        DispatchError::Session(error)
    }

    /// Confirm every contact, then send the batch. Nothing is sent unless all are confirmed.
    pub fn run<B, T, F>(
        &mut self,
        contacts: &[Contact],
        build: B,
        connect: F,
        user: &str,
        password: &SecretString,
    ) -> Result<DispatchReport, DispatchError>
    where
        B: FnMut(&Contact) -> Result<ComposedMessage, ComposeError>,
        T: MailTransport,
        F: FnOnce() -> Result<T, TransportError>,
    {
        let batch = self.confirm_all(contacts, build)?;
        self.send_all(&batch, connect, user, password)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    use super::*;
    use crate::document;
    use crate::message::MessageAssembler;

    #[derive(Default)]
    struct Log {
        connects: usize,
        logins: usize,
        sent: Vec<String>,
    }

    struct FakeTransport {
        log: Rc<RefCell<Log>>,
        fail_at: Option<usize>,
    }

    impl MailTransport for FakeTransport {
        fn login(&mut self, _user: &str, _password: &SecretString) -> Result<(), TransportError> {
            self.log.borrow_mut().logins += 1;
            Ok(())
        }

        fn send(&mut self, message: &ComposedMessage) -> Result<(), TransportError> {
            let mut log = self.log.borrow_mut();
            if Some(log.sent.len()) == self.fail_at {
                return Err(TransportError::Send {
                    to: message.to.email.to_string(),
                    reason: "451 try later".into(),
                });
            }
            log.sent.push(message.to.email.to_string());
            Ok(())
        }
    }

    fn contacts(n: usize) -> Vec<Contact> {
        (0..n)
            .map(|i| Contact::from_pairs([("email", format!("user{i}@x.com"))]))
            .collect()
    }

    fn build(contact: &Contact) -> Result<ComposedMessage, ComposeError> {
        let doc = document::parse("---\nsubject: Hi\n---\nbody");
        MessageAssembler::new("Ops", "ops@x.com")?.assemble(
            contact,
            &doc.metadata,
            &doc.body,
            "t.txt",
            |_| Ok(String::new()),
        )
    }

    fn connector(
        log: &Rc<RefCell<Log>>,
        fail_at: Option<usize>,
    ) -> impl FnOnce() -> Result<FakeTransport, TransportError> {
        let log = Rc::clone(log);
        move || {
            log.borrow_mut().connects += 1;
            Ok(FakeTransport { log, fail_at })
        }
    }

    fn password() -> SecretString {
        SecretString::from("pw")
    }

    // ── All-or-nothing ──────────────────────────────────────────────

    #[test]
    fn decline_third_of_three_sends_nothing() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut controller =
            DispatchController::new(ScriptedConfirmer::new([true, true, false]), Vec::new());

        let err = controller
            .run(&contacts(3), build, connector(&log, None), "ops@x.com", &password())
            .unwrap_err();

        assert!(matches!(err, DispatchError::UserAborted { index: 2, .. }));
        assert_eq!(controller.state(), DispatchState::Aborted(2));
        let log = log.borrow();
        assert_eq!(log.connects, 0);
        assert_eq!(log.logins, 0);
        assert!(log.sent.is_empty());
    }

    #[test]
    fn decline_stops_further_prompts() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut controller =
            DispatchController::new(ScriptedConfirmer::new([false, true, true]), Vec::new());
        let _ = controller.run(&contacts(3), build, connector(&log, None), "u", &password());
        assert_eq!(controller.confirmer().asked(), ["user0@x.com"]);
    }

    #[test]
    fn all_confirmed_sends_in_order_with_one_login() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut controller = DispatchController::new(ScriptedConfirmer::approve_all(3), Vec::new());

        let report = controller
            .run(&contacts(3), build, connector(&log, None), "u", &password())
            .unwrap();

        assert_eq!(report.sent, 3);
        assert_eq!(controller.state(), DispatchState::Sent);
        let log = log.borrow();
        assert_eq!((log.connects, log.logins), (1, 1));
        assert_eq!(log.sent, vec!["user0@x.com", "user1@x.com", "user2@x.com"]);
    }

    #[test]
    fn send_failure_reports_boundary() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut controller = DispatchController::new(ScriptedConfirmer::approve_all(3), Vec::new());

        let err = controller
            .run(&contacts(3), build, connector(&log, Some(1)), "u", &password())
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::SendFailed {
                first_unsent: 1,
                sent: 1,
                ..
            }
        ));
        assert_eq!(controller.state(), DispatchState::SendFailed(1));
        assert_eq!(log.borrow().sent, vec!["user0@x.com"]);
    }

    #[test]
    fn compose_failure_aborts_before_sending() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut controller = DispatchController::new(ScriptedConfirmer::approve_all(2), Vec::new());
        let err = controller
            .run(
                &contacts(2),
                |c| {
                    if c.email() == "user1@x.com" {
                        Err(ComposeError::MissingSubject {
                            template: "t.txt".into(),
                        })
                    } else {
                        build(c)
                    }
                },
                connector(&log, None),
                "u",
                &password(),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Compose { index: 1, .. }));
        assert_eq!(log.borrow().connects, 0);
    }

    #[test]
    fn send_requires_full_confirmation() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut controller = DispatchController::new(ScriptedConfirmer::default(), Vec::new());
        let batch = vec![build(&contacts(1)[0]).unwrap()];
        let err = controller
            .send_all(&batch, connector(&log, None), "u", &password())
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotConfirmed { ref state } if state == "idle"));
        assert_eq!(controller.state(), DispatchState::Idle);
        assert_eq!(log.borrow().connects, 0);
    }

    #[test]
    fn preview_is_written_before_each_prompt() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut preview = Vec::new();
        {
            let mut controller =
                DispatchController::new(ScriptedConfirmer::approve_all(2), &mut preview);
            controller
                .run(&contacts(2), build, connector(&log, None), "u", &password())
                .unwrap();
        }
        let text = String::from_utf8(preview).unwrap();
        assert!(text.contains("[1/2] user0@x.com"));
        assert!(text.contains("[2/2] user1@x.com"));
        assert!(text.contains("Subject: Hi"));
    }

    // ── Prompt ──────────────────────────────────────────────────────

    #[test]
    fn prompt_accepts_only_y() {
        let contact = Contact::from_pairs([("email", "a@x.com")]);
        for (input, expected) in [
            ("y\n", true),
            ("Y\n", true),
            (" y \n", true),
            ("yes\n", false),
            ("n\n", false),
            ("\n", false),
            ("", false),
        ] {
            let mut output = Vec::new();
            let mut confirmer = PromptConfirmer::new(Cursor::new(input), &mut output);
            assert_eq!(confirmer.confirm(&contact), expected, "input {input:?}");
            drop(confirmer);
            assert_eq!(output, b"Resume (y/N): ");
        }
    }
}
