//! Mail transport seam and the SMTP implementation.

use std::time::Duration;

use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use secrecy::{ExposeSecret, SecretString};

use crate::error::TransportError;
use crate::message::ComposedMessage;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One authenticated mail session.
pub trait MailTransport {
    fn login(&mut self, user: &str, password: &SecretString) -> Result<(), TransportError>;

    fn send(&mut self, message: &ComposedMessage) -> Result<(), TransportError>;
}

/// A single implicit-TLS SMTP connection.
pub struct SmtpSession {
    server: String,
    connection: SmtpConnection,
    authenticated: bool,
}

impl SmtpSession {
    /// Open a TLS connection to `server:port` and greet the server.
    pub fn connect(server: &str, port: u16) -> Result<Self, TransportError> {
        let connect_err = |reason: String| TransportError::Connect {
            server: server.to_string(),
            port,
            reason,
        };
        let tls = TlsParameters::new(server.to_string()).map_err(|e| connect_err(e.to_string()))?;
        let hello = ClientId::Domain("localhost".to_string());
        let connection = SmtpConnection::connect(
            (server, port),
            Some(CONNECT_TIMEOUT),
            &hello,
            Some(&tls),
            None,
        )
        .map_err(|e| connect_err(e.to_string()))?;
        tracing::info!(server = %server, port, "SMTP session opened");
        Ok(Self {
            server: server.to_string(),
            connection,
            authenticated: false,
        })
    }
}

impl MailTransport for SmtpSession {
    fn login(&mut self, user: &str, password: &SecretString) -> Result<(), TransportError> {
        let credentials = Credentials::new(user.to_string(), password.expose_secret().to_string());
        self.connection
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .map_err(|e| TransportError::Auth {
                user: user.to_string(),
                reason: e.to_string(),
            })?;
        self.authenticated = true;
        tracing::info!(server = %self.server, user = %user, "SMTP login succeeded");
        Ok(())
    }

    fn send(&mut self, message: &ComposedMessage) -> Result<(), TransportError> {
        if !self.authenticated {
            return Err(TransportError::NotAuthenticated);
        }
        let to = message.to.email.to_string();
        let mime = message.mime();
        self.connection
            .send(mime.envelope(), &mime.formatted())
            .map_err(|e| TransportError::Send {
                to: to.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!("Email sent to {to}");
        Ok(())
    }
}

impl Drop for SmtpSession {
    fn drop(&mut self) {
        if let Err(e) = self.connection.quit() {
            tracing::debug!("SMTP quit failed: {e}");
        }
    }
}
