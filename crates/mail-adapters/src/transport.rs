use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lettre::address::Envelope;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::compose::OutgoingMail;

/// Whatever actually moves bytes to a mail server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;

    /// Short label for logs.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Which transport to build, and what it needs.
pub enum TransportConfig {
    Log,
    Sendmail { program: PathBuf },
    Smtp(SmtpSettings),
}

pub fn build_transport(config: TransportConfig) -> anyhow::Result<Arc<dyn MailTransport>> {
    Ok(match config {
        TransportConfig::Log => Arc::new(LogTransport),
        TransportConfig::Sendmail { program } => Arc::new(SendmailTransport::new(program)),
        TransportConfig::Smtp(settings) => Arc::new(SmtpTransport::new(settings)?),
    })
}

/// Writes each email to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            html_bytes = mail.html.len(),
            "email delivered to log transport"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// How the SMTP connection gets its TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// TLS from the first byte, usually port 465.
    Implicit,
    /// Plain connect, then STARTTLS, usually port 587.
    StartTls,
}

pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub security: SmtpSecurity,
    pub timeout: Duration,
}

/// Authenticated SMTP relay over TLS. Connections are pooled and opened
/// lazily, so building one never touches the network.
pub struct SmtpTransport {
    relay: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpTransport {
    pub fn new(settings: SmtpSettings) -> anyhow::Result<Self> {
        let builder = match settings.security {
            SmtpSecurity::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            }
        };
        let relay = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username,
                settings.password.expose_secret().to_owned(),
            ))
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self {
            relay,
            host: settings.host,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        let from = mail.from.parse::<Mailbox>()?.email;
        let to = mail.to.parse::<Mailbox>()?.email;
        let envelope = Envelope::new(Some(from), vec![to])?;
        self.relay
            .send_raw(&envelope, render_rfc5322(mail).as_bytes())
            .await?;
        debug!(to = %mail.to, host = %self.host, "email accepted by smtp relay");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Hands each email to the local MTA through `sendmail -t -i`.
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    program: PathBuf,
}

impl SendmailTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MailTransport for SendmailTransport {
    async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        let mut child = Command::new(&self.program)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("sendmail stdin unavailable"))?;
        stdin.write_all(render_rfc5322(mail).as_bytes()).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            anyhow::bail!(
                "sendmail exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!(to = %mail.to, "email handed to sendmail");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sendmail"
    }
}

/// Header values never carry line breaks, so user text cannot add headers.
fn header_value(raw: &str) -> String {
    raw.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// RFC 2047 encoded-word for non-ASCII subjects.
fn encode_subject(subject: &str) -> String {
    let subject = header_value(subject);
    if subject.is_ascii() {
        subject
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(subject.as_bytes()))
    }
}

pub fn render_rfc5322(mail: &OutgoingMail) -> String {
    let body = STANDARD.encode(mail.html.as_bytes());
    let mut wrapped = String::with_capacity(body.len() + body.len() / 76 * 2);
    for chunk in body.as_bytes().chunks(76) {
        wrapped.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        wrapped.push_str("\r\n");
    }

    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=utf-8\r\nContent-Transfer-Encoding: base64\r\n\r\n{}",
        header_value(&mail.from),
        header_value(&mail.to),
        encode_subject(&mail.subject),
        wrapped
    )
}
