//! # mail-adapters
//!
//! Outbound email: askama-rendered HTML, a bounded dispatch queue in front
//! of a pluggable transport (log, sendmail or SMTP), and a dead-letter log
//! for anything undelivered.

pub mod compose;
pub mod dead_letter;
pub mod dispatcher;
pub mod error;
pub mod transport;

pub use compose::{compose, Letterhead, OutgoingMail};
pub use dead_letter::DeadLetterLog;
pub use dispatcher::{DispatchSettings, MailDispatcher, MailWorker};
pub use error::MailError;
pub use transport::{
    build_transport, render_rfc5322, LogTransport, MailTransport, SendmailTransport, SmtpSecurity,
    SmtpSettings, SmtpTransport, TransportConfig,
};
