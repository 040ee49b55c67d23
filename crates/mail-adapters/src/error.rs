use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("template rendering failed: {0}")]
    Render(#[from] askama::Error),

    #[error("transport failed: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("dispatch queue is full")]
    QueueFull,

    #[error("dispatcher has shut down")]
    Closed,
}
