//! Record of emails that could not be delivered.
//!
//! Every entry is logged at `error`; when a path is configured it is also
//! appended as one JSON line, so failed mail can be replayed by hand.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, warn};

use domains::Notification;

#[derive(Serialize)]
struct DeadLetter<'a> {
    failed_at: DateTime<Utc>,
    reason: String,
    notification: &'a Notification,
}

pub struct DeadLetterLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl DeadLetterLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn record(&self, notification: &Notification, reason: &str) {
        error!(reason, ?notification, "email dead-lettered");

        let Some(path) = &self.path else {
            return;
        };
        let entry = DeadLetter {
            failed_at: Utc::now(),
            reason: reason.to_string(),
            notification,
        };
        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "dead letter not serializable");
                return;
            }
        };
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let written = async {
            let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(err) = written {
            warn!(error = %err, path = %path.display(), "could not append dead letter");
        }
    }
}
