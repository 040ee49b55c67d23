//! # MailDispatcher
//!
//! Bounded queue in front of a worker that sends with capped concurrency.
//! `notify` never waits: when the queue is full the email is dead-lettered
//! on the spot. Each send has its own deadline, and anything that fails to
//! render or deliver ends up in the [`DeadLetterLog`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use domains::{Notification, Notifier};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::compose::{compose, Letterhead};
use crate::dead_letter::DeadLetterLog;
use crate::error::MailError;
use crate::transport::MailTransport;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub queue_capacity: usize,
    pub max_concurrent_sends: usize,
    pub send_timeout: Duration,
    pub dead_letter_path: Option<PathBuf>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_concurrent_sends: 4,
            send_timeout: Duration::from_secs(10),
            dead_letter_path: None,
        }
    }
}

#[derive(Clone)]
pub struct MailDispatcher {
    tx: mpsc::Sender<Notification>,
    dead_letters: Arc<DeadLetterLog>,
}

/// Handle on the background worker, used to drain the queue at shutdown.
pub struct MailWorker {
    handle: JoinHandle<()>,
}

impl MailWorker {
    /// Waits for queued and in-flight sends, up to `within`. The worker stops
    /// once every [`MailDispatcher`] clone has been dropped.
    pub async fn drain(self, within: Duration) {
        match timeout(within, self.handle).await {
            Ok(Ok(())) => info!("mail queue drained"),
            Ok(Err(err)) => warn!(error = %err, "mail worker ended abnormally"),
            Err(_) => warn!(?within, "mail queue not drained in time"),
        }
    }
}

impl MailDispatcher {
    /// Spawns the worker on the current runtime.
    pub fn spawn(
        transport: Arc<dyn MailTransport>,
        letterhead: Letterhead,
        settings: DispatchSettings,
    ) -> (Self, MailWorker) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let dead_letters = Arc::new(DeadLetterLog::new(settings.dead_letter_path.clone()));
        let worker = Worker {
            rx,
            transport,
            letterhead: Arc::new(letterhead),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_sends.max(1))),
            max_concurrent: settings.max_concurrent_sends.max(1),
            send_timeout: settings.send_timeout,
            dead_letters: dead_letters.clone(),
        };
        let handle = tokio::spawn(worker.run());
        (Self { tx, dead_letters }, MailWorker { handle })
    }

    fn reject(&self, notification: Notification, err: MailError) {
        let dead_letters = self.dead_letters.clone();
        let reason = err.to_string();
        tokio::spawn(async move { dead_letters.record(&notification, &reason).await });
    }
}

impl Notifier for MailDispatcher {
    fn notify(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => debug!("email queued"),
            Err(TrySendError::Full(notification)) => self.reject(notification, MailError::QueueFull),
            Err(TrySendError::Closed(notification)) => self.reject(notification, MailError::Closed),
        }
    }
}

struct Worker {
    rx: mpsc::Receiver<Notification>,
    transport: Arc<dyn MailTransport>,
    letterhead: Arc<Letterhead>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    send_timeout: Duration,
    dead_letters: Arc<DeadLetterLog>,
}

impl Worker {
    async fn run(mut self) {
        while let Some(notification) = self.rx.recv().await {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            let transport = self.transport.clone();
            let letterhead = self.letterhead.clone();
            let dead_letters = self.dead_letters.clone();
            let send_timeout = self.send_timeout;
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) =
                    deliver(transport.as_ref(), &letterhead, &notification, send_timeout).await
                {
                    dead_letters.record(&notification, &err.to_string()).await;
                }
            });
        }

        // Senders are gone; wait for in-flight sends to finish.
        let _ = self.permits.acquire_many(self.max_concurrent as u32).await;
    }
}

async fn deliver(
    transport: &dyn MailTransport,
    letterhead: &Letterhead,
    notification: &Notification,
    send_timeout: Duration,
) -> Result<(), MailError> {
    let mail = compose(notification, letterhead)?;
    timeout(send_timeout, transport.send(&mail))
        .await
        .map_err(|_| MailError::Timeout(send_timeout))?
        .map_err(MailError::Transport)?;
    debug!(to = %mail.to, subject = %mail.subject, "email sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::compose::OutgoingMail;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailTransport for Recording {
        async fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl MailTransport for Failing {
        async fn send(&self, _: &OutgoingMail) -> anyhow::Result<()> {
            anyhow::bail!("relay refused")
        }
    }

    struct Slow;

    #[async_trait]
    impl MailTransport for Slow {
        async fn send(&self, _: &OutgoingMail) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn letterhead() -> Letterhead {
        Letterhead {
            from: "noreply@folio.test".into(),
            admin_address: "owner@folio.test".into(),
            owner_name: "Ada".into(),
        }
    }

    fn new_message(name: &str) -> Notification {
        Notification::AdminNewMessage {
            name: name.into(),
            email: "a@x.com".into(),
            message: "hi".into(),
        }
    }

    fn scratch_file() -> PathBuf {
        std::env::temp_dir().join(format!("dead-letters-{}.jsonl", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn queued_notifications_are_delivered_before_drain_returns() {
        let transport = Arc::new(Recording::default());
        let (dispatcher, worker) =
            MailDispatcher::spawn(transport.clone(), letterhead(), DispatchSettings::default());

        dispatcher.notify(new_message("one"));
        dispatcher.notify(new_message("two"));
        drop(dispatcher);
        worker.drain(Duration::from_secs(5)).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.to == "owner@folio.test"));
    }

    #[tokio::test]
    async fn transport_failures_are_dead_lettered() {
        let path = scratch_file();
        let settings = DispatchSettings {
            dead_letter_path: Some(path.clone()),
            ..DispatchSettings::default()
        };
        let (dispatcher, worker) = MailDispatcher::spawn(Arc::new(Failing), letterhead(), settings);

        dispatcher.notify(new_message("one"));
        drop(dispatcher);
        worker.drain(Duration::from_secs(5)).await;

        let log = std::fs::read_to_string(&path).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("relay refused"));
        assert!(log.contains("admin_new_message"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn slow_sends_hit_the_deadline() {
        let path = scratch_file();
        let settings = DispatchSettings {
            send_timeout: Duration::from_millis(50),
            dead_letter_path: Some(path.clone()),
            ..DispatchSettings::default()
        };
        let (dispatcher, worker) = MailDispatcher::spawn(Arc::new(Slow), letterhead(), settings);

        dispatcher.notify(new_message("one"));
        drop(dispatcher);
        worker.drain(Duration::from_secs(5)).await;

        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("timed out"));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn overflow_is_rejected_without_waiting() {
        let transport = Arc::new(Recording::default());
        let settings = DispatchSettings {
            queue_capacity: 1,
            max_concurrent_sends: 1,
            ..DispatchSettings::default()
        };
        let (dispatcher, worker) = MailDispatcher::spawn(transport.clone(), letterhead(), settings);

        // No await in between, so the worker cannot drain the queue yet.
        dispatcher.notify(new_message("one"));
        dispatcher.notify(new_message("two"));
        dispatcher.notify(new_message("three"));
        drop(dispatcher);
        worker.drain(Duration::from_secs(5)).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
    }
}
