//! # Portfolio Binary
//!
//! Assembles the application from compile-time features and settings.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use api_adapters::{AppState, HttpSettings, Metrics};
use auth_adapters::{AdminCredentials, SessionManager, SignedBlockTokens};
use chrono::Duration;
use configs::{LogFormat, LoggingSettings, MailTransportKind, Settings};
use domains::{
    AssetStorage, Clock, MediaRepository, MessageRepository, StoreHealth, SystemClock,
};
use mail_adapters::{
    build_transport, DispatchSettings, Letterhead, MailDispatcher, MailTransport, SmtpSecurity,
    SmtpSettings, TransportConfig,
};
use secrecy::{ExposeSecret, SecretString};
use services::{MediaService, MessageService, MessageSettings, RateLimitPolicy, RateLimiter};
use storage_adapters::{InMemoryStore, JpegOptimizer, TimedStorage};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "db-postgres")]
use storage_adapters::PgStore;

#[cfg(feature = "media-local")]
use storage_adapters::LocalAssetStorage;

#[cfg(not(feature = "media-local"))]
compile_error!("the portfolio binary needs an asset storage backend: enable `media-local`");

/// The three persistence ports, backed by one store.
struct Stores {
    messages: Arc<dyn MessageRepository>,
    media: Arc<dyn MediaRepository>,
    health: Arc<dyn StoreHealth>,
}

impl Stores {
    fn backed_by<T>(store: Arc<T>) -> Self
    where
        T: MessageRepository + MediaRepository + StoreHealth + 'static,
    {
        Self {
            messages: store.clone(),
            media: store.clone(),
            health: store,
        }
    }
}

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

async fn connect_store(settings: &Settings) -> anyhow::Result<Stores> {
    match &settings.database.url {
        Some(url) => connect_database(settings, url).await,
        None => Ok(Stores::backed_by(Arc::new(InMemoryStore::new()))),
    }
}

#[cfg(feature = "db-postgres")]
async fn connect_database(settings: &Settings, url: &SecretString) -> anyhow::Result<Stores> {
    let store = PgStore::connect(
        url.expose_secret(),
        settings.database.max_connections,
        settings.database.connect_timeout(),
    )
    .await
    .context("connecting to postgres")?;
    store.migrate().await.context("running migrations")?;
    Ok(Stores::backed_by(Arc::new(store)))
}

#[cfg(not(feature = "db-postgres"))]
async fn connect_database(_settings: &Settings, _url: &SecretString) -> anyhow::Result<Stores> {
    anyhow::bail!("database.url is set but this build has no `db-postgres` feature")
}

fn mail_transport(settings: &Settings) -> anyhow::Result<Arc<dyn MailTransport>> {
    let mail = &settings.mail;
    let config = match mail.transport {
        MailTransportKind::Log => TransportConfig::Log,
        MailTransportKind::Sendmail => TransportConfig::Sendmail {
            program: mail.sendmail_path.clone(),
        },
        MailTransportKind::Smtp => TransportConfig::Smtp(SmtpSettings {
            host: mail.host.clone().unwrap_or_default(),
            port: mail.port,
            username: mail.username.clone().unwrap_or_default(),
            password: SecretString::from(
                mail.password
                    .as_ref()
                    .map(|p| p.expose_secret().to_owned())
                    .unwrap_or_default(),
            ),
            security: if mail.implicit_tls() {
                SmtpSecurity::Implicit
            } else {
                SmtpSecurity::StartTls
            },
            timeout: mail.send_timeout(),
        }),
    };
    let transport = build_transport(config).context("building the mail transport")?;
    info!(transport = transport.name(), "mail transport ready");
    Ok(transport)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.logging);
    for note in settings.advisories() {
        warn!("{note}");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stores = connect_store(&settings).await?;

    let storage: Arc<dyn AssetStorage> = Arc::new(TimedStorage::new(
        Arc::new(LocalAssetStorage::new(
            settings.storage.root.clone(),
            settings.storage.url_prefix.clone(),
            settings.storage.api_key.clone(),
            SecretString::from(settings.storage.api_secret.expose_secret().to_owned()),
        )),
        settings.storage.timeout(),
    ));

    let (mailer, mail_worker) = MailDispatcher::spawn(
        mail_transport(&settings)?,
        Letterhead {
            from: settings.mail.from.clone(),
            admin_address: settings.mail.admin_address.clone(),
            owner_name: settings.mail.owner_name.clone(),
        },
        DispatchSettings {
            queue_capacity: settings.mail.queue_capacity,
            max_concurrent_sends: settings.mail.max_concurrent_sends,
            send_timeout: settings.mail.send_timeout(),
            dead_letter_path: settings.mail.dead_letter_path.clone(),
        },
    );

    let secret = settings.auth.session_secret.expose_secret().as_bytes();
    let sessions = Arc::new(SessionManager::new(
        secret,
        AdminCredentials {
            email: settings.auth.admin_email.clone(),
            password: SecretString::from(settings.auth.admin_password.expose_secret().to_owned()),
        },
        Duration::hours(i64::from(settings.auth.session_ttl_hours)),
    ));

    let limiter = RateLimiter::new(
        stores.messages.clone(),
        RateLimitPolicy {
            window: Duration::minutes(i64::from(settings.limits.window_minutes)),
            max_messages: settings.limits.max_messages,
        },
    );
    let messages = Arc::new(MessageService::new(
        stores.messages.clone(),
        limiter,
        Arc::new(SignedBlockTokens::new(secret)),
        Arc::new(mailer),
        clock.clone(),
        MessageSettings {
            public_url: settings.server.public_url.clone(),
            block_token_max_age: Duration::days(i64::from(settings.auth.block_token_max_age_days)),
        },
    ));
    let media = Arc::new(MediaService::new(
        stores.media.clone(),
        storage,
        Arc::new(JpegOptimizer),
        clock.clone(),
    ));

    let state = AppState {
        messages,
        media,
        sessions: sessions.clone(),
        store: stores.health.clone(),
        clock: clock.clone(),
        metrics: Arc::new(Metrics::new()),
        http: Arc::new(HttpSettings {
            frontend_dir: settings.server.frontend_dir.clone(),
            uploads: Some((
                settings.storage.url_prefix.clone(),
                settings.storage.root.clone(),
            )),
            max_upload_bytes: settings.server.max_upload_bytes(),
            secure_cookies: settings.server.public_url.starts_with("https://"),
            cors_origins: settings.server.cors_origins.clone(),
            owner_name: settings.mail.owner_name.clone(),
        }),
    };

    let purge = {
        let sessions = sessions.clone();
        let clock = clock.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(15 * 60));
            loop {
                ticker.tick().await;
                let purged = sessions.purge_expired(clock.now());
                if purged > 0 {
                    info!(purged, "expired admin sessions removed");
                }
            }
        })
    };

    let app = api_adapters::router(state);
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("server.host/server.port do not form a socket address")?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, public_url = %settings.server.public_url, "portfolio backend listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    purge.abort();
    // The router (and every mailer clone in it) is gone; let queued mail out.
    mail_worker.drain(StdDuration::from_secs(15)).await;
    info!("portfolio backend stopped");
    Ok(())
}
