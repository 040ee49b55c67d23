//! Operator tool.
//!
//! ```text
//! seed migrate                 apply database migrations from settings
//! seed hash-password [secret]  print an Argon2 PHC string (reads stdin if omitted)
//! ```

use std::io::BufRead;

use anyhow::{bail, Context};
use configs::Settings;
use secrecy::ExposeSecret;
use storage_adapters::PgStore;
use tracing::info;

const USAGE: &str = "usage: seed <migrate | hash-password [secret]>";

async fn migrate() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    let Some(url) = &settings.database.url else {
        bail!("database.url is not set (PORTFOLIO__DATABASE__URL)");
    };
    let store = PgStore::connect(
        url.expose_secret(),
        1,
        settings.database.connect_timeout(),
    )
    .await
    .context("connecting to postgres")?;
    store.migrate().await?;
    info!("database is up to date");
    Ok(())
}

fn hash_password(arg: Option<String>) -> anyhow::Result<()> {
    let secret = match arg {
        Some(secret) => secret,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if secret.is_empty() {
        bail!("refusing to hash an empty password");
    }
    let phc = auth_adapters::hash_password(&secret)
        .map_err(|err| anyhow::anyhow!("hashing failed: {err}"))?;
    println!("{phc}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate().await,
        Some("hash-password") => hash_password(args.next()),
        _ => bail!(USAGE),
    }
}
