use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgSslMode},
};
use std::{str::FromStr, sync::Arc};

pub mod subscription_types;
pub mod subscriptions;
pub mod transactions;

pub mod models {
    pub mod subscription;
    pub mod transaction;
}

/// True when the error is a Postgres unique-key violation (SQLSTATE 23505).
/// Callers translate this into a domain-level conflict instead of retrying.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

async fn connect(database_url: &str, require_ssl: bool) -> Result<PgPool, Box<dyn std::error::Error>> {
    let url = url::Url::parse(database_url)?;
    let db_name = url.path().trim_start_matches('/');
    let username = url.username();
    let password = url.password().unwrap_or("");
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(5432);

    let admin_url = format!(
        "postgresql://{}:{}@{}:{}/postgres",
        username, password, host, port
    );

    let mut admin_options = PgConnectOptions::from_str(&admin_url)?;
    if require_ssl {
        admin_options = admin_options.ssl_mode(PgSslMode::Require);
    }

    let admin_pool = PgPool::connect_with(admin_options).await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&admin_pool)
            .await?;

    if !exists {
        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&admin_pool)
            .await?;
    }

    admin_pool.close().await;

    let mut options = PgConnectOptions::from_str(database_url)?;
    if require_ssl {
        options = options.ssl_mode(PgSslMode::Require);
    }
    let pool = PgPool::connect_with(options).await?;

    Ok(pool)
}

/// Connects to the billing ledger database, creating it if missing, and runs
/// the billing migration set.
pub async fn setup_billing(
    database_url: &str,
    require_ssl: bool,
) -> Result<Arc<PgPool>, Box<dyn std::error::Error>> {
    let pool = connect(database_url, require_ssl).await?;
    sqlx::migrate!("./migrations/billing").run(&pool).await?;
    Ok(Arc::new(pool))
}

/// Connects to the subscription registry database, creating it if missing,
/// and runs the subscriptions migration set.
pub async fn setup_subscriptions(
    database_url: &str,
    require_ssl: bool,
) -> Result<Arc<PgPool>, Box<dyn std::error::Error>> {
    let pool = connect(database_url, require_ssl).await?;
    sqlx::migrate!("./migrations/subscriptions")
        .run(&pool)
        .await?;
    Ok(Arc::new(pool))
}
