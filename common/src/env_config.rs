use std::{env, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration for the payment gateway account.
pub struct GatewayConfig {
    /// Base URL of the gateway API.
    pub base_url: String,
    /// Shop/account identifier used for basic auth.
    pub account_id: String,
    /// API secret key used for basic auth.
    pub secret_key: String,
    /// URL the gateway redirects the payer back to after confirmation.
    pub return_url: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        GatewayConfig {
            base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.yookassa.ru/v3".to_string()),
            account_id: env::var("GATEWAY_ACCOUNT_ID").expect("GATEWAY_ACCOUNT_ID must be set"),
            secret_key: env::var("GATEWAY_SECRET_KEY").expect("GATEWAY_SECRET_KEY must be set"),
            return_url: env::var("GATEWAY_RETURN_URL")
                .unwrap_or_else(|_| "http://localhost:3000/payment/return".to_string()),
        }
    }
}

#[derive(Clone, Debug)]
/// Configuration for service-to-service bearer tokens.
///
/// Both services share one secret; a caller signs a short-lived token and the
/// callee validates it with the same secret.
pub struct ServiceAuthConfig {
    /// The shared secret used to sign and verify service tokens.
    pub secret: String,
    /// Token lifetime in minutes.
    pub expiration_minutes: i64,
}

impl ServiceAuthConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        ServiceAuthConfig {
            secret: env::var("SERVICE_JWT_SECRET").expect("SERVICE_JWT_SECRET must be set"),
            expiration_minutes: env::var("SERVICE_JWT_EXPIRATION_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .expect("SERVICE_JWT_EXPIRATION_MINUTES must be a valid number"),
        }
    }
}

#[derive(Clone, Debug)]
/// Knobs for the billing reconciliation jobs.
pub struct BillingJobsConfig {
    /// Row-level attempt ceiling; rows past it are excluded from batches.
    pub payment_attempts_limit: i32,
    /// Rows fetched per page while draining a batch.
    pub batch_size: i64,
    /// Seconds between new-payment processor runs.
    pub process_new_interval_secs: u64,
    /// Seconds between pending-payment checker runs.
    pub check_pending_interval_secs: u64,
}

impl BillingJobsConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        BillingJobsConfig {
            payment_attempts_limit: env::var("PAYMENT_ATTEMPTS_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("PAYMENT_ATTEMPTS_LIMIT must be a valid number"),
            batch_size: env::var("JOB_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .expect("JOB_BATCH_SIZE must be a valid number"),
            process_new_interval_secs: env::var("PROCESS_NEW_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("PROCESS_NEW_INTERVAL_SECS must be a valid number"),
            check_pending_interval_secs: env::var("CHECK_PENDING_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("CHECK_PENDING_INTERVAL_SECS must be a valid number"),
        }
    }
}

#[derive(Clone, Debug)]
/// Configuration struct for the billing service.
///
/// Holds the database connection, HTTP server parameters, the payment
/// gateway account, the subscriptions sibling-service address and the
/// reconciliation job knobs.
pub struct BillingConfig {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Payment gateway account.
    pub gateway: GatewayConfig,
    /// Shared-secret config for tokens sent to the subscriptions service.
    pub service_auth: ServiceAuthConfig,
    /// Base URL of the subscriptions service.
    pub subscriptions_base_url: String,
    /// Reconciliation job knobs.
    pub jobs: BillingJobsConfig,
}

impl BillingConfig {
    /// Creates a new `BillingConfig` instance from environment variables.
    ///
    /// Required: `ENVIRONMENT`, `DATABASE_URL`, `GATEWAY_ACCOUNT_ID`,
    /// `GATEWAY_SECRET_KEY`, `SERVICE_JWT_SECRET`. Everything else has a
    /// default.
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing or a numeric value cannot be
    /// parsed.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(BillingConfig {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            gateway: GatewayConfig::from_env(),
            service_auth: ServiceAuthConfig::from_env(),
            subscriptions_base_url: env::var("SUBSCRIPTIONS_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            jobs: BillingJobsConfig::from_env(),
        })
    }
}

#[derive(Clone, Debug)]
/// Knobs for the subscription renewal scanner.
pub struct RenewalJobConfig {
    /// UTC hour of the daily renewal scan.
    pub renewal_hour: u32,
    /// How many days ahead of expiry a subscription becomes renewable.
    pub lookahead_days: i64,
    /// Rows fetched per page while draining a batch.
    pub batch_size: i64,
}

impl RenewalJobConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        RenewalJobConfig {
            renewal_hour: env::var("RENEWAL_HOUR")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .expect("RENEWAL_HOUR must be a valid number"),
            lookahead_days: env::var("RENEWAL_LOOKAHEAD_DAYS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("RENEWAL_LOOKAHEAD_DAYS must be a valid number"),
            batch_size: env::var("JOB_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .expect("JOB_BATCH_SIZE must be a valid number"),
        }
    }
}

#[derive(Clone, Debug)]
/// Configuration struct for the subscriptions service.
pub struct SubscriptionsConfig {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// Shared-secret config for tokens sent to the billing service.
    pub service_auth: ServiceAuthConfig,
    /// Base URL of the billing service.
    pub billing_base_url: String,
    /// Renewal scanner knobs.
    pub jobs: RenewalJobConfig,
}

impl SubscriptionsConfig {
    /// Creates a new `SubscriptionsConfig` instance from environment
    /// variables.
    ///
    /// Required: `ENVIRONMENT`, `DATABASE_URL`, `SERVICE_JWT_SECRET`.
    /// Everything else has a default.
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing or a numeric value cannot be
    /// parsed.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(SubscriptionsConfig {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .unwrap_or(8081),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            service_auth: ServiceAuthConfig::from_env(),
            billing_base_url: env::var("BILLING_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            jobs: RenewalJobConfig::from_env(),
        })
    }
}
