use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use billing::clients::subscriptions::{SubscriptionsApi, SubscriptionsClient};
use billing::jobs::{check_pending::CheckPendingPayments, process_new::ProcessNewPayments};
use billing::store::{PgTransactionStore, TransactionStore};
use common::env_config::BillingConfig;
use common::retry::RetryPolicy;
use gateway::{HttpGateway, PaymentGateway};
use scheduler::{Cadence, Scheduler};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = BillingConfig::from_env();
    let config_data = config.clone();

    let is_production = config.environment == "production";

    // init logger
    if config.console_logging_enabled {
        logger::setup("billing.log").expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup_billing(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");

    // clients are constructed once and passed into jobs and routes
    let gateway_client: Arc<dyn PaymentGateway> = Arc::new(HttpGateway::new(
        config.gateway.clone(),
        RetryPolicy::default(),
    ));
    let subscriptions_client: Arc<dyn SubscriptionsApi> = Arc::new(SubscriptionsClient::new(
        config.subscriptions_base_url.clone(),
        config.service_auth.clone(),
        RetryPolicy::default(),
    ));
    let store: Arc<dyn TransactionStore> = Arc::new(PgTransactionStore::new(pool.clone()));

    // reconciliation jobs
    let mut jobs = Scheduler::new();
    jobs.register(
        Arc::new(ProcessNewPayments::new(
            store.clone(),
            gateway_client.clone(),
            subscriptions_client.clone(),
            config.jobs.clone(),
        )),
        Cadence::Every(Duration::from_secs(config.jobs.process_new_interval_secs)),
    );
    jobs.register(
        Arc::new(CheckPendingPayments::new(
            store.clone(),
            gateway_client.clone(),
            subscriptions_client.clone(),
            config.jobs.clone(),
        )),
        Cadence::Every(Duration::from_secs(config.jobs.check_pending_interval_secs)),
    );

    let gateway_data: web::Data<dyn PaymentGateway> = web::Data::from(gateway_client.clone());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(gateway_data.clone())
            .wrap(logger::middleware())
            .service(billing::mount_payments(&config_data.service_auth.secret))
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
