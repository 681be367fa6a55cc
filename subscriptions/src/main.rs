use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use common::env_config::SubscriptionsConfig;
use common::retry::RetryPolicy;
use scheduler::{Cadence, Scheduler};
use subscriptions::clients::billing::{BillingApi, BillingClient};
use subscriptions::jobs::renewal::SubscriptionsRenewal;
use subscriptions::store::{PgSubscriptionStore, SubscriptionStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = SubscriptionsConfig::from_env();
    let config_data = config.clone();

    let is_production = config.environment == "production";

    // init logger
    if config.console_logging_enabled {
        logger::setup("subscriptions.log").expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup_subscriptions(&config.database_url, is_production)
        .await
        .expect("Failed to set up database");

    // clients are constructed once and passed into jobs and routes
    let billing_client: Arc<dyn BillingApi> = Arc::new(BillingClient::new(
        config.billing_base_url.clone(),
        config.service_auth.clone(),
        RetryPolicy::default(),
    ));
    let store: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(pool.clone()));

    // renewal scanner
    let mut jobs = Scheduler::new();
    jobs.register(
        Arc::new(SubscriptionsRenewal::new(
            store.clone(),
            billing_client.clone(),
            config.jobs.clone(),
        )),
        Cadence::DailyAt {
            hour: config.jobs.renewal_hour,
            minute: 0,
        },
    );

    let billing_data: web::Data<dyn BillingApi> = web::Data::from(billing_client.clone());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(billing_data.clone())
            .wrap(logger::middleware())
            .service(subscriptions::mount_internal(
                &config_data.service_auth.secret,
            ))
            .service(subscriptions::mount_me())
            .service(subscriptions::mount_types())
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
