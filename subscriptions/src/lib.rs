use actix_web::web::{self};
use common::middleware::ServiceAuthMiddleware;

pub mod clients {
    pub mod billing;
}

pub mod dtos {
    pub mod subscription;
}

pub mod jobs {
    pub mod renewal;
    #[cfg(test)]
    pub(crate) mod fakes;
}

pub mod routes {
    pub mod me_subscriptions;
    pub mod subscription_types;
    pub mod user_subscriptions;
}

pub mod services {
    pub mod refund;
    pub mod subscriptions;
}

pub mod store;

/// Internal surface consumed by the billing service.
pub fn mount_internal(service_secret: &str) -> impl actix_web::dev::HttpServiceFactory + use<> {
    web::scope("/user_subscriptions")
        .wrap(ServiceAuthMiddleware::new(service_secret.to_string()))
        .service(routes::user_subscriptions::post_activate)
        .service(routes::user_subscriptions::post_cancel)
}

/// User-facing subscription lifecycle.
pub fn mount_me() -> actix_web::Scope {
    web::scope("/me/subscriptions")
        .service(routes::me_subscriptions::get_list)
        .service(routes::me_subscriptions::post_subscribe)
        .service(routes::me_subscriptions::post_cancel)
}

pub fn mount_types() -> actix_web::Scope {
    web::scope("/subscription_types")
        .service(routes::subscription_types::get_list)
        .service(routes::subscription_types::get_one)
}
