use actix_web::web::{self};
use common::middleware::ServiceAuthMiddleware;

pub mod clients {
    pub mod subscriptions;
}

pub mod dtos {
    pub mod payment;
}

pub mod jobs {
    pub mod check_pending;
    pub mod process_new;
    #[cfg(test)]
    pub(crate) mod fakes;
}

pub mod routes {
    pub mod payments;
}

pub mod services {
    pub mod payments;
}

pub mod store;

/// The payments surface consumed by the subscriptions service.
pub fn mount_payments(service_secret: &str) -> impl actix_web::dev::HttpServiceFactory + use<> {
    web::scope("/payments")
        .wrap(ServiceAuthMiddleware::new(service_secret.to_string()))
        .service(routes::payments::post_new)
        .service(routes::payments::post_renew)
        .service(routes::payments::post_refund)
        .service(routes::payments::get_list)
}
