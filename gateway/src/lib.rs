mod client;
mod types;

pub use client::{CreatePayment, CreateRefund, HttpGateway, PaymentGateway};
pub use types::{Amount, Confirmation, PaymentInternal, PaymentMethod, PaymentStatus, RefundInternal};
