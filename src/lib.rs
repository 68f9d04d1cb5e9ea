pub mod config;
pub mod domain {
    pub mod booking;
    pub mod payment;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod ops;
        pub mod payment_failures;
        pub mod payment_retry;
    }
    pub mod middleware {
        pub mod admin_auth;
    }
}
pub mod queue;
pub mod repo {
    pub mod payments_repo;
}
pub mod retry;
pub mod service {
    pub mod retry_service;
    pub mod retry_worker;
}

#[derive(Clone)]
pub struct AppState {
    pub retry_service: service::retry_service::PaymentRetryService,
    pub pool: sqlx::PgPool,
    pub redis_client: redis::Client,
}
