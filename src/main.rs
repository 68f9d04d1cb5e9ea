use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use notary_payments::config::AppConfig;
use notary_payments::gateways::mock::MockProvider;
use notary_payments::gateways::stripe::StripeProvider;
use notary_payments::gateways::PaymentProvider;
use notary_payments::http::handlers::{ops, payment_failures, payment_retry};
use notary_payments::http::middleware::admin_auth::require_internal_api_key;
use notary_payments::queue::store_redis::RedisJobQueue;
use notary_payments::repo::payments_repo::PaymentsRepo;
use notary_payments::retry::store_redis::{PaymentLockRedis, RetryHistoryRedis};
use notary_payments::service::retry_service::PaymentRetryService;
use notary_payments::service::retry_worker::RetryWorker;
use notary_payments::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;

    let provider: Arc<dyn PaymentProvider> = if cfg.stripe_secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY not set, retries go to the mock provider");
        Arc::new(MockProvider {
            behavior: std::env::var("MOCK_PROVIDER_BEHAVIOR").unwrap_or_else(|_| "ALWAYS_SUCCESS".to_string()),
        })
    } else {
        Arc::new(StripeProvider {
            base_url: cfg.stripe_base_url.clone(),
            secret_key: cfg.stripe_secret_key.clone(),
            timeout_ms: cfg.provider_timeout_ms,
            client: reqwest::Client::new(),
        })
    };

    let queue = Arc::new(RedisJobQueue::new(redis_client.clone()));
    let retry_service = PaymentRetryService {
        config: cfg.retry.clone(),
        payments: Arc::new(PaymentsRepo { pool: pool.clone() }),
        history: Arc::new(RetryHistoryRedis::new(redis_client.clone())),
        locks: Arc::new(PaymentLockRedis::new(redis_client.clone())),
        queue: queue.clone(),
        provider,
    };

    let worker = RetryWorker {
        service: retry_service.clone(),
        queue,
        batch_size: cfg.worker_batch_size,
        poll_interval: std::time::Duration::from_millis(cfg.worker_poll_ms),
    };
    tokio::spawn(worker.run());

    let state = AppState {
        retry_service,
        pool,
        redis_client,
    };

    let admin_routes = Router::new()
        .route("/admin/payment-failures", get(payment_failures::list_payment_failures))
        .layer(from_fn_with_state(cfg.internal_api_key.clone(), require_internal_api_key));

    let app = Router::new()
        .route("/health", get(ops::liveness))
        .route("/payments/:payment_id/failures", post(payment_retry::report_failure))
        .route("/payments/:payment_id/retries", post(payment_retry::execute_retry))
        .route("/payments/:payment_id/retry-status", get(payment_retry::get_retry_status))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .merge(admin_routes)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
