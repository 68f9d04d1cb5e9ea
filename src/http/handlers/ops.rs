use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub status: &'static str,
    pub provider: Option<&'static str>,
    pub checks: Vec<DependencyCheck>,
}

#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub name: &'static str,
    pub ok: bool,
}

async fn redis_ping(client: &redis::Client) -> bool {
    let Ok(mut conn) = client.get_multiplexed_async_connection().await else {
        return false;
    };
    redis::cmd("PING").query_async::<_, String>(&mut conn).await.is_ok()
}

/// Ready once Postgres and Redis both answer; the retry flow needs both.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let checks = vec![
        DependencyCheck {
            name: "postgres",
            ok: sqlx::query("SELECT 1").execute(&state.pool).await.is_ok(),
        },
        DependencyCheck {
            name: "redis",
            ok: redis_ping(&state.redis_client).await,
        },
    ];

    let ready = checks.iter().all(|c| c.ok);
    if !ready {
        tracing::warn!(?checks, "readiness check failed");
    }
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let report = ProbeReport {
        status: if ready { "ready" } else { "unavailable" },
        provider: Some(state.retry_service.provider.name()),
        checks,
    };
    (code, Json(report))
}

pub async fn liveness() -> impl IntoResponse {
    Json(ProbeReport {
        status: "alive",
        provider: None,
        checks: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_reports_alive_without_dependency_checks() {
        let response = liveness().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "alive");
        assert!(json["provider"].is_null());
        assert_eq!(json["checks"], serde_json::json!([]));
    }
}
