use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde::Deserialize;

use crate::identity::{normalize_handle, sanitize_wallet_address};
use crate::models::proof::{AvatarStatus, Platform};
use crate::state::AppState;

use super::HttpError;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(query_proofs))
}

#[derive(Debug, Deserialize)]
pub struct ProofQuery {
    platform: Platform,
    identity: String,
    exact: Option<bool>,
}

async fn query_proofs(
    State(state): State<AppState>,
    Query(query): Query<ProofQuery>,
) -> Result<Json<AvatarStatus>, HttpError> {
    let identity = match query.platform {
        Platform::Ethereum => sanitize_wallet_address(&query.identity),
        Platform::Twitter => normalize_handle(&query.identity),
    }
    .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let status = state
        .proof_client
        .query_status(query.platform, &identity, query.exact.unwrap_or(true))
        .await?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::http::tests::{get, send, test_app};
    use crate::proof::ServiceMethod;
    use crate::proof::testing::avatar_status_json;

    #[tokio::test]
    async fn proofs_require_configured_service() {
        let app = test_app(None, false);
        let (status, _) = send(
            &app.router,
            get("/proofs?platform=twitter&identity=alice"),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(app.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn identity_is_normalized_before_query() {
        let app = test_app(Some("https://proof.test"), false);
        app.mock.push_json(200, avatar_status_json());

        let (status, body) = send(
            &app.router,
            get("/proofs?platform=twitter&identity=%40Alice&exact=false"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["ids"].is_array());

        let calls = app.mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, ServiceMethod::Get);
        assert!(calls[0].url.contains("identity=alice"));
        assert!(calls[0].url.contains("exact=false"));
    }

    #[tokio::test]
    async fn bad_identity_and_upstream_errors_are_mapped() {
        let app = test_app(Some("https://proof.test"), false);
        let (status, _) = send(
            &app.router,
            get("/proofs?platform=ethereum&identity=not-an-address"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        app.mock.push_text(404, "");
        let (status, _) = send(
            &app.router,
            get("/proofs?platform=twitter&identity=alice"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        app.mock.push_text(500, r#"{"message":"internal"}"#);
        let (status, body) = send(
            &app.router,
            get("/proofs?platform=twitter&identity=alice"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("internal"));
    }
}
