//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::api::ws;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let enable_cors = state.config.server.enable_cors;

    let router = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Handshake
        .route(
            "/authentication/:session_id",
            post(handlers::submit_credential_response),
        )
        // Credential offers
        .route("/credential-offer", get(handlers::credential_offer))
        .route("/credential-receive", post(handlers::credential_receive))
        .route("/credential-receive/", post(handlers::credential_receive))
        // Mobile deep links
        .route(
            "/mobile/credential-request",
            get(handlers::mobile_credential_request),
        )
        .route(
            "/mobile/credential-offer-request",
            get(handlers::mobile_credential_offer_request),
        )
        // Realtime channels
        .route("/ws/handshake", get(ws::handshake_socket))
        .route("/ws/qr-code", get(ws::qr_code_socket))
        .route("/ws/sso-status", get(ws::sso_status_socket))
        .route("/ws/qr-receive", get(ws::qr_receive_socket))
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::server::Server;
    use crate::wallet::LocalWallet;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use handshake_types::{ClaimSet, GatewayMessage, SessionId};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn state() -> AppState {
        Server::new(DaemonConfig::default()).await.unwrap().state()
    }

    /// Plays the mobile app against the default development wallet
    fn device() -> LocalWallet {
        LocalWallet::new("development-seed", "did:local:handshake")
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_watch_count() {
        let app = create_router(state().await);

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["watching"], 0);
    }

    #[tokio::test]
    async fn credential_response_completes_pending_session() {
        let state = state().await;
        let app = create_router(state.clone());
        let session_id = SessionId::new("abc123").unwrap();

        let GatewayMessage::Pending { token, .. } =
            state.gateway.issue_auth_code(&session_id).await.unwrap()
        else {
            panic!("expected pending message");
        };
        let response = device()
            .respond(&token, "did:x:1", ClaimSet::new().with("givenName", "Ann"))
            .unwrap();

        let first = app
            .clone()
            .oneshot(post("/authentication/abc123", json!({ "token": response })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(json_body(first).await, json!("OK"));

        let second = app
            .oneshot(post("/authentication/abc123", json!({ "token": response })))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(second).await["code"], "ALREADY_COMPLETED");
    }

    #[tokio::test]
    async fn response_to_other_session_is_unauthorized() {
        let state = state().await;
        let app = create_router(state.clone());

        state
            .gateway
            .issue_auth_code(&SessionId::new("abc123").unwrap())
            .await
            .unwrap();
        let GatewayMessage::Pending { token, .. } = state
            .gateway
            .issue_auth_code(&SessionId::new("other").unwrap())
            .await
            .unwrap()
        else {
            panic!("expected pending message");
        };
        let response = device()
            .respond(&token, "did:x:1", ClaimSet::new())
            .unwrap();

        let rejected = app
            .oneshot(post("/authentication/abc123", json!({ "token": response })))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(rejected).await["code"], "INVALID_CREDENTIAL");
    }

    #[tokio::test]
    async fn unknown_and_invalid_sessions() {
        let app = create_router(state().await);

        let response = app
            .clone()
            .oneshot(post("/authentication/ghost", json!({ "token": "t" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post("/authentication/bad%20id", json!({ "token": "t" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn offer_flow_issues_credential() {
        let app = create_router(state().await);

        let response = app.clone().oneshot(get("/credential-offer")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let offer = json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let accepted = device().accept_offer(&offer, "did:x:7").unwrap();
        let response = app
            .oneshot(post("/credential-receive/", json!({ "token": accepted })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let credential = json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(device().credential_subject(&credential).unwrap(), "did:x:7");
    }

    #[tokio::test]
    async fn mobile_request_uses_deep_link_callback() {
        let app = create_router(state().await);

        let response = app
            .oneshot(get("/mobile/credential-request"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let token = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(device()
            .respond(&token, "did:x:1", ClaimSet::new())
            .is_ok());
    }
}
