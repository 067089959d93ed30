//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers::{envelope, workflow};
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Envelope CRUD (draft only for mutations)
        .route(
            "/envelopes",
            post(envelope::create_envelope).get(envelope::list_envelopes),
        )
        .route(
            "/envelopes/{id}",
            get(envelope::get_envelope)
                .put(envelope::update_envelope)
                .delete(envelope::delete_envelope),
        )
        .route("/envelopes/{id}/custom-fields", put(envelope::set_custom_fields))
        .route("/envelopes/{id}/documents", post(envelope::add_document))
        .route(
            "/envelopes/{id}/documents/{document_id}",
            axum::routing::delete(envelope::remove_document),
        )
        .route("/envelopes/{id}/recipients", post(envelope::add_recipient))
        .route(
            "/envelopes/{id}/recipients/{recipient_id}",
            put(envelope::update_recipient).delete(envelope::remove_recipient),
        )
        // Lifecycle
        .route("/envelopes/{id}/finalize", post(envelope::finalize_envelope))
        .route("/envelopes/{id}/send", post(workflow::send_envelope))
        .route("/envelopes/{id}/void", post(workflow::void_envelope))
        // Workflow
        .route("/envelopes/{id}/workflow", get(workflow::get_workflow))
        .route("/envelopes/{id}/workflow/start", post(workflow::start_workflow))
        .route("/envelopes/{id}/workflow/pause", post(workflow::pause_workflow))
        .route("/envelopes/{id}/workflow/resume", post(workflow::resume_workflow))
        .route("/envelopes/{id}/workflow/cancel", post(workflow::cancel_workflow))
        .route("/envelopes/{id}/workflow/current", get(workflow::current_recipients))
        .route("/envelopes/{id}/workflow/pending", get(workflow::pending_recipients))
        // Signing surface callback
        .route(
            "/envelopes/{id}/recipients/{recipient_id}/actions",
            post(workflow::record_recipient_action),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillflow_infra::sqlite::pool::{DatabasePool, database_url};
    use quillflow_types::access::Capability;
    use quillflow_types::config::GlobalConfig;
    use serde_json::{Value, json};
    use uuid::Uuid;

    struct TestServer {
        base: String,
        key: String,
        client: reqwest::Client,
        _dir: tempfile::TempDir,
    }

    impl TestServer {
        async fn start() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
            let state =
                AppState::from_parts(pool, GlobalConfig::default(), dir.path().to_path_buf())
                    .unwrap();
            let (_, key) = state
                .api_keys
                .create("test", Uuid::now_v7(), &Capability::ALL)
                .await
                .unwrap();

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, build_router(state)).await.unwrap();
            });

            Self {
                base: format!("http://{addr}"),
                key,
                client: reqwest::Client::new(),
                _dir: dir,
            }
        }

        async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (u16, Value) {
            let mut req = self
                .client
                .request(method, format!("{}/api/v1{path}", self.base))
                .bearer_auth(&self.key);
            if let Some(body) = body {
                req = req.json(&body);
            }
            let resp = req.send().await.unwrap();
            let status = resp.status().as_u16();
            (status, resp.json().await.unwrap())
        }
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let server = TestServer::start().await;
        let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let server = TestServer::start().await;
        let resp = reqwest::get(format!("{}/api/v1/envelopes", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 401);
    }

    #[tokio::test]
    async fn test_sequential_signing_end_to_end() {
        use reqwest::Method;
        let server = TestServer::start().await;

        let (status, body) = server
            .call(Method::POST, "/envelopes", Some(json!({ "subject": "Lease", "routing_mode": "sequential" })))
            .await;
        assert_eq!(status, 200);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        // Sending without documents is a validation error.
        let (status, body) = server.call(Method::POST, &format!("/envelopes/{id}/send"), None).await;
        assert_eq!(status, 400);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");

        server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/documents"),
                Some(json!({ "name": "lease.pdf", "file_reference": "blobs/lease" })),
            )
            .await;
        for (name, email) in [("Tenant", "tenant@example.com"), ("Landlord", "landlord@example.com")] {
            let (status, _) = server
                .call(
                    Method::POST,
                    &format!("/envelopes/{id}/recipients"),
                    Some(json!({ "name": name, "email": email, "recipient_type": "signer" })),
                )
                .await;
            assert_eq!(status, 200);
        }

        let (status, body) = server.call(Method::POST, &format!("/envelopes/{id}/send"), None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["status"], "sent");

        let (_, body) = server
            .call(Method::GET, &format!("/envelopes/{id}/workflow/current"), None)
            .await;
        let current = body["data"].as_array().unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0]["name"], "Tenant");
        let tenant = current[0]["id"].as_str().unwrap().to_string();

        // Drafts only: editing after send is a state error.
        let (status, body) = server
            .call(Method::PUT, &format!("/envelopes/{id}"), Some(json!({ "subject": "New" })))
            .await;
        assert_eq!(status, 409);
        assert_eq!(body["errors"][0]["code"], "INVALID_STATE");

        server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/recipients/{tenant}/actions"),
                Some(json!({ "action": "completed" })),
            )
            .await;
        let (_, body) = server
            .call(Method::GET, &format!("/envelopes/{id}/workflow/current"), None)
            .await;
        let landlord = body["data"][0]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"][0]["name"], "Landlord");

        let (status, body) = server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/recipients/{landlord}/actions"),
                Some(json!({ "action": "completed" })),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["status"], "completed");

        let (_, body) = server.call(Method::GET, &format!("/envelopes/{id}/workflow"), None).await;
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["workflow"]["steps"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_a_state_error() {
        use reqwest::Method;
        let server = TestServer::start().await;

        let (_, body) = server
            .call(Method::POST, "/envelopes", Some(json!({ "subject": "NDA" })))
            .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/documents"),
                Some(json!({ "name": "nda.pdf", "file_reference": "blobs/nda" })),
            )
            .await;
        server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/recipients"),
                Some(json!({ "name": "Ava", "email": "ava@example.com", "recipient_type": "signer" })),
            )
            .await;
        server.call(Method::POST, &format!("/envelopes/{id}/workflow/start"), None).await;

        let (status, first) = server
            .call(Method::POST, &format!("/envelopes/{id}/workflow/cancel"), None)
            .await;
        assert_eq!(status, 200);
        assert_eq!(first["data"]["status"], "voided");
        let (_, stored) = server.call(Method::GET, &format!("/envelopes/{id}"), None).await;

        let (status, body) = server
            .call(Method::POST, &format!("/envelopes/{id}/workflow/cancel"), None)
            .await;
        assert_eq!(status, 409);
        assert_eq!(body["errors"][0]["code"], "INVALID_STATE");

        let (_, after) = server.call(Method::GET, &format!("/envelopes/{id}"), None).await;
        assert_eq!(after["data"]["voided_date_time"], stored["data"]["voided_date_time"]);
        assert_eq!(after["data"]["voided_reason"], "workflow cancelled");
    }

    #[tokio::test]
    async fn test_unknown_envelope_is_not_found() {
        let server = TestServer::start().await;
        let (status, body) = server
            .call(
                reqwest::Method::GET,
                &format!("/envelopes/{}", Uuid::now_v7()),
                None,
            )
            .await;
        assert_eq!(status, 404);
        assert_eq!(body["errors"][0]["code"], "ENVELOPE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_finalized_draft_is_locked_but_voidable() {
        use reqwest::Method;
        let server = TestServer::start().await;

        let (_, body) = server
            .call(Method::POST, "/envelopes", Some(json!({ "subject": "NDA" })))
            .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        // An empty draft cannot be finalized.
        let (status, body) = server
            .call(Method::POST, &format!("/envelopes/{id}/finalize"), None)
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");

        server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/documents"),
                Some(json!({ "name": "nda.pdf", "file_reference": "blobs/nda" })),
            )
            .await;
        server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/recipients"),
                Some(json!({ "name": "Ava", "email": "ava@example.com", "recipient_type": "signer" })),
            )
            .await;

        let (status, body) = server
            .call(Method::POST, &format!("/envelopes/{id}/finalize"), None)
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["status"], "created");

        let (status, _) = server
            .call(Method::PUT, &format!("/envelopes/{id}"), Some(json!({ "subject": "Other" })))
            .await;
        assert_eq!(status, 409);

        let (status, body) = server
            .call(
                Method::POST,
                &format!("/envelopes/{id}/void"),
                Some(json!({ "reason": "superseded" })),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["status"], "voided");
        assert_eq!(body["data"]["voided_reason"], "superseded");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recipient_adds_are_all_stored() {
        use reqwest::Method;
        let server = std::sync::Arc::new(TestServer::start().await);

        let (_, body) = server
            .call(Method::POST, "/envelopes", Some(json!({ "subject": "Board consent" })))
            .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let server = server.clone();
                let path = format!("/envelopes/{id}/recipients");
                tokio::spawn(async move {
                    let body = json!({
                        "name": format!("Director {i}"),
                        "email": format!("director{i}@example.com"),
                        "recipient_type": "signer",
                    });
                    server.call(Method::POST, &path, Some(body)).await.0
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), 200);
        }

        let (_, body) = server.call(Method::GET, &format!("/envelopes/{id}"), None).await;
        assert_eq!(body["data"]["recipients"].as_array().unwrap().len(), 10);

        // A parallel flag on the only recipient is rejected up front.
        let (_, body) = server
            .call(Method::POST, "/envelopes", Some(json!({ "subject": "Waiver" })))
            .await;
        let other = body["data"]["id"].as_str().unwrap().to_string();
        let (status, body) = server
            .call(
                Method::POST,
                &format!("/envelopes/{other}/recipients"),
                Some(json!({
                    "name": "Ava",
                    "email": "ava@example.com",
                    "recipient_type": "signer",
                    "parallel_with_previous": true,
                })),
            )
            .await;
        assert_eq!(status, 400);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }
}
