//! Route modules for Cargomail Server

pub mod blobs;
pub mod collections;
pub mod health;

use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::authenticate;
use crate::entities::{Bodies, Contacts, Drafts, Files, Messages};
use crate::state::AppState;

/// Build the complete HTTP application
pub fn app(state: AppState) -> Router {
    let max_upload_bytes = state.config().storage.max_upload_bytes;

    let authenticated = Router::new()
        .nest("/contacts", collections::json_router::<Contacts>())
        .nest("/drafts", collections::json_router::<Drafts>())
        .nest("/messages", collections::json_router::<Messages>())
        .nest("/bodies", blobs::router::<Bodies>(max_upload_bytes))
        .nest("/files", blobs::router::<Files>(max_upload_bytes))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .nest("/api/v1", authenticated.merge(health::router()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::auth::SessionRepository;
    use crate::config::Config;
    use crate::db::create_memory_pool;
    use crate::storage::BlobStorage;

    struct TestApp {
        server: TestServer,
        state: AppState,
        _blob_dir: TempDir,
    }

    impl TestApp {
        async fn new() -> Self {
            let blob_dir = TempDir::new().unwrap();
            let pool = create_memory_pool().await.unwrap();
            let state = AppState::new(Config::default(), pool, BlobStorage::new(blob_dir.path()));
            let server = TestServer::new(app(state.clone())).unwrap();

            Self {
                server,
                state,
                _blob_dir: blob_dir,
            }
        }

        async fn login(&self, user_id: i64, device: Option<&str>) -> HeaderValue {
            let token = SessionRepository::new(self.state.db())
                .issue(user_id, device)
                .await
                .unwrap();
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
        }
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = TestApp::new().await;

        let response = app.server.get("/api/v1/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "cargomail-server");

        app.server.get("/health").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let app = TestApp::new().await;

        let response = app.server.get("/api/v1/contacts").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"], "unauthorized");

        let response = app
            .server
            .get("/api/v1/contacts")
            .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_handler_without_middleware_fails_closed() {
        let pool = create_memory_pool().await.unwrap();
        let blob_dir = TempDir::new().unwrap();
        let state = AppState::new(Config::default(), pool, BlobStorage::new(blob_dir.path()));

        let router = Router::new()
            .nest("/contacts", collections::router::<Contacts>())
            .with_state(state);
        let server = TestServer::new(router).unwrap();

        let response = server.get("/contacts").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], "internal_error");
    }

    #[tokio::test]
    async fn test_contact_sync_flow() {
        let app = TestApp::new().await;
        let phone = app.login(1, Some("phone")).await;
        let laptop = app.login(1, Some("laptop")).await;

        let response = app
            .server
            .post("/api/v1/contacts")
            .add_header(header::AUTHORIZATION, phone.clone())
            .json(&json!({
                "emailAddress": "alice@example.com",
                "firstname": "Alice",
                "lastname": "Liddell"
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let contact: Value = response.json();
        let id = contact["id"].as_str().unwrap().to_string();
        assert!(contact.get("historyId").is_none());

        let listing: Value = app
            .server
            .get("/api/v1/contacts")
            .add_header(header::AUTHORIZATION, laptop.clone())
            .await
            .json();
        assert_eq!(listing["lastHistoryId"], 1);
        assert_eq!(listing["contacts"].as_array().unwrap().len(), 1);

        // The phone does not get its own insert echoed back.
        let delta: Value = app
            .server
            .post("/api/v1/contacts/sync")
            .add_header(header::AUTHORIZATION, phone.clone())
            .json(&json!({ "lastHistoryId": 0 }))
            .await
            .json();
        assert_eq!(delta["lastHistoryId"], 1);
        assert!(delta["inserted"].as_array().unwrap().is_empty());

        let delta: Value = app
            .server
            .post("/api/v1/contacts/sync")
            .add_header(header::AUTHORIZATION, laptop.clone())
            .json(&json!({ "lastHistoryId": 0 }))
            .await
            .json();
        assert_eq!(delta["inserted"][0]["id"], id.as_str());

        let affected: Value = app
            .server
            .post("/api/v1/contacts/trash")
            .add_header(header::AUTHORIZATION, phone.clone())
            .json(&json!({ "ids": [id, "missing"] }))
            .await
            .json();
        assert_eq!(affected["affected"], 1);

        let response = app
            .server
            .put("/api/v1/contacts")
            .add_header(header::AUTHORIZATION, laptop.clone())
            .json(&json!({ "id": id, "firstname": "Alicia" }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "not_found");

        let affected: Value = app
            .server
            .delete("/api/v1/contacts/delete")
            .add_header(header::AUTHORIZATION, phone.clone())
            .json(&json!({ "ids": [id] }))
            .await
            .json();
        assert_eq!(affected["affected"], 1);

        let delta: Value = app
            .server
            .post("/api/v1/contacts/sync")
            .add_header(header::AUTHORIZATION, laptop)
            .json(&json!({ "lastHistoryId": 1 }))
            .await
            .json();
        assert_eq!(delta["lastHistoryId"], 3);
        assert!(delta["trashed"].as_array().unwrap().is_empty());
        assert_eq!(delta["deleted"], json!([{ "id": id }]));
    }

    #[tokio::test]
    async fn test_duplicate_contact_conflict() {
        let app = TestApp::new().await;
        let auth = app.login(1, None).await;
        let body = json!({ "emailAddress": "bob@example.com", "firstname": "Bob", "lastname": "B" });

        app.server
            .post("/api/v1/contacts")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&body)
            .await
            .assert_status(StatusCode::CREATED);

        let response = app
            .server
            .post("/api/v1/contacts")
            .add_header(header::AUTHORIZATION, auth)
            .json(&body)
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "duplicate_key");
    }

    #[tokio::test]
    async fn test_negative_history_id_rejected() {
        let app = TestApp::new().await;
        let auth = app.login(1, None).await;

        app.server
            .post("/api/v1/drafts/sync")
            .add_header(header::AUTHORIZATION, auth)
            .json(&json!({ "lastHistoryId": -1 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_draft_create_and_list() {
        let app = TestApp::new().await;
        let auth = app.login(7, Some("tablet")).await;

        let response = app
            .server
            .post("/api/v1/drafts")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({
                "payload": {
                    "mimeType": "text/plain",
                    "headers": [{ "name": "Subject", "value": "Hi" }],
                    "body": { "data": "hello" }
                }
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let draft: Value = response.json();
        assert_eq!(draft["unread"], false);
        assert!(draft["messageUid"].as_str().is_some());
        assert_eq!(draft["payload"]["headers"][0]["value"], "Hi");

        let listing: Value = app
            .server
            .get("/api/v1/drafts")
            .add_header(header::AUTHORIZATION, auth)
            .await
            .json();
        assert_eq!(listing["drafts"][0]["id"], draft["id"]);
    }

    #[tokio::test]
    async fn test_body_upload_and_download() {
        let app = TestApp::new().await;
        let auth = app.login(1, Some("phone")).await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"Dear Alice, see you soon.".to_vec())
                .file_name("letter.txt")
                .mime_type("text/plain"),
        );
        let response = app
            .server
            .post("/api/v1/bodies/upload")
            .add_header(header::AUTHORIZATION, auth.clone())
            .multipart(form)
            .await;
        response.assert_status(StatusCode::CREATED);
        let blob: Value = response.json();
        let uri = blob["uri"].as_str().unwrap().to_string();
        assert_eq!(blob["name"], "letter.txt");
        assert_eq!(blob["snippet"], "Dear Alice, see you soon.");
        assert_eq!(blob["size"], 25);
        assert!(blob.get("hash").is_none());
        assert!(blob.get("path").is_none());

        let response = app
            .server
            .get(&format!("/api/v1/bodies/{}", uri))
            .add_header(header::AUTHORIZATION, auth.clone())
            .await;
        response.assert_status_ok();
        assert_eq!(response.header(header::CONTENT_TYPE), "text/plain");
        assert_eq!(response.as_bytes().as_ref(), b"Dear Alice, see you soon.");

        // Files are a separate collection.
        app.server
            .get(&format!("/api/v1/files/{}", uri))
            .add_header(header::AUTHORIZATION, auth.clone())
            .await
            .assert_status(StatusCode::NOT_FOUND);

        app.server
            .post("/api/v1/bodies/trash")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({ "uris": [uri] }))
            .await
            .assert_status_ok();

        app.server
            .get(&format!("/api/v1/bodies/{}", uri))
            .add_header(header::AUTHORIZATION, auth)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_reports_blob_metadata() {
        use axum::body::{to_bytes, Body};
        use axum::http::{Method, Request};
        use tower::ServiceExt;

        let blob_dir = TempDir::new().unwrap();
        let pool = create_memory_pool().await.unwrap();
        let state = AppState::new(Config::default(), pool, BlobStorage::new(blob_dir.path()));
        let token = SessionRepository::new(state.db())
            .issue(1, None)
            .await
            .unwrap();

        let stored = state.blobs().put(b"<p>hello</p>").await.unwrap();
        let new = crate::entities::NewBlob {
            hash: stored.hash.clone(),
            name: "body.html".to_string(),
            snippet: String::new(),
            path: stored.path,
            size: stored.size,
            content_type: "text/html".to_string(),
        };
        let blob = crate::sync::EntityStore::<Bodies>::new(state.db(), state.timeouts())
            .create(&crate::auth::AuthUser::new(1, None), &new)
            .await
            .unwrap();

        let request = Request::builder()
            .method(Method::HEAD)
            .uri(format!("/api/v1/bodies/{}", blob.uri))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let response = app(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "12");
        assert_eq!(
            response.headers()[header::ETAG],
            format!("\"{}\"", stored.hash).as_str()
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_file_replace_content() {
        let app = TestApp::new().await;
        let auth = app.login(1, None).await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(vec![0u8, 1, 2, 3])
                .file_name("data.bin")
                .mime_type("application/octet-stream"),
        );
        let blob: Value = app
            .server
            .post("/api/v1/files/upload")
            .add_header(header::AUTHORIZATION, auth.clone())
            .multipart(form)
            .await
            .json();
        let uri = blob["uri"].as_str().unwrap().to_string();
        assert_eq!(blob["snippet"], "");

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(vec![9u8; 10])
                .file_name("ignored.bin")
                .mime_type("application/octet-stream"),
        );
        let updated: Value = app
            .server
            .put(&format!("/api/v1/files/{}", uri))
            .add_header(header::AUTHORIZATION, auth.clone())
            .multipart(form)
            .await
            .json();
        assert_eq!(updated["name"], "data.bin");
        assert_eq!(updated["size"], 10);

        let response = app
            .server
            .get(&format!("/api/v1/files/{}", uri))
            .add_header(header::AUTHORIZATION, auth)
            .await;
        assert_eq!(response.as_bytes().as_ref(), vec![9u8; 10].as_slice());
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let app = TestApp::new().await;
        let auth = app.login(1, None).await;

        let form = MultipartForm::new().add_text("note", "no file here");
        app.server
            .post("/api/v1/files/upload")
            .add_header(header::AUTHORIZATION, auth)
            .multipart(form)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
