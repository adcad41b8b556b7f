use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{comments, notifications, users};

/// All `/api` routes. Listing comments is public; everything else needs a
/// bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/comments", get(comments::list_comments))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/comments", post(comments::create_comment))
        .route(
            "/api/comments/{id}",
            get(comments::get_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .route(
            "/api/notifications",
            get(notifications::list_notifications).post(notifications::mark_all_read),
        )
        .route("/api/notifications/{id}", patch(notifications::mark_read))
        .route("/api/users", get(users::list_users))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use tracing_subscriber::layer::SubscriberExt;

    use murmur_db::Database;
    use murmur_types::api::Claims;

    use super::*;
    use crate::directory::{DirectoryEntry, StaticDirectory};
    use crate::logging::{LogBuffer, LogBufferLayer};
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::state::AppStateInner;

    const SECRET: &str = "test-secret";

    fn make_state(max_requests: u32) -> AppState {
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: SECRET.to_string(),
            limiter: RateLimiter::in_memory(RateLimitConfig {
                max_requests,
                window: Duration::from_secs(60),
            }),
            directory: Arc::new(StaticDirectory::new(vec![DirectoryEntry {
                id: "user_ada".into(),
                first_name: Some("Ada".into()),
                last_name: Some("Lovelace".into()),
                ..Default::default()
            }])),
        })
    }

    fn token(user: &str) -> String {
        let claims = Claims {
            sub: user.to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn send(app: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let res = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn create_fans_out_one_notification_per_mention() {
        let app = router(make_state(60));

        let (status, comment) = send(
            &app,
            "POST",
            "/api/comments",
            Some("author"),
            Some(json!({ "content": "hi both", "mentionedUserIds": ["alice", "bob"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(comment["authorId"], "author");
        assert_eq!(comment["mentions"].as_array().unwrap().len(), 2);

        let (_, alice) = send(&app, "GET", "/api/notifications", Some("alice"), None).await;
        let (_, bob) = send(&app, "GET", "/api/notifications", Some("bob"), None).await;
        assert_eq!(alice["total"], 1);
        assert_eq!(bob["total"], 1);

        let alice_n = &alice["notifications"][0];
        let bob_n = &bob["notifications"][0];
        assert_eq!(alice_n["type"], "MENTION");
        assert_eq!(alice_n["mentionId"], alice_n["mention"]["id"]);
        assert_eq!(alice_n["mention"]["userId"], "alice");
        assert_eq!(bob_n["mention"]["userId"], "bob");
        assert_ne!(alice_n["mentionId"], bob_n["mentionId"]);
        assert_eq!(alice_n["mention"]["comment"]["content"], "hi both");
    }

    #[tokio::test]
    async fn create_does_not_scan_content() {
        let app = router(make_state(60));
        let (status, comment) = send(
            &app,
            "POST",
            "/api/comments",
            Some("author"),
            Some(json!({ "content": "hello @alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(comment["mentions"].as_array().unwrap().is_empty());

        let (_, alice) = send(&app, "GET", "/api/notifications", Some("alice"), None).await;
        assert_eq!(alice["total"], 0);
    }

    #[tokio::test]
    async fn create_validation_and_auth() {
        let app = router(make_state(60));

        let (status, body) = send(&app, "POST", "/api/comments", None, Some(json!({ "content": "x" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, body) = send(&app, "POST", "/api/comments", Some("author"), Some(json!({ "content": "" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"][0]["path"][0], "content");
        assert_eq!(body["error"][0]["code"], "too_small");

        let long = "x".repeat(1001);
        let (status, _) = send(&app, "POST", "/api/comments", Some("author"), Some(json!({ "content": long }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/api/comments",
            Some("author"),
            Some(json!({ "content": "orphan", "parentId": uuid::Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"][0]["path"][0], "parentId");
    }

    #[tokio::test]
    async fn create_reports_wrong_field_types_per_field() {
        let app = router(make_state(60));
        let cases = [
            (json!({ "content": "hi", "parentId": "abc" }), json!(["parentId"]), "invalid_string"),
            (json!({ "content": 5 }), json!(["content"]), "invalid_type"),
            (json!({ "content": "hi", "mentionedUserIds": "alice" }), json!(["mentionedUserIds"]), "invalid_type"),
            (json!({ "content": "hi", "mentionedUserIds": ["a", 7] }), json!(["mentionedUserIds", "1"]), "invalid_type"),
        ];

        for (payload, path, code) in cases {
            let (status, body) = send(&app, "POST", "/api/comments", Some("author"), Some(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"][0]["path"], path);
            assert_eq!(body["error"][0]["code"], code);
        }

        let (_, page) = send(&app, "GET", "/api/comments", None, None).await;
        assert_eq!(page["total"], 0);
    }

    #[tokio::test]
    async fn malformed_ids_are_not_found() {
        let app = router(make_state(60));

        for method in ["GET", "DELETE"] {
            let (status, body) = send(&app, method, "/api/comments/not-a-uuid", Some("author"), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"], "Comment not found");
        }

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/comments/not-a-uuid",
            Some("author"),
            Some(json!({ "content": "edit" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Comment not found");

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/notifications/not-a-uuid",
            Some("alice"),
            Some(json!({ "read": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Notification not found");
    }

    #[tokio::test]
    async fn storage_failures_are_logged_not_returned() {
        let buffer = LogBuffer::new(50);
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(LogBufferLayer::new(buffer.clone())),
        );

        let state = make_state(60);
        state
            .db
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE notifications")?;
                Ok(())
            })
            .unwrap();
        let app = router(state);

        let (status, body) = send(&app, "GET", "/api/notifications", Some("alice"), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");

        let errors: Vec<_> = buffer.entries().into_iter().filter(|e| e.level == "ERROR").collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("no such table: notifications"));
    }

    #[tokio::test]
    async fn rejects_bad_tokens() {
        let app = router(make_state(60));
        let req = Request::builder()
            .uri("/api/notifications")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let expired = encode(
            &Header::default(),
            &Claims {
                sub: "alice".into(),
                exp: 1_000_000,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let req = Request::builder()
            .uri("/api/notifications")
            .header(header::AUTHORIZATION, format!("Bearer {}", expired))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rate_limit_applies_per_caller() {
        let app = router(make_state(2));
        let body = || Some(json!({ "content": "spam" }));

        for _ in 0..2 {
            let (status, _) = send(&app, "POST", "/api/comments", Some("spammer"), body()).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, error) = send(&app, "POST", "/api/comments", Some("spammer"), body()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error["error"], "Rate limit exceeded");

        let (status, _) = send(&app, "POST", "/api/comments", Some("someone_else"), body()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn update_extracts_mentions_from_content() {
        let app = router(make_state(60));
        let (_, comment) = send(&app, "POST", "/api/comments", Some("author"), Some(json!({ "content": "draft" }))).await;
        let uri = format!("/api/comments/{}", comment["id"].as_str().unwrap());

        let (status, updated) = send(&app, "PATCH", &uri, Some("author"), Some(json!({ "content": "plain edit" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["content"], "plain edit");
        assert!(updated["mentions"].as_array().unwrap().is_empty());

        let (status, updated) = send(
            &app,
            "PATCH",
            &uri,
            Some("author"),
            Some(json!({ "content": "Hello @user1 and @user2 and @user1!" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let users: Vec<&str> = updated["mentions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["userId"].as_str().unwrap())
            .collect();
        assert_eq!(users, vec!["user1", "user2", "user1"]);

        let (_, user1) = send(&app, "GET", "/api/notifications", Some("user1"), None).await;
        assert_eq!(user1["total"], 2);
        assert_ne!(user1["notifications"][0]["mentionId"], user1["notifications"][1]["mentionId"]);

        let (status, body) = send(&app, "PATCH", &uri, Some("author"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"][0]["message"], "Required");

        let missing = format!("/api/comments/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "PATCH", &missing, Some("author"), Some(json!({ "content": "@x" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_then_lookup_is_not_found() {
        let app = router(make_state(60));
        let (_, comment) = send(
            &app,
            "POST",
            "/api/comments",
            Some("author"),
            Some(json!({ "content": "bye", "mentionedUserIds": ["a", "b", "c"] })),
        )
        .await;
        let uri = format!("/api/comments/{}", comment["id"].as_str().unwrap());

        let (status, fetched) = send(&app, "GET", &uri, Some("author"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["mentions"].as_array().unwrap().len(), 3);

        let (status, body) = send(&app, "DELETE", &uri, Some("author"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, body) = send(&app, "GET", &uri, Some("author"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Comment not found");

        let (_, a) = send(&app, "GET", "/api/notifications", Some("a"), None).await;
        assert_eq!(a["total"], 0);

        let (status, _) = send(&app, "DELETE", &uri, Some("author"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_comments_paginates_without_auth() {
        let app = router(make_state(100));
        for i in 0..15 {
            send(&app, "POST", "/api/comments", Some("author"), Some(json!({ "content": format!("c{}", i) }))).await;
        }

        let (status, page) = send(&app, "GET", "/api/comments?page=2&limit=10", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["comments"].as_array().unwrap().len(), 5);
        assert_eq!(page["total"], 15);
        assert_eq!(page["pages"], 2);
        assert_eq!(page["comments"][4]["content"], "c0");

        let (_, page) = send(&app, "GET", "/api/comments?limit=1000", None, None).await;
        assert_eq!(page["comments"].as_array().unwrap().len(), 15);
        assert_eq!(page["pages"], 1);

        let (status, body) = send(&app, "GET", "/api/comments?page=0", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"][0]["path"][0], "page");
    }

    #[tokio::test]
    async fn list_comments_by_parent() {
        let app = router(make_state(60));
        let (_, parent) = send(&app, "POST", "/api/comments", Some("author"), Some(json!({ "content": "parent" }))).await;
        let parent_id = parent["id"].as_str().unwrap().to_string();
        send(
            &app,
            "POST",
            "/api/comments",
            Some("other"),
            Some(json!({ "content": "reply", "parentId": parent_id, "mentionedUserIds": ["author"] })),
        )
        .await;

        let (_, top) = send(&app, "GET", "/api/comments", None, None).await;
        assert_eq!(top["total"], 1);
        assert_eq!(top["comments"][0]["replies"][0]["content"], "reply");
        assert_eq!(top["comments"][0]["replies"][0]["mentions"][0]["userId"], "author");

        let (_, replies) = send(&app, "GET", &format!("/api/comments?parentId={}", parent_id), None, None).await;
        assert_eq!(replies["total"], 1);
        assert_eq!(replies["comments"][0]["parentId"], parent_id.as_str());
        assert!(replies["comments"][0]["mentions"][0]["notification"].is_object());
    }

    #[tokio::test]
    async fn notification_read_transitions() {
        let app = router(make_state(60));
        send(
            &app,
            "POST",
            "/api/comments",
            Some("author"),
            Some(json!({ "content": "ping", "mentionedUserIds": ["alice", "alice"] })),
        )
        .await;

        let (_, list) = send(&app, "GET", "/api/notifications", Some("alice"), None).await;
        let id = list["notifications"][0]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/notifications/{}", id);

        let (status, _) = send(&app, "PATCH", &uri, Some("mallory"), Some(json!({ "read": true }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, updated) = send(&app, "PATCH", &uri, Some("alice"), Some(json!({ "read": true }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["read"], true);

        for _ in 0..2 {
            let (status, body) = send(&app, "POST", "/api/notifications", Some("alice"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({ "success": true }));
        }

        let (_, list) = send(&app, "GET", "/api/notifications", Some("alice"), None).await;
        assert!(list["notifications"].as_array().unwrap().iter().all(|n| n["read"] == true));
    }

    #[tokio::test]
    async fn users_require_auth_and_map_directory() {
        let app = router(make_state(60));

        let (status, _) = send(&app, "GET", "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, "GET", "/api/users", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"][0]["userId"], "user_ada");
        assert_eq!(body["users"][0]["name"], "Ada Lovelace");
        assert_eq!(body["users"][0]["groups"][0], "organization");
        assert_eq!(body["groups"][0]["name"], "Organization");
    }
}
