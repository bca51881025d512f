use axum::{body::Body, Router};
use campus_guard::{
    config::{
        GuardConfig, GuardedRouteConfig, JwtConfig, LoggingConfig, RateLimitingConfig,
        ServerConfig, StorageConfig, UpstreamConfig,
    },
    identity::{Claims, Role},
    rate_limit::LimiterConfig,
    resource::InMemoryOwnership,
    GuardApp,
};
use http::{header, Request, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const SECRET: &str = "integration-secret";
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00];

struct TestApp {
    app: Router,
    _storage: TempDir,
}

/// Helper to build the service over a temporary storage root
fn setup_app(upstream: Option<String>) -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let student_dir = storage.path().join("students").join("42");
    std::fs::create_dir_all(&student_dir).unwrap();
    std::fs::write(student_dir.join("photo.jpg"), JPEG).unwrap();
    std::fs::write(student_dir.join("report.pdf"), b"MZ\x90\x00 not a pdf").unwrap();

    let ownership = Arc::new(InMemoryOwnership::new());
    ownership.insert("/uploads/students/42/photo.jpg", "school-a");
    ownership.insert("/uploads/students/42/report.pdf", "school-a");

    let routes = if upstream.is_some() {
        vec![
            GuardedRouteConfig {
                path: "/api/auth/login".to_string(),
                limiter: "auth".to_string(),
                description: "Login".to_string(),
            },
            GuardedRouteConfig {
                path: "/api/invites/accept".to_string(),
                limiter: "invite".to_string(),
                description: "Invite acceptance".to_string(),
            },
        ]
    } else {
        vec![]
    };

    let config = GuardConfig {
        server: ServerConfig::default(),
        logging: LoggingConfig::default(),
        rate_limiting: RateLimitingConfig {
            cleanup_interval_secs: 60,
            limiters: vec![
                LimiterConfig::new("auth", 2, 60_000).unwrap(),
                LimiterConfig::new("invite", 1, 60_000).unwrap(),
            ],
            routes,
        },
        upstream: upstream.map(|url| UpstreamConfig { url }),
        storage: StorageConfig::new(storage.path()),
        auth: JwtConfig::hs256(SECRET),
    };

    let app = GuardApp::build(&config, ownership).unwrap().into_router();

    TestApp {
        app,
        _storage: storage,
    }
}

fn token(role: Role, school_id: Option<&str>) -> String {
    let claims = Claims {
        sub: "user-1".to_string(),
        role,
        school_id: school_id.map(str::to_string),
        iss: None,
        aud: None,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn get_file(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_from(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-forwarded-for", ip)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"email":"a@example.com"}"#))
        .unwrap()
}

#[tokio::test]
async fn test_unauthenticated_file_request() {
    let test = setup_app(None);

    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/photo.jpg", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_token_is_unauthenticated() {
    let test = setup_app(None);

    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/photo.jpg", Some("not-a-jwt")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_scope_mismatch_is_forbidden() {
    let test = setup_app(None);
    let token = token(Role::SchoolAdmin, Some("school-b"));

    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/photo.jpg", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_matching_scope_serves_file() {
    let test = setup_app(None);
    let token = token(Role::Teacher, Some("school-a"));

    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/photo.jpg", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/jpeg");
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "inline; filename=\"photo.jpg\""
    );
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "private, max-age=31536000, immutable"
    );
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], JPEG);
}

#[tokio::test]
async fn test_system_admin_reads_any_school() {
    let test = setup_app(None);
    let token = token(Role::SystemAdmin, None);

    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/photo.jpg", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_traversal_is_forbidden() {
    let test = setup_app(None);
    let token = token(Role::SystemAdmin, None);

    for uri in [
        "/uploads/students/%2e%2e/%2e%2e/etc/passwd.jpg",
        "/uploads/students/42/photo%00.jpg",
        "/uploads/students/42/photo.jpg.exe",
    ] {
        let response = test
            .app
            .clone()
            .oneshot(get_file(uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(!body.contains("/tmp"), "error body leaked a path: {}", body);
    }
}

#[tokio::test]
async fn test_undecodable_path_checks_identity_first() {
    let test = setup_app(None);

    let response = test
        .app
        .clone()
        .oneshot(get_file("/uploads/students/42/%FF.jpg", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = token(Role::Teacher, Some("school-a"));
    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/%FF.jpg", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], 403);
    assert_eq!(body["error"], "Access denied: invalid_path");
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let test = setup_app(None);
    let token = token(Role::Teacher, Some("school-a"));

    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/missing.png", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_spoofed_pdf_is_forbidden() {
    let test = setup_app(None);
    let token = token(Role::Teacher, Some("school-a"));

    let response = test
        .app
        .oneshot(get_file("/uploads/students/42/report.pdf", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_is_rate_limited_per_client() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok"
        })))
        .mount(&upstream)
        .await;

    let test = setup_app(Some(upstream.uri()));

    let first = test
        .app
        .clone()
        .oneshot(post_from("/api/auth/login", "1.2.3.4, 10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers().get("x-ratelimit-limit").unwrap(), "2");
    assert_eq!(first.headers().get("x-ratelimit-remaining").unwrap(), "1");
    assert!(first.headers().get("x-ratelimit-reset").is_some());

    let body = axum::body::to_bytes(first.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8(body.to_vec()).unwrap().contains("ok"));

    let second = test
        .app
        .clone()
        .oneshot(post_from("/api/auth/login", "1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-ratelimit-remaining").unwrap(), "0");

    let third = test
        .app
        .clone()
        .oneshot(post_from("/api/auth/login", "1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.headers().get("x-ratelimit-remaining").unwrap(), "0");
    let retry_after: u64 = third
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);

    let other_client = test
        .app
        .oneshot(post_from("/api/auth/login", "5.6.7.8"))
        .await
        .unwrap();
    assert_eq!(other_client.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_limiters_are_isolated_by_name() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&upstream)
        .await;

    let test = setup_app(Some(upstream.uri()));

    let invite = test
        .app
        .clone()
        .oneshot(post_from("/api/invites/accept", "9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(invite.status(), StatusCode::NO_CONTENT);

    let invite_again = test
        .app
        .clone()
        .oneshot(post_from("/api/invites/accept", "9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(invite_again.status(), StatusCode::TOO_MANY_REQUESTS);

    // The auth limiter has its own counters for the same client
    let login = test
        .app
        .oneshot(post_from("/api/auth/login", "9.9.9.9"))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Nothing listens on port 1
    let test = setup_app(Some("http://127.0.0.1:1".to_string()));

    let response = test
        .app
        .oneshot(post_from("/api/auth/login", "1.2.3.4"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
