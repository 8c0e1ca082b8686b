use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use mfg_relay::auth::{FileTokenStorage, MemoryTokenStorage, Tier, TokenStore};
use mfg_relay::config::Config;
use mfg_relay::transport::ReqwestTransport;
use mfg_relay::{AuthError, CoreClient, Navigator, RequestOptions, Session, ThrottledApi};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use url::Url;

#[derive(Default)]
struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

#[derive(Clone, Default)]
struct Seen {
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn spawn_test_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let base = Url::parse(&format!("http://{}", addr)).expect("valid base url");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    base
}

fn make_session(base: Url, tokens: TokenStore, navigator: Arc<dyn Navigator>) -> Session {
    let mut cfg = Config::default();
    cfg.client.base_url = base;
    cfg.auth.courtesy_delay_ms = 10;
    let transport = Arc::new(ReqwestTransport::new(&cfg.client).expect("transport"));
    let client = CoreClient::new(&cfg, transport, tokens).expect("client");
    Session::new(ThrottledApi::new(client, cfg.throttle_settings()), navigator)
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn list_products() -> Json<Value> {
    Json(json!([
        {"id": 1, "code": "P-100", "name": "Bracket"},
        {"id": 2, "code": "P-200", "name": "Housing"}
    ]))
}

async fn create_product(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body.get("code").and_then(Value::as_str).unwrap_or_default().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": ["This field may not be blank."]})),
        );
    }
    (StatusCode::CREATED, Json(json!({"id": 3, "code": body["code"]})))
}

#[tokio::test]
async fn product_list_is_normalized() {
    let app = Router::new().route("/api/products/", get(list_products).post(create_product));
    let base = spawn_test_server(app).await;
    let session = make_session(
        base,
        TokenStore::in_memory(),
        Arc::new(RecordingNavigator::default()),
    );

    let result = session
        .get("/api/products/", RequestOptions::default(), false)
        .await
        .expect("result");

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "success": true,
            "data": [
                {"id": 1, "code": "P-100", "name": "Bracket"},
                {"id": 2, "code": "P-200", "name": "Housing"}
            ],
            "status": 200
        })
    );
}

#[tokio::test]
async fn validation_error_is_flattened() {
    let app = Router::new().route("/api/products/", get(list_products).post(create_product));
    let base = spawn_test_server(app).await;
    let session = make_session(
        base,
        TokenStore::in_memory(),
        Arc::new(RecordingNavigator::default()),
    );

    let result = session
        .post("/api/products/", json!({"code": ""}), RequestOptions::default(), false)
        .await
        .expect("failure is data");

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["success"], json!(false));
    assert_eq!(value["error"], json!("code: This field may not be blank."));
    assert_eq!(value["status"], json!(400));
    assert_eq!(value["data"], json!({"code": ["This field may not be blank."]}));
}

#[tokio::test]
async fn unauthorized_without_refresh_token_redirects_to_login() {
    let app = Router::new().route(
        "/api/orders/",
        get(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Authentication credentials were not provided."})),
            )
        }),
    );
    let base = spawn_test_server(app).await;
    let tokens = TokenStore::in_memory();
    tokens.store(Tier::Session, "stale-access", None);
    let navigator = Arc::new(RecordingNavigator::default());
    let session = make_session(base, tokens.clone(), navigator.clone());

    let outcome = session
        .get("/api/orders/", RequestOptions::default(), false)
        .await;

    assert_eq!(outcome, Err(AuthError::NoAuthToken));
    assert_eq!(
        outcome.unwrap_err().to_string(),
        "No authentication token available"
    );
    assert_eq!(tokens.access_token(), None);
    assert_eq!(*navigator.routes.lock().unwrap(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_and_replayed() {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/api/inventory/",
            get(|State(seen): State<Seen>, headers: HeaderMap| async move {
                let auth = bearer(&headers);
                seen.auth.lock().unwrap().push(auth.clone());
                if auth.as_deref() == Some("Bearer fresh-access") {
                    (StatusCode::OK, Json(json!({"items": []})))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Token is expired"})))
                }
            }),
        )
        .route(
            "/api/token/refresh/",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body, json!({"refresh": "refresh-1"}));
                Json(json!({"access": "fresh-access"}))
            }),
        )
        .with_state(seen.clone());
    let base = spawn_test_server(app).await;
    let tokens = TokenStore::in_memory();
    tokens.store(Tier::Session, "old-access", Some("refresh-1"));
    let navigator = Arc::new(RecordingNavigator::default());
    let session = make_session(base, tokens.clone(), navigator.clone());

    let result = session
        .get("/api/inventory/", RequestOptions::default(), false)
        .await
        .expect("refreshed");

    assert!(result.is_success());
    assert_eq!(
        *seen.auth.lock().unwrap(),
        vec![
            Some("Bearer old-access".to_string()),
            Some("Bearer fresh-access".to_string())
        ]
    );
    assert_eq!(tokens.access_token().as_deref(), Some("fresh-access"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("refresh-1"));
    assert!(navigator.routes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn remembered_login_persists_tokens_to_disk() {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/api/token/",
            post(|Json(body): Json<Value>| async move {
                if body == json!({"username": "planner", "password": "s3cret"}) {
                    (
                        StatusCode::OK,
                        Json(json!({"access": "login-access", "refresh": "login-refresh"})),
                    )
                } else {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({"detail": "No active account found with the given credentials"})),
                    )
                }
            }),
        )
        .route(
            "/api/me/",
            get(|State(seen): State<Seen>, headers: HeaderMap| async move {
                seen.auth.lock().unwrap().push(bearer(&headers));
                Json(json!({"username": "planner"}))
            }),
        )
        .with_state(seen.clone());
    let base = spawn_test_server(app).await;

    let dir = tempfile::tempdir().expect("temp dir");
    let token_file = dir.path().join("tokens.json");
    let tokens = TokenStore::new(
        Arc::new(FileTokenStorage::new(token_file.clone())),
        Arc::new(MemoryTokenStorage::new()),
    );
    let session = make_session(
        base,
        tokens.clone(),
        Arc::new(RecordingNavigator::default()),
    );

    let rejected = session
        .login(&json!({"username": "planner", "password": "wrong"}), true)
        .await
        .expect("transport ok");
    assert!(!rejected.is_success());
    assert_eq!(rejected.status(), 401);
    assert_eq!(
        rejected.error(),
        Some("No active account found with the given credentials")
    );
    assert_eq!(tokens.access_token(), None);

    let accepted = session
        .login(&json!({"username": "planner", "password": "s3cret"}), true)
        .await
        .expect("transport ok");
    assert!(accepted.is_success());
    assert_eq!(tokens.active_tier(), Some(Tier::Durable));

    let on_disk: Value =
        serde_json::from_slice(&std::fs::read(&token_file).expect("token file")).unwrap();
    assert_eq!(on_disk["authToken"], json!("login-access"));
    assert_eq!(on_disk["refreshToken"], json!("login-refresh"));

    session
        .get("/api/me/", RequestOptions::default(), false)
        .await
        .expect("me");
    assert_eq!(
        *seen.auth.lock().unwrap(),
        vec![Some("Bearer login-access".to_string())]
    );

    session.logout();
    assert!(!token_file.exists());
}

#[tokio::test]
async fn coalesced_auth_failures_redirect_once_until_next_login() {
    let app = Router::new()
        .route(
            "/api/orders/",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"detail": "Token is expired"})),
                )
            }),
        )
        .route(
            "/api/token/",
            post(|| async { Json(json!({"access": "next-access"})) }),
        );
    let base = spawn_test_server(app).await;
    let tokens = TokenStore::in_memory();
    tokens.store(Tier::Session, "stale-access", None);
    let navigator = Arc::new(RecordingNavigator::default());
    let session = make_session(base, tokens.clone(), navigator.clone());

    let (a, b) = tokio::join!(
        session.get("/api/orders/", RequestOptions::default(), false),
        session.get("/api/orders/", RequestOptions::default(), false),
    );
    assert_eq!(a, Err(AuthError::NoAuthToken));
    assert_eq!(b, Err(AuthError::NoAuthToken));
    assert_eq!(navigator.routes.lock().unwrap().len(), 1);

    let login = session
        .login(&json!({"username": "planner", "password": "s3cret"}), false)
        .await
        .expect("transport ok");
    assert!(login.is_success());
    assert_eq!(tokens.access_token().as_deref(), Some("next-access"));

    let again = session
        .get("/api/orders/?page=2", RequestOptions::default(), false)
        .await;
    assert_eq!(again, Err(AuthError::NoAuthToken));
    assert_eq!(tokens.access_token(), None);
    assert_eq!(
        *navigator.routes.lock().unwrap(),
        vec!["/login".to_string(), "/login".to_string()]
    );
}
