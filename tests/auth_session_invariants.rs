//! Auth and Session Invariant Tests
//!
//! Session lifecycle against a mock auth service:
//! - a successful login installs the session and its token is used afterwards
//! - a failed login leaves no session, even if one existed before
//! - logout always clears the local session
//! - every auth failure is an Authentication error
//! - authorization helpers fail with Authorization errors

use std::time::Duration;

use aerodb_client::observability::CallObserver;
use aerodb_client::{Client, ClientConfig, ErrorFamily, ErrorKind, Fields};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_ID: &str = "8d0fd2b3-9ca7-4d9e-a95f-9e13dded6e09";

// =============================================================================
// Helper Functions
// =============================================================================

fn client_for(server: &MockServer) -> Client {
    let config = ClientConfig::new(server.uri(), "anon-key")
        .with_log_dir(None)
        .with_console_log(false);
    Client::with_observer(config, CallObserver::disabled()).unwrap()
}

fn jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(json!({"sub": USER_ID, "exp": exp}).to_string());
    format!("{}.{}.sig", header, claims)
}

fn user_body() -> Value {
    json!({"id": USER_ID, "email": "ann@example.com", "role": "authenticated"})
}

fn session_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "token_type": "bearer",
        "expires_in": 3600,
        "user": user_body()
    })
}

fn invalid_grant() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": "invalid_grant",
        "error_description": "Invalid login credentials"
    }))
}

async fn mount_login(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_json(json!({"email": "ann@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(access_token)))
        .mount(server)
        .await;
}

// =============================================================================
// Login / Logout
// =============================================================================

/// After login, row requests carry the user's token.
#[tokio::test]
async fn test_login_installs_session_token() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/notes"))
        .and(header("authorization", "Bearer user-token"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(!client.is_authenticated());

    let session = client.login("ann@example.com", "hunter2").await.unwrap();
    assert_eq!(session.access_token, "user-token");
    assert_eq!(session.user_id().map(|id| id.to_string()).as_deref(), Some(USER_ID));
    assert!(session.expires_at.is_some());
    assert!(client.is_authenticated());

    client.select("notes", &Fields::All, &[]).await.unwrap();
}

/// A rejected login raises and leaves no session behind.
#[tokio::test]
async fn test_failed_login_leaves_no_session() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_json(json!({"email": "ann@example.com", "password": "wrong"})))
        .respond_with(invalid_grant())
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.login("ann@example.com", "hunter2").await.unwrap();
    assert!(client.is_authenticated());

    let err = client.login("ann@example.com", "wrong").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(err.family(), ErrorFamily::Auth);
    assert!(err.message().contains("Invalid login credentials"));
    assert!(!client.is_authenticated());
    assert!(client.session().is_none());
}

/// Blank credentials are rejected before any request.
#[tokio::test]
async fn test_login_requires_credentials() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.login("", "pw").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);

    let err = client.login("ann@example.com", " ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

/// Logout revokes the token and clears the session.
#[tokio::test]
async fn test_logout_clears_session() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.login("ann@example.com", "hunter2").await.unwrap();
    client.logout().await.unwrap();
    assert!(!client.is_authenticated());

    // Without a session there is nothing to revoke
    client.logout().await.unwrap();
}

/// Even when the backend refuses the logout, the local session is gone.
#[tokio::test]
async fn test_logout_failure_still_clears_session() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"msg": "boom"})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.login("ann@example.com", "hunter2").await.unwrap();

    let err = client.logout().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(!client.is_authenticated());
}

// =============================================================================
// Signup / Recovery / OTP
// =============================================================================

/// Signup pending confirmation returns the user without a session.
#[tokio::test]
async fn test_signup_pending_confirmation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_json(json!({
            "email": "ann@example.com",
            "password": "hunter2",
            "data": {"display_name": "Ann"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = client
        .signup("ann@example.com", "hunter2", Some(json!({"display_name": "Ann"})))
        .await
        .unwrap();

    assert!(outcome.needs_email_confirmation);
    assert!(outcome.session.is_none());
    assert_eq!(outcome.user.unwrap().email.as_deref(), Some("ann@example.com"));
    assert!(!client.is_authenticated());
}

/// Signup that signs in immediately installs the session.
#[tokio::test]
async fn test_signup_with_session_signs_in() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body("fresh-token")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let outcome = client.signup("ann@example.com", "hunter2", None).await.unwrap();

    assert!(!outcome.needs_email_confirmation);
    assert_eq!(client.session().unwrap().access_token, "fresh-token");
}

/// A duplicate account is an authentication error.
#[tokio::test]
async fn test_signup_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "code": 422,
            "msg": "User already registered"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.signup("ann@example.com", "hunter2", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_reset_password_posts_recover() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/recover"))
        .and(body_json(json!({"email": "ann@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.reset_password("ann@example.com").await.unwrap();
}

#[tokio::test]
async fn test_verify_otp_signs_in() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/verify"))
        .and(body_json(json!({"type": "email", "email": "ann@example.com", "token": "123456"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body("otp-token")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let session = client.verify_otp("ann@example.com", "123456").await.unwrap();
    assert_eq!(session.access_token, "otp-token");
    assert!(client.is_authenticated());
}

#[test]
fn test_provider_login_url() {
    let config = ClientConfig::new("https://demo.example.co", "anon-key").with_log_dir(None);
    let client = Client::with_observer(config, CallObserver::disabled()).unwrap();

    let redirect = client
        .login_with_provider("github", Some("https://app.example.co/callback"))
        .unwrap();
    assert_eq!(redirect.provider, "github");
    assert_eq!(
        redirect.url,
        "https://demo.example.co/auth/v1/authorize?provider=github&redirect_to=https%3A%2F%2Fapp.example.co%2Fcallback"
    );
}

// =============================================================================
// Session Management
// =============================================================================

/// Without a session there is no user and no request.
#[tokio::test]
async fn test_get_user_without_session() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    assert!(client.get_user().await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_user_with_session() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.login("ann@example.com", "hunter2").await.unwrap();
    let user = client.get_user().await.unwrap().unwrap();
    assert_eq!(user.role.as_deref(), Some("authenticated"));
}

#[tokio::test]
async fn test_refresh_session_replaces_tokens() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body("second-token")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(
        client.refresh_session().await.unwrap_err().kind(),
        ErrorKind::Authentication
    );

    client.login("ann@example.com", "hunter2").await.unwrap();
    let session = client.refresh_session().await.unwrap();
    assert_eq!(session.access_token, "second-token");
    assert_eq!(client.session().unwrap().access_token, "second-token");
}

/// A live token is validated by fetching its user.
#[tokio::test]
async fn test_set_session_with_live_token() {
    let server = MockServer::start().await;
    let token = jwt(chrono::Utc::now().timestamp() + 3600);

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let session = client.set_session(&token, "refresh-9").await.unwrap();
    assert_eq!(session.user_id().map(|id| id.to_string()).as_deref(), Some(USER_ID));
    assert_eq!(client.session().unwrap().refresh_token, "refresh-9");
}

/// An expired token is refreshed instead of validated.
#[tokio::test]
async fn test_set_session_with_expired_token_refreshes() {
    let server = MockServer::start().await;
    let token = jwt(chrono::Utc::now().timestamp() - 60);

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "refresh-9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body("renewed")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let session = client.set_session(&token, "refresh-9").await.unwrap();
    assert_eq!(session.access_token, "renewed");
}

#[tokio::test]
async fn test_update_user_refreshes_stored_user() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .and(body_json(json!({"data": {"theme": "dark"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": USER_ID,
            "email": "ann@example.com",
            "user_metadata": {"theme": "dark"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.login("ann@example.com", "hunter2").await.unwrap();

    let user = client.update_user(json!({"data": {"theme": "dark"}})).await.unwrap();
    assert_eq!(user.user_metadata["theme"], json!("dark"));

    let stored = client.session().unwrap();
    assert_eq!(stored.user.as_ref().unwrap().user_metadata["theme"], json!("dark"));
    assert_eq!(stored.access_token, "user-token");
}

/// A logout that lands while the profile update is in flight stays logged out.
#[tokio::test]
async fn test_update_user_does_not_restore_logged_out_session() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(user_body())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.login("ann@example.com", "hunter2").await.unwrap();

    let logout = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.logout().await
    };
    let (updated, logged_out) = tokio::join!(client.update_user(json!({"data": {}})), logout);

    assert!(updated.is_ok());
    assert!(logged_out.is_ok());
    assert!(!client.is_authenticated());
}

// =============================================================================
// Authorization Helpers
// =============================================================================

#[tokio::test]
async fn test_set_current_domain_calls_rpc() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/set_current_domain"))
        .and(body_json(json!({"domain_id": "acme"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.set_current_domain(Some("acme")).await.unwrap();
}

#[tokio::test]
async fn test_set_current_domain_failure_is_authorization_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/set_current_domain"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "permission denied for function set_current_domain"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.set_current_domain(Some("acme")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(err.message().starts_with("Failed to set current domain"));
}

#[tokio::test]
async fn test_roles_and_permissions() {
    let server = MockServer::start().await;
    mount_login(&server, "user-token").await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_user_roles"))
        .and(body_json(json!({"p_user_id": USER_ID})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"role": "admin"}, {"role": "editor"}])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/check_permission"))
        .and(body_json(json!({"p_permission": "notes.write"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client.get_user_roles(None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    client.login("ann@example.com", "hunter2").await.unwrap();
    assert_eq!(client.get_user_roles(None).await.unwrap(), vec!["admin", "editor"]);
    assert!(client.check_permission("notes.write").await.unwrap());
}
