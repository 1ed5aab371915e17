//! Tests for the `__authz` endpoint.

mod common;

use axum::http::{Method, StatusCode, header};
use cell_authz::{
    AppState,
    cells::CellProperties,
    directory::{AccountStatus, NewAccount},
    locks::LockManager,
    token::{self, TokenKind},
};
use common::*;

const CELL: &str = "alpha";
const AUTHZ: &str = "/alpha/__authz";

fn password_form(username: &str, password: &str) -> FormBody {
    vec![
        ("response_type", "token".to_string()),
        ("client_id", CLIENT_ID.to_string()),
        ("redirect_uri", REDIRECT_URI.to_string()),
        ("state", "xyz".to_string()),
        ("username", username.to_string()),
        ("password", password.to_string()),
    ]
}

type FormBody = Vec<(&'static str, String)>;

fn with(mut form: FormBody, key: &'static str, value: &str) -> FormBody {
    form.retain(|(k, _)| *k != key);
    form.push((key, value.to_string()));
    form
}

async fn setup() -> AppState {
    let state = test_state(test_config()).await;
    provision(
        &state,
        CELL,
        &[
            ("alice", AccountStatus::Active),
            ("bob", AccountStatus::Deactivated),
            ("carol", AccountStatus::PasswordChangeRequired),
        ],
    )
    .await;
    state
}

// =============================================================================
// Password flow
// =============================================================================

#[tokio::test]
async fn test_active_account_receives_access_token() {
    let state = setup().await;
    let server = test_server(state.clone());

    let response = server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    let location = location(&response);
    assert!(location.starts_with(&format!("{REDIRECT_URI}#")));
    let params = fragment(&location);
    assert_eq!(params["token_type"], "Bearer");
    assert_eq!(params["expires_in"], "3600");
    assert_eq!(params["state"], "xyz");
    assert!(!params.contains_key("password_change_required"));

    let access_token = &params["access_token"];
    assert!(access_token.starts_with("AR~"));
    let key = state.keys.signing_key(CELL).await.expect("key");
    let decoded = token::decode(&key, &format!("{BASE_URL}/{CELL}/"), access_token)
        .expect("token verifies");
    assert_eq!(decoded.kind, TokenKind::Access);
    assert_eq!(decoded.claims.sub, "alice");
    assert_eq!(decoded.claims.aud, CLIENT_ID);
    assert_eq!(decoded.claims.exp - decoded.claims.iat, 3600);

    let account = state.directory.lookup(CELL, "alice").await.expect("alice");
    assert!(account.last_authenticated.is_some());
    assert_eq!(account.failed_count, 0);
}

#[tokio::test]
async fn test_requested_expires_in_is_honoured() {
    let state = setup().await;
    let server = test_server(state.clone());

    let response = server
        .post(AUTHZ)
        .form(&with(password_form("alice", PASSWORD), "expires_in", "5"))
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    let params = fragment(&location(&response));
    assert_eq!(params["expires_in"], "5");

    let key = state.keys.signing_key(CELL).await.expect("key");
    let decoded = token::decode(&key, &format!("{BASE_URL}/{CELL}/"), &params["access_token"])
        .expect("token verifies");
    assert_eq!(decoded.claims.exp - decoded.claims.iat, 5);
}

#[tokio::test]
async fn test_expires_in_out_of_range_is_redirected_error() {
    let server = test_server(setup().await);

    for value in ["0", "3601", "abc"] {
        let response = server
            .post(AUTHZ)
            .form(&with(password_form("alice", PASSWORD), "expires_in", value))
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        let params = fragment(&location(&response));
        assert_eq!(params["error"], "invalid_request", "expires_in={value}");
        assert_eq!(params["code"], "PR400-AZ-0008");
        assert_eq!(params["state"], "xyz");
    }
}

#[tokio::test]
async fn test_deactivated_account_is_rejected_like_wrong_password() {
    let server = test_server(setup().await);

    let response = server
        .post(AUTHZ)
        .form(&password_form("bob", PASSWORD))
        .await;

    response.assert_status_ok();
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(response.text().contains("PS-AU-0004"));
}

#[tokio::test]
async fn test_wrong_password_and_unknown_account_share_a_code() {
    let server = test_server(setup().await);

    let wrong = server
        .post(AUTHZ)
        .form(&password_form("alice", "not-the-password"))
        .await;
    let unknown = server
        .post(AUTHZ)
        .form(&password_form("nobody", PASSWORD))
        .await;

    wrong.assert_status_ok();
    unknown.assert_status_ok();
    assert!(wrong.text().contains("PS-AU-0004"));
    assert!(unknown.text().contains("PS-AU-0004"));
}

#[tokio::test]
async fn test_missing_credentials() {
    let server = test_server(setup().await);

    let response = server
        .post(AUTHZ)
        .form(&password_form("alice", ""))
        .await;

    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0003"));
}

// =============================================================================
// Password change required
// =============================================================================

#[tokio::test]
async fn test_password_change_required_issues_password_change_token() {
    let state = setup().await;
    let server = test_server(state.clone());

    // One failure first so the reported count is not trivially zero.
    server
        .post(AUTHZ)
        .form(&password_form("carol", "wrong-password"))
        .await
        .assert_status_ok();

    let response = server
        .post(AUTHZ)
        .form(&password_form("carol", PASSWORD))
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    let params = fragment(&location(&response));
    assert!(params["access_token"].starts_with("AP~"));
    assert_eq!(params["password_change_required"], "true");
    assert_eq!(params["failed_count"], "1");
    assert_eq!(params["last_authenticated"], "");

    // Password-change logins do not count as a completed authentication.
    let account = state.directory.lookup(CELL, "carol").await.expect("carol");
    assert!(account.last_authenticated.is_none());
    assert_eq!(account.failed_count, 0);
}

#[tokio::test]
async fn test_password_change_then_login_with_new_password() {
    let state = setup().await;
    let server = test_server(state.clone());

    let response = server
        .post(AUTHZ)
        .form(&password_form("carol", PASSWORD))
        .await;
    let ap_token = fragment(&location(&response))["access_token"].clone();

    let change = vec![
        ("response_type", "token".to_string()),
        ("client_id", CLIENT_ID.to_string()),
        ("redirect_uri", REDIRECT_URI.to_string()),
        ("state", "xyz".to_string()),
        ("access_token", ap_token),
        ("password", "new-password2".to_string()),
    ];
    let response = server.post(AUTHZ).form(&change).await;

    response.assert_status(StatusCode::SEE_OTHER);
    let params = fragment(&location(&response));
    assert!(params["access_token"].starts_with("AR~"));
    assert!(!params.contains_key("password_change_required"));

    let account = state.directory.lookup(CELL, "carol").await.expect("carol");
    assert_eq!(account.account_status(), AccountStatus::Active);

    server
        .post(AUTHZ)
        .form(&password_form("carol", PASSWORD))
        .await
        .assert_status_ok();
    server
        .post(AUTHZ)
        .form(&password_form("carol", "new-password2"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_password_change_rejections() {
    let server = test_server(setup().await);

    let response = server
        .post(AUTHZ)
        .form(&password_form("carol", PASSWORD))
        .await;
    let ap_token = fragment(&location(&response))["access_token"].clone();
    let base = vec![
        ("response_type", "token".to_string()),
        ("client_id", CLIENT_ID.to_string()),
        ("redirect_uri", REDIRECT_URI.to_string()),
        ("access_token", ap_token.clone()),
    ];

    // No new password: back to the password-change form.
    let response = server.post(AUTHZ).form(&base).await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("PS-AU-0007"));
    assert!(body.contains(&ap_token));

    // Password outside the policy.
    let response = server.post(AUTHZ).form(&with(base.clone(), "password", "x")).await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0008"));

    // An access token cannot be used to change a password.
    let access = server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await;
    let ar_token = fragment(&location(&access))["access_token"].clone();
    let response = server
        .post(AUTHZ)
        .form(&with(
            with(base, "access_token", &ar_token),
            "password",
            "new-password2",
        ))
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0002"));
}

// =============================================================================
// Account lockout and authentication interval
// =============================================================================

#[tokio::test]
async fn test_account_locks_after_repeated_failures() {
    let state = setup().await;
    let server = test_server(state.clone());

    for _ in 0..3 {
        server
            .post(AUTHZ)
            .form(&password_form("alice", "wrong-password"))
            .await
            .assert_status_ok();
    }

    // Locked: even the right password fails.
    let response = server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0004"));

    let account = state.directory.lookup(CELL, "alice").await.expect("alice");
    assert!(account.locked_until.is_some());

    state.directory.unlock(CELL, "alice").await.expect("unlock");
    server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let state = setup().await;
    let server = test_server(state.clone());

    for _ in 0..2 {
        server
            .post(AUTHZ)
            .form(&password_form("alice", "wrong-password"))
            .await;
    }
    assert_eq!(
        state.directory.lookup(CELL, "alice").await.expect("alice").failed_count,
        2
    );

    server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    assert_eq!(
        state.directory.lookup(CELL, "alice").await.expect("alice").failed_count,
        0
    );
}

#[tokio::test]
async fn test_account_lock_expires() {
    let mut config = test_config();
    config.authn.account_lock_time = 1;
    let state = test_state(config).await;
    provision(&state, CELL, &[("alice", AccountStatus::Active)]).await;
    let server = test_server(state);

    for _ in 0..3 {
        server
            .post(AUTHZ)
            .form(&password_form("alice", "wrong-password"))
            .await;
    }
    let response = server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await;
    response.assert_status_ok();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_busy_account_lock_times_out() {
    let mut config = test_config();
    config.lock.acquire_timeout_ms = 50;
    let state = test_state(config).await;
    provision(&state, CELL, &[("alice", AccountStatus::Active)]).await;
    let server = test_server(state.clone());

    let _held = state
        .locks
        .acquire(&LockManager::account_key(CELL, "alice"))
        .await
        .expect("hold lock");

    let response = server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.text().contains("PS-SV-0001"));
    assert!(!response.text().contains("PS-AU-0004"));
}

#[tokio::test]
async fn test_authentication_interval_blocks_retry() {
    let mut config = test_config();
    config.authn.valid_authn_interval = 60;
    let state = test_state(config).await;
    provision(&state, CELL, &[("alice", AccountStatus::Active)]).await;
    let server = test_server(state.clone());

    server
        .post(AUTHZ)
        .form(&password_form("alice", "wrong-password"))
        .await
        .assert_status_ok();

    let locks = state.locks.snapshot();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].key, "authn-interval:alpha:alice");

    let response = server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0004"));

    state.locks.delete_all();
    server
        .post(AUTHZ)
        .form(&password_form("alice", PASSWORD))
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_ip_address_range_restricts_clients() {
    let state = setup().await;
    state
        .directory
        .create(
            CELL,
            NewAccount {
                name: "dave".into(),
                password: PASSWORD.into(),
                status: AccountStatus::Active,
                ip_address_range: Some("10.0.0.0/8".into()),
            },
        )
        .await
        .expect("create dave");
    let server = test_server(state);

    let (name, value) = forwarded_for("192.168.1.1");
    let response = server
        .post(AUTHZ)
        .add_header(name, value)
        .form(&password_form("dave", PASSWORD))
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0004"));

    let (name, value) = forwarded_for("10.1.2.3");
    server
        .post(AUTHZ)
        .add_header(name, value)
        .form(&password_form("dave", PASSWORD))
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_ip_address_range_ignores_forwarded_header_without_proxy() {
    let mut config = test_config();
    config.trusted_proxies.clear();
    let state = test_state(config).await;
    provision(&state, CELL, &[]).await;
    state
        .directory
        .create(
            CELL,
            NewAccount {
                name: "erin".into(),
                password: PASSWORD.into(),
                status: AccountStatus::Active,
                ip_address_range: Some("192.168.0.0/24".into()),
            },
        )
        .await
        .expect("create erin");
    let server = test_server(state);

    let (name, value) = forwarded_for("192.168.0.5");
    let response = server
        .post(AUTHZ)
        .add_header(name, value)
        .form(&password_form("erin", PASSWORD))
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0004"));
}

// =============================================================================
// Request validation
// =============================================================================

#[tokio::test]
async fn test_redirect_uri_outside_client_is_not_redirected() {
    let server = test_server(setup().await);

    let response = server
        .post(AUTHZ)
        .form(&with(
            password_form("alice", PASSWORD),
            "redirect_uri",
            "https://evil.example.com/callback",
        ))
        .await;

    response.assert_status_bad_request();
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(response.text().contains("PR400-AZ-0003"));
}

#[tokio::test]
async fn test_missing_client_id() {
    let server = test_server(setup().await);

    let response = server
        .get(AUTHZ)
        .add_query_param("response_type", "token")
        .add_query_param("redirect_uri", REDIRECT_URI)
        .await;

    response.assert_status_bad_request();
    assert!(response.text().contains("PR400-AZ-0002"));
}

#[tokio::test]
async fn test_unsupported_and_missing_response_type() {
    let server = test_server(setup().await);

    let response = server
        .post(AUTHZ)
        .form(&with(password_form("alice", PASSWORD), "response_type", "code"))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    let params = fragment(&location(&response));
    assert_eq!(params["error"], "unsupported_response_type");
    assert_eq!(params["code"], "PR400-AZ-0001");

    let response = server
        .post(AUTHZ)
        .form(&with(password_form("alice", PASSWORD), "response_type", ""))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    let params = fragment(&location(&response));
    assert_eq!(params["error"], "invalid_request");
    assert_eq!(params["code"], "PR400-AZ-0004");
}

#[tokio::test]
async fn test_cancel_redirects_with_error() {
    let server = test_server(setup().await);

    let response = server
        .post(AUTHZ)
        .form(&with(password_form("", ""), "cancel_flg", "true"))
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    let params = fragment(&location(&response));
    assert_eq!(params["error"], "unauthorized_client");
    assert_eq!(params["code"], "PR401-AZ-0001");
    assert_eq!(params["state"], "xyz");
}

#[tokio::test]
async fn test_unknown_cell_is_not_found() {
    let server = test_server(setup().await);

    server
        .post("/nowhere/__authz")
        .form(&password_form("alice", PASSWORD))
        .await
        .assert_status_not_found();
}

// =============================================================================
// Forms
// =============================================================================

#[tokio::test]
async fn test_get_renders_login_form() {
    let server = test_server(setup().await);

    let response = server
        .get(AUTHZ)
        .add_query_param("response_type", "token")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("state", "xyz")
        .await;

    response.assert_status_ok();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
    let body = response.text();
    assert!(body.contains("PS-AU-0002"));
    assert!(body.contains("name=\"username\""));
    assert!(body.contains("value=\"xyz\""));
}

#[tokio::test]
async fn test_get_renders_password_change_form() {
    let server = test_server(setup().await);

    let response = server
        .get(AUTHZ)
        .add_query_param("response_type", "token")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("password_change_required", "true")
        .add_query_param("access_token", "AP~sample")
        .await;

    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("PS-AU-0006"));
    assert!(body.contains("AP~sample"));
}

#[tokio::test]
async fn test_custom_login_page_is_served() {
    let state = setup().await;
    state
        .cells
        .put_resource(
            CELL,
            "/login.html",
            "text/html",
            "<html><body>custom login</body></html>".into(),
        )
        .await
        .expect("store page");
    state
        .cells
        .set_properties(
            CELL,
            CellProperties {
                authorization_html_url: Some("/login.html".into()),
                authorization_password_change_html_url: None,
            },
        )
        .await
        .expect("set properties");
    let server = test_server(state);

    let response = server
        .get(AUTHZ)
        .add_query_param("response_type", "token")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("custom login"));

    // Outcomes are reported on the default form, which echoes the request.
    let response = server
        .post(AUTHZ)
        .form(&password_form("alice", "wrong-password"))
        .await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("PS-AU-0004"));
    assert!(!body.contains("custom login"));
    assert!(body.contains("xyz"));

    let response = server
        .post(AUTHZ)
        .form(&password_form("bob", PASSWORD))
        .await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0004"));

    let response = server.post(AUTHZ).form(&password_form("alice", "")).await;
    response.assert_status_ok();
    assert!(response.text().contains("PS-AU-0003"));
}

#[tokio::test]
async fn test_options_lists_allowed_methods() {
    let server = test_server(setup().await);

    let response = server.method(Method::OPTIONS, AUTHZ).await;

    response.assert_status_ok();
    assert_eq!(
        response.headers().get(header::ALLOW).expect("allow header"),
        "OPTIONS, GET, POST"
    );
}
