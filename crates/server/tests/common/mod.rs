//! Shared setup for the HTTP level tests.

#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use cell_authz::{
    AppState,
    api::build_router,
    config::{
        AdminConfig, AppConfig, AuthnConfig, IpNet, KeysConfig, LockConfig, PasswordPolicy,
        TokenConfig,
    },
    directory::{AccountStatus, NewAccount},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub const BASE_URL: &str = "https://cells.example.com";
pub const CLIENT_ID: &str = "https://app.example.com/";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const PASSWORD: &str = "password1";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        base_url: BASE_URL.into(),
        // axum-test connects from loopback, standing in for the reverse proxy.
        trusted_proxies: vec!["127.0.0.1/32".parse::<IpNet>().expect("cidr")],
        admin: AdminConfig {
            allowed_nets: vec!["127.0.0.1/32".parse::<IpNet>().expect("cidr")],
        },
        authn: AuthnConfig {
            account_lock_count: 3,
            account_lock_time: 600,
            valid_authn_interval: 0,
        },
        token: TokenConfig::default(),
        lock: LockConfig::default(),
        keys: KeysConfig::default(),
        password: PasswordPolicy::default(),
    }
}

pub async fn test_state(config: AppConfig) -> AppState {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    AppState::new(Arc::new(db), Arc::new(config)).expect("app state")
}

/// Serves over a real socket so handlers see a peer address.
pub fn test_server(state: AppState) -> TestServer {
    TestServer::new(build_router(state).into_make_service_with_connect_info::<SocketAddr>())
        .expect("create test server")
}

/// Creates `cell` and one account per `(name, status)` pair, all with [`PASSWORD`].
pub async fn provision(state: &AppState, cell: &str, accounts: &[(&str, AccountStatus)]) {
    state.cells.create(cell).await.expect("create cell");
    for (name, status) in accounts {
        state
            .directory
            .create(
                cell,
                NewAccount {
                    name: name.to_string(),
                    password: PASSWORD.to_string(),
                    status: *status,
                    ip_address_range: None,
                },
            )
            .await
            .expect("create account");
    }
}

pub fn forwarded_for(ip: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_static(ip),
    )
}

/// The `key=value` pairs after `#` in a redirect location, percent-decoded.
pub fn fragment(location: &str) -> HashMap<String, String> {
    let (_, fragment) = location.split_once('#').expect("location has a fragment");
    fragment
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let v = urlencoding::decode(v).expect("utf-8").into_owned();
            (k.to_string(), v)
        })
        .collect()
}

pub fn location(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}
