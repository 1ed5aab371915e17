use goose::prelude::*;
use std::env;

fn var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/healthz").await?;
    Ok(())
}

async fn get_certs(user: &mut GooseUser) -> TransactionResult {
    let path = format!("/{}/__certs", var("CELL", "loadtest"));
    let _goose_metrics = user.get(&path).await?;
    Ok(())
}

async fn get_login_form(user: &mut GooseUser) -> TransactionResult {
    let path = format!(
        "/{}/__authz?response_type=token&client_id={}&redirect_uri={}&state=load",
        var("CELL", "loadtest"),
        var("CLIENT_ID", "http://localhost:8080/"),
        var("REDIRECT_URI", "http://localhost:8080/healthz"),
    );
    let _goose_metrics = user.get(&path).await?;
    Ok(())
}

// The redirect lands on /healthz by default; the fragment is never sent.
async fn password_flow(user: &mut GooseUser) -> TransactionResult {
    let path = format!("/{}/__authz", var("CELL", "loadtest"));
    let form = [
        ("response_type", "token".to_string()),
        ("client_id", var("CLIENT_ID", "http://localhost:8080/")),
        ("redirect_uri", var("REDIRECT_URI", "http://localhost:8080/healthz")),
        ("state", "load".to_string()),
        ("username", var("USERNAME", "loadtest")),
        ("password", var("PASSWORD", "loadtest1")),
    ];
    let _goose_metrics = user.post_form(&path, &form).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    println!(
        "Cell: {}, account: {}",
        var("CELL", "loadtest"),
        var("USERNAME", "loadtest")
    );

    GooseAttack::initialize()?
        .register_scenario(
            scenario!("HealthCheck").register_transaction(transaction!(health_check)),
        )
        .register_scenario(
            scenario!("Certificates").register_transaction(transaction!(get_certs)),
        )
        .register_scenario(
            scenario!("Authorization")
                .register_transaction(transaction!(get_login_form))
                .register_transaction(transaction!(password_flow)),
        )
        .execute()
        .await?;

    Ok(())
}
