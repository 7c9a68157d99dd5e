//! `HttpIdentityGateway` against a local stub of the identity service
use std::net::SocketAddr;
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use passkey_server::{HttpIdentityGateway, IdentityGateway, PasskeyError, RegistrationRequest};
use serde_json::{json, Value};

async fn create_user(body: web::Json<Value>) -> HttpResponse {
    let username = format!(
        "{}-{}",
        body["username"].as_str().unwrap_or_default(),
        body["firstName"].as_str().unwrap_or_default()
    );
    HttpResponse::Created().json(json!({
        "message": "user created",
        "user": {
            "user_id": 42,
            "email": body["email"],
            "username": username,
        }
    }))
}

async fn conflict() -> HttpResponse {
    HttpResponse::Conflict().json(json!({"message": "email already exists"}))
}

async fn malformed() -> HttpResponse {
    HttpResponse::Ok().json(json!({"unexpected": true}))
}

async fn slow() -> HttpResponse {
    actix_web::rt::time::sleep(Duration::from_secs(3)).await;
    HttpResponse::Ok().finish()
}

/// Start the stub on an ephemeral port
fn start_stub() -> (SocketAddr, ServerHandle) {
    let server = HttpServer::new(|| {
        App::new()
            .route("/ok/users", web::post().to(create_user))
            .route("/conflict/users", web::post().to(conflict))
            .route("/malformed/users", web::post().to(malformed))
            .route("/slow/users", web::post().to(slow))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);
    (addr, handle)
}

fn gateway(addr: SocketAddr, prefix: &str) -> HttpIdentityGateway {
    HttpIdentityGateway::new(&format!("http://{addr}/{prefix}"), Duration::from_secs(1)).unwrap()
}

#[actix_web::test]
async fn test_resolves_identity_and_forwards_handle_fields() {
    let (addr, handle) = start_stub();

    let mut request = RegistrationRequest::new("a@example.com", Some("alice"));
    request
        .extra
        .insert("firstName".to_string(), json!("Alice"));

    let identity = gateway(addr, "ok").resolve(&request).await.unwrap();
    assert_eq!(identity.user_id, "42");
    assert_eq!(identity.email, "a@example.com");
    assert_eq!(identity.username, "alice-Alice");

    handle.stop(false).await;
}

#[actix_web::test]
async fn test_rejected_handle_is_identity_unavailable() {
    let (addr, handle) = start_stub();

    let result = gateway(addr, "conflict")
        .resolve(&RegistrationRequest::new("a@example.com", None))
        .await;
    assert!(matches!(result, Err(PasskeyError::IdentityUnavailable(_))));

    handle.stop(false).await;
}

#[actix_web::test]
async fn test_malformed_body_is_identity_unavailable() {
    let (addr, handle) = start_stub();

    let result = gateway(addr, "malformed")
        .resolve(&RegistrationRequest::new("a@example.com", None))
        .await;
    assert!(matches!(result, Err(PasskeyError::IdentityUnavailable(_))));

    handle.stop(false).await;
}

#[actix_web::test]
async fn test_slow_service_times_out() {
    let (addr, handle) = start_stub();

    let started = std::time::Instant::now();
    let result = gateway(addr, "slow")
        .resolve(&RegistrationRequest::new("a@example.com", None))
        .await;
    assert!(matches!(result, Err(PasskeyError::IdentityUnavailable(_))));
    assert!(started.elapsed() < Duration::from_secs(3));

    handle.stop(false).await;
}

#[actix_web::test]
async fn test_unreachable_service_is_identity_unavailable() {
    let gateway =
        HttpIdentityGateway::new("http://127.0.0.1:9/api/v1", Duration::from_secs(1)).unwrap();
    let result = gateway
        .resolve(&RegistrationRequest::new("a@example.com", None))
        .await;
    assert!(matches!(result, Err(PasskeyError::IdentityUnavailable(_))));
}
