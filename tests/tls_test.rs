//! End-to-end tests with TLS termination.

use std::time::Duration;

use portcullis::http::StatusBody;
use rcgen::{CertificateParams, KeyPair};
use time::OffsetDateTime;

mod common;

fn self_signed(valid_for: time::Duration) -> (String, String) {
    let mut params =
        CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
    params.not_before = OffsetDateTime::now_utc() - time::Duration::days(1);
    params.not_after = OffsetDateTime::now_utc() + valid_for;
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

fn tls_config(valid_for: time::Duration) -> String {
    tls_config_with_backend(valid_for, &common::closed_port().to_string())
}

fn tls_config_with_backend(valid_for: time::Duration, backend: &str) -> String {
    let (cert, key) = self_signed(valid_for);
    format!(
        r#"
        [server]
        instance_id = "tls"

        [listener.tls]
        cert = '''
{cert}'''
        key = '''
{key}'''

        [[routes]]
        path = "/about"
        resource = "about"

        [[routes]]
        path = "/api"
        resource = "backend"

        [[resources.backend]]
        url = "http://{backend}"
        "#
    )
}

fn tls_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[tokio::test]
async fn tls_responses_carry_hsts() {
    let proxy = common::start_proxy(&tls_config(time::Duration::days(90))).await;
    let url = format!("https://{}/nowhere", proxy.addr);

    let res = tls_client().get(url).send().await.unwrap();

    assert_eq!(res.status(), 404);
    assert_eq!(res.headers()["strict-transport-security"], "max-age=31536000");
    assert_eq!(res.headers()["x-frame-options"], "sameorigin");
    let body: StatusBody = res.json().await.unwrap();
    assert_eq!(body.message, "not found");
    assert!(body.request_id.starts_with("XR-tls-"));

    proxy.stop().await;
}

#[tokio::test]
async fn forwarded_responses_carry_hsts() {
    let mut backend = common::start_backend(200, "upstream says hi").await;
    let proxy = common::start_proxy(&tls_config_with_backend(
        time::Duration::days(90),
        &backend.addr.to_string(),
    ))
    .await;

    let res = tls_client()
        .get(format!("https://{}/api/items", proxy.addr))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["strict-transport-security"], "max-age=31536000");
    let request_id = res.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(request_id.starts_with("XR-tls-"));
    assert_eq!(res.text().await.unwrap(), "upstream says hi");

    let head = backend.next_request().await;
    assert!(head.starts_with("GET /api/items HTTP/1.1"));
    assert_eq!(common::header_in(&head, "x-forwarded-proto").as_deref(), Some("https"));
    assert_eq!(common::header_in(&head, "x-request-id"), Some(request_id));

    proxy.stop().await;
}

#[tokio::test]
async fn about_reports_certificate_state() {
    let proxy = common::start_proxy(&tls_config(time::Duration::days(10))).await;
    let url = format!("https://{}/about", proxy.addr);

    let res = tls_client().get(url).send().await.unwrap();

    assert_eq!(res.status(), 200);
    let about: serde_json::Value = res.json().await.unwrap();
    assert_eq!(about["tls"]["mode"], true);
    assert_eq!(about["tls"]["expiry"], "expiring_soon");
    assert!(about["tls"]["notAfter"].as_u64().is_some());

    proxy.stop().await;
}

#[tokio::test]
async fn plaintext_client_is_rejected_on_tls_listener() {
    let proxy = common::start_proxy(&tls_config(time::Duration::days(90))).await;

    let res = common::client()
        .get(format!("http://{}/about", proxy.addr))
        .send()
        .await;

    assert!(res.is_err());

    proxy.stop().await;
}
