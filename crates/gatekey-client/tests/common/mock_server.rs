//! Mock auth service endpoints
//!
//! Each helper mounts a `GET /v1/access/{id}`, `GET /v1/bucket` or
//! `GET /v1/health/live` responder on a wiremock server. Helpers taking `expected` register a call
//! count that wiremock verifies when the server drops.

use std::time::Duration;

use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{grant_body, CLIENT_IP, TEST_TOKEN};

fn access_path(access_key_id: &str) -> String {
    format!("/v1/access/{}", access_key_id)
}

/// Resolve succeeds, and only when the expected headers are present
pub async fn mock_access_granted(server: &MockServer, access_key_id: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path(access_path(access_key_id)))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .and(header("forwarded", format!("for={}", CLIENT_IP).as_str()))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_body(false)))
        .expect(expected)
        .mount(server)
        .await;
}

/// Resolve answers `status` every time
pub async fn mock_access_status(server: &MockServer, access_key_id: &str, status: u16, expected: u64) {
    Mock::given(method("GET"))
        .and(path(access_path(access_key_id)))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(server)
        .await;
}

/// Resolve answers after `delay`, so concurrent callers overlap
pub async fn mock_access_slow(
    server: &MockServer,
    access_key_id: &str,
    status: u16,
    delay: Duration,
    expected: u64,
) {
    let template = if status == 200 {
        ResponseTemplate::new(200).set_body_json(grant_body(true))
    } else {
        ResponseTemplate::new(status)
    };
    Mock::given(method("GET"))
        .and(path(access_path(access_key_id)))
        .respond_with(template.set_delay(delay))
        .expect(expected)
        .mount(server)
        .await;
}

/// First `fail_count` resolves answer 500, then the grant
pub async fn mock_access_flaky(server: &MockServer, access_key_id: &str, fail_count: u64) {
    Mock::given(method("GET"))
        .and(path(access_path(access_key_id)))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(fail_count)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(access_path(access_key_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_body(false)))
        .mount(server)
        .await;
}

/// First resolve answers 200 with a body that is not JSON, then the grant
pub async fn mock_access_garbled_once(server: &MockServer, access_key_id: &str) {
    Mock::given(method("GET"))
        .and(path(access_path(access_key_id)))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(access_path(access_key_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_body(false)))
        .mount(server)
        .await;
}

/// Bucket check answers 200 with `body`, only when the expected headers are present
pub async fn mock_bucket_check(server: &MockServer, bucket: &str, body: serde_json::Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/bucket"))
        .and(query_param("bucket", bucket))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .and(header("forwarded", format!("for={}", CLIENT_IP).as_str()))
        .and(header_exists("x-request-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

/// Bucket check answers `status` for the first `times` calls
pub async fn mock_bucket_status(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path("/v1/bucket"))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Liveness endpoint answering `status`
pub async fn mock_health_live(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/v1/health/live"))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(server)
        .await;
}

/// Number of requests the server has seen
pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or_default()
}
