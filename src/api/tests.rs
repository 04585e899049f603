//! Tests for authentication-failure detection and the request executor.

use std::time::Duration;

use super::*;
use crate::session::SessionManager;
use crate::store::Credential;
use crate::test_support::{ManualClock, MemoryStore};
use rstest::rstest;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const AUTH_PATH: &str = "/api/auth/checkAPIToken";

fn response(status: u16, body: Value) -> RawResponse {
    RawResponse { status, body }
}

#[rstest]
#[case(response(401, Value::Null), true)]
#[case(response(200, json!({"status": "error", "message": "Invalid Auth Token"})), true)]
#[case(response(200, json!({"code": "InvalidToken"})), true)]
#[case(response(200, json!({"status": "KO", "message": "invalid TOKEN supplied"})), true)]
#[case(response(200, json!({"status": "KO", "message": "Not authorised for project"})), false)]
#[case(response(200, json!({"status": "error", "message": "Disk full"})), false)]
#[case(response(500, json!({"message": "Internal error"})), false)]
#[case(response(200, json!([{"id": 1}])), false)]
fn default_signals_classify_responses(#[case] raw: RawResponse, #[case] expected: bool) {
    assert_eq!(AuthSignals::default().detect(&raw).is_some(), expected);
}

#[rstest]
fn custom_signal_extends_detection() {
    let raw = response(403, json!({"status": "error", "message": "Forbidden"}));
    assert!(AuthSignals::default().detect(&raw).is_none());

    let signals = AuthSignals::default().with(AuthSignal::HttpStatus(403));

    assert_eq!(signals.detect(&raw), Some(&AuthSignal::HttpStatus(403)));
    assert_eq!(signals.signals().last(), Some(&AuthSignal::HttpStatus(403)));
    assert_eq!(signals.signals().len(), AuthSignals::default().signals().len() + 1);
}

#[rstest]
#[case("https://api.elest.io/", "https://api.elest.io")]
#[case("http://127.0.0.1:8080", "http://127.0.0.1:8080")]
fn transport_trims_trailing_slash(#[case] configured: &str, #[case] expected: &str) {
    let transport = HttpTransport::new(configured, Duration::from_secs(5))
        .unwrap_or_else(|err| panic!("transport: {err}"));

    assert_eq!(transport.base_url(), expected);
}

#[rstest]
fn request_parameters_replace_earlier_values() {
    let request = ApiRequest::post("/api/servers/getServices")
        .param("projectId", "1")
        .param("projectId", "2")
        .param("isActiveService", "true");

    assert_eq!(request.method, Method::Post);
    assert_eq!(request.params.get("projectId"), Some(&json!("2")));
    assert_eq!(request.params.len(), 2);
}

#[rstest]
#[case(response(200, json!({"message": "Service busy"})), "Service busy")]
#[case(response(502, Value::Null), "HTTP 502")]
fn describe_prefers_server_message(#[case] raw: RawResponse, #[case] expected: &str) {
    assert_eq!(raw.describe(), expected);
}

struct Harness {
    server: MockServer,
    store: MemoryStore,
    client: ApiClient<MemoryStore, ManualClock>,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let store = MemoryStore::with_credential(Credential::new("ops@example.com", "api-secret"));
        let transport = HttpTransport::new(server.uri(), Duration::from_secs(5))
            .unwrap_or_else(|err| panic!("transport: {err}"));
        let session =
            SessionManager::with_clock(store.clone(), transport.clone(), ManualClock::default());
        let client = ApiClient::new(transport, session);
        Self {
            server,
            store,
            client,
        }
    }

    fn with_signals(self, signals: AuthSignals) -> Self {
        Self {
            client: self.client.with_signals(signals),
            ..self
        }
    }

    async fn auth_calls(&self) -> usize {
        self.requests_to(AUTH_PATH).await.len()
    }

    async fn requests_to(&self, wanted: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == wanted)
            .collect()
    }

    async fn mount_auth_sequence(&self, tokens: &[&str]) {
        for (priority, jwt) in (1_u8..).zip(tokens) {
            Mock::given(method("POST"))
                .and(path(AUTH_PATH))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "jwt": jwt})),
                )
                .up_to_n_times(1)
                .with_priority(priority)
                .mount(&self.server)
                .await;
        }
    }
}

#[tokio::test]
async fn retries_once_after_http_401() {
    let harness = Harness::start().await;
    harness.mount_auth_sequence(&["jwt-stale", "jwt-fresh"]).await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .and(body_partial_json(json!({"jwt": "jwt-stale"})))
        .respond_with(ResponseTemplate::new(401))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .and(body_partial_json(json!({"jwt": "jwt-fresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
        .mount(&harness.server)
        .await;

    let body = harness
        .client
        .execute(&ApiRequest::post("/api/servers/getServices"))
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));

    assert_eq!(body, json!({"servers": []}));
    assert_eq!(harness.auth_calls().await, 2);
    assert_eq!(harness.store.session().token.as_deref(), Some("jwt-fresh"));
}

#[tokio::test]
async fn retries_once_after_auth_error_body() {
    let harness = Harness::start().await;
    harness.mount_auth_sequence(&["jwt-stale", "jwt-fresh"]).await;
    Mock::given(method("POST"))
        .and(path("/api/projects/getList"))
        .and(body_partial_json(json!({"jwt": "jwt-stale"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "error", "message": "Invalid Auth Token"})),
        )
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/projects/getList"))
        .and(body_partial_json(json!({"jwt": "jwt-fresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .mount(&harness.server)
        .await;

    let body = harness
        .client
        .execute(&ApiRequest::post("/api/projects/getList"))
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));

    assert_eq!(body, json!({"status": "OK"}));
    assert_eq!(harness.auth_calls().await, 2);
}

#[tokio::test]
async fn second_auth_failure_is_not_retried() {
    let harness = Harness::start().await;
    harness
        .mount_auth_sequence(&["jwt-1", "jwt-2", "jwt-3"])
        .await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": "InvalidToken", "message": "Token revoked"})),
        )
        .mount(&harness.server)
        .await;

    let Err(err) = harness
        .client
        .execute(&ApiRequest::post("/api/servers/getServices"))
        .await
    else {
        panic!("second rejection should fail the call");
    };

    let ApiError::AuthRetryExhausted { endpoint, message } = err else {
        panic!("expected AuthRetryExhausted, got {err:?}");
    };
    assert_eq!(endpoint, "/api/servers/getServices");
    assert_eq!(message, "Token revoked");
    assert_eq!(harness.auth_calls().await, 2);
    assert_eq!(harness.requests_to("/api/servers/getServices").await.len(), 2);
}

#[tokio::test]
async fn non_auth_errors_are_returned_untouched() {
    let harness = Harness::start().await;
    harness.mount_auth_sequence(&["jwt-1"]).await;
    Mock::given(method("POST"))
        .and(path("/api/servers/DoActionOnServer"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "KO", "message": "Server is locked"})),
        )
        .mount(&harness.server)
        .await;

    let body = harness
        .client
        .execute(&ApiRequest::post("/api/servers/DoActionOnServer").param("vmID", "42"))
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));

    assert_eq!(body, json!({"status": "KO", "message": "Server is locked"}));
    assert_eq!(harness.requests_to("/api/servers/DoActionOnServer").await.len(), 1);
}

#[tokio::test]
async fn get_requests_carry_token_and_params_in_query() {
    let harness = Harness::start().await;
    harness.mount_auth_sequence(&["jwt-q"]).await;
    Mock::given(method("GET"))
        .and(path("/api/servers/getServerDetails"))
        .and(query_param("jwt", "jwt-q"))
        .and(query_param("vmID", "42"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness
        .client
        .execute(
            &ApiRequest::get("/api/servers/getServerDetails")
                .param("vmID", "42")
                .param("limit", 5),
        )
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));
}

#[tokio::test]
async fn post_requests_merge_token_into_body() {
    let harness = Harness::start().await;
    harness.mount_auth_sequence(&["jwt-b"]).await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .and(body_partial_json(
            json!({"jwt": "jwt-b", "appid": "Cloudxx", "projectId": "7"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness
        .client
        .execute(
            &ApiRequest::post("/api/servers/getServices")
                .param("appid", "Cloudxx")
                .param("projectId", "7"),
        )
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));
}

#[tokio::test]
async fn unauthenticated_requests_skip_the_session() {
    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/api/servers/getTemplates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instances": []})))
        .mount(&harness.server)
        .await;

    let body = harness
        .client
        .execute_unauthenticated(&ApiRequest::get("/api/servers/getTemplates"))
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));

    assert_eq!(body, json!({"instances": []}));
    assert_eq!(harness.auth_calls().await, 0);
    let requests = harness.requests_to("/api/servers/getTemplates").await;
    let [request] = requests.as_slice() else {
        panic!("expected one catalog request");
    };
    assert_eq!(request.url.query(), None);
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/api/servers/getServerSizes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&harness.server)
        .await;

    let result = harness
        .client
        .execute_unauthenticated(&ApiRequest::get("/api/servers/getServerSizes"))
        .await;

    assert!(matches!(result, Err(ApiError::Decode { .. })), "{result:?}");
}

#[tokio::test]
async fn size_catalog_is_fetched_once() {
    use crate::catalog::SizeCatalog;

    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/api/servers/getServerSizes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [{"title": "SMALL-1C-2G", "providerName": "netcup", "regionID": "nbg"}]
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    let first = harness
        .client
        .sizes()
        .await
        .unwrap_or_else(|err| panic!("sizes: {err}"));
    let second = harness
        .client
        .sizes()
        .await
        .unwrap_or_else(|err| panic!("sizes again: {err}"));

    assert_eq!(first.len(), 1);
    assert!(std::sync::Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn put_requests_merge_token_into_body() {
    let harness = Harness::start().await;
    harness.mount_auth_sequence(&["jwt-put"]).await;
    Mock::given(method("PUT"))
        .and(path("/api/servers/updateAlerts"))
        .and(body_partial_json(json!({"jwt": "jwt-put", "vmID": "42", "enabled": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&harness.server)
        .await;

    let body = harness
        .client
        .execute(
            &ApiRequest::put("/api/servers/updateAlerts")
                .param("vmID", "42")
                .param("enabled", true),
        )
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));

    assert_eq!(body, json!({"status": "OK"}));
}

#[tokio::test]
async fn delete_requests_merge_token_into_body() {
    let harness = Harness::start().await;
    harness.mount_auth_sequence(&["jwt-del"]).await;
    Mock::given(method("DELETE"))
        .and(path("/api/servers/deleteService"))
        .and(body_partial_json(json!({"jwt": "jwt-del", "vmID": "42"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness
        .client
        .execute(&ApiRequest::delete("/api/servers/deleteService").param("vmID", "42"))
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));

    let requests = harness.requests_to("/api/servers/deleteService").await;
    let [request] = requests.as_slice() else {
        panic!("expected one delete request");
    };
    assert_eq!(request.url.query(), None);
}

#[tokio::test]
async fn custom_signal_triggers_the_retry() {
    let harness = Harness::start()
        .await
        .with_signals(AuthSignals::default().with(AuthSignal::HttpStatus(403)));
    harness.mount_auth_sequence(&["jwt-stale", "jwt-fresh"]).await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .and(body_partial_json(json!({"jwt": "jwt-stale"})))
        .respond_with(ResponseTemplate::new(403))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .and(body_partial_json(json!({"jwt": "jwt-fresh"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
        .mount(&harness.server)
        .await;

    let body = harness
        .client
        .execute(&ApiRequest::post("/api/servers/getServices"))
        .await
        .unwrap_or_else(|err| panic!("execute: {err}"));

    assert_eq!(body, json!({"servers": []}));
    assert_eq!(harness.auth_calls().await, 2);
    assert_eq!(harness.requests_to("/api/servers/getServices").await.len(), 2);
}

#[tokio::test]
async fn refreshed_size_catalog_replaces_the_cached_copy() {
    use crate::catalog::SizeCatalog;

    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/api/servers/getServerSizes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [{"title": "SMALL-1C-2G", "providerName": "netcup", "regionID": "nbg"}]
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/servers/getServerSizes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [
                {"title": "SMALL-1C-2G", "providerName": "netcup", "regionID": "nbg"},
                {"title": "LARGE-4C-8G", "providerName": "netcup", "regionID": "nbg"}
            ]
        })))
        .with_priority(2)
        .mount(&harness.server)
        .await;

    let stale = harness
        .client
        .sizes()
        .await
        .unwrap_or_else(|err| panic!("sizes: {err}"));
    let refreshed = harness
        .client
        .refresh_sizes()
        .await
        .unwrap_or_else(|err| panic!("refresh: {err}"));
    let cached = harness
        .client
        .sizes()
        .await
        .unwrap_or_else(|err| panic!("sizes after refresh: {err}"));

    assert_eq!(stale.len(), 1);
    assert_eq!(refreshed.len(), 2);
    assert!(std::sync::Arc::ptr_eq(&refreshed, &cached));
    assert!(!std::sync::Arc::ptr_eq(&stale, &cached));
    assert_eq!(harness.requests_to("/api/servers/getServerSizes").await.len(), 2);
}
