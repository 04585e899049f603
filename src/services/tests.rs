//! Tests for the service wrappers against a mock API.

use std::time::Duration;

use super::*;
use crate::api::HttpTransport;
use crate::config::ElestioConfig;
use crate::resize::ResizeError;
use crate::session::SessionManager;
use crate::store::Credential;
use crate::test_support::{ManualClock, MemoryStore};
use rstest::rstest;
use serde_json::{Map, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type TestClient = ApiClient<MemoryStore, ManualClock>;

async fn client() -> (MockServer, TestClient, ManualClock) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/checkAPIToken"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "jwt": "jwt"})),
        )
        .mount(&server)
        .await;
    let transport = HttpTransport::new(server.uri(), Duration::from_secs(5))
        .unwrap_or_else(|err| panic!("transport: {err}"));
    let clock = ManualClock::default();
    let store = MemoryStore::with_credential(Credential::new("ops@example.com", "api-secret"));
    let session = SessionManager::with_clock(store, transport.clone(), clock.clone());
    (server, ApiClient::new(transport, session), clock)
}

async fn respond(server: &MockServer, endpoint: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn list_services_reads_servers_with_numeric_ids() {
    let (server, client, _) = client().await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .and(body_partial_json(
            json!({"appid": "Cloudxx", "projectId": "7", "isActiveService": "true"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "servers": [{"id": 3, "vmID": 4242, "displayName": "pg", "deploymentStatus": "Deployed", "status": "running", "cores": 2}]
        })))
        .mount(&server)
        .await;

    let services = list_services(&client, "7")
        .await
        .unwrap_or_else(|err| panic!("list: {err}"));

    let [service] = services.as_slice() else {
        panic!("expected one service, got {services:?}");
    };
    assert_eq!(service.vm_id.as_deref(), Some("4242"));
    assert!(service.matches_id("4242"));
    assert!(service.is_deployed());
    assert_eq!(service.extra.get("cores"), Some(&json!(2)));
}

#[tokio::test]
async fn list_services_falls_back_to_data_services() {
    let (server, client, _) = client().await;
    respond(
        &server,
        "/api/servers/getServices",
        json!({"data": {"services": [{"vmID": "a"}, {"vmID": "b"}]}}),
    )
    .await;

    let services = list_services(&client, "7")
        .await
        .unwrap_or_else(|err| panic!("list: {err}"));

    assert_eq!(services.len(), 2);
}

#[rstest]
#[case(json!({"status": "KO", "message": "Project not found"}), "Project not found")]
#[case(json!({"code": "AccessDenied"}), "Access denied.")]
#[tokio::test]
async fn list_services_rejects_denied_projects(
    #[case] body: serde_json::Value,
    #[case] expected: &str,
) {
    let (server, client, _) = client().await;
    respond(&server, "/api/servers/getServices", body).await;

    let Err(ApiError::Remote { message }) = list_services(&client, "7").await else {
        panic!("listing should fail");
    };
    assert_eq!(message, expected);
}

#[tokio::test]
async fn service_details_prefers_service_infos() {
    let (server, client, _) = client().await;
    respond(
        &server,
        "/api/servers/getServerDetails",
        json!({"serviceInfos": [{"vmID": "42", "serverType": "MEDIUM-2C-4G", "provider": "netcup"}]}),
    )
    .await;

    let service = service_details(&client, "42", "7")
        .await
        .unwrap_or_else(|err| panic!("details: {err}"));

    assert_eq!(service.server_type.as_deref(), Some("MEDIUM-2C-4G"));
    assert_eq!(service.provider(), Some("netcup"));
}

#[tokio::test]
async fn do_action_wraps_array_responses() {
    let (server, client, _) = client().await;
    Mock::given(method("POST"))
        .and(path(ACTION_ENDPOINT))
        .and(body_partial_json(json!({"vmID": "42", "action": "reboot"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"ok": true}])))
        .mount(&server)
        .await;

    let body = do_action(&client, "42", "reboot", Map::new())
        .await
        .unwrap_or_else(|err| panic!("action: {err}"));

    assert_eq!(body, json!({"status": "OK", "data": [{"ok": true}]}));
}

#[tokio::test]
async fn do_action_reports_failures() {
    let (server, client, _) = client().await;
    respond(&server, ACTION_ENDPOINT, json!({"status": "error"})).await;

    let Err(err) = do_action(&client, "42", "powerOn", Map::new()).await else {
        panic!("action should fail");
    };
    assert_eq!(err.to_string(), "Action \"powerOn\" failed");
}

#[tokio::test]
async fn shutdown_of_managed_database_is_refused() {
    let (server, client, _) = client().await;
    respond(
        &server,
        "/api/servers/getServerDetails",
        json!({"serviceInfos": [{"vmID": "42", "templateName": "PostgreSQL"}]}),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(ACTION_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(0)
        .mount(&server)
        .await;

    let result = power_action(&client, "42", "7", PowerAction::Shutdown).await;

    assert!(
        matches!(&result, Err(ApiError::Remote { message }) if message.contains("managed database")),
        "{result:?}"
    );
}

#[rstest]
#[case("reboot", PowerAction::Reboot)]
#[case("powerOff", PowerAction::PowerOff)]
#[case("poweroff", PowerAction::PowerOff)]
#[case("restart-stack", PowerAction::RestartStack)]
#[case("UNLOCK", PowerAction::Unlock)]
fn power_actions_parse_from_cli_names(#[case] input: &str, #[case] expected: PowerAction) {
    assert_eq!(input.parse::<PowerAction>(), Ok(expected));
}

async fn mount_resize_fixtures(server: &MockServer, current: &str, provider: &str) {
    respond(
        server,
        "/api/servers/getServerDetails",
        json!({"serviceInfos": [{"vmID": "42", "serverType": current, "provider": provider, "datacenter": "nbg"}]}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/servers/getServerSizes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instances": [
            {"title": "SMALL-1C-2G", "providerName": provider, "regionID": "nbg"},
            {"title": "MEDIUM-2C-4G", "providerName": provider, "regionID": "nbg"},
            {"title": "LARGE-4C-8G", "providerName": provider, "regionID": "nbg"}
        ]})))
        .mount(server)
        .await;
}

fn resize_request(size: &str) -> ResizeRequest {
    ResizeRequest {
        vm_id: String::from("42"),
        size: size.to_owned(),
        project_id: String::from("7"),
        fallback_provider: String::from("netcup"),
        fallback_region: String::from("nbg"),
        cpu_ram_only: true,
    }
}

#[tokio::test]
async fn resize_sends_change_type_with_resolved_title() {
    let (server, client, _) = client().await;
    mount_resize_fixtures(&server, "MEDIUM-2C-4G", "netcup").await;
    Mock::given(method("POST"))
        .and(path(ACTION_ENDPOINT))
        .and(body_partial_json(json!({
            "vmID": "42",
            "action": "changeType",
            "newType": "LARGE-4C-8G",
            "region": "nbg",
            "providerName": "netcup",
            "upgradeCPURAMOnly": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = resize_service(&client, &resize_request("large"))
        .await
        .unwrap_or_else(|err| panic!("resize: {err}"));

    let ResizeOutcome::Requested { from, to, downgrade, .. } = outcome else {
        panic!("expected a resize request, got {outcome:?}");
    };
    assert_eq!((from.as_str(), to.as_str(), downgrade), ("MEDIUM-2C-4G", "LARGE-4C-8G", false));
}

#[tokio::test]
async fn resize_to_current_size_sends_nothing() {
    let (server, client, _) = client().await;
    mount_resize_fixtures(&server, "MEDIUM-2C-4G", "netcup").await;
    Mock::given(method("POST"))
        .and(path(ACTION_ENDPOINT))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = resize_service(&client, &resize_request("medium-2c-4g"))
        .await
        .unwrap_or_else(|err| panic!("resize: {err}"));

    assert_eq!(
        outcome,
        ResizeOutcome::AlreadySized {
            size: String::from("MEDIUM-2C-4G")
        }
    );
}

#[tokio::test]
async fn resize_downgrade_on_unsupported_provider_fails() {
    let (server, client, _) = client().await;
    mount_resize_fixtures(&server, "LARGE-4C-8G", "hetzner").await;

    let result = resize_service(&client, &resize_request("SMALL-1C-2G")).await;

    assert!(
        matches!(result, Err(ResizeError::UnsupportedDowngrade { .. })),
        "{result:?}"
    );
}

#[rstest]
#[case("")]
#[case("  ")]
#[tokio::test]
async fn resize_without_size_sends_nothing(#[case] size: &str) {
    let (server, client, _) = client().await;
    mount_resize_fixtures(&server, "MEDIUM-2C-4G", "netcup").await;

    let result = resize_service(&client, &resize_request(size)).await;

    assert!(matches!(result, Err(ResizeError::MissingSize)), "{result:?}");
    let received = server.received_requests().await.unwrap_or_default();
    assert!(
        received.iter().all(|request| request.url.path() == "/api/auth/checkAPIToken"),
        "no service request should be sent: {received:?}"
    );
}

#[tokio::test]
async fn default_project_uses_configuration_first() {
    let (server, client, _) = client().await;

    let project = default_project(&client, Some(" 99 "))
        .await
        .unwrap_or_else(|err| panic!("project: {err}"));

    assert_eq!(project, "99");
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn default_project_falls_back_to_first_listed() {
    let (server, client, _) = client().await;
    respond(
        &server,
        "/api/projects/getList",
        json!({"status": "OK", "data": {"projects": [{"projectID": 12, "project_name": "main"}, {"projectID": 13}]}}),
    )
    .await;

    let project = default_project(&client, None)
        .await
        .unwrap_or_else(|err| panic!("project: {err}"));

    assert_eq!(project, "12");
}

async fn mount_templates(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/servers/getTemplates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"instances": [
            {"id": 11, "title": "PostgreSQL", "dockerhub_default_tag": "16"},
            {"id": 99, "title": "CI-CD-Target"}
        ]})))
        .mount(server)
        .await;
}

fn deploy_options(template: &str) -> DeployOptions {
    DeployOptions {
        template: template.to_owned(),
        project_id: String::from("7"),
        name: Some(String::from("pg-main")),
        ..DeployOptions::default()
    }
}

#[tokio::test]
async fn deploy_dry_run_plans_without_creating() {
    let (server, client, _) = client().await;
    mount_templates(&server).await;

    let options = DeployOptions {
        dry_run: true,
        ..deploy_options("pg")
    };
    let outcome = deploy_service(&client, &ElestioConfig::default(), &options, |_| {})
        .await
        .unwrap_or_else(|err| panic!("deploy: {err}"));

    let DeployOutcome::DryRun(plan) = outcome else {
        panic!("expected dry run, got {outcome:?}");
    };
    assert_eq!(plan.template_id, "11");
    assert_eq!(plan.version, "16");
    assert_eq!(plan.server_type, "MEDIUM-2C-4G");
    assert_eq!(plan.admin_email, "ops@example.com");
    assert_eq!(plan.service_type, "Service");
    let created = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == "/api/servers/createServer")
        .count();
    assert_eq!(created, 0);
}

#[tokio::test]
async fn deploy_without_server_id_or_action_fails() {
    let (server, client, _) = client().await;
    mount_templates(&server).await;
    respond(
        &server,
        "/api/servers/createServer",
        json!({"status": "KO", "message": "Quota exceeded"}),
    )
    .await;

    let config = ElestioConfig::default();
    let Err(err) = deploy_service(&client, &config, &deploy_options("pg"), |_| {}).await else {
        panic!("deploy should fail");
    };
    assert_eq!(err.to_string(), "Quota exceeded");
}

#[tokio::test]
async fn deploy_and_wait_returns_running_service() {
    let (server, client, clock) = client().await;
    mount_templates(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/servers/createServer"))
        .and(body_partial_json(json!({"templateID": "11", "serverName": "pg-main", "appid": "Cloudxx"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"providerServerID": 5150})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/servers/getServices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "servers": [{"vmID": "vm-1", "providerServerID": 5150, "deploymentStatus": "Deploying", "status": "stopped"}]
        })))
        .up_to_n_times(2)
        .with_priority(2)
        .mount(&server)
        .await;
    respond(
        &server,
        "/api/servers/getServices",
        json!({"servers": [{"vmID": "vm-1", "providerServerID": 5150, "deploymentStatus": "Deployed", "status": "running"}]}),
    )
    .await;

    let options = DeployOptions {
        wait: true,
        ..deploy_options("PostgreSQL")
    };
    let mut changes = Vec::new();
    let outcome = deploy_service(&client, &ElestioConfig::default(), &options, |change| {
        changes.push(change.status.clone());
    })
    .await
    .unwrap_or_else(|err| panic!("deploy: {err}"));

    let DeployOutcome::Completed { service, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(service.vm_id.as_deref(), Some("vm-1"));
    assert_eq!(
        changes,
        vec![Some(String::from("Deploying")), Some(String::from("Deployed"))]
    );
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(15),
            Duration::from_secs(15)
        ]
    );
}

#[tokio::test]
async fn unknown_template_is_reported_before_any_call() {
    let (server, client, _) = client().await;
    mount_templates(&server).await;

    let config = ElestioConfig::default();
    let result = deploy_service(&client, &config, &deploy_options("nope"), |_| {}).await;

    assert!(matches!(result, Err(DeployError::TemplateNotFound(_))), "{result:?}");
}
