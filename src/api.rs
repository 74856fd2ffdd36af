use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{Config, ResponseFormat};
use crate::error::InputError;
use crate::provider::{self, BuildError, Credentials, ProviderKind};
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::record::DesiredState;

pub struct AppState {
    pub config: Config,
    pub reconciler: Reconciler,
}

#[derive(Debug, Serialize)]
struct ApiResponse {
    status: &'static str,
    code: u8,
    msg: String,
}

/// Inbound body. Field names follow what router scripts already send.
#[derive(Debug, Deserialize)]
struct UpdateRequest {
    #[serde(default)]
    domain: String,
    #[serde(default, alias = "host")]
    record: String,
    #[serde(default = "default_record_type", rename = "type")]
    record_type: String,
    #[serde(default, alias = "value")]
    ip: String,
    ttl: Option<u32>,
    #[serde(alias = "weight")]
    priority: Option<u32>,
    line: Option<String>,

    #[serde(alias = "access_key_id")]
    id: Option<String>,
    #[serde(alias = "access_key_secret")]
    secret: Option<String>,
    #[serde(alias = "key")]
    token: Option<String>,
    zone: Option<String>,
}

fn default_record_type() -> String {
    "A".to_string()
}

impl UpdateRequest {
    fn desired_state(&self) -> DesiredState {
        DesiredState::new(&self.domain, &self.record, &self.record_type, &self.ip)
            .with_ttl(self.ttl)
            .with_priority(self.priority)
            .with_line(self.line.clone())
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            access_key_id: self.id.clone(),
            access_key_secret: self.secret.clone(),
            token: self.token.clone(),
            zone: self.zone.clone(),
        }
    }
}

pub fn create_router(config: Config) -> Router {
    let reconciler = Reconciler::new(config.server.timeout());
    let state = Arc::new(AppState { config, reconciler });

    Router::new()
        .route("/ddns/{provider}", post(update_dns))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// One line per request under the `access` target. Bodies carry credentials
/// and are never logged; the provider segment is pulled out as its own field.
async fn access_log(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let provider = path
        .strip_prefix("/ddns/")
        .filter(|p| !p.is_empty())
        .unwrap_or("-")
        .to_string();
    let client = client_ip(request.headers());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(request).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        target: "access",
        "{} {} provider={} client={} status={} ua=\"{}\" {:.3}ms",
        method,
        path,
        provider,
        client,
        response.status().as_u16(),
        user_agent,
        elapsed_ms
    );

    response
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> String {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header_str("x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .or_else(|| header_str("x-real-ip"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "-".to_string())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": ["aliyun", "cloudflare", "namesilo"]
    }))
}

async fn update_dns(
    State(state): State<Arc<AppState>>,
    Path(provider_name): Path<String>,
    body: Bytes,
) -> Response {
    let (target, value, outcome) = handle(&state, &provider_name, &body).await;
    log_outcome(&provider_name, &target, &outcome);

    let reply = describe(&outcome, &target, &value);
    match state.config.server.response_format {
        ResponseFormat::Object => (reply.http, Json(reply.body)).into_response(),
        ResponseFormat::Code => (reply.http, Json(reply.body.code)).into_response(),
    }
}

/// Decodes the request and runs one reconciliation. Returns the target name
/// and desired value alongside the outcome for the response message.
async fn handle(state: &AppState, provider_name: &str, body: &[u8]) -> (String, String, ReconcileOutcome) {
    let unknown = || ("-".to_string(), "-".to_string());

    let kind = match provider_name.parse::<ProviderKind>() {
        Ok(kind) => kind,
        Err(e) => {
            let (target, value) = unknown();
            return (target, value, ReconcileOutcome::InvalidInput(e));
        }
    };

    let request: UpdateRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            let (target, value) = unknown();
            return (
                target,
                value,
                ReconcileOutcome::InvalidInput(InputError::MalformedBody(e.to_string())),
            );
        }
    };

    let desired = request.desired_state();
    let target = desired.full_name.clone();
    let value = desired.value.clone();

    let store = match provider::build_store(
        kind,
        &request.credentials(),
        &state.config.endpoints,
        state.config.server.timeout(),
    ) {
        Ok(store) => store,
        Err(BuildError::Input(e)) => return (target, value, ReconcileOutcome::InvalidInput(e)),
        Err(BuildError::Client(e)) => return (target, value, ReconcileOutcome::ListFailed(e)),
    };

    debug!("Reconciling {} {} via {}", target, desired.record_type, store.name());
    let outcome = state.reconciler.reconcile(&desired, store.as_ref()).await;
    (target, value, outcome)
}

fn log_outcome(provider: &str, target: &str, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Updated { record_id, previous } => {
            info!("[{}] Updated {} (record {}), previous value {}", provider, target, record_id, previous)
        }
        ReconcileOutcome::AlreadyCurrent { record_id } => {
            info!("[{}] {} (record {}) already current", provider, target, record_id)
        }
        ReconcileOutcome::NoMatchingRecord => warn!("[{}] No record found for {}", provider, target),
        ReconcileOutcome::InvalidInput(e) => warn!("[{}] Invalid request for {}: {}", provider, target, e),
        ReconcileOutcome::ListFailed(e) => error!("[{}] Query for {} failed: {}", provider, target, e),
        ReconcileOutcome::UpdateFailed(e) => error!("[{}] Update of {} failed: {}", provider, target, e),
    }
}

struct Reply {
    http: StatusCode,
    body: ApiResponse,
}

fn describe(outcome: &ReconcileOutcome, target: &str, value: &str) -> Reply {
    let failure_status = |timed_out: bool| {
        if timed_out {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::BAD_GATEWAY
        }
    };

    let (http, status, code, msg) = match outcome {
        ReconcileOutcome::Updated { previous, .. } => (
            StatusCode::OK,
            "updated",
            0,
            format!("Updated {target} from {previous} to {value}"),
        ),
        ReconcileOutcome::AlreadyCurrent { .. } => (
            StatusCode::OK,
            "unchanged",
            2,
            format!("{target} already points to {value}"),
        ),
        ReconcileOutcome::NoMatchingRecord => (
            StatusCode::NOT_FOUND,
            "not_found",
            1,
            format!("Can't find record for {target}"),
        ),
        ReconcileOutcome::InvalidInput(e @ InputError::UnknownProvider(_)) => {
            (StatusCode::NOT_FOUND, "invalid_input", 1, e.to_string())
        }
        ReconcileOutcome::InvalidInput(e) => (
            StatusCode::BAD_REQUEST,
            "invalid_input",
            1,
            format!("Params are invalid for {target}: {e}"),
        ),
        ReconcileOutcome::ListFailed(e) => (
            failure_status(e.is_timeout()),
            "query_failed",
            1,
            format!("Query DNS record for {target} failed: {e}"),
        ),
        ReconcileOutcome::UpdateFailed(e) => (
            failure_status(e.is_timeout()),
            "update_failed",
            1,
            format!("Update DNS record for {target} failed: {e}"),
        ),
    };

    Reply {
        http,
        body: ApiResponse { status, code, msg },
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use httpmock::prelude::*;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn config_for(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.endpoints.aliyun = server.base_url();
        config.endpoints.cloudflare = server.base_url();
        config.endpoints.namesilo = server.base_url();
        config.server.timeout_secs = 5;
        config
    }

    async fn post(config: Config, provider: &str, body: Value) -> (StatusCode, Value) {
        let app = create_router(config);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri(format!("/ddns/{provider}"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn cloudflare_body(ip: &str) -> Value {
        json!({
            "domain": "example.com",
            "record": "home",
            "ip": ip,
            "token": "cf-token",
            "zone": "zone123"
        })
    }

    async fn mock_cloudflare_list<'a>(server: &'a MockServer, content: &str) -> httpmock::Mock<'a> {
        let content = content.to_string();
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/zones/zone123/dns_records");
                then.status(200).json_body(json!({
                    "success": true,
                    "errors": [],
                    "result": [{"id": "r1", "type": "A", "name": "home.example.com", "content": content, "ttl": 1}]
                }));
            })
            .await
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(Config::default());
        let response = app
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "-");

        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());
        assert_eq!(client_ip(&headers), "198.51.100.7");

        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.5");
    }

    #[tokio::test]
    async fn test_cloudflare_update_end_to_end() {
        let server = MockServer::start_async().await;
        let list = mock_cloudflare_list(&server, "9.9.9.9").await;
        let update = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/zones/zone123/dns_records/r1")
                    .json_body_partial(r#"{"content": "1.2.3.4"}"#);
                then.status(200)
                    .json_body(json!({"success": true, "errors": [], "result": {"id": "r1"}}));
            })
            .await;

        let (status, body) = post(config_for(&server), "cloudflare", cloudflare_body("1.2.3.4")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "updated");
        assert_eq!(body["code"], 0);
        list.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_unchanged_makes_no_update_call() {
        let server = MockServer::start_async().await;
        mock_cloudflare_list(&server, "1.2.3.4").await;
        let update = server
            .mock_async(|when, then| {
                when.method(PUT);
                then.status(200).json_body(json!({"success": true}));
            })
            .await;

        let (status, body) = post(config_for(&server), "cloudflare", cloudflare_body("1.2.3.4")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "unchanged");
        assert_eq!(body["code"], 2);
        assert_eq!(update.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_missing_domain_makes_no_calls() {
        let server = MockServer::start_async().await;
        let list = mock_cloudflare_list(&server, "9.9.9.9").await;

        let (status, body) = post(
            config_for(&server),
            "cloudflare",
            json!({"record": "home", "ip": "1.2.3.4", "token": "t", "zone": "zone123"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "invalid_input");
        assert_eq!(body["code"], 1);
        assert_eq!(list.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let (status, body) = post(
            Config::default(),
            "aliyun",
            json!({"domain": "example.com", "record": "home", "ip": "1.2.3.4", "id": "LTAIkey"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["msg"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let (status, body) = post(Config::default(), "route53", cloudflare_body("1.2.3.4")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "invalid_input");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = create_router(Config::default());
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/ddns/cloudflare")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_failure_is_query_failed() {
        let server = MockServer::start_async().await;
        let update = server
            .mock_async(|when, then| {
                when.method(PUT);
                then.status(200).json_body(json!({"success": true}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/zones/zone123/dns_records");
                then.status(403).json_body(json!({
                    "success": false,
                    "errors": [{"code": 10000, "message": "Authentication error"}]
                }));
            })
            .await;

        let (status, body) = post(config_for(&server), "cloudflare", cloudflare_body("1.2.3.4")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], "query_failed");
        assert!(body["msg"].as_str().unwrap().contains("Authentication error"));
        assert_eq!(update.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_connection_refused_is_query_failed() {
        let mut config = Config::default();
        config.endpoints.cloudflare = "http://127.0.0.1:1".to_string();

        let (status, body) = post(config, "cloudflare", cloudflare_body("1.2.3.4")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], "query_failed");
    }

    #[tokio::test]
    async fn test_namesilo_no_matching_record() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/dnsListRecords");
                then.status(200).body(
                    "<namesilo><reply><code>300</code><detail>success</detail>\
                     <resource_record><record_id>x1</record_id><type>A</type><host>office.example.com</host>\
                     <value>9.9.9.9</value><ttl>3600</ttl><distance>0</distance></resource_record>\
                     </reply></namesilo>",
                );
            })
            .await;

        let (status, body) = post(
            config_for(&server),
            "namesilo",
            json!({"domain": "example.com", "record": "home", "ip": "1.2.3.4", "token": "ns-key"}),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "not_found");
        assert_eq!(body["code"], 1);
    }

    #[tokio::test]
    async fn test_aliyun_update_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/").query_param("Action", "DescribeDomainRecords");
                then.status(200).json_body(json!({
                    "RequestId": "req-1",
                    "DomainRecords": {"Record": [
                        {"RR": "home", "DomainName": "example.com", "RecordId": "9001", "Type": "A",
                         "Value": "9.9.9.9", "TTL": 600, "Line": "default"}
                    ]}
                }));
            })
            .await;
        let update = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/")
                    .query_param("Action", "UpdateDomainRecord")
                    .query_param("RecordId", "9001");
                then.status(400).json_body(json!({
                    "RequestId": "req-2",
                    "Code": "Throttling.User",
                    "Message": "Request was denied due to user flow control."
                }));
            })
            .await;

        let (status, body) = post(
            config_for(&server),
            "aliyun",
            json!({"domain": "example.com", "record": "home", "ip": "1.2.3.4", "id": "LTAIkey", "secret": "s"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], "update_failed");
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_code_response_format() {
        let server = MockServer::start_async().await;
        mock_cloudflare_list(&server, "1.2.3.4").await;
        let mut config = config_for(&server);
        config.server.response_format = ResponseFormat::Code;

        let (status, body) = post(config, "cloudflare", cloudflare_body("1.2.3.4")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(2));
    }
}
