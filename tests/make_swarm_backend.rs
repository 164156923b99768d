//! make-swarm adapter behaviour against a mocked API.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use carina::{
    BackendKind, ClusterBackend, ClusterError, ClusterRequest, ClusterStatus, MakeSwarmAccount,
    MakeSwarmBackend, PollPolicy,
};
use rstest::rstest;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> MakeSwarmBackend {
    let mut account = MakeSwarmAccount::new("alicia", "abc123");
    account.identity_endpoint = format!("{}/v2.0", server.uri());
    account.endpoint = server.uri();
    MakeSwarmBackend::with_http(account, reqwest::Client::new(), PollPolicy::default())
}

async fn mount_identity(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": { "token": { "id": token } } })),
        )
        .mount(server)
        .await;
}

fn cluster_body(status: &str, nodes: serde_json::Value) -> serde_json::Value {
    json!({
        "cluster_name": "demo",
        "username": "alicia",
        "flavor": "container1-4G",
        "image": "swarm",
        "nodes": nodes,
        "autoscale": false,
        "status": status,
    })
}

/// Log sink shared with a scoped `tracing` subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_warnings() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map_or(0, |requests| requests.len())
}

#[tokio::test]
async fn resize_is_unsupported_without_network_calls() {
    let server = MockServer::start().await;
    let backend = backend(&server);

    let err = backend
        .resize_cluster("demo", 5)
        .await
        .expect_err("resize is unsupported");

    assert!(
        matches!(
            err,
            ClusterError::Unsupported {
                backend: BackendKind::MakeSwarm,
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("grow"));
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn templates_are_unsupported_without_network_calls() {
    let server = MockServer::start().await;
    let backend = backend(&server);

    let err = backend
        .list_cluster_templates()
        .await
        .expect_err("templates are unsupported");

    assert!(matches!(err, ClusterError::Unsupported { .. }));
    assert!(err.to_string().contains("--template"));
    assert_eq!(request_count(&server).await, 0);
}

#[rstest]
#[case(None, false)]
#[case(Some(String::from("swarm-dev")), true)]
#[tokio::test]
async fn create_ignores_template(#[case] template: Option<String>, #[case] warns: bool) {
    let (logs, _guard) = capture_warnings();
    let server = MockServer::start().await;
    mount_identity(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/clusters/alicia"))
        .and(header("X-Auth-Token", "tok-1"))
        .and(body_json(json!({
            "cluster_name": "demo",
            "nodes": 3,
            "autoscale": false,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(cluster_body("new", json!("3"))))
        .expect(1)
        .mount(&server)
        .await;

    let request = ClusterRequest::builder()
        .name("demo")
        .template(template)
        .nodes(3)
        .build()
        .unwrap_or_else(|err| panic!("request: {err}"));
    let cluster = backend(&server)
        .create_cluster(&request)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(cluster.name, "demo");
    assert_eq!(cluster.status, ClusterStatus::New);
    assert_eq!(cluster.node_count, 3);
    let output = logs.contents();
    assert_eq!(
        output.contains("Ignoring --template, not supported."),
        warns,
        "captured logs: {output}"
    );
}

#[tokio::test]
async fn grow_posts_the_node_delta() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-1").await;
    Mock::given(method("POST"))
        .and(path("/clusters/alicia/demo/grow"))
        .and(body_json(json!({ "nodes": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("building", json!(3))))
        .expect(1)
        .mount(&server)
        .await;

    let cluster = backend(&server)
        .grow_cluster("demo", 2)
        .await
        .unwrap_or_else(|err| panic!("grow: {err}"));

    assert_eq!(cluster.status, ClusterStatus::Building);
    assert_eq!(cluster.node_count, 3);
}

#[tokio::test]
async fn autoscale_and_rebuild_use_cluster_subpaths() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-1").await;
    Mock::given(method("PUT"))
        .and(path("/clusters/alicia/demo/autoscale/true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cluster_name": "demo",
            "nodes": 1,
            "autoscale": true,
            "status": "active",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/clusters/alicia/demo/rebuild"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cluster_body("rebuilding-swarm", json!(1))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    let scaled = backend
        .set_autoscale("demo", true)
        .await
        .unwrap_or_else(|err| panic!("autoscale: {err}"));
    let rebuilt = backend
        .rebuild_cluster("demo")
        .await
        .unwrap_or_else(|err| panic!("rebuild: {err}"));

    assert_eq!(scaled.autoscale, Some(true));
    assert_eq!(rebuilt.status, ClusterStatus::Rebuilding);
}

#[tokio::test]
async fn missing_cluster_is_not_found() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/clusters/alicia/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = backend(&server)
        .get_cluster("ghost")
        .await
        .expect_err("cluster is missing");

    assert_eq!(
        err,
        ClusterError::NotFound {
            backend: BackendKind::MakeSwarm,
            name: String::from("ghost"),
        }
    );
}

#[tokio::test]
async fn rejected_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": { "token": { "id": "tok-1" } } })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_identity(&server, "tok-2").await;
    Mock::given(method("GET"))
        .and(path("/clusters/alicia/demo"))
        .and(header("X-Auth-Token", "tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clusters/alicia/demo"))
        .and(header("X-Auth-Token", "tok-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_body("active", json!(1))))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    let cluster = backend
        .get_cluster("demo")
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));
    let account = backend
        .authenticated_account()
        .await
        .unwrap_or_else(|err| panic!("account: {err}"))
        .unwrap_or_else(|| panic!("backend should be authenticated"));

    assert_eq!(cluster.status, ClusterStatus::Active);
    assert_eq!(account.token(), "tok-2");
}

#[tokio::test]
async fn second_rejection_is_an_authentication_error() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/clusters/alicia/demo"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let err = backend(&server)
        .get_cluster("demo")
        .await
        .expect_err("token keeps being rejected");

    assert!(matches!(err, ClusterError::Authentication { .. }), "unexpected: {err}");
}

#[tokio::test]
async fn credentials_and_quotas_are_mapped() {
    let server = MockServer::start().await;
    mount_identity(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/clusters/alicia/demo/credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": { "ca.pem": "CA", "docker.env": "export DOCKER_HOST=tcp://1.2.3.4:2376" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quotas/alicia"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "max_clusters": 3,
            "max_nodes_per_cluster": 10,
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let bundle = backend
        .get_cluster_credentials("demo")
        .await
        .unwrap_or_else(|err| panic!("credentials: {err}"));
    let quotas = backend
        .get_quotas()
        .await
        .unwrap_or_else(|err| panic!("quotas: {err}"));

    assert_eq!(bundle.get("ca.pem"), Some(b"CA".as_slice()));
    assert_eq!(bundle.files.len(), 2);
    assert_eq!(quotas.max_clusters, Some(3));
    assert_eq!(quotas.max_nodes_per_cluster, Some(10));
}

#[tokio::test]
async fn wait_until_deleted_returns_immediately() {
    let server = MockServer::start().await;
    let backend = backend(&server);
    let cluster = carina::test_support::cluster_in("demo", ClusterStatus::Active);

    backend
        .wait_until_deleted(cluster)
        .await
        .unwrap_or_else(|err| panic!("wait: {err}"));

    assert_eq!(request_count(&server).await, 0);
}
