//! Client orchestration: backend dispatch, waits, and cache persistence.

use camino::Utf8PathBuf;
use chrono::{DateTime, TimeZone, Utc};
use carina::test_support::{ScriptedBackend, cluster_in};
use carina::{
    Account, BackendKind, Client, ClientError, ClientSettings, ClusterError, ClusterRequest,
    ClusterStatus, CredentialCache, MakeSwarmAccount,
};
use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CacheFixture {
    _tmp: TempDir,
    path: Utf8PathBuf,
}

impl CacheFixture {
    fn load(&self) -> CredentialCache {
        CredentialCache::load(self.path.clone()).unwrap_or_else(|err| panic!("load cache: {err}"))
    }
}

#[fixture]
fn cache_fixture() -> CacheFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("cache.json"))
        .unwrap_or_else(|err| panic!("temp path should be utf8: {}", err.display()));
    CacheFixture { _tmp: tmp, path }
}

fn authenticated(token: &str) -> Account {
    let mut account = MakeSwarmAccount::new("alicia", "abc123");
    account.token = token.to_owned();
    Account::MakeSwarm(account)
}

#[rstest]
#[tokio::test]
async fn operations_persist_the_authenticated_account(cache_fixture: CacheFixture) {
    let account = authenticated("tok-1");
    let backend = ScriptedBackend::new(BackendKind::MakeSwarm).with_account(account.clone());
    backend.push_cluster(cluster_in("demo", ClusterStatus::Active));
    let mut client = Client::with_backend(Box::new(backend), Some(cache_fixture.load()));

    let cluster = client
        .get_cluster("demo", false)
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));

    assert_eq!(cluster.status, ClusterStatus::Active);
    let reloaded = cache_fixture.load();
    let entry = reloaded
        .entry(&account.id())
        .unwrap_or_else(|| panic!("account should be cached"));
    assert_eq!(entry.token, "tok-1");
}

#[rstest]
#[tokio::test]
async fn failed_operations_still_persist_the_account(cache_fixture: CacheFixture) {
    let account = authenticated("tok-1");
    let backend = ScriptedBackend::new(BackendKind::MakeSwarm).with_account(account.clone());
    backend.push_error(ClusterError::NotFound {
        backend: BackendKind::MakeSwarm,
        name: String::from("ghost"),
    });
    let mut client = Client::with_backend(Box::new(backend), Some(cache_fixture.load()));

    let err = client
        .get_cluster("ghost", false)
        .await
        .expect_err("cluster is missing");

    assert!(matches!(err, ClientError::Cluster(ClusterError::NotFound { .. })));
    assert!(cache_fixture.load().entry(&account.id()).is_some());
}

#[rstest]
#[tokio::test]
async fn unauthenticated_backends_leave_the_cache_alone(cache_fixture: CacheFixture) {
    let backend = ScriptedBackend::new(BackendKind::MakeSwarm);
    let mut client = Client::with_backend(Box::new(backend), Some(cache_fixture.load()));

    client
        .list_clusters()
        .await
        .unwrap_or_else(|err| panic!("list: {err}"));

    assert!(cache_fixture.load().is_empty());
}

#[tokio::test(start_paused = true)]
async fn create_with_wait_polls_until_active() {
    let backend = ScriptedBackend::new(BackendKind::MakeSwarm);
    backend.push_cluster(cluster_in("demo", ClusterStatus::New));
    backend.push_cluster(cluster_in("demo", ClusterStatus::Building));
    backend.push_cluster(cluster_in("demo", ClusterStatus::Active));
    let mut client = Client::with_backend(Box::new(backend.clone()), None);

    let request = ClusterRequest::builder()
        .name("demo")
        .build()
        .unwrap_or_else(|err| panic!("request: {err}"));
    let cluster = client
        .create_cluster(&request, true)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(cluster.status, ClusterStatus::Active);
    assert_eq!(
        backend.calls(),
        ["create_cluster", "get_cluster", "get_cluster"]
    );
}

#[tokio::test]
async fn create_without_wait_returns_initial_state() {
    let backend = ScriptedBackend::new(BackendKind::MakeSwarm);
    backend.push_cluster(cluster_in("demo", ClusterStatus::New));
    let mut client = Client::with_backend(Box::new(backend.clone()), None);

    let request = ClusterRequest::builder()
        .name("demo")
        .build()
        .unwrap_or_else(|err| panic!("request: {err}"));
    let cluster = client
        .create_cluster(&request, false)
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(cluster.status, ClusterStatus::New);
    assert_eq!(backend.calls(), ["create_cluster"]);
}

#[tokio::test(start_paused = true)]
async fn delete_with_wait_polls_until_gone() {
    let backend = ScriptedBackend::new(BackendKind::Magnum);
    backend.push_cluster(cluster_in("demo", ClusterStatus::Deleting));
    backend.push_error(ClusterError::NotFound {
        backend: BackendKind::Magnum,
        name: String::from("demo"),
    });
    let mut client = Client::with_backend(Box::new(backend.clone()), None);

    let cluster = client
        .delete_cluster("demo", true)
        .await
        .unwrap_or_else(|err| panic!("delete: {err}"));

    assert_eq!(cluster.status, ClusterStatus::Deleting);
    assert_eq!(backend.calls(), ["delete_cluster", "get_cluster"]);
}

#[rstest]
#[tokio::test]
async fn cached_token_is_reused_and_saved_back(cache_fixture: CacheFixture) {
    let server = MockServer::start().await;
    let mut account = MakeSwarmAccount::new("alicia", "abc123");
    account.identity_endpoint = format!("{}/v2.0", server.uri());
    account.endpoint = server.uri();

    let mut seeded = account.clone();
    seeded.token = String::from("tok-cached");
    let mut cache = cache_fixture.load();
    cache
        .save_account(&Account::MakeSwarm(seeded))
        .unwrap_or_else(|err| panic!("seed cache: {err}"));

    Mock::given(method("HEAD"))
        .and(path("/v2.0/tokens/tok-cached"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clusters/alicia/demo"))
        .and(header("X-Auth-Token", "tok-cached"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cluster_name": "demo",
            "nodes": "2",
            "autoscale": false,
            "status": "active",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let settings = ClientSettings {
        cache_path: Some(cache_fixture.path.clone()),
        ..ClientSettings::default()
    };
    let mut client = Client::with_parts(
        Account::MakeSwarm(account.clone()),
        &settings,
        Some(cache_fixture.load()),
    )
    .unwrap_or_else(|err| panic!("client: {err}"));

    let cluster = client
        .get_cluster("demo", false)
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));

    assert_eq!(cluster.node_count, 2);
    let reloaded = cache_fixture.load();
    let entry = reloaded
        .entry(&Account::MakeSwarm(account).id())
        .unwrap_or_else(|| panic!("account should stay cached"));
    assert_eq!(entry.token, "tok-cached");
    assert_eq!(entry.endpoint, server.uri());
}

fn checked_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
        .single()
        .unwrap_or_else(|| panic!("valid timestamp"))
}

fn make_swarm_account(server: &MockServer) -> MakeSwarmAccount {
    let mut account = MakeSwarmAccount::new("alicia", "abc123");
    account.identity_endpoint = format!("{}/v2.0", server.uri());
    account.endpoint = server.uri();
    account
}

async fn mount_exchange_and_cluster(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": { "token": { "id": token } } })),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clusters/alicia/demo"))
        .and(header("X-Auth-Token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cluster_name": "demo",
            "nodes": 1,
            "autoscale": false,
            "status": "active",
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[rstest]
#[tokio::test]
async fn update_check_entry_does_not_replace_the_endpoint(cache_fixture: CacheFixture) {
    let server = MockServer::start().await;
    let account = make_swarm_account(&server);
    let id = Account::MakeSwarm(account.clone()).id();
    cache_fixture
        .load()
        .save_last_update_check(&id, checked_at())
        .unwrap_or_else(|err| panic!("seed cache: {err}"));
    mount_exchange_and_cluster(&server, "tok-new").await;

    let mut client = Client::with_parts(
        Account::MakeSwarm(account),
        &ClientSettings::default(),
        Some(cache_fixture.load()),
    )
    .unwrap_or_else(|err| panic!("client: {err}"));
    let cluster = client
        .get_cluster("demo", false)
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));

    assert_eq!(cluster.status, ClusterStatus::Active);
    let reloaded = cache_fixture.load();
    let entry = reloaded
        .entry(&id)
        .unwrap_or_else(|| panic!("account should be cached"));
    assert_eq!(entry.token, "tok-new");
    assert_eq!(entry.endpoint, server.uri());
    assert_eq!(entry.last_update_check, Some(checked_at()));
}

#[rstest]
#[tokio::test]
async fn stale_cached_endpoint_does_not_override_configuration(cache_fixture: CacheFixture) {
    let server = MockServer::start().await;
    let account = make_swarm_account(&server);
    let mut stale = account.clone();
    stale.endpoint = String::from("http://stale.invalid");
    stale.token = String::from("tok-stale");
    cache_fixture
        .load()
        .save_account(&Account::MakeSwarm(stale))
        .unwrap_or_else(|err| panic!("seed cache: {err}"));
    Mock::given(method("HEAD"))
        .and(path("/v2.0/tokens/tok-stale"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_exchange_and_cluster(&server, "tok-new").await;

    let mut client = Client::with_parts(
        Account::MakeSwarm(account.clone()),
        &ClientSettings::default(),
        Some(cache_fixture.load()),
    )
    .unwrap_or_else(|err| panic!("client: {err}"));
    client
        .get_cluster("demo", false)
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));

    let reloaded = cache_fixture.load();
    let entry = reloaded
        .entry(&Account::MakeSwarm(account).id())
        .unwrap_or_else(|| panic!("account should be cached"));
    assert_eq!(entry.endpoint, server.uri());
    assert_eq!(entry.token, "tok-new");
}

#[rstest]
#[tokio::test]
async fn operations_keep_the_recorded_update_check(cache_fixture: CacheFixture) {
    let account = authenticated("tok-1");
    let mut cache = cache_fixture.load();
    cache
        .save_last_update_check(&account.id(), checked_at())
        .unwrap_or_else(|err| panic!("seed cache: {err}"));
    let backend = ScriptedBackend::new(BackendKind::MakeSwarm).with_account(account.clone());
    backend.push_cluster(cluster_in("demo", ClusterStatus::Active));
    let mut client = Client::with_backend(Box::new(backend), Some(cache));

    client
        .get_cluster("demo", false)
        .await
        .unwrap_or_else(|err| panic!("get: {err}"));

    let reloaded = cache_fixture.load();
    let entry = reloaded
        .entry(&account.id())
        .unwrap_or_else(|| panic!("account should be cached"));
    assert_eq!(entry.token, "tok-1");
    assert_eq!(entry.last_update_check, Some(checked_at()));
}

#[tokio::test]
async fn unsupported_operations_surface_as_cluster_errors() {
    let settings = ClientSettings::default();
    let mut client = Client::with_parts(
        Account::MakeSwarm(MakeSwarmAccount::new("alicia", "abc123")),
        &settings,
        None,
    )
    .unwrap_or_else(|err| panic!("client: {err}"));

    let err = client
        .resize_cluster("demo", 3, false)
        .await
        .expect_err("resize is unsupported on make-swarm");

    assert!(matches!(
        err,
        ClientError::Cluster(ClusterError::Unsupported { .. })
    ));
    assert_eq!(client.backend().kind(), BackendKind::MakeSwarm);
}
