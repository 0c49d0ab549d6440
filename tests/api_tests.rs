//! Writes against a mocked apiserver
//!
//! Each test scripts the requests it expects, in order, and answers them from
//! a spawned task. A request the script does not expect closes the mock and
//! fails the call under test.

mod common;

use common::example_mcc;
use http::{Method, Request, Response};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use konfigure_operator::config::ControllerConfig;
use konfigure_operator::constants::{FINALIZER, OWNER_NAME_LABEL, RECONCILE_LABEL};
use konfigure_operator::controller::reconciler::reconcile::{cleanup_on_deletion, ensure_finalizer};
use konfigure_operator::controller::reconciler::render::RenderedApp;
use konfigure_operator::controller::reconciler::writer::{
    apply_desired_objects, build_desired_objects, generate_ownership_labels, preflight,
    DesiredObjects, WriteOutcome,
};
use konfigure_operator::controller::reconciler::{reconcile, Reconciler, ReconcilerError, TriggerSource};
use konfigure_operator::crd::ManagementClusterConfiguration;
use kube::client::Body;
use kube::{Client, Resource};
use kube_runtime::controller::Action;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_test::mock::SendResponse;

const REVISION: &str = "main@sha1:0123456789abcdef";
const CONFIGMAPS: &str = "/api/v1/namespaces/default/configmaps";
const CONFIGMAP: &str = "/api/v1/namespaces/default/configmaps/app-1-ex1";
const SECRETS: &str = "/api/v1/namespaces/default/secrets";
const SECRET: &str = "/api/v1/namespaces/default/secrets/app-1-ex1";
const MCC: &str =
    "/apis/konfigure.giantswarm.io/v1alpha1/namespaces/default/managementclusterconfigurations/example-1";
const MCC_STATUS: &str = "/apis/konfigure.giantswarm.io/v1alpha1/namespaces/default/managementclusterconfigurations/example-1/status";

type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

struct ApiServerVerifier(ApiServerHandle);

/// One request received by the mock
struct Call {
    query: String,
    body: Option<Value>,
    send: SendResponse<Response<Body>>,
}

impl ApiServerVerifier {
    /// Next request, checked against `method` and `path`
    async fn expect(&mut self, method: Method, path: &str) -> Call {
        let (request, send) = self.0.next_request().await.expect("service not called");
        assert_eq!(request.method(), method);
        assert_eq!(request.uri().path(), path);
        let query = request.uri().query().unwrap_or_default().to_string();
        let bytes = request.into_body().collect_bytes().await.unwrap();
        let body = (!bytes.is_empty())
            .then(|| serde_json::from_slice(&bytes).expect("request body is json"));
        Call { query, body, send }
    }
}

fn respond_json(send: SendResponse<Response<Body>>, body: &impl Serialize) {
    let bytes = serde_json::to_vec(body).unwrap();
    send.send_response(Response::builder().body(Body::from(bytes)).unwrap());
}

fn respond_status(send: SendResponse<Response<Body>>, code: u16, reason: &str) {
    let status = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": format!("{reason} (code {code})"),
        "reason": reason,
        "code": code,
    });
    let bytes = serde_json::to_vec(&status).unwrap();
    send.send_response(
        Response::builder()
            .status(code)
            .body(Body::from(bytes))
            .unwrap(),
    );
}

fn mock_client() -> (Client, ApiServerVerifier) {
    let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(mock_service, "default"), ApiServerVerifier(handle))
}

async fn test_reconciler(client: Client) -> Reconciler {
    let config = Arc::new(RwLock::new(ControllerConfig::default()));
    Reconciler::with_keys(client, config, None)
        .await
        .expect("reconciler")
}

async fn timeout_after_1s(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("timeout on mock apiserver")
        .expect("scenario succeeded");
}

fn desired() -> DesiredObjects {
    let mcc = example_mcc();
    let rendered = RenderedApp {
        app: "app-1".to_string(),
        configmap_values: "foo: bar\n".to_string(),
        secret_values: "secret: value\n".to_string(),
    };
    build_desired_objects(
        &mcc,
        &rendered,
        "app-1-ex1",
        &generate_ownership_labels(&mcc, REVISION),
    )
}

/// `object` as stored by the apiserver
fn stored<K: Resource + Clone>(object: &K, resource_version: &str) -> K {
    let mut stored = object.clone();
    stored.meta_mut().resource_version = Some(resource_version.to_string());
    stored
}

fn with_label<K: Resource + Clone>(object: &K, key: &str, value: &str) -> K {
    let mut labelled = object.clone();
    labelled
        .meta_mut()
        .labels
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
    labelled
}

fn finalized_mcc() -> ManagementClusterConfiguration {
    let mut mcc = example_mcc();
    mcc.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    mcc.metadata.resource_version = Some("7".to_string());
    mcc
}

#[tokio::test]
async fn test_apply_creates_missing_objects() {
    let (client, mut server) = mock_client();
    let mocksrv = tokio::spawn(async move {
        let get = server.expect(Method::GET, CONFIGMAP).await;
        respond_status(get.send, 404, "NotFound");
        let create = server.expect(Method::POST, CONFIGMAPS).await;
        let body = create.body.expect("configmap body");
        assert_eq!(body["metadata"]["name"], "app-1-ex1");
        assert_eq!(body["data"]["configmap-values.yaml"], "foo: bar\n");
        respond_json(create.send, &body);

        let get = server.expect(Method::GET, SECRET).await;
        respond_status(get.send, 404, "NotFound");
        let create = server.expect(Method::POST, SECRETS).await;
        let body = create.body.expect("secret body");
        assert_eq!(body["type"], "Opaque");
        respond_json(create.send, &body);
    });

    let outcome = apply_desired_objects(&client, &desired(), 3).await.unwrap();
    assert_eq!(outcome, (WriteOutcome::Created, WriteOutcome::Created));
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_apply_identical_input_writes_nothing() {
    let (client, mut server) = mock_client();
    let desired = desired();
    let configmap = stored(&desired.configmap, "10");
    let secret = stored(&desired.secret, "11");
    let mocksrv = tokio::spawn(async move {
        let get = server.expect(Method::GET, CONFIGMAP).await;
        respond_json(get.send, &configmap);
        let get = server.expect(Method::GET, SECRET).await;
        respond_json(get.send, &secret);
    });

    let outcome = apply_desired_objects(&client, &desired, 3).await.unwrap();
    assert_eq!(outcome, (WriteOutcome::Unchanged, WriteOutcome::Unchanged));
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_apply_replaces_and_keeps_external_labels() {
    let (client, mut server) = mock_client();
    let desired = desired();
    let mut outdated: ConfigMap = with_label(&stored(&desired.configmap, "10"), "team", "honeybadger");
    outdated.data = Some([("configmap-values.yaml".to_string(), "foo: old\n".to_string())].into());
    let secret = stored(&desired.secret, "11");
    let mocksrv = tokio::spawn(async move {
        let get = server.expect(Method::GET, CONFIGMAP).await;
        respond_json(get.send, &outdated);
        let replace = server.expect(Method::PUT, CONFIGMAP).await;
        let body = replace.body.expect("configmap body");
        assert_eq!(body["metadata"]["resourceVersion"], "10");
        assert_eq!(body["metadata"]["labels"]["team"], "honeybadger");
        assert_eq!(body["data"]["configmap-values.yaml"], "foo: bar\n");
        respond_json(replace.send, &body);

        let get = server.expect(Method::GET, SECRET).await;
        respond_json(get.send, &secret);
    });

    let outcome = apply_desired_objects(&client, &desired, 3).await.unwrap();
    assert_eq!(outcome, (WriteOutcome::Updated, WriteOutcome::Unchanged));
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_apply_leaves_opted_out_objects_alone() {
    let (client, mut server) = mock_client();
    let desired = desired();
    let mut configmap: ConfigMap =
        with_label(&stored(&desired.configmap, "10"), RECONCILE_LABEL, "disabled");
    configmap.data = Some([("configmap-values.yaml".to_string(), "hand: edited\n".to_string())].into());
    let secret: Secret = with_label(&stored(&desired.secret, "11"), RECONCILE_LABEL, "disabled");
    let mocksrv = tokio::spawn(async move {
        let get = server.expect(Method::GET, CONFIGMAP).await;
        respond_json(get.send, &configmap);
        let get = server.expect(Method::GET, SECRET).await;
        respond_json(get.send, &secret);
    });

    let outcome = apply_desired_objects(&client, &desired, 3).await.unwrap();
    assert_eq!(outcome, (WriteOutcome::OptedOut, WriteOutcome::OptedOut));
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_apply_rechecks_ownership_after_create_conflict() {
    let (client, mut server) = mock_client();
    let desired = desired();
    let foreign: ConfigMap = with_label(&stored(&desired.configmap, "3"), OWNER_NAME_LABEL, "example-2");
    let mocksrv = tokio::spawn(async move {
        let get = server.expect(Method::GET, CONFIGMAP).await;
        respond_status(get.send, 404, "NotFound");
        let create = server.expect(Method::POST, CONFIGMAPS).await;
        respond_status(create.send, 409, "AlreadyExists");
        let get = server.expect(Method::GET, CONFIGMAP).await;
        respond_json(get.send, &foreign);
    });

    let error = apply_desired_objects(&client, &desired, 3).await.unwrap_err();
    match error {
        ReconcilerError::OwnershipConflict(message) => assert!(
            message.starts_with("desired configmap exists already and is owned by another object"),
            "unexpected message: {message}"
        ),
        other => panic!("expected an ownership conflict, got {other:?}"),
    }
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_apply_gives_up_after_conflict_retries() {
    let (client, mut server) = mock_client();
    let desired = desired();
    let mut outdated = stored(&desired.configmap, "10");
    outdated.data = Some([("configmap-values.yaml".to_string(), "foo: old\n".to_string())].into());
    let mocksrv = tokio::spawn(async move {
        for _ in 0..2 {
            let get = server.expect(Method::GET, CONFIGMAP).await;
            respond_json(get.send, &outdated);
            let replace = server.expect(Method::PUT, CONFIGMAP).await;
            respond_status(replace.send, 409, "Conflict");
        }
    });

    let error = apply_desired_objects(&client, &desired, 1).await.unwrap_err();
    assert!(
        matches!(
            error,
            ReconcilerError::ApiConflict {
                kind: "configmap",
                attempts: 2,
                ..
            }
        ),
        "unexpected error: {error:?}"
    );
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_preflight_rejects_foreign_objects() {
    let (client, mut server) = mock_client();
    let desired = desired();
    let foreign: ConfigMap = with_label(&stored(&desired.configmap, "3"), OWNER_NAME_LABEL, "example-2");
    let mocksrv = tokio::spawn(async move {
        let get = server.expect(Method::GET, CONFIGMAP).await;
        respond_json(get.send, &foreign);
        let get = server.expect(Method::GET, SECRET).await;
        respond_status(get.send, 404, "NotFound");
    });

    let error = preflight(&client, &desired).await.unwrap_err();
    match error {
        ReconcilerError::OwnershipConflict(message) => assert_eq!(
            message,
            "desired configmap exists already and is owned by another object: \
             label \"konfigure.giantswarm.io/ownerName\" is set to \"example-2\", \
             expected to be: \"example-1\""
        ),
        other => panic!("expected an ownership conflict, got {other:?}"),
    }
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_deletion_removes_owned_objects_and_finalizer() {
    let (client, mut server) = mock_client();
    let reconciler = test_reconciler(client).await;
    let desired = desired();
    let configmap = stored(&desired.configmap, "10");
    let secret = stored(&desired.secret, "11");
    let mut deleting = serde_json::to_value(finalized_mcc()).unwrap();
    deleting["metadata"]["deletionTimestamp"] = json!("2024-01-01T00:00:00Z");
    let mcc: ManagementClusterConfiguration = serde_json::from_value(deleting).unwrap();
    let mut released = mcc.clone();
    released.metadata.finalizers = None;

    let mocksrv = tokio::spawn(async move {
        let list = server.expect(Method::GET, CONFIGMAPS).await;
        assert!(list.query.contains("labelSelector="), "query: {}", list.query);
        respond_json(
            list.send,
            &json!({"apiVersion": "v1", "kind": "ConfigMapList", "metadata": {}, "items": [configmap]}),
        );
        let delete = server.expect(Method::DELETE, CONFIGMAP).await;
        respond_json(delete.send, &configmap);

        let list = server.expect(Method::GET, SECRETS).await;
        respond_json(
            list.send,
            &json!({"apiVersion": "v1", "kind": "SecretList", "metadata": {}, "items": [secret]}),
        );
        let delete = server.expect(Method::DELETE, SECRET).await;
        respond_json(delete.send, &secret);

        let patch = server.expect(Method::PATCH, MCC).await;
        let body = patch.body.expect("finalizer patch");
        assert_eq!(body["metadata"]["finalizers"], json!([]));
        assert_eq!(body["metadata"]["resourceVersion"], "7");
        respond_json(patch.send, &released);
    });

    let action = cleanup_on_deletion(&reconciler, &mcc).await.unwrap();
    assert_eq!(action, Action::await_change());
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_finalizer_conflict_is_retried_immediately() {
    let (client, mut server) = mock_client();
    let reconciler = test_reconciler(client).await;
    let mut mcc = example_mcc();
    mcc.metadata.resource_version = Some("7".to_string());
    let mut latest = mcc.clone();
    latest.metadata.resource_version = Some("8".to_string());
    latest.metadata.finalizers = Some(vec!["other.io/finalizer".to_string()]);

    let mocksrv = tokio::spawn(async move {
        let patch = server.expect(Method::PATCH, MCC).await;
        assert_eq!(patch.body.expect("first patch")["metadata"]["resourceVersion"], "7");
        respond_status(patch.send, 409, "Conflict");

        let get = server.expect(Method::GET, MCC).await;
        respond_json(get.send, &latest);

        let patch = server.expect(Method::PATCH, MCC).await;
        let body = patch.body.expect("second patch");
        assert_eq!(body["metadata"]["resourceVersion"], "8");
        assert_eq!(
            body["metadata"]["finalizers"],
            json!(["other.io/finalizer", FINALIZER])
        );
        respond_json(patch.send, &latest);
    });

    ensure_finalizer(&reconciler, &mcc).await.unwrap();
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_suspended_resource_only_reports_status() {
    let (client, mut server) = mock_client();
    let reconciler = test_reconciler(client).await;
    let mut mcc = finalized_mcc();
    mcc.spec.suspend = true;
    let response = mcc.clone();

    let mocksrv = tokio::spawn(async move {
        let patch = server.expect(Method::PATCH, MCC_STATUS).await;
        let body = patch.body.expect("status patch");
        assert_eq!(body["status"]["phase"], "Suspended");
        assert_eq!(body["status"]["observedGeneration"], 1);
        respond_json(patch.send, &response);
    });

    let action = reconcile(Arc::new(mcc), Arc::new(reconciler), TriggerSource::SpecChange)
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
    timeout_after_1s(mocksrv).await;
}

#[tokio::test]
async fn test_invalid_matcher_waits_for_a_spec_change() {
    let (client, mut server) = mock_client();
    let reconciler = test_reconciler(client).await;
    let mut mcc = finalized_mcc();
    mcc.spec.configuration.applications.excludes.regex_matchers = vec!["(unclosed".to_string()];
    let response = mcc.clone();

    let mocksrv = tokio::spawn(async move {
        let patch = server.expect(Method::PATCH, MCC_STATUS).await;
        let body = patch.body.expect("status patch");
        assert_eq!(body["status"]["phase"], "Failed");
        assert_eq!(body["status"]["conditions"][0]["reason"], "ConfigurationInvalid");
        respond_json(patch.send, &response);
    });

    let action = reconcile(Arc::new(mcc), Arc::new(reconciler), TriggerSource::SpecChange)
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
    timeout_after_1s(mocksrv).await;
}
