// Copyright 2025 The clustermanager Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{Error, ObjectStore, RecordSnafu, StoreObject, kind_of, object_key};
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use snafu::futures::TryFutureExt;
use std::collections::BTreeMap;

/// [`ObjectStore`] backed by a Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    recorder: Recorder,
}

impl KubeStore {
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Sorts API failures into the kinds callers branch on; everything else stays opaque.
fn classify<K: StoreObject>(source: kube::Error, name: &str) -> Error {
    let kind = kind_of::<K>();
    let name = name.to_owned();
    match &source {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound { kind, name },
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            Error::AlreadyExists { kind, name }
        }
        kube::Error::Api(ae) if ae.code == 409 => Error::Conflict { kind, name },
        _ => Error::Kube { source },
    }
}

impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, name: &str, namespace: &str) -> Result<K, Error> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| classify::<K>(e, name))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, Error> {
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        let list = self
            .api::<K>(namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| classify::<K>(e, namespace))?;
        Ok(list.items)
    }

    async fn create<K: StoreObject>(&self, resource: &K) -> Result<K, Error> {
        let (ns, name) = object_key(resource)?;
        self.api::<K>(&ns)
            .create(&PostParams::default(), resource)
            .await
            .map_err(|e| classify::<K>(e, &name))
    }

    async fn replace<K: StoreObject>(&self, resource: &K) -> Result<K, Error> {
        let (ns, name) = object_key(resource)?;
        self.api::<K>(&ns)
            .replace(&name, &PostParams::default(), resource)
            .await
            .map_err(|e| classify::<K>(e, &name))
    }

    async fn replace_status<K: StoreObject>(&self, resource: &K) -> Result<K, Error> {
        let (ns, name) = object_key(resource)?;
        self.api::<K>(&ns)
            .replace_status(&name, &PostParams::default(), resource)
            .await
            .map_err(|e| classify::<K>(e, &name))
    }

    async fn delete<K: StoreObject>(&self, name: &str, namespace: &str) -> Result<(), Error> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify::<K>(e, name))
    }

    async fn record(
        &self,
        resource: &JoinedCluster,
        event_type: EventType,
        reason: &str,
        note: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(note.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &resource.object_ref(&()),
            )
            .context(RecordSnafu)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_joined_cluster;
    use crate::types::v1alpha1::status::ConditionType;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use chrono::Utc;
    use k8s_openapi::api::core::v1 as corev1;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Option<Value>>>;

    fn failure(code: StatusCode, reason: &str) -> (StatusCode, Json<Value>) {
        let body = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": reason,
            "reason": reason,
            "code": code.as_u16(),
        });
        (code, Json(body))
    }

    async fn put_status(
        State(received): State<Received>,
        Path((_ns, name)): Path<(String, String)>,
        Json(mut body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if name == "cluster-b" {
            return failure(StatusCode::CONFLICT, "Conflict");
        }
        *received.lock().await = Some(body.clone());
        body["metadata"]["resourceVersion"] = json!("2");
        (StatusCode::OK, Json(body))
    }

    async fn get_secret() -> (StatusCode, Json<Value>) {
        failure(StatusCode::NOT_FOUND, "NotFound")
    }

    /// A `KubeStore` talking to a local fake API server.
    async fn fake_api_server() -> (KubeStore, Received) {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let received = Received::default();
        let app = Router::new()
            .route(
                "/apis/clustermanager.onprem.io/v1alpha1/namespaces/{ns}/joinedclusters/{name}/status",
                put(put_status),
            )
            .route("/api/v1/namespaces/{ns}/secrets/{name}", get(get_secret))
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let uri: http::Uri = format!("http://{}", addr).parse().unwrap();
        let client = Client::try_from(kube::Config::new(uri)).unwrap();
        (KubeStore::new(client, "clustermanager-test"), received)
    }

    #[tokio::test]
    async fn test_replace_status_sends_the_object() {
        let (store, received) = fake_api_server().await;
        let mut jc = create_test_joined_cluster("cluster-a", None);
        jc.metadata.resource_version = Some("1".to_string());
        let mut status = jc.status_or_default();
        status.apply_transition(ConditionType::ReadyToJoin, Utc::now());
        status.join_command = Some("echo join".to_string());
        jc.status = Some(status);

        let updated = store.replace_status(&jc).await.unwrap();

        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert!(updated.is_ready_to_join());
        let body = received.lock().await.clone().unwrap();
        assert_eq!(body["kind"], "JoinedCluster");
        assert_eq!(body["metadata"]["name"], "cluster-a");
        assert_eq!(body["status"]["joinCommand"], "echo join");
    }

    #[tokio::test]
    async fn test_api_errors_are_classified() {
        let (store, _) = fake_api_server().await;

        let err = store
            .get::<corev1::Secret>("missing", "default")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let mut jc = create_test_joined_cluster("cluster-b", None);
        jc.metadata.resource_version = Some("1".to_string());
        let err = store.replace_status(&jc).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
