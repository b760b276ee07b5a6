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

//! Typed access to the object store backing the controllers.
//!
//! Every write goes through resourceVersion-checked replaces, so callers see a
//! [`Error::Conflict`] when somebody else updated the object first and are expected to
//! re-read and retry (see [`update_status`]).

mod kube_store;
mod memory;

pub use self::kube_store::KubeStore;
pub use self::memory::{MemoryStore, RecordedEvent};

use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use crate::types::v1alpha1::status::JoinedClusterStatus;
use kube::Resource;
use kube::ResourceExt;
use kube::runtime::events::EventType;
use k8s_openapi::NamespaceResourceScope;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::Snafu;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use tracing::{debug, info};

const STATUS_UPDATE_ATTEMPTS: usize = 5;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{} '{}' not found", kind, name))]
    NotFound { kind: String, name: String },

    #[snafu(display("{} '{}' already exists", kind, name))]
    AlreadyExists { kind: String, name: String },

    #[snafu(display("{} '{}' was modified concurrently", kind, name))]
    Conflict { kind: String, name: String },

    #[snafu(display("{} '{}' has no namespace", kind, name))]
    MissingNamespace { kind: String, name: String },

    #[snafu(display("{} of {} '{}' is unavailable", operation, kind, name))]
    Unavailable {
        operation: String,
        kind: String,
        name: String,
    },

    #[snafu(display(
        "gave up updating {} '{}' after {} conflicting writes",
        kind,
        name,
        attempts
    ))]
    RetriesExhausted {
        kind: String,
        name: String,
        attempts: usize,
    },

    #[snafu(display("Kubernetes API error: {}", source))]
    Kube { source: kube::Error },

    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },

    #[snafu(transparent)]
    Serde { source: serde_json::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

/// Namespaced resources the stores know how to persist.
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

pub trait ObjectStore: Send + Sync + 'static {
    fn get<K: StoreObject>(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    /// Objects in `namespace` carrying every label in `labels`.
    fn list<K: StoreObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Vec<K>, Error>> + Send;

    /// Fails with [`Error::AlreadyExists`] when an object with the same name exists.
    fn create<K: StoreObject>(&self, resource: &K)
    -> impl Future<Output = Result<K, Error>> + Send;

    /// Replaces metadata and spec. Rejected with [`Error::Conflict`] when the
    /// resourceVersion carried by `resource` is stale.
    fn replace<K: StoreObject>(
        &self,
        resource: &K,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    /// Replaces only the status subresource, with the same concurrency rules as `replace`.
    fn replace_status<K: StoreObject>(
        &self,
        resource: &K,
    ) -> impl Future<Output = Result<K, Error>> + Send;

    fn delete<K: StoreObject>(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// send event
    fn record(
        &self,
        resource: &JoinedCluster,
        event_type: EventType,
        reason: &str,
        note: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

pub(crate) fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).to_string()
}

pub(crate) fn object_key<K: StoreObject>(resource: &K) -> Result<(String, String), Error> {
    let name = resource.name_any();
    match resource.namespace() {
        Some(ns) => Ok((ns, name)),
        None => MissingNamespaceSnafu {
            kind: kind_of::<K>(),
            name,
        }
        .fail(),
    }
}

/// Returns the stored object, creating `resource` first when it does not exist yet.
/// Losing a creation race to another writer is not an error.
pub async fn get_or_create<S, K>(store: &S, resource: &K) -> Result<K, Error>
where
    S: ObjectStore,
    K: StoreObject,
{
    let (ns, name) = object_key(resource)?;
    match store.get::<K>(&name, &ns).await {
        Ok(existing) => return Ok(existing),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    match store.create(resource).await {
        Ok(created) => {
            info!("created {} {}/{}", kind_of::<K>(), ns, name);
            Ok(created)
        }
        Err(e) if e.is_already_exists() => {
            debug!("{} {}/{} already exists", kind_of::<K>(), ns, name);
            store.get::<K>(&name, &ns).await
        }
        Err(e) => Err(e),
    }
}

/// Deletes by name, treating an already absent object as success.
pub async fn delete_if_exists<S, K>(store: &S, name: &str, namespace: &str) -> Result<(), Error>
where
    S: ObjectStore,
    K: StoreObject,
{
    store
        .delete::<K>(name, namespace)
        .await
        .or_else(|e| if e.is_not_found() { Ok(()) } else { Err(e) })
}

/// Applies `mutate` to the latest status and writes it back, re-reading the object and
/// retrying whenever the write loses an optimistic-concurrency race. Nothing is written
/// when the mutation leaves the status unchanged.
pub async fn update_status<S, F>(
    store: &S,
    resource: &JoinedCluster,
    mut mutate: F,
) -> Result<JoinedCluster, Error>
where
    S: ObjectStore,
    F: FnMut(&mut JoinedClusterStatus) + Send,
{
    let (ns, name) = object_key(resource)?;
    let mut current = resource.clone();

    for attempt in 1..=STATUS_UPDATE_ATTEMPTS {
        let unchanged = current.status_or_default();
        let mut status = unchanged.clone();
        mutate(&mut status);
        if status == unchanged {
            return Ok(current);
        }

        let mut desired = current.clone();
        desired.status = Some(status);
        match store.replace_status(&desired).await {
            Ok(updated) => return Ok(updated),
            Err(e) if e.is_conflict() => {
                info!(
                    "status update of {}/{} conflicted (attempt {}), retrieve the latest resource and retry.",
                    ns, name, attempt
                );
                current = store.get::<JoinedCluster>(&name, &ns).await?;
            }
            Err(e) => return Err(e),
        }
    }

    RetriesExhaustedSnafu {
        kind: kind_of::<JoinedCluster>(),
        name,
        attempts: STATUS_UPDATE_ATTEMPTS,
    }
    .fail()
}
