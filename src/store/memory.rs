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

use super::{
    AlreadyExistsSnafu, ConflictSnafu, Error, NotFoundSnafu, ObjectStore, StoreObject,
    UnavailableSnafu, kind_of, object_key,
};
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use chrono::{SecondsFormat, Utc};
use kube::{Resource, ResourceExt};
use kube::runtime::events::EventType;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

type Key = (String, String, String);

/// An event published through [`MemoryStore::record`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub object: String,
    pub event_type: EventType,
    pub reason: String,
    pub note: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    revision: u64,
    delete_faults: HashMap<Key, usize>,
    status_conflicts: HashMap<Key, usize>,
    events: Vec<RecordedEvent>,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// In-process [`ObjectStore`] with API server semantics: resourceVersion checks, a
/// separate status subresource and finalizer-gated deletion.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn key_of<K: StoreObject>(name: &str, namespace: &str) -> Key {
    (kind_of::<K>(), namespace.to_owned(), name.to_owned())
}

fn stored_revision(value: &Value) -> Option<&str> {
    value["metadata"]["resourceVersion"].as_str()
}

fn finalizers_pending(value: &Value) -> bool {
    value["metadata"]["finalizers"]
        .as_array()
        .is_some_and(|finalizers| !finalizers.is_empty())
}

fn deletion_requested(value: &Value) -> bool {
    !value["metadata"]["deletionTimestamp"].is_null()
}

fn check_revision<K: StoreObject>(resource: &K, stored: &Value, name: &str) -> Result<(), Error> {
    match resource.meta().resource_version.as_deref() {
        Some(incoming) if Some(incoming) != stored_revision(stored) => ConflictSnafu {
            kind: kind_of::<K>(),
            name,
        }
        .fail(),
        _ => Ok(()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` deletes of the named object fail as unavailable.
    pub async fn fail_next_delete<K: StoreObject>(&self, name: &str, namespace: &str, times: usize) {
        let mut state = self.state.lock().await;
        state
            .delete_faults
            .insert(key_of::<K>(name, namespace), times);
    }

    /// Makes the next `times` status writes of the named object lose to a concurrent writer.
    pub async fn conflict_next_status_writes<K: StoreObject>(
        &self,
        name: &str,
        namespace: &str,
        times: usize,
    ) {
        let mut state = self.state.lock().await;
        state
            .status_conflicts
            .insert(key_of::<K>(name, namespace), times);
    }

    pub async fn exists<K: StoreObject>(&self, name: &str, namespace: &str) -> bool {
        let state = self.state.lock().await;
        state.objects.contains_key(&key_of::<K>(name, namespace))
    }

    pub async fn events(&self) -> Vec<RecordedEvent> {
        self.state.lock().await.events.clone()
    }
}

impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(&self, name: &str, namespace: &str) -> Result<K, Error> {
        let state = self.state.lock().await;
        match state.objects.get(&key_of::<K>(name, namespace)) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => NotFoundSnafu {
                kind: kind_of::<K>(),
                name,
            }
            .fail(),
        }
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, Error> {
        let kind = kind_of::<K>();
        let state = self.state.lock().await;
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, value)| {
                labels.iter().all(|(key, wanted)| {
                    value["metadata"]["labels"][key].as_str() == Some(wanted.as_str())
                })
            })
            .map(|(_, value)| serde_json::from_value(value.clone()).map_err(Error::from))
            .collect()
    }

    async fn create<K: StoreObject>(&self, resource: &K) -> Result<K, Error> {
        let (ns, name) = object_key(resource)?;
        let key = key_of::<K>(&name, &ns);
        let mut state = self.state.lock().await;
        if state.objects.contains_key(&key) {
            return AlreadyExistsSnafu {
                kind: kind_of::<K>(),
                name,
            }
            .fail();
        }

        let mut value = serde_json::to_value(resource)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("status");
        }
        let revision = state.next_revision();
        value["metadata"]["resourceVersion"] = Value::String(revision.clone());
        if value["metadata"]["uid"].is_null() {
            value["metadata"]["uid"] = Value::String(format!("uid-{}-{}", name, revision));
        }
        value["metadata"]["creationTimestamp"] =
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn replace<K: StoreObject>(&self, resource: &K) -> Result<K, Error> {
        let (ns, name) = object_key(resource)?;
        let key = key_of::<K>(&name, &ns);
        let mut state = self.state.lock().await;
        let Some(stored) = state.objects.get(&key) else {
            return NotFoundSnafu {
                kind: kind_of::<K>(),
                name,
            }
            .fail();
        };
        check_revision(resource, stored, &name)?;

        let mut value = serde_json::to_value(resource)?;
        for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
            value["metadata"][field] = stored["metadata"][field].clone();
        }
        if let Some(fields) = value.as_object_mut() {
            fields.remove("status");
            if let Some(status) = stored.get("status") {
                fields.insert("status".to_owned(), status.clone());
            }
        }
        let revision = state.next_revision();
        value["metadata"]["resourceVersion"] = Value::String(revision);

        if deletion_requested(&value) && !finalizers_pending(&value) {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, value.clone());
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn replace_status<K: StoreObject>(&self, resource: &K) -> Result<K, Error> {
        let (ns, name) = object_key(resource)?;
        let key = key_of::<K>(&name, &ns);
        let mut state = self.state.lock().await;
        let Some(stored) = state.objects.get(&key) else {
            return NotFoundSnafu {
                kind: kind_of::<K>(),
                name,
            }
            .fail();
        };
        check_revision(resource, stored, &name)?;
        let mut value = stored.clone();

        if let Some(remaining) = state.status_conflicts.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            return ConflictSnafu {
                kind: kind_of::<K>(),
                name,
            }
            .fail();
        }

        let status = serde_json::to_value(resource)?
            .get("status")
            .cloned()
            .unwrap_or(Value::Null);
        value["status"] = status;
        let revision = state.next_revision();
        value["metadata"]["resourceVersion"] = Value::String(revision);

        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: StoreObject>(&self, name: &str, namespace: &str) -> Result<(), Error> {
        let key = key_of::<K>(name, namespace);
        let mut state = self.state.lock().await;

        if let Some(remaining) = state.delete_faults.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            return UnavailableSnafu {
                operation: "delete",
                kind: kind_of::<K>(),
                name,
            }
            .fail();
        }

        let Some(stored) = state.objects.get(&key) else {
            return NotFoundSnafu {
                kind: kind_of::<K>(),
                name,
            }
            .fail();
        };

        if !finalizers_pending(stored) {
            state.objects.remove(&key);
            return Ok(());
        }
        if deletion_requested(stored) {
            return Ok(());
        }

        let revision = state.next_revision();
        if let Some(value) = state.objects.get_mut(&key) {
            value["metadata"]["deletionTimestamp"] =
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
            value["metadata"]["resourceVersion"] = Value::String(revision);
        }
        Ok(())
    }

    async fn record(
        &self,
        resource: &JoinedCluster,
        event_type: EventType,
        reason: &str,
        note: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.events.push(RecordedEvent {
            object: resource.name_any(),
            event_type,
            reason: reason.to_owned(),
            note: note.to_owned(),
        });
        Ok(())
    }
}
