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

use crate::config::HubConfig;
use crate::store::ObjectStore;
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use crate::utils::clock::Clock;
use kube::runtime::events::EventType;
use std::sync::Arc;
use tracing::warn;

/// Shared state handed to every JoinedCluster reconcile.
pub struct Context<S: ObjectStore> {
    pub(crate) store: S,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: HubConfig,
}

impl<S: ObjectStore> Context<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: HubConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Publishes an event on the JoinedCluster. Failures are logged and otherwise ignored.
    pub(crate) async fn publish(
        &self,
        resource: &JoinedCluster,
        event_type: EventType,
        reason: &str,
        note: &str,
    ) {
        if let Err(e) = self.store.record(resource, event_type, reason, note).await {
            warn!("publish event {} for {} failed: {}", reason, resource.name(), e);
        }
    }
}
