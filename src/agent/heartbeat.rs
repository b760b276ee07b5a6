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

use super::Error;
use super::facts::FactsSource;
use crate::store::{ObjectStore, update_status};
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use crate::types::v1alpha1::status::{AgentInfo, ConditionType};
use crate::utils::clock::Clock;
use crate::utils::duration::format_duration;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const HEARTBEAT_MESSAGE: &str = "Spoke agent successfully connected to hub";

/// Periodically writes `AgentConnected` and fresh [`AgentInfo`] to one JoinedCluster on
/// the hub.
pub struct HeartbeatReporter<S, F> {
    hub: S,
    facts: F,
    clock: Arc<dyn Clock>,
    name: String,
    namespace: String,
    image: String,
    interval: Duration,
}

impl<S: ObjectStore, F: FactsSource> HeartbeatReporter<S, F> {
    pub fn new(
        hub: S,
        facts: F,
        clock: Arc<dyn Clock>,
        name: &str,
        namespace: &str,
        image: &str,
        interval: Duration,
    ) -> Self {
        Self {
            hub,
            facts,
            clock,
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            image: image.to_owned(),
            interval,
        }
    }

    /// Sends a single heartbeat. Conditions written by the hub, such as `ReadyToJoin`,
    /// are kept; only the liveness states change.
    pub async fn report_once(&self) -> Result<(), Error> {
        let jc = self
            .hub
            .get::<JoinedCluster>(&self.name, &self.namespace)
            .await?;
        if jc.name() != self.name {
            debug!("skip joined cluster {}, reporting for {}", jc.name(), self.name);
            return Ok(());
        }

        let facts = self.facts.collect().await?;
        let now = self.clock.now();
        let info = AgentInfo {
            version: crate::build::PKG_VERSION.to_owned(),
            image: self.image.clone(),
            cluster_name: facts.cluster_name,
            cluster_version: facts.cluster_version,
            node_count: facts.node_count,
            last_update_time: now,
        };

        update_status(&self.hub, &jc, |status| {
            status.apply_transition(ConditionType::AgentConnected, now);
            status.set_condition_message(ConditionType::AgentConnected, HEARTBEAT_MESSAGE);
            status.agent_info = Some(info.clone());
        })
        .await?;

        debug!("heartbeat sent for {}/{}", self.namespace, self.name);
        Ok(())
    }

    /// Reports every interval until `shutdown` fires. Failed heartbeats are logged and the
    /// next tick tries again.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "reporting heartbeats for {}/{} every {}",
            self.namespace,
            self.name,
            format_duration(self.interval)
        );

        loop {
            if let Err(e) = self.report_once().await {
                warn!("heartbeat for {}/{} failed: {}", self.namespace, self.name, e);
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("heartbeat reporter stopped");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
