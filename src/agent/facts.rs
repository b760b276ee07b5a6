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

use super::{Error, FactsSnafu};
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{Api, ListParams};
use kube::Client;
use snafu::ResultExt;
use std::future::Future;

/// What the agent reports about its own cluster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterFacts {
    pub cluster_name: String,
    pub cluster_version: String,
    pub node_count: u32,
}

pub trait FactsSource: Send + Sync + 'static {
    fn collect(&self) -> impl Future<Output = Result<ClusterFacts, Error>> + Send;
}

/// Facts read from the spoke's API server.
pub struct KubeFacts {
    client: Client,
    cluster_name: String,
}

impl KubeFacts {
    pub fn new(client: Client, cluster_name: String) -> Self {
        Self {
            client,
            cluster_name,
        }
    }
}

/// Stable identifier of a cluster: the UID of its kube-system namespace.
pub async fn cluster_uid(client: &Client) -> Result<String, Error> {
    let ns = Api::<corev1::Namespace>::all(client.clone())
        .get("kube-system")
        .await
        .context(FactsSnafu {
            what: "kube-system namespace",
        })?;
    Ok(ns.metadata.uid.unwrap_or_default())
}

impl FactsSource for KubeFacts {
    async fn collect(&self) -> Result<ClusterFacts, Error> {
        let version = self
            .client
            .apiserver_version()
            .await
            .context(FactsSnafu {
                what: "server version",
            })?;

        let nodes = Api::<corev1::Node>::all(self.client.clone())
            .list_metadata(&ListParams::default())
            .await
            .context(FactsSnafu { what: "nodes" })?;

        Ok(ClusterFacts {
            cluster_name: self.cluster_name.clone(),
            cluster_version: version.git_version,
            node_count: u32::try_from(nodes.items.len()).unwrap_or(u32::MAX),
        })
    }
}
