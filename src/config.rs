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

use crate::utils::duration::parse_go_duration;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CANONICAL_NAMESPACE: &str = "clustermanager-hub-system";
pub const DEFAULT_AGENT_MANIFEST: &str = "config/agent/agent.yaml";
pub const DEFAULT_CLUSTER_ROLE: &str = "joinedcluster-role";
pub const DEFAULT_BOOTSTRAP_NAME: &str = "hub-cluster";
pub const DEFAULT_AGENT_IMAGE: &str =
    const_str::concat!("clustermanager/agent:", env!("CARGO_PKG_VERSION"));

#[derive(Args, Debug, Clone)]
pub struct HubArgs {
    /// Hub API address the spokes connect to. Defaults to the address this process uses.
    #[arg(long, env)]
    pub hub_api_server: Option<String>,

    /// Namespace holding the join secrets.
    #[arg(long, env, default_value = DEFAULT_CANONICAL_NAMESPACE)]
    pub canonical_namespace: String,

    /// Agent deployment manifest embedded in join commands.
    #[arg(long, env, default_value = DEFAULT_AGENT_MANIFEST)]
    pub agent_manifest: PathBuf,

    /// ClusterRole bound to every spoke service account.
    #[arg(long, env, default_value = DEFAULT_CLUSTER_ROLE)]
    pub cluster_role: String,

    /// Periodic resync of every JoinedCluster, e.g. `30s`.
    #[arg(long, env, default_value = "30s", value_parser = parse_go_duration)]
    pub sync_interval: Duration,

    #[arg(long, env, default_value_t = 8080)]
    pub health_port: u16,
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Namespace of the bootstrap config map and secret. Defaults to the pod namespace.
    #[arg(long, env = "POD_NAMESPACE")]
    pub namespace: Option<String>,

    #[arg(long, env, default_value = DEFAULT_BOOTSTRAP_NAME)]
    pub bootstrap_config_map: String,

    #[arg(long, env, default_value = DEFAULT_BOOTSTRAP_NAME)]
    pub bootstrap_secret: String,

    #[arg(long, env, default_value = "5s", value_parser = parse_go_duration)]
    pub heartbeat_interval: Duration,

    /// Reported cluster name. Defaults to the UID of the kube-system namespace.
    #[arg(long, env)]
    pub cluster_name: Option<String>,

    /// Reported agent image.
    #[arg(long, env = "AGENT_IMAGE", default_value = DEFAULT_AGENT_IMAGE)]
    pub image: String,

    #[arg(long, env, default_value_t = 8081)]
    pub health_port: u16,
}

/// Settings shared by every hub reconcile.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub hub_api_server: String,
    pub canonical_namespace: String,
    pub agent_manifest: PathBuf,
    pub cluster_role: String,
    pub sync_interval: Duration,
}

impl HubConfig {
    pub fn new(args: &HubArgs, hub_api_server: String) -> Self {
        Self {
            hub_api_server,
            canonical_namespace: args.canonical_namespace.clone(),
            agent_manifest: args.agent_manifest.clone(),
            cluster_role: args.cluster_role.clone(),
            sync_interval: args.sync_interval,
        }
    }
}
