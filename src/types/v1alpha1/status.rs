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

pub mod agent_info;
pub mod condition;

pub use agent_info::AgentInfo;
pub use condition::{Condition, ConditionStatus, ConditionType};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedClusterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Operator-facing script that installs the agent on the spoke cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_command: Option<String>,

    /// Service account chosen by the hub for the spoke to authenticate with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Metadata reported by the agent running in the spoke cluster.
    #[serde(
        default,
        rename = "clusterAgentInfo",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_info: Option<AgentInfo>,
}
