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

mod rbac;
pub mod secrets;

use crate::types;
use crate::types::error::{InvalidDurationSnafu, NoNamespaceSnafu};
use crate::types::v1alpha1::status::{ConditionType, JoinedClusterStatus};
use crate::utils::duration::parse_go_duration;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_STALE_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_DISCONNECT_DURATION: Duration = Duration::from_secs(120);

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "clustermanager";
pub const JOINED_CLUSTER_LABEL: &str = "clustermanager.onprem.io/joined-cluster";
pub const JOINED_CLUSTER_NAMESPACE_LABEL: &str = "clustermanager.onprem.io/joined-cluster-namespace";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "clustermanager.onprem.io",
    version = "v1alpha1",
    kind = "JoinedCluster",
    namespaced,
    status = "crate::types::v1alpha1::status::JoinedClusterStatus",
    shortname = "jc",
    plural = "joinedclusters",
    singular = "joinedcluster",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ReadyToJoin\")].status"}"#,
    printcolumn = r#"{"name":"Connected", "type":"string", "jsonPath":".status.conditions[?(@.type==\"AgentConnected\")].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct JoinedClusterSpec {
    /// Service account the spoke uses to talk back to the hub. Created when missing;
    /// generated from the JoinedCluster name when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// How long without a heartbeat before the connection is considered stale (e.g. `30s`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_duration: Option<String>,

    /// How long without a heartbeat before the spoke is considered disconnected (e.g. `2m`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnect_duration: Option<String>,
}

impl JoinedCluster {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// a new owner reference for joined cluster
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    pub fn managed_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_owned(), MANAGED_BY.to_owned());
        labels.insert(JOINED_CLUSTER_LABEL.to_owned(), self.name());
        if let Ok(ns) = self.namespace() {
            labels.insert(JOINED_CLUSTER_NAMESPACE_LABEL.to_owned(), ns);
        }
        labels
    }

    pub fn stale_threshold(&self) -> Result<Duration, types::error::Error> {
        parse_threshold(
            "spec.staleDuration",
            self.spec.stale_duration.as_deref(),
            DEFAULT_STALE_DURATION,
        )
    }

    pub fn disconnect_threshold(&self) -> Result<Duration, types::error::Error> {
        parse_threshold(
            "spec.disconnectDuration",
            self.spec.disconnect_duration.as_deref(),
            DEFAULT_DISCONNECT_DURATION,
        )
    }

    pub fn is_ready_to_join(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.is_condition_true(ConditionType::ReadyToJoin))
    }

    pub fn status_or_default(&self) -> JoinedClusterStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn service_account_name(&self) -> String {
        self.spec
            .service_account
            .clone()
            .unwrap_or_else(|| format!("{}-serviceaccount", self.name()))
    }

    pub fn role_binding_name(&self) -> String {
        format!("{}-rolebinding", self.service_account_name())
    }

    pub fn token_secret_name(&self) -> String {
        format!("{}-token", self.service_account_name())
    }

    pub fn join_secret_name(&self) -> String {
        format!("{}-join-secret", self.name())
    }
}

fn parse_threshold(
    field: &str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, types::error::Error> {
    match value {
        None => Ok(default),
        Some(raw) => parse_go_duration(raw).map_err(|message| {
            InvalidDurationSnafu {
                field,
                value: raw,
                message,
            }
            .build()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_joined_cluster;

    #[test]
    fn test_default_names() {
        let jc = create_test_joined_cluster("cluster-a", None);

        assert_eq!(jc.service_account_name(), "cluster-a-serviceaccount");
        assert_eq!(
            jc.role_binding_name(),
            "cluster-a-serviceaccount-rolebinding"
        );
        assert_eq!(jc.token_secret_name(), "cluster-a-serviceaccount-token");
        assert_eq!(jc.join_secret_name(), "cluster-a-join-secret");
    }

    #[test]
    fn test_service_account_override() {
        let jc = create_test_joined_cluster("cluster-a", Some("spoke-sa"));

        assert_eq!(jc.service_account_name(), "spoke-sa");
        assert_eq!(jc.role_binding_name(), "spoke-sa-rolebinding");
        // join secret is keyed by the joined cluster, not the identity
        assert_eq!(jc.join_secret_name(), "cluster-a-join-secret");
    }

    #[test]
    fn test_default_thresholds() {
        let jc = create_test_joined_cluster("cluster-a", None);

        assert_eq!(jc.stale_threshold().unwrap(), Duration::from_secs(30));
        assert_eq!(jc.disconnect_threshold().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_custom_thresholds() {
        let mut jc = create_test_joined_cluster("cluster-a", None);
        jc.spec.stale_duration = Some("1m".to_string());
        jc.spec.disconnect_duration = Some("5m30s".to_string());

        assert_eq!(jc.stale_threshold().unwrap(), Duration::from_secs(60));
        assert_eq!(jc.disconnect_threshold().unwrap(), Duration::from_secs(330));
    }

    #[test]
    fn test_fractional_thresholds() {
        let mut jc = create_test_joined_cluster("cluster-a", None);
        jc.spec.stale_duration = Some("1.5m".to_string());
        jc.spec.disconnect_duration = Some("2m0.25s".to_string());

        assert_eq!(jc.stale_threshold().unwrap(), Duration::from_secs(90));
        assert_eq!(
            jc.disconnect_threshold().unwrap(),
            Duration::from_millis(120_250)
        );
    }

    #[test]
    fn test_invalid_threshold() {
        let mut jc = create_test_joined_cluster("cluster-a", None);
        jc.spec.stale_duration = Some("soon".to_string());

        let err = jc.stale_threshold().unwrap_err();
        assert!(matches!(
            err,
            types::error::Error::InvalidDuration { ref field, .. } if field == "spec.staleDuration"
        ));
    }

    #[test]
    fn test_owner_ref_and_labels() {
        let jc = create_test_joined_cluster("cluster-a", None);
        let owner = jc.new_owner_ref();

        assert_eq!(owner.kind, "JoinedCluster");
        assert_eq!(owner.api_version, "clustermanager.onprem.io/v1alpha1");
        assert_eq!(owner.name, "cluster-a");
        assert_eq!(owner.controller, Some(true));

        let labels = jc.managed_labels();
        assert_eq!(labels.get(MANAGED_BY_LABEL).map(String::as_str), Some(MANAGED_BY));
        assert_eq!(
            labels.get(JOINED_CLUSTER_LABEL).map(String::as_str),
            Some("cluster-a")
        );
    }

    #[test]
    fn test_ready_to_join() {
        let mut jc = create_test_joined_cluster("cluster-a", None);
        assert!(!jc.is_ready_to_join());

        let mut status = JoinedClusterStatus::default();
        status.apply_transition(ConditionType::ReadyToJoin, chrono::Utc::now());
        jc.status = Some(status);
        assert!(jc.is_ready_to_join());
    }
}
