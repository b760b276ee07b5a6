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

use super::JoinedCluster;
use k8s_openapi::Resource as _;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

impl JoinedCluster {
    /// Binds the spoke's service account to the fixed hub ClusterRole, scoped to this
    /// JoinedCluster's namespace.
    pub fn new_role_binding(&self, sa_name: &str, cluster_role: &str) -> rbacv1::RoleBinding {
        rbacv1::RoleBinding {
            metadata: metav1::ObjectMeta {
                name: Some(self.role_binding_name()),
                namespace: self.namespace().ok(),
                labels: Some(self.managed_labels()),
                owner_references: Some(vec![self.new_owner_ref()]),
                ..Default::default()
            },
            subjects: Some(vec![rbacv1::Subject {
                kind: corev1::ServiceAccount::KIND.to_owned(),
                namespace: self.namespace().ok(),
                name: sa_name.to_owned(),
                ..Default::default()
            }]),
            role_ref: rbacv1::RoleRef {
                api_group: rbacv1::ClusterRole::GROUP.to_owned(),
                kind: rbacv1::ClusterRole::KIND.to_owned(),
                name: cluster_role.to_owned(),
            },
        }
    }

    pub fn new_service_account(&self) -> corev1::ServiceAccount {
        corev1::ServiceAccount {
            metadata: metav1::ObjectMeta {
                name: Some(self.service_account_name()),
                namespace: self.namespace().ok(),
                labels: Some(self.managed_labels()),
                owner_references: Some(vec![self.new_owner_ref()]),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::create_test_joined_cluster;

    #[test]
    fn test_new_service_account_structure() {
        let jc = create_test_joined_cluster("cluster-a", None);

        let sa = jc.new_service_account();

        assert_eq!(sa.metadata.name, Some("cluster-a-serviceaccount".to_string()));
        assert_eq!(sa.metadata.namespace, Some("default".to_string()));

        let owner_refs = sa.metadata.owner_references.unwrap();
        assert_eq!(owner_refs.len(), 1);
        assert_eq!(owner_refs[0].kind, "JoinedCluster");
        assert_eq!(owner_refs[0].name, "cluster-a");
        assert_eq!(owner_refs[0].controller, Some(true));
    }

    #[test]
    fn test_new_role_binding_default_sa() {
        let jc = create_test_joined_cluster("cluster-a", None);
        let sa_name = jc.service_account_name();

        let role_binding = jc.new_role_binding(&sa_name, "joinedcluster-role");

        assert_eq!(
            role_binding.metadata.name,
            Some("cluster-a-serviceaccount-rolebinding".to_string())
        );

        let subjects = role_binding
            .subjects
            .expect("RoleBinding should have subjects");
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].kind, "ServiceAccount");
        assert_eq!(subjects[0].name, "cluster-a-serviceaccount");
        assert_eq!(subjects[0].namespace, Some("default".to_string()));

        assert_eq!(role_binding.role_ref.kind, "ClusterRole");
        assert_eq!(role_binding.role_ref.api_group, "rbac.authorization.k8s.io");
        assert_eq!(role_binding.role_ref.name, "joinedcluster-role");
    }

    #[test]
    fn test_new_role_binding_custom_sa() {
        let jc = create_test_joined_cluster("cluster-a", Some("spoke-sa"));
        let sa_name = jc.service_account_name();

        let role_binding = jc.new_role_binding(&sa_name, "joinedcluster-role");

        assert_eq!(
            role_binding.metadata.name,
            Some("spoke-sa-rolebinding".to_string())
        );
        let subjects = role_binding
            .subjects
            .expect("RoleBinding should have subjects");
        assert_eq!(
            subjects[0].name, "spoke-sa",
            "RoleBinding should reference the overridden service account"
        );
    }
}
