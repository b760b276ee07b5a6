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
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;

pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";
pub const CA_CERT_HASH_ANNOTATION: &str = "clustermanager.onprem.io/ca-cert-hash";

pub const TOKEN_SECRET_CA_KEY: &str = "ca.crt";
pub const TOKEN_SECRET_TOKEN_KEY: &str = "token";

pub const JOIN_SECRET_CA_BUNDLE_KEY: &str = "caBundle";
pub const JOIN_SECRET_TOKEN_KEY: &str = "token";
pub const JOIN_SECRET_SERVER_KEY: &str = "server";

impl JoinedCluster {
    /// Token secret the platform fills with `ca.crt` and `token` for the service account.
    pub fn new_service_account_token(&self) -> corev1::Secret {
        corev1::Secret {
            metadata: metav1::ObjectMeta {
                name: Some(self.token_secret_name()),
                namespace: self.namespace().ok(),
                labels: Some(self.managed_labels()),
                annotations: Some(
                    [(
                        SERVICE_ACCOUNT_NAME_ANNOTATION.to_owned(),
                        self.service_account_name(),
                    )]
                    .into_iter()
                    .collect(),
                ),
                owner_references: Some(vec![self.new_owner_ref()]),
                ..Default::default()
            },
            type_: Some(SERVICE_ACCOUNT_TOKEN_TYPE.to_owned()),
            ..Default::default()
        }
    }

    /// Credential bundle the spoke agent is bootstrapped from. Lives in the hub's canonical
    /// namespace, so it carries labels instead of an owner reference.
    pub fn new_join_secret(
        &self,
        canonical_namespace: &str,
        server: &str,
        ca_bundle: &[u8],
        token: &[u8],
        ca_cert_hash: Option<&str>,
    ) -> corev1::Secret {
        let mut data = BTreeMap::new();
        data.insert(
            JOIN_SECRET_CA_BUNDLE_KEY.to_owned(),
            ByteString(ca_bundle.to_vec()),
        );
        data.insert(JOIN_SECRET_TOKEN_KEY.to_owned(), ByteString(token.to_vec()));
        data.insert(
            JOIN_SECRET_SERVER_KEY.to_owned(),
            ByteString(server.as_bytes().to_vec()),
        );

        let annotations = ca_cert_hash.map(|hash| {
            [(CA_CERT_HASH_ANNOTATION.to_owned(), hash.to_owned())]
                .into_iter()
                .collect()
        });

        corev1::Secret {
            metadata: metav1::ObjectMeta {
                name: Some(self.join_secret_name()),
                namespace: Some(canonical_namespace.to_owned()),
                labels: Some(self.managed_labels()),
                annotations,
                ..Default::default()
            },
            type_: Some("Opaque".to_owned()),
            data: Some(data),
            ..Default::default()
        }
    }
}
