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

use super::{Error, InvalidCaBundleSnafu, InvalidServerSnafu, MissingBootstrapKeySnafu};
use crate::store::ObjectStore;
use crate::utils::tls;
use k8s_openapi::api::core::v1 as corev1;
use snafu::{OptionExt, ResultExt};
use std::fmt;

pub const SERVER_KEY: &str = "server";
pub const JOINED_CLUSTER_NAME_KEY: &str = "joinClusterName";
pub const JOINED_CLUSTER_NAMESPACE_KEY: &str = "joinClusterNamespace";
pub const CA_BUNDLE_KEY: &str = "caBundle";
pub const TOKEN_KEY: &str = "token";

/// Where the hub is and which JoinedCluster this spoke reports to.
#[derive(Clone, PartialEq)]
pub struct JoinCoordinates {
    pub server: String,
    pub name: String,
    pub namespace: String,
    pub ca_bundle: Vec<u8>,
    pub token: Vec<u8>,
}

impl fmt::Debug for JoinCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinCoordinates")
            .field("server", &self.server)
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("ca_bundle", &format_args!("{} bytes", self.ca_bundle.len()))
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Reads the coordinates from the bootstrap config map and secret in `namespace`.
/// Any missing or empty key is an error; the CA bundle must hold a PEM certificate.
pub async fn resolve<S: ObjectStore>(
    spoke: &S,
    namespace: &str,
    config_map: &str,
    secret: &str,
) -> Result<JoinCoordinates, Error> {
    let cm: corev1::ConfigMap = spoke.get(config_map, namespace).await?;
    let cm_data = cm.data.unwrap_or_default();
    let text = |key: &str| {
        cm_data
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
            .context(MissingBootstrapKeySnafu {
                kind: "configmap",
                name: config_map,
                key,
            })
    };

    let server = text(SERVER_KEY)?;
    let name = text(JOINED_CLUSTER_NAME_KEY)?;
    let jc_namespace = text(JOINED_CLUSTER_NAMESPACE_KEY)?;

    let secret_obj: corev1::Secret = spoke.get(secret, namespace).await?;
    let secret_data = secret_obj.data.unwrap_or_default();
    let bytes = |key: &str| {
        secret_data
            .get(key)
            .filter(|value| !value.0.is_empty())
            .map(|value| value.0.clone())
            .context(MissingBootstrapKeySnafu {
                kind: "secret",
                name: secret,
                key,
            })
    };

    let ca_bundle = bytes(CA_BUNDLE_KEY)?;
    let token = bytes(TOKEN_KEY)?;
    tls::load_certs(&ca_bundle).context(InvalidCaBundleSnafu)?;

    Ok(JoinCoordinates {
        server,
        name,
        namespace: jc_namespace,
        ca_bundle,
        token,
    })
}

impl JoinCoordinates {
    /// Client configuration for the hub: its address, the CA bundle as trust roots and
    /// the bearer token.
    pub fn hub_client_config(&self) -> Result<kube::Config, Error> {
        let url: http::Uri = self.server.parse().context(InvalidServerSnafu {
            server: self.server.clone(),
        })?;

        let mut config = kube::Config::new(url);
        config.default_namespace = self.namespace.clone();
        config.root_cert = Some(tls::der_certs(&self.ca_bundle).context(InvalidCaBundleSnafu)?);
        config.auth_info.token = Some(
            String::from_utf8_lossy(&self.token)
                .trim()
                .to_owned()
                .into(),
        );
        Ok(config)
    }
}
