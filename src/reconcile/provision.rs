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

use super::{BootstrapSecretNotReadySnafu, Error, ManifestReadSnafu};
use crate::context::Context;
use crate::store::{self, ObjectStore, delete_if_exists, get_or_create, update_status};
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use crate::types::v1alpha1::joined_cluster::secrets::{TOKEN_SECRET_CA_KEY, TOKEN_SECRET_TOKEN_KEY};
use crate::types::v1alpha1::status::ConditionType;
use crate::utils::tls::ca_cert_hash;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use kube::ResourceExt;
use kube::runtime::events::EventType;
use snafu::ResultExt;
use tracing::{debug, info, warn};

/// Namespace on the spoke the join command installs the agent into.
pub const AGENT_NAMESPACE: &str = "clustermanager-system";

/// Coordinates substituted into the join command.
#[derive(Debug, Clone)]
pub struct JoinCommand<'a> {
    pub secret_name: &'a str,
    pub secret_namespace: &'a str,
    pub cluster_name: &'a str,
    pub cluster_namespace: &'a str,
    pub server: &'a str,
    pub manifest: &'a str,
}

/// Renders the shell script an operator runs to join a spoke: it copies the join secret
/// out of the hub, seeds the agent's bootstrap config on the spoke and applies the agent
/// manifest.
pub fn render_join_command(cmd: &JoinCommand<'_>) -> String {
    format!(
        r#"# Run this against the hub cluster
kubectl get secret {secret} -n {secret_ns} -o jsonpath='{{.data.caBundle}}' | base64 -d > hub-ca.crt
kubectl get secret {secret} -n {secret_ns} -o jsonpath='{{.data.token}}' | base64 -d > hub-token
# Run this against the spoke cluster, SPOKE_KUBECONFIG points at its kubeconfig
export KUBECONFIG=${{SPOKE_KUBECONFIG}}
kubectl create namespace {agent_ns}
kubectl create secret generic hub-cluster -n {agent_ns} --from-file=caBundle=hub-ca.crt --from-file=token=hub-token
kubectl create configmap hub-cluster -n {agent_ns} --from-literal=joinClusterName={name} --from-literal=joinClusterNamespace={ns} --from-literal=server={server}
cat << EOF | kubectl apply -f -
{manifest}
EOF
"#,
        secret = cmd.secret_name,
        secret_ns = cmd.secret_namespace,
        agent_ns = AGENT_NAMESPACE,
        name = cmd.cluster_name,
        ns = cmd.cluster_namespace,
        server = cmd.server,
        manifest = cmd.manifest.trim_end(),
    )
}

/// Creates the spoke's service account, binding and join secret, then marks the
/// JoinedCluster ready to join. Every step is get-or-create, so a failed attempt is
/// simply run again.
pub(super) async fn provision<S: ObjectStore>(
    ctx: &Context<S>,
    jc: &JoinedCluster,
) -> Result<(), Error> {
    let sa = get_or_create(&ctx.store, &jc.new_service_account()).await?;
    let sa_name = sa.name_any();

    let (ca_bundle, token) = match resolve_token(ctx, jc, &sa).await {
        Ok(credentials) => credentials,
        Err(e @ Error::BootstrapSecretNotReady { .. }) => {
            ctx.publish(
                jc,
                EventType::Normal,
                "WaitingForToken",
                &format!("Waiting for the token of service account {}", sa_name),
            )
            .await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    get_or_create(
        &ctx.store,
        &jc.new_role_binding(&sa_name, &ctx.config.cluster_role),
    )
    .await?;

    let join_secret = ensure_join_secret(ctx, jc, &ca_bundle, &token).await?;
    let join_secret_name = join_secret.name_any();

    let manifest = tokio::fs::read_to_string(&ctx.config.agent_manifest)
        .await
        .context(ManifestReadSnafu {
            path: ctx.config.agent_manifest.clone(),
        })?;

    let command = render_join_command(&JoinCommand {
        secret_name: &join_secret_name,
        secret_namespace: &ctx.config.canonical_namespace,
        cluster_name: &jc.name(),
        cluster_namespace: &jc.namespace()?,
        server: &ctx.config.hub_api_server,
        manifest: &manifest,
    });

    let now = ctx.clock.now();
    update_status(&ctx.store, jc, |status| {
        status.service_account_name = Some(sa_name.clone());
        status.join_command = Some(command.clone());
        status.apply_transition(ConditionType::ReadyToJoin, now);
    })
    .await?;

    info!("joined cluster {} is ready to join", jc.name());
    ctx.publish(
        jc,
        EventType::Normal,
        "Provisioned",
        &format!(
            "Service account {} and join secret {}/{} are ready",
            sa_name, ctx.config.canonical_namespace, join_secret_name
        ),
    )
    .await;

    Ok(())
}

/// CA bundle and token of the service account, read from its token secret.
async fn resolve_token<S: ObjectStore>(
    ctx: &Context<S>,
    jc: &JoinedCluster,
    sa: &corev1::ServiceAccount,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let ns = jc.namespace()?;
    let sa_name = sa.name_any();

    let attached = sa
        .secrets
        .as_ref()
        .and_then(|secrets| secrets.first())
        .and_then(|reference| reference.name.clone());

    let secret = match attached {
        // older platforms attach the token secret to the service account themselves
        Some(name) => match ctx.store.get::<corev1::Secret>(&name, &ns).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => {
                return BootstrapSecretNotReadySnafu {
                    service_account: sa_name,
                }
                .fail();
            }
            Err(e) => return Err(e.into()),
        },
        None => get_or_create(&ctx.store, &jc.new_service_account_token()).await?,
    };

    let secret_name = secret.name_any();
    let data = secret.data.unwrap_or_default();
    let populated = |key: &str| {
        data.get(key)
            .filter(|value| !value.0.is_empty())
            .map(|value| value.0.clone())
    };

    match (populated(TOKEN_SECRET_CA_KEY), populated(TOKEN_SECRET_TOKEN_KEY)) {
        (Some(ca_bundle), Some(token)) => Ok((ca_bundle, token)),
        _ => {
            debug!("token secret {} is not populated yet", secret_name);
            BootstrapSecretNotReadySnafu {
                service_account: sa_name,
            }
            .fail()
        }
    }
}

/// The join secret in the canonical namespace. An existing secret is reused untouched.
async fn ensure_join_secret<S: ObjectStore>(
    ctx: &Context<S>,
    jc: &JoinedCluster,
    ca_bundle: &[u8],
    token: &[u8],
) -> Result<corev1::Secret, store::Error> {
    let hash = match ca_cert_hash(ca_bundle) {
        Ok(hash) => Some(hash),
        Err(e) => {
            warn!(
                "CA bundle of {} has no usable certificate, join secret is not pinned: {}",
                jc.name(),
                e
            );
            None
        }
    };

    let secret = jc.new_join_secret(
        &ctx.config.canonical_namespace,
        &ctx.config.hub_api_server,
        ca_bundle,
        token,
        hash.as_deref(),
    );
    get_or_create(&ctx.store, &secret).await
}

/// Removes every provisioned artifact, tolerating ones that are already gone.
pub(super) async fn cleanup<S: ObjectStore>(
    ctx: &Context<S>,
    jc: &JoinedCluster,
) -> Result<(), Error> {
    let ns = jc.namespace()?;

    delete_if_exists::<_, rbacv1::RoleBinding>(&ctx.store, &jc.role_binding_name(), &ns).await?;
    delete_if_exists::<_, corev1::Secret>(
        &ctx.store,
        &jc.join_secret_name(),
        &ctx.config.canonical_namespace,
    )
    .await?;
    delete_if_exists::<_, corev1::Secret>(&ctx.store, &jc.token_secret_name(), &ns).await?;
    delete_if_exists::<_, corev1::ServiceAccount>(&ctx.store, &jc.service_account_name(), &ns)
        .await?;

    info!("cleaned up artifacts of joined cluster {}", jc.name());
    Ok(())
}
