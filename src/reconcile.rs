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

mod liveness;
mod provision;

pub use self::liveness::classify;
pub use self::provision::{AGENT_NAMESPACE, JoinCommand, render_join_command};

use crate::context::Context;
use crate::store::{self, ObjectStore};
use crate::types;
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use snafu::Snafu;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub const JOINED_CLUSTER_FINALIZER: &str = "joinedcluster.finalizers.clustermanager.onprem.io";

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display(
        "token secret of service account '{}' is not populated yet",
        service_account
    ))]
    BootstrapSecretNotReady { service_account: String },

    #[snafu(display("read agent manifest '{}' error: {}", path.display(), source))]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store { source } if source.is_not_found())
    }
}

pub async fn reconcile_joined_cluster<S: ObjectStore>(
    jc: Arc<JoinedCluster>,
    ctx: Arc<Context<S>>,
) -> Result<Action, Error> {
    let ns = jc.namespace()?;
    let latest = ctx.store.get::<JoinedCluster>(&jc.name(), &ns).await?;

    if latest.metadata.deletion_timestamp.is_some() {
        debug!(
            "joined cluster {} is deleted, deletion_timestamp is {:?}",
            latest.name(),
            latest.metadata.deletion_timestamp
        );
        return finalize(&ctx, latest).await;
    }

    let latest = ensure_finalizer(&ctx, latest).await?;

    if !latest.is_ready_to_join() {
        provision::provision(&ctx, &latest).await?;
    } else {
        liveness::reconcile_liveness(&ctx, &latest).await?;
    }

    Ok(Action::requeue(ctx.config.sync_interval))
}

pub fn error_policy<S: ObjectStore>(
    _object: Arc<JoinedCluster>,
    error: &Error,
    _ctx: Arc<Context<S>>,
) -> Action {
    if error.is_not_found() {
        Action::await_change()
    } else {
        error!("error_policy: {}", error);
        Action::requeue(Duration::from_secs(5))
    }
}

fn has_finalizer(jc: &JoinedCluster) -> bool {
    jc.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|name| name == JOINED_CLUSTER_FINALIZER))
}

async fn ensure_finalizer<S: ObjectStore>(
    ctx: &Context<S>,
    jc: JoinedCluster,
) -> Result<JoinedCluster, Error> {
    if has_finalizer(&jc) {
        return Ok(jc);
    }

    let mut desired = jc;
    desired
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(JOINED_CLUSTER_FINALIZER.to_owned());

    let updated = ctx.store.replace(&desired).await?;
    debug!("registered finalizer on {}", updated.name());
    Ok(updated)
}

/// Cleans up the provisioned artifacts and releases the finalizer. The object stays in
/// Terminating until cleanup has succeeded once.
async fn finalize<S: ObjectStore>(ctx: &Context<S>, jc: JoinedCluster) -> Result<Action, Error> {
    if !has_finalizer(&jc) {
        return Ok(Action::await_change());
    }

    provision::cleanup(ctx, &jc).await?;
    ctx.publish(
        &jc,
        EventType::Normal,
        "CleanedUp",
        "Removed service account, role binding and join secret",
    )
    .await;

    let mut released = jc;
    if let Some(finalizers) = released.metadata.finalizers.as_mut() {
        finalizers.retain(|name| name != JOINED_CLUSTER_FINALIZER);
    }
    ctx.store.replace(&released).await?;
    info!("released finalizer of {}", released.name());

    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::facts::ClusterFacts;
    use crate::agent::heartbeat::HeartbeatReporter;
    use crate::store::MemoryStore;
    use crate::tests::{
        ManualClock, StaticFacts, TEST_CANONICAL_NAMESPACE, create_test_joined_cluster,
        populate_token_secret, test_context,
    };
    use crate::types::v1alpha1::status::{ConditionStatus, ConditionType};
    use crate::utils::clock::Clock;
    use k8s_openapi::api::core::v1 as corev1;
    use k8s_openapi::api::rbac::v1 as rbacv1;

    async fn reconcile(ctx: &Arc<Context<MemoryStore>>, name: &str) -> Result<Action, Error> {
        let jc = ctx.store.get::<JoinedCluster>(name, "default").await?;
        reconcile_joined_cluster(Arc::new(jc), ctx.clone()).await
    }

    async fn fetch(ctx: &Arc<Context<MemoryStore>>, name: &str) -> JoinedCluster {
        ctx.store
            .get::<JoinedCluster>(name, "default")
            .await
            .unwrap()
    }

    /// Creates `name` and drives it to ReadyToJoin.
    async fn provisioned(ctx: &Arc<Context<MemoryStore>>, name: &str) -> JoinedCluster {
        ctx.store
            .create(&create_test_joined_cluster(name, None))
            .await
            .unwrap();

        let err = reconcile(ctx, name).await.unwrap_err();
        assert!(matches!(err, Error::BootstrapSecretNotReady { .. }));

        let jc = fetch(ctx, name).await;
        populate_token_secret(&ctx.store, &jc).await;
        reconcile(ctx, name).await.unwrap();
        fetch(ctx, name).await
    }

    fn condition_status(jc: &JoinedCluster, type_: ConditionType) -> Option<ConditionStatus> {
        jc.status
            .as_ref()
            .and_then(|s| s.condition(type_))
            .map(|c| c.status)
    }

    #[tokio::test]
    async fn test_first_reconcile_waits_for_token() {
        let clock = ManualClock::default();
        let ctx = test_context(MemoryStore::new(), &clock);
        ctx.store
            .create(&create_test_joined_cluster("cluster-a", None))
            .await
            .unwrap();

        let err = reconcile(&ctx, "cluster-a").await.unwrap_err();
        assert!(matches!(err, Error::BootstrapSecretNotReady { .. }));
        assert!(!err.is_not_found());

        let jc = fetch(&ctx, "cluster-a").await;
        assert!(has_finalizer(&jc));
        assert!(!jc.is_ready_to_join());
        assert!(
            jc.status
                .as_ref()
                .and_then(|s| s.join_command.as_ref())
                .is_none()
        );
        assert!(
            ctx.store
                .exists::<corev1::ServiceAccount>("cluster-a-serviceaccount", "default")
                .await
        );

        let events = ctx.store.events().await;
        assert!(events.iter().any(|e| e.reason == "WaitingForToken"));
    }

    #[tokio::test]
    async fn test_cluster_lifecycle() {
        let clock = ManualClock::default();
        let ctx = test_context(MemoryStore::new(), &clock);
        let t0 = clock.now();

        let jc = provisioned(&ctx, "cluster-a").await;
        let status = jc.status.clone().unwrap();
        assert!(status.is_condition_true(ConditionType::ReadyToJoin));
        assert!(status.join_command.as_deref().is_some_and(|c| !c.is_empty()));
        assert_eq!(
            status.service_account_name.as_deref(),
            Some("cluster-a-serviceaccount")
        );
        assert!(
            ctx.store
                .exists::<rbacv1::RoleBinding>("cluster-a-serviceaccount-rolebinding", "default")
                .await
        );
        assert!(
            ctx.store
                .exists::<corev1::Secret>("cluster-a-join-secret", TEST_CANONICAL_NAMESPACE)
                .await
        );

        // no heartbeat yet: liveness is left alone
        reconcile(&ctx, "cluster-a").await.unwrap();
        let jc = fetch(&ctx, "cluster-a").await;
        assert_eq!(condition_status(&jc, ConditionType::AgentStale), None);

        let reporter = HeartbeatReporter::new(
            ctx.store.clone(),
            StaticFacts(ClusterFacts {
                cluster_name: "spoke-a".to_string(),
                cluster_version: "v1.30.2".to_string(),
                node_count: 3,
            }),
            Arc::new(clock.clone()),
            "cluster-a",
            "default",
            "clustermanager/agent:test",
            Duration::from_secs(5),
        );
        reporter.report_once().await.unwrap();

        let jc = fetch(&ctx, "cluster-a").await;
        assert_eq!(
            condition_status(&jc, ConditionType::AgentConnected),
            Some(ConditionStatus::True)
        );
        assert_eq!(
            jc.status.as_ref().unwrap().agent_info.as_ref().unwrap().last_update_time,
            t0
        );

        clock.advance(Duration::from_secs(10));
        reconcile(&ctx, "cluster-a").await.unwrap();
        let jc = fetch(&ctx, "cluster-a").await;
        assert_eq!(
            condition_status(&jc, ConditionType::AgentConnected),
            Some(ConditionStatus::True)
        );

        clock.set(t0 + chrono::Duration::seconds(45));
        reconcile(&ctx, "cluster-a").await.unwrap();
        let jc = fetch(&ctx, "cluster-a").await;
        assert_eq!(
            condition_status(&jc, ConditionType::AgentStale),
            Some(ConditionStatus::True)
        );
        assert_eq!(
            condition_status(&jc, ConditionType::AgentConnected),
            Some(ConditionStatus::False)
        );

        clock.set(t0 + chrono::Duration::seconds(150));
        reconcile(&ctx, "cluster-a").await.unwrap();
        let jc = fetch(&ctx, "cluster-a").await;
        assert_eq!(
            condition_status(&jc, ConditionType::AgentDisconnected),
            Some(ConditionStatus::True)
        );
        assert_eq!(
            condition_status(&jc, ConditionType::AgentStale),
            Some(ConditionStatus::False)
        );
        assert_eq!(
            condition_status(&jc, ConditionType::AgentConnected),
            Some(ConditionStatus::False)
        );
        assert!(jc.is_ready_to_join());

        let events = ctx.store.events().await;
        assert!(events.iter().any(|e| e.reason == "AgentDisconnected"));
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let clock = ManualClock::default();
        let ctx = test_context(MemoryStore::new(), &clock);
        let jc = provisioned(&ctx, "cluster-a").await;
        let secret: corev1::Secret = ctx
            .store
            .get("cluster-a-join-secret", TEST_CANONICAL_NAMESPACE)
            .await
            .unwrap();

        provision::provision(&ctx, &jc).await.unwrap();

        let again: corev1::Secret = ctx
            .store
            .get("cluster-a-join-secret", TEST_CANONICAL_NAMESPACE)
            .await
            .unwrap();
        assert_eq!(secret.metadata.uid, again.metadata.uid);
        assert_eq!(
            secret.metadata.resource_version,
            again.metadata.resource_version
        );
        assert!(fetch(&ctx, "cluster-a").await.is_ready_to_join());
    }

    #[tokio::test]
    async fn test_delete_retries_failed_cleanup() {
        let clock = ManualClock::default();
        let ctx = test_context(MemoryStore::new(), &clock);
        provisioned(&ctx, "cluster-a").await;

        ctx.store
            .delete::<JoinedCluster>("cluster-a", "default")
            .await
            .unwrap();
        ctx.store
            .fail_next_delete::<corev1::Secret>("cluster-a-join-secret", TEST_CANONICAL_NAMESPACE, 1)
            .await;

        assert!(reconcile(&ctx, "cluster-a").await.is_err());
        let jc = fetch(&ctx, "cluster-a").await;
        assert!(jc.metadata.deletion_timestamp.is_some());
        assert!(has_finalizer(&jc));

        let action = reconcile(&ctx, "cluster-a").await.unwrap();
        assert_eq!(action, Action::await_change());

        assert!(!ctx.store.exists::<JoinedCluster>("cluster-a", "default").await);
        assert!(
            !ctx.store
                .exists::<corev1::ServiceAccount>("cluster-a-serviceaccount", "default")
                .await
        );
        assert!(
            !ctx.store
                .exists::<rbacv1::RoleBinding>("cluster-a-serviceaccount-rolebinding", "default")
                .await
        );
        assert!(
            !ctx.store
                .exists::<corev1::Secret>("cluster-a-join-secret", TEST_CANONICAL_NAMESPACE)
                .await
        );
        assert!(
            !ctx.store
                .exists::<corev1::Secret>("cluster-a-serviceaccount-token", "default")
                .await
        );

        // the object is gone, the controller waits for the next change
        let err = reconcile(&ctx, "cluster-a").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_threshold_fails_reconcile() {
        let clock = ManualClock::default();
        let ctx = test_context(MemoryStore::new(), &clock);
        let jc = provisioned(&ctx, "cluster-a").await;

        let reporter = HeartbeatReporter::new(
            ctx.store.clone(),
            StaticFacts(ClusterFacts::default()),
            Arc::new(clock.clone()),
            "cluster-a",
            "default",
            "clustermanager/agent:test",
            Duration::from_secs(5),
        );
        reporter.report_once().await.unwrap();

        let mut broken = fetch(&ctx, "cluster-a").await;
        broken.spec.stale_duration = Some("later".to_string());
        ctx.store.replace(&broken).await.unwrap();

        let err = reconcile(&ctx, &jc.name()).await.unwrap_err();
        assert!(matches!(err, Error::Types { .. }));
    }

    #[tokio::test]
    async fn test_heartbeat_between_read_and_write_wins() {
        let clock = ManualClock::default();
        let ctx = test_context(MemoryStore::new(), &clock);
        let t0 = clock.now();
        provisioned(&ctx, "cluster-a").await;

        let reporter = HeartbeatReporter::new(
            ctx.store.clone(),
            StaticFacts(ClusterFacts::default()),
            Arc::new(clock.clone()),
            "cluster-a",
            "default",
            "clustermanager/agent:test",
            Duration::from_secs(5),
        );
        reporter.report_once().await.unwrap();

        // the hub reads a view whose last heartbeat is already stale
        clock.set(t0 + chrono::Duration::seconds(45));
        let stale_view = fetch(&ctx, "cluster-a").await;
        assert_eq!(
            liveness::classify(
                clock.now(),
                t0,
                stale_view.stale_threshold().unwrap(),
                stale_view.disconnect_threshold().unwrap(),
            ),
            Some(ConditionType::AgentStale)
        );

        // a heartbeat lands before the hub writes its verdict
        reporter.report_once().await.unwrap();
        liveness::reconcile_liveness(&ctx, &stale_view).await.unwrap();

        let jc = fetch(&ctx, "cluster-a").await;
        assert_eq!(
            condition_status(&jc, ConditionType::AgentConnected),
            Some(ConditionStatus::True)
        );
        assert_ne!(
            condition_status(&jc, ConditionType::AgentStale),
            Some(ConditionStatus::True)
        );
        assert_eq!(
            jc.status.as_ref().unwrap().agent_info.as_ref().unwrap().last_update_time,
            clock.now()
        );
        let events = ctx.store.events().await;
        assert!(!events.iter().any(|e| e.reason == "AgentStale"));
    }
}
