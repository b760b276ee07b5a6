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

use crate::agent::AGENT_CONTROLLER;
use crate::agent::coordinates;
use crate::agent::facts::{self, KubeFacts};
use crate::agent::heartbeat::HeartbeatReporter;
use crate::config::{AgentArgs, HubArgs, HubConfig};
use crate::context::Context;
use crate::health::Probe;
use crate::reconcile::{error_policy, reconcile_joined_cluster};
use crate::store::KubeStore;
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use crate::utils::clock::SystemClock;
use crate::utils::duration::format_duration;
use futures::StreamExt;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use kube::CustomResourceExt;
use kube::api::ListParams;
use kube::runtime::{Controller, watcher};
use kube::{Api, Client};
use shadow_rs::shadow;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod agent;
pub mod config;
pub mod context;
pub mod health;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod utils;


shadow!(build);

pub const HUB_CONTROLLER: &str = "clustermanager-hub";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();
}

pub async fn run_hub(args: HubArgs) -> Result<(), Box<dyn std::error::Error>> {
    let kube_config = kube::Config::infer().await?;
    let hub_api_server = match &args.hub_api_server {
        Some(server) => server.clone(),
        None => {
            let inferred = kube_config.cluster_url.to_string();
            warn!(
                "--hub-api-server is not set, join commands will point spokes at {}",
                inferred
            );
            inferred
        }
    };
    let client = Client::try_from(kube_config)?;

    let joined_clusters = Api::<JoinedCluster>::all(client.clone());
    if let Err(e) = joined_clusters.list(&ListParams::default().limit(1)).await {
        error!("JoinedCluster CRD is not queryable: {}. Is the CRD installed?", e);
        return Err(e.into());
    }

    let context = Context::new(
        KubeStore::new(client.clone(), HUB_CONTROLLER),
        Arc::new(SystemClock),
        HubConfig::new(&args, hub_api_server),
    );

    let shutdown = CancellationToken::new();
    let probe = Probe::default();
    let listener = health::bind(args.health_port).await?;
    let health = tokio::spawn(health::serve(listener, probe.clone(), shutdown.clone()));

    info!(
        "starting hub controller {} {}, resync every {}",
        HUB_CONTROLLER,
        build::PKG_VERSION,
        format_duration(args.sync_interval)
    );
    probe.mark_ready();
    Controller::new(joined_clusters, watcher::Config::default())
        .owns(
            Api::<corev1::ServiceAccount>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<rbacv1::RoleBinding>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<corev1::Secret>::all(client.clone()),
            watcher::Config::default(),
        )
        .shutdown_on_signal()
        .run(reconcile_joined_cluster, error_policy, Arc::new(context))
        .for_each(|res| async move {
            match res {
                Ok((jc, _)) => info!("reconciled successful, object {:?}", jc.name),
                Err(e) => warn!("reconcile failed: {}", e),
            }
        })
        .await;

    shutdown.cancel();
    health.await??;
    Ok(())
}

pub async fn run_agent(args: AgentArgs) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::try_default().await?;
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_owned());

    let spoke = KubeStore::new(client.clone(), AGENT_CONTROLLER);
    let coords = coordinates::resolve(
        &spoke,
        &namespace,
        &args.bootstrap_config_map,
        &args.bootstrap_secret,
    )
    .await?;
    info!("resolved hub coordinates {:?}", coords);

    let hub = KubeStore::new(Client::try_from(coords.hub_client_config()?)?, AGENT_CONTROLLER);
    let cluster_name = match &args.cluster_name {
        Some(name) => name.clone(),
        None => facts::cluster_uid(&client).await?,
    };

    let reporter = HeartbeatReporter::new(
        hub,
        KubeFacts::new(client, cluster_name),
        Arc::new(SystemClock),
        &coords.name,
        &coords.namespace,
        &args.image,
        args.heartbeat_interval,
    );

    let shutdown = CancellationToken::new();
    let probe = Probe::default();
    let listener = health::bind(args.health_port).await?;
    let health = tokio::spawn(health::serve(listener, probe.clone(), shutdown.clone()));
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("received interrupt, shutting down");
                    shutdown.cancel();
                }
                Err(e) => warn!("unable to listen for interrupt: {}", e),
            }
        }
    });

    probe.mark_ready();
    reporter.run(shutdown.clone()).await;

    shutdown.cancel();
    health.await??;
    Ok(())
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    };

    writer
        .write_all(serde_yaml_ng::to_string(&JoinedCluster::crd())?.as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}
