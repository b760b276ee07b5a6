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

use super::Error;
use crate::context::Context;
use crate::store::{ObjectStore, update_status};
use crate::types::v1alpha1::joined_cluster::JoinedCluster;
use crate::types::v1alpha1::status::ConditionType;
use chrono::{DateTime, Utc};
use kube::runtime::events::EventType;
use std::time::Duration;
use tracing::{debug, warn};

/// Liveness state implied by the time since the last heartbeat, or `None` while the
/// heartbeat is fresh. Both thresholds are inclusive. A heartbeat from the future
/// (clock skew) counts as fresh.
pub fn classify(
    now: DateTime<Utc>,
    last_update: DateTime<Utc>,
    stale: Duration,
    disconnect: Duration,
) -> Option<ConditionType> {
    let Ok(elapsed) = (now - last_update).to_std() else {
        return None;
    };

    if elapsed >= disconnect {
        Some(ConditionType::AgentDisconnected)
    } else if elapsed >= stale {
        Some(ConditionType::AgentStale)
    } else {
        None
    }
}

pub(super) async fn reconcile_liveness<S: ObjectStore>(
    ctx: &Context<S>,
    jc: &JoinedCluster,
) -> Result<(), Error> {
    let Some(last_update) = jc
        .status
        .as_ref()
        .and_then(|s| s.agent_info.as_ref())
        .map(|info| info.last_update_time)
    else {
        debug!("no heartbeat from {} yet", jc.name());
        return Ok(());
    };

    let stale = jc.stale_threshold()?;
    let disconnect = jc.disconnect_threshold()?;
    let now = ctx.clock.now();

    let Some(target) = classify(now, last_update, stale, disconnect) else {
        return Ok(());
    };
    let already = jc
        .status
        .as_ref()
        .is_some_and(|s| s.is_condition_true(target));

    // classify again against the status being written, a heartbeat may have landed since
    let updated = update_status(&ctx.store, jc, |status| {
        let target = status
            .agent_info
            .as_ref()
            .and_then(|info| classify(now, info.last_update_time, stale, disconnect));
        if let Some(target) = target {
            status.apply_transition(target, now);
        }
    })
    .await?;

    let reached = updated
        .status
        .as_ref()
        .is_some_and(|s| s.is_condition_true(target));
    if reached && !already {
        warn!(
            "joined cluster {} is {}, last heartbeat at {}",
            jc.name(),
            target,
            last_update
        );
        ctx.publish(
            jc,
            EventType::Warning,
            &target.to_string(),
            &format!("No heartbeat since {}", last_update.to_rfc3339()),
        )
        .await;
    }

    Ok(())
}
