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

//! Conditions of a JoinedCluster and the bookkeeping that keeps them consistent.
//!
//! `AgentConnected`, `AgentStale` and `AgentDisconnected` are mutually exclusive liveness
//! states stored as independent records; [`JoinedClusterStatus::apply_transition`] keeps
//! exactly one of them `True`. `ReadyToJoin` is a latch that is only ever set.

use super::JoinedClusterStatus;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq)]
pub enum ConditionType {
    #[strum(serialize = "ReadyToJoin")]
    ReadyToJoin,

    #[strum(serialize = "AgentConnected")]
    AgentConnected,

    #[strum(serialize = "AgentStale")]
    AgentStale,

    #[strum(serialize = "AgentDisconnected")]
    AgentDisconnected,
}

impl ConditionType {
    /// Liveness states that must be cleared when `self` becomes true.
    pub fn excludes(&self) -> &'static [ConditionType] {
        match self {
            ConditionType::AgentDisconnected => {
                &[ConditionType::AgentStale, ConditionType::AgentConnected]
            }
            ConditionType::AgentStale => {
                &[ConditionType::AgentDisconnected, ConditionType::AgentConnected]
            }
            ConditionType::AgentConnected => {
                &[ConditionType::AgentStale, ConditionType::AgentDisconnected]
            }
            ConditionType::ReadyToJoin => &[],
        }
    }

    /// Reason recorded on the condition when it is set through a transition.
    pub fn transition_reason(&self) -> &'static str {
        match self {
            ConditionType::AgentDisconnected => "DisconnectTimerExpired",
            ConditionType::AgentStale => "StaleTimerExpired",
            ConditionType::AgentConnected => "AgentConnected",
            ConditionType::ReadyToJoin => "AgentReadyToJoin",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, Display, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    #[strum(serialize = "True")]
    True,

    #[strum(serialize = "False")]
    False,

    #[default]
    #[strum(serialize = "Unknown")]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// One-word CamelCase reason for the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JoinedClusterStatus {
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_condition_true(&self, type_: ConditionType) -> bool {
        self.condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Marks `type_` as `True`, appending the record if it does not exist yet.
    pub fn set_condition(&mut self, type_: ConditionType, reason: &str, now: DateTime<Utc>) {
        if let Some(c) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if c.status != ConditionStatus::True {
                c.last_transition_time = Some(now);
            }
            c.status = ConditionStatus::True;
            c.reason = Some(reason.to_owned());
            return;
        }

        self.conditions.push(Condition {
            type_,
            status: ConditionStatus::True,
            last_transition_time: Some(now),
            reason: Some(reason.to_owned()),
            message: None,
        });
    }

    /// Marks an existing `type_` record as `False`. Clearing a condition that was never set
    /// leaves the list untouched.
    pub fn clear_condition(&mut self, type_: ConditionType, reason: &str, now: DateTime<Utc>) {
        if let Some(c) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if c.status != ConditionStatus::False {
                c.last_transition_time = Some(now);
            }
            c.status = ConditionStatus::False;
            c.reason = Some(reason.to_owned());
        }
    }

    /// Sets `target` and clears every liveness state it excludes.
    pub fn apply_transition(&mut self, target: ConditionType, now: DateTime<Utc>) {
        let clear_reason = target.to_string();
        for excluded in target.excludes() {
            self.clear_condition(*excluded, &clear_reason, now);
        }
        self.set_condition(target, target.transition_reason(), now);
    }

    pub fn set_condition_message(&mut self, type_: ConditionType, message: &str) {
        if let Some(c) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            c.message = Some(message.to_owned());
        }
    }
}
