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

//! The spoke side: resolves where the hub is from local bootstrap config and keeps the
//! JoinedCluster's status fresh with periodic heartbeats.

pub mod coordinates;
pub mod facts;
pub mod heartbeat;

use crate::store;
use crate::utils::tls;
use snafu::Snafu;

pub const AGENT_CONTROLLER: &str = "clustermanager-agent";

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(display(
        "the {} '{}' for the hub cluster is missing a non-empty value for '{}'",
        kind,
        name,
        key
    ))]
    MissingBootstrapKey {
        kind: String,
        name: String,
        key: String,
    },

    #[snafu(display("the CA bundle for the hub cluster is invalid: {}", source))]
    InvalidCaBundle { source: tls::Error },

    #[snafu(display("invalid hub API server address '{}': {}", server, source))]
    InvalidServer {
        server: String,
        source: http::uri::InvalidUri,
    },

    #[snafu(display("collect {} error: {}", what, source))]
    Facts { what: String, source: kube::Error },
}
