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

use clap::{Parser, Subcommand};
use clustermanager::config::{AgentArgs, HubArgs};
use clustermanager::{build, crd, init_tracing, run_agent, run_hub};

#[derive(Parser)]
#[command(name = "clustermanager", version = build::PKG_VERSION)]
#[command(about = "Hub/spoke cluster join and heartbeat controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Output CRDs in YAML
    Crd {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Run the hub controller
    Hub(HubArgs),

    /// Run the spoke agent
    Agent(AgentArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("failed to install the ring crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Crd { file } => crd(file).await?,
        Commands::Hub(args) => {
            init_tracing();
            run_hub(args).await?
        }
        Commands::Agent(args) => {
            init_tracing();
            run_agent(args).await?
        }
    }

    Ok(())
}
