//! Serve command implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use antifraud_mesh::{KeyExchangeManager, MeshResponder};
use antifraud_validator::TransactionValidator;
use clap::Args;

use crate::api::{self, ApiState};
use crate::output;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, env = "ANTIFRAUD_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,
}

/// Run the serve command.
pub async fn run(args: ServeArgs) -> i32 {
    let validator = TransactionValidator::from_env();

    // The responder answers with the same identity the client uses.
    let keys = match validator.mesh_client() {
        Some(client) => client.keys().clone(),
        None => Arc::new(KeyExchangeManager::new(validator.config().mesh.identity.clone())),
    };
    if let Err(e) = keys.get_or_create_local_key_pair() {
        output::error(&format!("Invalid mesh key material: {}", e));
        return 1;
    }

    output::header("Antifraud Node");
    output::kv("Listening", &format!("http://{}", args.listen));
    output::kv("Node ID", keys.node_id());
    output::kv("Threshold", &format!("{:.2}", validator.config().threshold));
    if validator.mesh_client().is_some() {
        output::kv("Mesh peers", &validator.config().mesh.nodes.len().to_string());
    } else {
        output::info("Mesh client disabled; serving as a responder only");
    }

    let state = Arc::new(ApiState {
        responder: MeshResponder::new(keys),
        validator,
    });

    match api::start_server(args.listen, state).await {
        Ok(()) => 0,
        Err(e) => {
            output::error(&format!("Server error: {}", e));
            1
        }
    }
}
