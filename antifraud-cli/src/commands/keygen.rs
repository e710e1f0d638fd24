//! Keygen command implementation.

use antifraud_mesh::config::{ENV_ECDH_PRIVATE_KEY, ENV_SIGNING_KEY};
use antifraud_mesh::generate_key_material;
use clap::Args;
use serde::Serialize;

use crate::output;

/// Arguments for the keygen command.
#[derive(Args)]
pub struct KeygenArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput {
    ecdh_private_key: String,
    ecdh_public_key: String,
    signing_private_key: String,
    signing_public_key: String,
}

/// Run the keygen command.
pub fn run(args: KeygenArgs) -> i32 {
    let keys = match generate_key_material() {
        Ok(keys) => keys,
        Err(e) => {
            output::error(&format!("Key generation failed: {}", e));
            return 1;
        }
    };

    if args.json {
        let out = JsonOutput {
            ecdh_private_key: keys.ecdh_private_key,
            ecdh_public_key: keys.ecdh_public_key,
            signing_private_key: keys.signing_private_key_pem,
            signing_public_key: keys.signing_public_key_pem,
        };
        return match serde_json::to_string_pretty(&out) {
            Ok(text) => {
                println!("{}", text);
                0
            }
            Err(e) => {
                output::error(&format!("Failed to encode keys: {}", e));
                1
            }
        };
    }

    output::header("Private (keep secret)");
    println!("{}={}", ENV_ECDH_PRIVATE_KEY, keys.ecdh_private_key);
    println!("{}=\"{}\"", ENV_SIGNING_KEY, keys.signing_private_key_pem.trim_end());

    output::header("Public (share with peers)");
    output::kv("ecdhPublicKey", &keys.ecdh_public_key);
    println!("{}", keys.signing_public_key_pem.trim_end());
    println!();
    output::hint("Peers pin these in ANTIFRAUD_MESH_NODES as ecdhPublicKey / signingPublicKey.");
    0
}
