use assert_cmd::Command;
use wiremock::MockServer;

/// Variables that would leak the developer's own setup into a test run.
const ISOLATED_VARS: &[&str] = &[
    "ANTIFRAUD_THRESHOLD",
    "ANTIFRAUD_RETENTION_DAYS",
    "ANTIFRAUD_ML_URL",
    "ANTIFRAUD_ML_TOKEN",
    "ANTIFRAUD_ML_TIMEOUT_MS",
    "ANTIFRAUD_MESH_ENABLED",
    "ANTIFRAUD_MESH_NODES",
    "ANTIFRAUD_MESH_ENDPOINTS",
    "ANTIFRAUD_MESH_QUORUM",
    "ANTIFRAUD_MESH_TIMEOUT_MS",
    "ANTIFRAUD_MESH_RETRIES",
    "ANTIFRAUD_MESH_DEADLINE_MS",
    "ANTIFRAUD_MESH_SIGNAL_PATH",
    "ANTIFRAUD_MESH_SIGNING_KEY",
    "ANTIFRAUD_MESH_ECDH_PRIVATE_KEY",
    "BITCOIN_NETWORK",
    "RUST_LOG",
];

pub struct TestEnv {
    pub server: MockServer,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn antifraud(&self) -> Command {
        let mut cmd = Command::cargo_bin("antifraud").unwrap();
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd.env("RUST_LOG", "warn");
        cmd
    }
}
