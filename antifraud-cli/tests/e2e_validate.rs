mod common;
use common::TestEnv;
use predicates::prelude::*;
use wiremock::matchers::method;
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_validate_help() {
    let env = TestEnv::new().await;
    env.antifraud()
        .arg("validate")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Destination Bitcoin address"));
}

#[tokio::test]
async fn test_validate_low_risk_json() {
    let env = TestEnv::new().await;
    let output = env
        .antifraud()
        .args([
            "validate", "--address", "bc1qlowrisk", "--amount", "0.1", "--fee-rate", "10", "--json",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["decision"], "approve");
    assert_eq!(body["modelVersion"], "mock-ensemble-32-v1");
    assert_eq!(body["policy"]["mode"], "local");
    assert_eq!(body["signals"][0], "direccion_segwit");
    assert!(body.get("mesh").is_none());
}

#[tokio::test]
async fn test_validate_rejection_exit_code() {
    let env = TestEnv::new().await;
    env.antifraud()
        .env("ANTIFRAUD_THRESHOLD", "0.3")
        .args([
            "validate",
            "--address",
            "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            "--amount",
            "8",
            "--fee-rate",
            "50",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Rejected"))
        .stdout(predicate::str::contains("monto_alto, tarifa_alta, direccion_legacy"));
}

#[tokio::test]
async fn test_validate_invalid_amount() {
    let env = TestEnv::new().await;
    env.antifraud()
        .args(["validate", "--address", "bc1q", "--amount", "-3", "--fee-rate", "10"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid request"));
}

#[tokio::test]
async fn test_validate_invalid_json_output() {
    let env = TestEnv::new().await;
    env.antifraud()
        .args(["validate", "--address", "  ", "--amount", "1", "--fee-rate", "10", "--json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"error\""));
}

#[tokio::test]
async fn test_validate_uses_external_scorer() {
    let env = TestEnv::new().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "score": 0.12,
            "decision": "approve",
            "modelVersion": "remote-v3"
        })))
        .expect(1)
        .mount(&env.server)
        .await;

    let output = env
        .antifraud()
        .env("ANTIFRAUD_ML_URL", env.server.uri())
        .args(["validate", "--address", "bc1qext", "--amount", "0.5", "--fee-rate", "10", "--json"])
        .output()
        .unwrap();

    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["policy"]["mode"], "external");
    assert_eq!(body["modelVersion"], "remote-v3");
    assert_eq!(body["score"], 0.12);
}

#[tokio::test]
async fn test_validate_falls_back_when_external_fails() {
    let env = TestEnv::new().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&env.server)
        .await;

    let output = env
        .antifraud()
        .env("ANTIFRAUD_ML_URL", env.server.uri())
        .args(["validate", "--address", "bc1qext", "--amount", "0.5", "--fee-rate", "10", "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["policy"]["mode"], "local");
}

#[tokio::test]
async fn test_keygen_json() {
    let env = TestEnv::new().await;
    let output = env.antifraud().args(["keygen", "--json"]).output().unwrap();

    assert!(output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(body["signingPrivateKey"].as_str().unwrap().contains("BEGIN PRIVATE KEY"));
    assert!(body["signingPublicKey"].as_str().unwrap().contains("BEGIN PUBLIC KEY"));
    assert!(!body["ecdhPrivateKey"].as_str().unwrap().is_empty());
}
