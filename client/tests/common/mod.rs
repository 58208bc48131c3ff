//! In-process mock cluster serving the JSON-RPC methods the client uses

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine as _;
use desirium_client::keypair::Keypair;
use desirium_client::transaction::{Hash, Transaction};
use desirium_client::{CommitmentLevel, ProviderConfig};
use ed25519_dalek::{Signature, SigningKey, Verifier, VerifyingKey};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const LAST_VALID_BLOCK_HEIGHT: u64 = 100;

/// How the mock cluster treats submitted transactions
#[derive(Debug, Clone)]
pub enum Landing {
    /// Lands at the given commitment with the given logs
    Success {
        status: CommitmentLevel,
        logs: Vec<String>,
    },
    /// Lands with an execution error
    Failure(Value),
    /// Never lands; block height is already past the validity window
    Dropped,
    /// Rejected at submission with a JSON-RPC error
    Rejected { code: i64, message: String },
}

pub struct MockCluster {
    pub blockhash: Hash,
    pub landing: Landing,
    pub submitted: Mutex<Vec<Transaction>>,
}

impl MockCluster {
    pub fn new(landing: Landing) -> Arc<Self> {
        Arc::new(Self {
            blockhash: Hash([42u8; 32]),
            landing,
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }

    fn landed_signatures(&self) -> Vec<String> {
        self.submitted()
            .iter()
            .filter_map(|tx| tx.signature())
            .collect()
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, (i64, String)> {
        match method {
            "getHealth" => Ok(json!("ok")),
            "getLatestBlockhash" => Ok(json!({
                "context": { "slot": 1 },
                "value": {
                    "blockhash": self.blockhash.to_string(),
                    "lastValidBlockHeight": LAST_VALID_BLOCK_HEIGHT,
                }
            })),
            "getBlockHeight" => match self.landing {
                Landing::Dropped => Ok(json!(LAST_VALID_BLOCK_HEIGHT + 1)),
                _ => Ok(json!(10)),
            },
            "sendTransaction" => self.send_transaction(params),
            "getSignatureStatuses" => {
                let landed = self.landed_signatures();
                let requested = params[0].as_array().cloned().unwrap_or_default();
                let value: Vec<Value> = requested
                    .iter()
                    .map(|sig| {
                        let sig = sig.as_str().unwrap_or_default();
                        if !landed.iter().any(|l| l == sig) {
                            return Value::Null;
                        }
                        match &self.landing {
                            Landing::Success { status, .. } => json!({
                                "slot": 5,
                                "confirmations": 0,
                                "err": null,
                                "confirmationStatus": status.to_string(),
                            }),
                            Landing::Failure(err) => json!({
                                "slot": 5,
                                "confirmations": 0,
                                "err": err,
                                "confirmationStatus": "processed",
                            }),
                            _ => Value::Null,
                        }
                    })
                    .collect();
                Ok(json!({ "context": { "slot": 5 }, "value": value }))
            }
            "getTransaction" => {
                let sig = params[0].as_str().unwrap_or_default();
                match &self.landing {
                    Landing::Success { logs, .. } if self.landed_signatures().iter().any(|l| l == sig) => {
                        Ok(json!({ "slot": 5, "meta": { "err": null, "logMessages": logs } }))
                    }
                    _ => Ok(Value::Null),
                }
            }
            other => Err((-32601, format!("Method not found: {}", other))),
        }
    }

    fn send_transaction(&self, params: &Value) -> Result<Value, (i64, String)> {
        if let Landing::Rejected { code, message } = &self.landing {
            return Err((*code, message.clone()));
        }

        assert_eq!(params[1]["encoding"], "base64");

        let wire = base64::engine::general_purpose::STANDARD
            .decode(params[0].as_str().unwrap_or_default())
            .map_err(|e| (-32602, format!("invalid base64: {}", e)))?;
        let tx = Transaction::deserialize(&wire).map_err(|e| (-32602, format!("{:#}", e)))?;

        if tx.message.recent_blockhash != self.blockhash {
            return Err((-32002, "Blockhash not found".to_string()));
        }

        let message = tx.message.serialize().map_err(|e| (-32602, e.to_string()))?;
        for (key, sig) in tx.message.signer_keys().iter().zip(&tx.signatures) {
            let verifying_key =
                VerifyingKey::from_bytes(key.as_bytes()).map_err(|e| (-32003, e.to_string()))?;
            verifying_key
                .verify(&message, &Signature::from_bytes(sig))
                .map_err(|_| (-32003, "Transaction signature verification failure".to_string()))?;
        }

        let signature = tx.signature().unwrap_or_default();
        self.submitted.lock().unwrap().push(tx);
        Ok(json!(signature))
    }
}

async fn rpc_handler(State(cluster): State<Arc<MockCluster>>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();

    match cluster.handle(&method, &params) {
        Ok(result) => Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })),
        Err((code, message)) => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        })),
    }
}

/// Serve `cluster` on an ephemeral port, returning its URL
pub async fn spawn(cluster: Arc<MockCluster>) -> String {
    let app = Router::new().route("/", post(rpc_handler)).with_state(cluster);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Serve an endpoint that answers every request with `status` and `body`
pub async fn spawn_status(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().route("/", post(move || async move { (status, body) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

pub fn test_keypair() -> Keypair {
    Keypair::from_signing_key(SigningKey::from_bytes(&[11u8; 32]))
}

/// Provider config pointing at `url` with a freshly written wallet file in `dir`
pub fn provider_config(url: &str, dir: &Path, extra: &[(&str, &str)]) -> ProviderConfig {
    let wallet_path = dir.join("id.json");
    test_keypair().write_to_file(&wallet_path).unwrap();

    let url = url.to_string();
    let wallet = wallet_path.to_string_lossy().to_string();
    let extra: Vec<(String, String)> = extra
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    ProviderConfig::from_lookup(move |key| match key {
        "ANCHOR_PROVIDER_URL" => Some(url.clone()),
        "ANCHOR_WALLET" => Some(wallet.clone()),
        _ => extra.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
    })
    .unwrap()
}

/// Write an `Anchor.toml` (and optionally the program IDL) into `dir`
pub fn write_workspace(dir: &Path, with_idl: bool) {
    std::fs::write(
        dir.join("Anchor.toml"),
        r#"
[programs.localnet]
desirium_contract = "CzY7h2jY3Fq8Rw3rSSi8PZksgbtZzn44aQR6EeYm2bMo"

[provider]
cluster = "Localnet"
wallet = "~/.config/solana/id.json"
"#,
    )
    .unwrap();

    if with_idl {
        let idl_dir = dir.join("target").join("idl");
        std::fs::create_dir_all(&idl_dir).unwrap();
        std::fs::write(
            idl_dir.join("desirium_contract.json"),
            r#"{
  "address": "CzY7h2jY3Fq8Rw3rSSi8PZksgbtZzn44aQR6EeYm2bMo",
  "metadata": { "name": "desirium_contract", "version": "0.1.0", "spec": "0.1.0" },
  "instructions": [
    {
      "name": "initialize",
      "discriminator": [175, 175, 109, 31, 13, 152, 155, 237],
      "accounts": [],
      "args": []
    }
  ]
}"#,
        )
        .unwrap();
    }
}
