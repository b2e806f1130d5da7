//! Shared fixtures for the integration tests

#![allow(dead_code)]

use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

pub const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const EVM_ADDRESS: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";
pub const BTC_ADDRESS: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

/// A closed local port
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Answer one JSON-RPC method with `result`
pub async fn mock_rpc<'a>(server: &'a MockServer, method: &str, result: Value) -> Mock<'a> {
    let needle = format!("\"method\":\"{}\"", method);
    server
        .mock_async(|when, then| {
            when.method(POST).path("/").body_contains(needle);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }));
        })
        .await
}

/// Reject one JSON-RPC method with an error object
pub async fn mock_rpc_error<'a>(server: &'a MockServer, method: &str, message: &str) -> Mock<'a> {
    let needle = format!("\"method\":\"{}\"", method);
    let message = message.to_string();
    server
        .mock_async(|when, then| {
            when.method(POST).path("/").body_contains(needle);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32000, "message": message }
                }));
        })
        .await
}

/// Left-pad a value into one 32-byte ABI word
pub fn abi_word(hex_value: &str) -> String {
    format!("{:0>64}", hex_value)
}
