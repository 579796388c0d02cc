//! Demo handlers registered by the worker binary

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Deserialize;
use taskqueue::prelude::*;

/// Register every demo task type on `manager`
pub fn register_demo_handlers(manager: &TaskManager) {
    manager.register_fn("sum", |payload| async move { sum(payload) });
    manager.register_fn("echo", |payload| async move { Ok(payload) });
    manager.register_blocking("checksum", checksum);
    manager.register("flaky", FlakyHandler::default());
}

#[derive(Debug, Deserialize)]
struct SumInput {
    a: i64,
    b: i64,
}

fn sum(payload: serde_json::Value) -> HandlerResult {
    let input: SumInput = serde_json::from_value(payload)
        .map_err(|e| HandlerError::permanent(format!("invalid payload: {e}")))?;
    let total = input
        .a
        .checked_add(input.b)
        .ok_or_else(|| HandlerError::permanent("sum overflows i64"))?;
    Ok(json!(total))
}

/// Byte sum of the `text` field; synchronous, runs on the blocking pool
fn checksum(payload: serde_json::Value) -> HandlerResult {
    let text = payload["text"]
        .as_str()
        .ok_or_else(|| HandlerError::permanent("missing string field: text"))?;
    let sum: u64 = text.bytes().map(u64::from).sum();
    Ok(json!({ "checksum": sum, "length": text.len() }))
}

/// Fails retryably until the `attempt`-th call for the same payload
///
/// Calls are counted per `key` field, falling back to the whole payload.
#[derive(Debug, Default)]
pub struct FlakyHandler {
    calls: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn execute(&self, payload: serde_json::Value) -> HandlerResult {
        let succeed_on = payload["attempt"].as_u64().unwrap_or(2);
        let key = payload["key"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());

        let call = {
            let mut calls = self.calls.lock();
            let count = calls.entry(key.clone()).or_insert(0);
            *count += 1;
            let call = u64::from(*count);
            // Succeeding calls drop their counter
            if call >= succeed_on {
                calls.remove(&key);
            }
            call
        };

        if call < succeed_on {
            return Err(HandlerError::retryable(format!(
                "flaky failure on attempt {call} of {succeed_on}"
            )));
        }
        Ok(json!({ "succeeded_on": call }))
    }
}
