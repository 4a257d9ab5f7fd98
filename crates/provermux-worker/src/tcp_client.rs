// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON over TCP: one concrete shape of a line- or
//! socket-oriented worker RPC.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::rpc::{WorkerError, WorkerRpc, TIMEOUT_ERROR_CODE};

/// A worker RPC client over a single TCP connection to `127.0.0.1:<port>`.
///
/// Each request is one JSON line `{"route": ..., "params": ...}`; each
/// response is one JSON line `{"result": ...}` or `{"error": {"code": ...,
/// "message": ...}}`.
pub struct TcpLineWorker {
    port: u16,
    stream: Option<BufReader<TcpStream>>,
}

impl TcpLineWorker {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            stream: None,
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), WorkerError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(("127.0.0.1", self.port))
            .await
            .map_err(|e| WorkerError::Connection(e.to_string()))?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }
}

#[async_trait]
impl WorkerRpc for TcpLineWorker {
    async fn call(
        &mut self,
        route: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, WorkerError> {
        self.ensure_connected().await?;
        let Some(stream) = &mut self.stream else {
            return Err(WorkerError::Connection("not connected".to_string()));
        };

        let request = json!({ "route": route, "params": params });
        let mut line = serde_json::to_vec(&request)
            .map_err(|e| WorkerError::Connection(format!("encode request: {e}")))?;
        line.push(b'\n');

        let roundtrip = async {
            stream
                .get_mut()
                .write_all(&line)
                .await
                .map_err(|e| WorkerError::Connection(e.to_string()))?;

            let mut response_line = String::new();
            let n = stream
                .read_line(&mut response_line)
                .await
                .map_err(|e| WorkerError::Connection(e.to_string()))?;
            if n == 0 {
                return Err(WorkerError::Connection(
                    "worker closed connection".to_string(),
                ));
            }
            let response: Value = serde_json::from_str(response_line.trim())
                .map_err(|e| WorkerError::Connection(format!("decode response: {e}")))?;
            Ok(response)
        };

        let response = match tokio::time::timeout(timeout, roundtrip).await {
            Ok(result) => result?,
            Err(_) => {
                // Drop the connection so the abandoned RPC cannot bleed
                // into the next call, and surface it as the well-known
                // timeout.
                self.stream = None;
                return Err(WorkerError::Timeout);
            }
        };

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            return Err(if code == TIMEOUT_ERROR_CODE {
                WorkerError::Timeout
            } else {
                WorkerError::Protocol { code, message }
            });
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn close(&mut self) {
        self.stream = None;
    }
}
