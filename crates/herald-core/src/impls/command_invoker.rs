//! CommandInvoker - 実行ファイルを target として呼び出す
//!
//! endpoint はコマンドライン。リクエスト JSON を stdin に書き、
//! stdout をレスポンス本文として読む。終了コードが 0 以外なら失敗。
//!
//! endpoint がそのまま既存ファイルのパスなら、空白を含んでいても分割せずに実行する。
//! それ以外は空白で区切ってプログラムと引数にする（クォートは解釈しない）。

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{EndpointId, InvokeError};
use crate::ports::TargetInvoker;

pub struct CommandInvoker {
    timeout: Duration,
}

impl CommandInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, endpoint: &EndpointId, payload: Vec<u8>) -> Result<Vec<u8>, InvokeError> {
        let transport = |message: String| InvokeError::Transport {
            endpoint: endpoint.clone(),
            message,
        };

        let (program, args) = command_line(endpoint.as_str())
            .ok_or_else(|| transport("empty command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| transport(format!("spawn: {e}")))?;

        // stdout must drain while stdin is written, or a target that echoes
        // its input blocks once the pipe buffer is full
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // a target may exit without reading its input
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(%endpoint, error = %e, "target closed stdin early");
                }
            }
        };
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| transport(format!("wait: {e}")))?;

        if !output.status.success() {
            return Err(InvokeError::Target {
                endpoint: endpoint.clone(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output.stdout)
    }
}

/// Program and arguments for an endpoint.
fn command_line(endpoint: &str) -> Option<(&str, Vec<&str>)> {
    if Path::new(endpoint).is_file() {
        return Some((endpoint, Vec::new()));
    }
    let mut parts = endpoint.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}

#[async_trait]
impl TargetInvoker for CommandInvoker {
    async fn invoke(
        &self,
        endpoint: Option<&EndpointId>,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, InvokeError> {
        let endpoint = endpoint.ok_or(InvokeError::TargetNotRegistered)?;
        tokio::time::timeout(self.timeout, self.run(endpoint, payload))
            .await
            .map_err(|_| InvokeError::Timeout {
                endpoint: endpoint.clone(),
                after: self.timeout,
            })?
    }
}
