//! Line-delimited transport: one JSON request per input line, one JSON
//! response per output line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::BridgeError;
use crate::handler::BridgeHandler;

/// Serve requests from `input` until EOF or `shutdown`.
///
/// Blank lines are skipped. Requests are answered in input order.
pub async fn serve_lines<R, W>(
    handler: &BridgeHandler,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<(), BridgeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut served = 0usize;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = handler.handle_text(line).await;
        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        output.write_all(json.as_bytes()).await?;
        output.flush().await?;
        served += 1;
    }

    info!(served, "Stdio bridge closed");
    Ok(())
}

/// Serve on the process's stdin and stdout.
pub async fn serve_stdio(handler: &BridgeHandler, shutdown: CancellationToken) -> Result<(), BridgeError> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_lines(handler, stdin, tokio::io::stdout(), shutdown).await
}
