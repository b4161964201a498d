use crate::server::McpServer;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Newline-delimited JSON-RPC over a pair of byte streams.
///
/// Each request runs on its own task; responses go through a single writer
/// task so lines never interleave.
pub struct StdioHandler {
    server: Arc<McpServer>,
}

impl StdioHandler {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn run(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(line) = rx.recv().await {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(())
        });

        let mut lines = BufReader::new(reader).lines();
        let mut in_flight = JoinSet::new();

        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read from stdin")?
        {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Received: {}", line);

            let server = self.server.clone();
            let tx = tx.clone();
            in_flight.spawn(async move {
                if let Some(response) = server.handle_line(&line).await {
                    match serde_json::to_string(&response) {
                        Ok(json) => {
                            if tx.send(json).await.is_err() {
                                error!("Response writer closed");
                            }
                        }
                        Err(e) => error!("Failed to serialize response: {}", e),
                    }
                }
            });

            // Reap finished requests so the set does not grow unbounded
            while in_flight.try_join_next().is_some() {}
        }

        info!("Input closed, waiting for {} pending requests", in_flight.len());
        while in_flight.join_next().await.is_some() {}
        drop(tx);

        writer_task
            .await
            .context("Response writer task failed")?
            .context("Failed to write to stdout")?;
        Ok(())
    }
}
