use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RunnerError;

/// Input fed to a process, one chunk at a time.
pub type InputStream = BoxStream<'static, Bytes>;

#[derive(Debug)]
pub struct ChunkTap {
    pub data: Bytes,
    pub stream: OutputStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Buffers filled from the tap channel.
#[derive(Debug, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub output: Vec<u8>,
}

pub fn pump_stdout<R>(rd: R, tap_tx: mpsc::Sender<ChunkTap>) -> JoinHandle<Result<u64, RunnerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pump(rd, "stdout", tap_tx, OutputStream::Stdout)
}

pub fn pump_stderr<R>(rd: R, tap_tx: mpsc::Sender<ChunkTap>) -> JoinHandle<Result<u64, RunnerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    pump(rd, "stderr", tap_tx, OutputStream::Stderr)
}

fn pump<R>(
    mut rd: R,
    label: &'static str,
    tap_tx: mpsc::Sender<ChunkTap>,
    stream: OutputStream,
) -> JoinHandle<Result<u64, RunnerError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        let mut collector_gone = false;

        loop {
            let n = rd.read(&mut buf).await.map_err(|e| RunnerError::StreamIo {
                stream: label,
                source: e,
            })?;
            if n == 0 {
                break;
            }
            total += n as u64;

            // Keep draining after the collector is gone so the child never blocks on a full pipe.
            if collector_gone {
                continue;
            }
            let tap = ChunkTap {
                data: Bytes::copy_from_slice(&buf[..n]),
                stream,
            };
            if tap_tx.send(tap).await.is_err() {
                tracing::debug!(stream = label, "output collector closed, discarding");
                collector_gone = true;
            }
        }

        Ok(total)
    })
}

/// Collect taps until every pump has dropped its sender.
pub async fn collect_taps(mut tap_rx: mpsc::Receiver<ChunkTap>) -> CapturedOutput {
    let mut captured = CapturedOutput::default();
    while let Some(tap) = tap_rx.recv().await {
        match tap.stream {
            OutputStream::Stdout => captured.stdout.extend_from_slice(&tap.data),
            OutputStream::Stderr => captured.stderr.extend_from_slice(&tap.data),
        }
        captured.output.extend_from_slice(&tap.data);
    }
    captured
}

/// Forward `input` to the child's stdin chunk by chunk, then close it.
pub fn feed_stdin<W>(mut wr: W, mut input: InputStream) -> JoinHandle<Result<u64, RunnerError>>
where
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut total = 0u64;
        while let Some(chunk) = input.next().await {
            let written = async {
                wr.write_all(&chunk).await?;
                wr.flush().await
            }
            .await;
            match written {
                Ok(()) => total += chunk.len() as u64,
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!(written = total, "child closed stdin early");
                    return Ok(total);
                }
                Err(e) => {
                    return Err(RunnerError::StreamIo {
                        stream: "stdin",
                        source: e,
                    })
                }
            }
        }

        if let Err(e) = wr.shutdown().await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(RunnerError::StreamIo {
                    stream: "stdin",
                    source: e,
                });
            }
        }
        Ok(total)
    })
}
