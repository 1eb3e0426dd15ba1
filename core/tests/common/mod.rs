#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use procpool_core::api::{ProcessManager, ProcessSession, ProcessSpec, ProgressSnapshot};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

/// Scripted behaviour of one fake command.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub delay: Duration,
    pub spawn_error: Option<String>,
}

impl Script {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }
}

/// In-memory process manager: records calls, captures stdin, tracks
/// how many fake processes run at once.
#[derive(Default)]
pub struct FakeProcessManager {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    stdin: Arc<Mutex<HashMap<String, Vec<String>>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeProcessManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, command: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.calls().iter().any(|c| c == command)
    }

    pub fn stdin_received(&self, command: &str) -> Vec<String> {
        self.stdin
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_default()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct FakeSession {
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    exit_code: i32,
    running: Arc<AtomicUsize>,
}

#[async_trait]
impl ProcessManager for FakeProcessManager {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start(&self, spec: &ProcessSpec) -> anyhow::Result<Box<dyn ProcessSession>> {
        let command = spec.command_line();
        self.calls.lock().unwrap().push(command.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&command)
            .cloned()
            .unwrap_or_default();
        if let Some(message) = script.spawn_error {
            anyhow::bail!(message);
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let (mut out_w, out_r) = tokio::io::duplex(1024);
        let (mut err_w, err_r) = tokio::io::duplex(1024);
        let writer = tokio::spawn(async move {
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            let _ = out_w.write_all(script.stdout.as_bytes()).await;
            let _ = err_w.write_all(script.stderr.as_bytes()).await;
        });

        let (stdin, reader) = if spec.pipe_stdin {
            let (in_w, mut in_r) = tokio::io::duplex(1024);
            let received = self.stdin.clone();
            let reader = tokio::spawn(async move {
                let mut buf = String::new();
                let _ = in_r.read_to_string(&mut buf).await;
                received
                    .lock()
                    .unwrap()
                    .entry(command)
                    .or_default()
                    .push(buf);
            });
            (Some(in_w), Some(reader))
        } else {
            (None, None)
        };

        Ok(Box::new(FakeSession {
            stdin,
            stdout: Some(out_r),
            stderr: Some(err_r),
            writer: Some(writer),
            reader,
            exit_code: script.exit_code,
            running: self.running.clone(),
        }))
    }
}

#[async_trait]
impl ProcessSession for FakeSession {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>> {
        self.stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncWrite + Unpin + Send>)
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn wait(&mut self) -> anyhow::Result<i32> {
        if let Some(writer) = self.writer.take() {
            writer.await?;
        }
        if let Some(reader) = self.reader.take() {
            reader.await?;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(self.exit_code)
    }
}

/// Collects every progress snapshot the pool reports.
#[derive(Clone, Default)]
pub struct SnapshotLog(pub Arc<Mutex<Vec<ProgressSnapshot>>>);

impl SnapshotLog {
    pub fn reporter(&self) -> Arc<dyn procpool_core::api::ProgressReporter> {
        let log = self.0.clone();
        Arc::new(move |s: &ProgressSnapshot| log.lock().unwrap().push(*s))
    }

    pub fn last(&self) -> Option<ProgressSnapshot> {
        self.0.lock().unwrap().last().copied()
    }

    pub fn all(&self) -> Vec<ProgressSnapshot> {
        self.0.lock().unwrap().clone()
    }
}
