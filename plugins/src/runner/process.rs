use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use procpool_core::api::{ProcessManager, ProcessSession, ProcessSpec};

/// Starts real OS processes through `tokio::process`.
pub struct OsProcessManager {}

impl OsProcessManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for OsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessManager for OsProcessManager {
    fn name(&self) -> &str {
        "os"
    }

    async fn start(&self, spec: &ProcessSpec) -> Result<Box<dyn ProcessSession>> {
        let child = build_command(spec)?
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", spec.program))?;
        tracing::trace!(pid = ?child.id(), program = %spec.program, "spawned");

        Ok(Box::new(OsProcessSession { child }))
    }
}

fn build_command(spec: &ProcessSpec) -> Result<Command> {
    if spec.program.trim().is_empty() {
        anyhow::bail!("empty command line");
    }

    let mut cmd = if spec.shell {
        shell_command(&shell_line(spec))
    } else {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        cmd
    };

    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    if !spec.include_parent_env {
        cmd.env_clear();
    }
    cmd.envs(&spec.envs)
        .stdin(if spec.pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    Ok(cmd)
}

/// The program is passed to the shell as written; each argument is quoted
/// so it reaches the command as one word.
fn shell_line(spec: &ProcessSpec) -> String {
    std::iter::once(spec.program.clone())
        .chain(spec.args.iter().map(|a| quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(windows)]
fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"') {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

#[cfg(not(windows))]
fn quote(arg: &str) -> String {
    let plain = |c: char| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c);
    if !arg.is_empty() && arg.chars().all(plain) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

struct OsProcessSession {
    child: Child,
}

#[async_trait]
impl ProcessSession for OsProcessSession {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn stdin(&mut self) -> Option<Box<dyn AsyncWrite + Unpin + Send>> {
        self.child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncWrite + Unpin + Send>)
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }
}
