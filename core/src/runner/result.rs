use std::fmt;
use std::sync::OnceLock;

use encoding_rs::{Encoding, UTF_8};

/// Captured outcome of one process run.
///
/// The three byte buffers are kept raw. String views are decoded on first
/// access with `encoding` and cached afterwards.
#[derive(Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// stdout and stderr interleaved in the order the chunks arrived.
    pub output: Vec<u8>,
    pub pid: Option<u32>,
    encoding: &'static Encoding,
    stdout_text: OnceLock<String>,
    stderr_text: OnceLock<String>,
    output_text: OnceLock<String>,
}

impl ProcessResult {
    pub fn new(
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        output: Vec<u8>,
        pid: Option<u32>,
        encoding: &'static Encoding,
    ) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            output,
            pid,
            encoding,
            stdout_text: OnceLock::new(),
            stderr_text: OnceLock::new(),
            output_text: OnceLock::new(),
        }
    }

    /// Placeholder result of a job that has not finished (or succeeded with no output).
    pub fn empty_success() -> Self {
        Self::new(0, Vec::new(), Vec::new(), Vec::new(), None, UTF_8)
    }

    /// Placeholder result of a job that never ran.
    pub fn failed() -> Self {
        Self::new(-1, Vec::new(), Vec::new(), Vec::new(), None, UTF_8)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    pub fn stdout_text(&self) -> &str {
        self.stdout_text
            .get_or_init(|| decode(self.encoding, &self.stdout))
    }

    pub fn stderr_text(&self) -> &str {
        self.stderr_text
            .get_or_init(|| decode(self.encoding, &self.stderr))
    }

    pub fn output_text(&self) -> &str {
        self.output_text
            .get_or_init(|| decode(self.encoding, &self.output))
    }
}

fn decode(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "replaced undecodable bytes in output");
    }
    text.into_owned()
}

impl fmt::Debug for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessResult")
            .field("exit_code", &self.exit_code)
            .field("pid", &self.pid)
            .field("stdout_len", &self.stdout.len())
            .field("stderr_len", &self.stderr.len())
            .field("output_len", &self.output.len())
            .field("encoding", &self.encoding.name())
            .finish()
    }
}
