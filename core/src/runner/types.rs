use std::collections::HashMap;
use std::path::PathBuf;

use encoding_rs::{Encoding, UTF_8};

/// Everything a `ProcessManager` needs to start one process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: HashMap<String, String>,
    pub include_parent_env: bool,
    /// Run through the system shell. `program` is handed over as shell
    /// text; `args` are quoted so each arrives as a single word.
    pub shell: bool,
    /// Open a pipe for stdin; otherwise stdin is null.
    pub pipe_stdin: bool,
}

impl ProcessSpec {
    /// Build a spec from a command line whose first element is the executable.
    pub fn from_argv(argv: &[String]) -> Self {
        let mut it = argv.iter().cloned();
        Self {
            program: it.next().unwrap_or_default(),
            args: it.collect(),
            cwd: None,
            envs: HashMap::new(),
            include_parent_env: true,
            shell: false,
            pipe_stdin: false,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn cwd_display(&self) -> String {
        match &self.cwd {
            Some(dir) => dir.display().to_string(),
            None => std::env::current_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Return a result for any exit code instead of raising `NonZeroExit`.
    pub fail_ok: bool,
    pub encoding: &'static Encoding,
    /// Capacity of the output chunk channel shared by stdout and stderr.
    pub tap_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fail_ok: false,
            encoding: UTF_8,
            tap_capacity: 64,
        }
    }
}
