//! Process execution: start one external command, feed its stdin, capture
//! stdout, stderr and the combined stream, and report the exit code.

mod io_pump;
mod result;
mod run;
mod traits;
pub mod types;

pub use io_pump::{InputStream, OutputStream};
pub use result::ProcessResult;
pub use run::{run_command, run_process};
pub use traits::{ProcessManager, ProcessSession};
pub use types::{ProcessSpec, RunOptions};
