use std::sync::Arc;

use anyhow::Result;

use procpool_core::api::{ProcessManager, ProgressReporter};

use crate::progress::{BarReporter, JsonlReporter, LogReporter};
use crate::runner::OsProcessManager;

pub fn build_manager() -> Arc<dyn ProcessManager> {
    Arc::new(OsProcessManager::new())
}

/// `interactive` controls whether the `bar` reporter actually draws.
pub fn build_reporter(kind: &str, interactive: bool) -> Result<Option<Arc<dyn ProgressReporter>>> {
    match kind {
        "bar" => Ok(Some(Arc::new(BarReporter::new(interactive)))),
        "log" => Ok(Some(Arc::new(LogReporter))),
        "jsonl" => Ok(Some(Arc::new(JsonlReporter::stdout()))),
        "none" | "" => Ok(None),
        other => anyhow::bail!("unknown progress reporter: {other}"),
    }
}
