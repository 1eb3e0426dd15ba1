use std::path::Path;

use tokio::io::AsyncReadExt;

/// Read a job list from `path`, or from standard input when `path` is `-`.
pub async fn read_job_list(path: &str) -> std::io::Result<String> {
    if path == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(text);
    }
    tokio::fs::read_to_string(Path::new(path)).await
}

/// One command line per job. Blank lines and `#` comments are skipped.
///
/// With `shell` each line is kept whole for the shell to interpret;
/// otherwise it is split on whitespace.
pub fn parse_job_list(text: &str, shell: bool) -> Vec<Vec<String>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            if shell {
                vec![line.to_string()]
            } else {
                line.split_whitespace().map(str::to_string).collect()
            }
        })
        .collect()
}
