//! Append-only JSON-lines failure recorder

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StateError;
use crate::failure_traits::*;

/// Writes one [`FailureRecord`] per line to a file.
///
/// Writes are serialised behind a mutex so concurrent callers never
/// interleave partial lines. Ids already present in the file when the
/// recorder is opened are not written again.
#[derive(Debug)]
pub struct JsonlFailureRecorder {
    path: PathBuf,
    seen: Mutex<HashSet<ResponseId>>,
}

impl JsonlFailureRecorder {
    /// Open (or create on first write) the file at `path`, loading ids already recorded.
    pub async fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut seen = HashSet::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                    let record: FailureRecord = serde_json::from_str(line)?;
                    seen.insert(record.response_id);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StateError::Io(e)),
        }

        debug!(path = %path.display(), existing = seen.len(), "opened failure log");
        Ok(Self {
            path,
            seen: Mutex::new(seen),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FailureRecorder for JsonlFailureRecorder {
    async fn mark_failed(&self, response_id: &ResponseId) -> StateResult<()> {
        check_response_id(response_id)?;

        let mut seen = self.seen.lock().await;
        if seen.contains(response_id) {
            return Ok(());
        }

        let mut line = serde_json::to_string(&FailureRecord::now(response_id.clone()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        seen.insert(response_id.clone());
        Ok(())
    }
}
