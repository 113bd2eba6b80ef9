// CSV File Sink - ProgressSink adapter writing to the local filesystem

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use rowcast_core::port::{ProgressSink, SinkError};

/// File-backed progress sink.
///
/// Data is written to `<path>.part` and only renamed to `<path>` on
/// `emit_done`, so a readable file at the final path is always a complete
/// export. A failed or interrupted run leaves no partial file behind: the
/// next invocation re-emits the header and starts the output fresh.
pub struct CsvFileSink {
    final_path: PathBuf,
    part_path: PathBuf,
    file: Mutex<Option<File>>,
    finalized: AtomicBool,
}

impl CsvFileSink {
    /// Open `<path>.part` for writing, creating parent directories as needed.
    ///
    /// Truncates any partial file left over from an interrupted run. At most
    /// one live sink per output path: concurrent sinks would truncate and
    /// delete each other's `.part`, so callers claim the run before creating
    /// its sink.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let final_path = path.as_ref().to_path_buf();

        let mut part_os = final_path.clone().into_os_string();
        part_os.push(".part");
        let part_path = PathBuf::from(part_os);

        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SinkError::Io(format!("create directory failed: {}", e)))?;
            }
        }

        let file = File::create(&part_path)
            .await
            .map_err(|e| SinkError::Io(format!("create {} failed: {}", part_path.display(), e)))?;

        debug!(path = %final_path.display(), "Opened CSV file sink");

        Ok(Self {
            final_path,
            part_path,
            file: Mutex::new(Some(file)),
            finalized: AtomicBool::new(false),
        })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

#[async_trait]
impl ProgressSink for CsvFileSink {
    async fn emit_data(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let mut guard = self.file.lock().await;
        match guard.as_mut() {
            Some(file) => file
                .write_all(bytes)
                .await
                .map_err(|e| SinkError::Io(format!("write failed: {}", e))),
            None => Err(SinkError::Closed("file sink already finalized".to_string())),
        }
    }

    // The file itself is the output; progress ticks have no representation here
    async fn emit_progress(&self, _rows_exported: i64, _total_rows: i64) -> Result<(), SinkError> {
        Ok(())
    }

    async fn emit_done(&self, rows_exported: i64) -> Result<(), SinkError> {
        let mut guard = self.file.lock().await;
        let Some(mut file) = guard.take() else {
            return Err(SinkError::Closed("file sink already finalized".to_string()));
        };

        file.flush()
            .await
            .map_err(|e| SinkError::Io(format!("flush failed: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| SinkError::Io(format!("fsync failed: {}", e)))?;
        drop(file);

        tokio::fs::rename(&self.part_path, &self.final_path)
            .await
            .map_err(|e| {
                SinkError::Io(format!(
                    "rename to {} failed: {}",
                    self.final_path.display(),
                    e
                ))
            })?;
        self.finalized.store(true, Ordering::SeqCst);

        info!(
            path = %self.final_path.display(),
            rows_exported,
            "Export file finalized"
        );
        Ok(())
    }

    async fn emit_failed(&self, rows_exported: i64, total_rows: i64) -> Result<(), SinkError> {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.take() {
            drop(file);
            let _ = tokio::fs::remove_file(&self.part_path).await;
        }
        self.finalized.store(true, Ordering::SeqCst);

        debug!(
            path = %self.final_path.display(),
            rows_exported,
            total_rows,
            "Export failed, partial file removed"
        );
        Ok(())
    }
}

impl Drop for CsvFileSink {
    fn drop(&mut self) {
        // Interrupted run (cancel, or the engine stopped after a sink write
        // error): the partial must not linger next to real exports. Relies on
        // the one-live-sink-per-path rule from `create`; a concurrent sink
        // would lose its file here.
        if !self.finalized.load(Ordering::SeqCst) {
            drop(self.file.get_mut().take());
            let _ = std::fs::remove_file(&self.part_path);
        }
    }
}
