//! Streaming publisher
//!
//! Writes projected records to the temporary output as they arrive, framed
//! as a JSON array:
//!
//! ```text
//! [
//!   {"sku":"A","stock":1,"price":"2.00"},
//!   {"sku":"B","stock":0,"price":"9.95"}
//! ]
//! ```
//!
//! Only the current page is ever held in memory. [`StreamingPublisher::finish`]
//! closes the array, checks the minimum size, and renames the temp file over
//! the canonical output. A publisher that fails or is dropped early leaves the
//! temp file behind for the process lock's release to remove; the canonical
//! output is never touched in that case.

use crate::api::CatalogRecord;
use crate::error::{Result, SyncError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub path: PathBuf,
    pub records: u64,
    pub bytes: u64,
}

/// Incremental JSON array writer with atomic publish
pub struct StreamingPublisher {
    writer: BufWriter<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    min_bytes: u64,
    records: u64,
}

impl StreamingPublisher {
    /// Open (truncate) the temp output and write the array opener
    pub async fn create(
        temp_path: impl Into<PathBuf>,
        final_path: impl Into<PathBuf>,
        min_bytes: u64,
    ) -> Result<Self> {
        let temp_path = temp_path.into();
        let final_path = final_path.into();

        for path in [&temp_path, &final_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let file = File::create(&temp_path).await.map_err(|e| {
            SyncError::integrity(format!(
                "Could not open temp file {} for writing: {}",
                temp_path.display(),
                e
            ))
        })?;

        let mut writer = BufWriter::new(file);
        writer.write_all(b"[\n").await?;

        Ok(Self {
            writer,
            temp_path,
            final_path,
            min_bytes,
            records: 0,
        })
    }

    /// Append one record
    pub async fn append(&mut self, record: &CatalogRecord) -> Result<()> {
        if self.records > 0 {
            self.writer.write_all(b",\n").await?;
        }
        let encoded = serde_json::to_vec(record)?;
        self.writer.write_all(b"  ").await?;
        self.writer.write_all(&encoded).await?;
        self.records += 1;
        Ok(())
    }

    /// Project and append a page of raw catalog items; returns how many were written
    pub async fn append_items(&mut self, items: &[Value]) -> Result<usize> {
        for item in items {
            self.append(&CatalogRecord::project(item)).await?;
        }
        Ok(items.len())
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Close the array, validate, and publish by rename
    pub async fn finish(mut self) -> Result<PublishReport> {
        self.writer.write_all(b"\n]").await?;
        self.writer.flush().await?;

        let file = self.writer.into_inner();
        file.sync_all().await?;
        drop(file);

        let bytes = tokio::fs::metadata(&self.temp_path).await?.len();
        if bytes < self.min_bytes {
            return Err(SyncError::integrity(format!(
                "Downloaded file is suspiciously small ({} bytes, expected at least {}).",
                bytes, self.min_bytes
            )));
        }

        tokio::fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| {
                SyncError::integrity(format!(
                    "Failed to move temp file to final location {}: {}",
                    self.final_path.display(),
                    e
                ))
            })?;

        Ok(PublishReport {
            path: self.final_path,
            records: self.records,
            bytes,
        })
    }
}
