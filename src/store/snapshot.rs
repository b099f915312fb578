use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use super::feed::{FeedRecord, BOOKMARKS_URL};
use super::item::logical_now;
use super::list::{List, ListError};

/// On-disk form of a [`List`]. The Bookmarks pseudo-feed is not stored; its
/// membership is rebuilt from the items' bookmark flags on restore.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ListSnapshot {
    ts: i64,
    feeds: Vec<FeedRecord>,
}

impl List {
    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Structural snapshot of every feed and its items as JSON.
    pub fn serialize(&self) -> Result<Vec<u8>, ListError> {
        let snapshot = ListSnapshot {
            ts: self.ts,
            feeds: self.feeds.iter().map(|f| f.to_record()).collect(),
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Overlays a snapshot onto the feeds already in the list.
    ///
    /// Feeds are matched by URL and category, falling back to URL alone.
    /// Recorded feeds with no match are skipped, and feeds missing from the
    /// snapshot are left alone. Restoring the same snapshot twice gives the
    /// same state as restoring it once. Nothing changes when `bytes` is not a
    /// valid snapshot.
    ///
    /// Returns the number of feeds restored.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<usize, ListError> {
        let snapshot: ListSnapshot = serde_json::from_slice(bytes)?;

        let mut restored = 0;
        for record in snapshot.feeds {
            if record.url == BOOKMARKS_URL {
                continue;
            }
            let position = self
                .feeds
                .iter()
                .position(|f| f.url() == record.url && f.category() == record.category)
                .or_else(|| self.feeds.iter().position(|f| f.url() == record.url));

            match position {
                Some(i) => {
                    self.feeds[i].overlay(record);
                    restored += 1;
                }
                None => {
                    tracing::debug!(feed = %record.url, "Snapshot feed no longer subscribed, skipping");
                }
            }
        }

        self.ts = self.ts.max(snapshot.ts);
        self.rebuild_bookmarks();
        self.reindex();
        tracing::info!(feeds = restored, items = self.items().count(), "Restored snapshot");
        Ok(restored)
    }

    /// Stamps the list timestamp and writes the snapshot to `path`, replacing
    /// any previous file only once the new one is fully on disk.
    pub fn save(&mut self, path: &Path) -> Result<(), ListError> {
        self.ts = logical_now();
        let bytes = self.serialize()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = path.with_extension(format!("tmp.{:016x}", suffix));

        let written = (|| -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved snapshot");
        Ok(())
    }

    /// Restores from `path` if it exists. Returns whether a snapshot was read.
    pub fn load(&mut self, path: &Path) -> Result<bool, ListError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No snapshot found");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        self.restore(&bytes)?;
        Ok(true)
    }
}
