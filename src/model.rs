// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborator surface of the download engine.
//!
//! Everything the files view reads or mutates goes through these traits. The
//! engine owns the records; the view only holds `Arc` handles to them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::errors::FilesViewError;
use crate::relocate::RenamePrompt;

#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Display,
    EnumIter,
)]
pub enum StorageType {
    #[default]
    Linear,
    Compact,
    Reorder,
    ReorderCompact,
}

impl StorageType {
    pub fn is_compact(self) -> bool {
        matches!(self, StorageType::Compact | StorageType::ReorderCompact)
    }

    /// The compact and non-compact members of this type's family.
    pub fn family(self) -> (StorageType, StorageType) {
        match self {
            StorageType::Linear | StorageType::Compact => {
                (StorageType::Compact, StorageType::Linear)
            }
            StorageType::Reorder | StorageType::ReorderCompact => {
                (StorageType::ReorderCompact, StorageType::Reorder)
            }
        }
    }
}

/// Identifies one file across every loaded download.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub download_id: String,
    pub index: usize,
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.download_id, self.index)
    }
}

pub trait FileRecord: Send + Sync + fmt::Debug {
    fn download_id(&self) -> String;
    fn index(&self) -> usize;
    /// Path inside the torrent, segments joined with the platform separator.
    fn relative_path(&self) -> String;
    fn length(&self) -> u64;
    fn downloaded(&self) -> u64;

    fn is_skipped(&self) -> bool;
    /// Returns false when the engine refused the change.
    fn set_skipped(&self, skipped: bool) -> bool;

    fn priority(&self) -> i32;
    fn set_priority(&self, priority: i32);

    fn storage_type(&self) -> StorageType;

    fn is_pad_file(&self) -> bool {
        false
    }

    fn first_piece(&self) -> u32;
    fn last_piece(&self) -> u32;

    /// Current location on disk, following any link.
    fn file_path(&self) -> PathBuf;
    /// Location the file would have without a link.
    fn original_path(&self) -> PathBuf;

    /// Points the file at `target`, moving the data unless
    /// `dont_delete_existing` is set and `target` already holds it.
    fn set_link(&self, target: &Path, dont_delete_existing: bool) -> bool;
    /// Forgets the link without touching data on disk.
    fn clear_link(&self) -> bool;
    fn last_error(&self) -> Option<String>;

    fn key(&self) -> FileKey {
        FileKey {
            download_id: self.download_id(),
            index: self.index(),
        }
    }

    fn is_relocated(&self) -> bool {
        self.file_path() != self.original_path()
    }
}

pub trait Download: Send + Sync + fmt::Debug {
    /// Stable identity, the hex info hash.
    fn id(&self) -> String;
    fn internal_name(&self) -> String;
    fn display_name(&self) -> String;

    /// All files of the download, ordered by index.
    fn file_set(&self) -> Result<Vec<Arc<dyn FileRecord>>, FilesViewError>;

    fn is_persistent(&self) -> bool;
    fn is_paused(&self) -> bool;
    /// Returns true only if this call moved the download into the paused state.
    fn pause(&self) -> bool;
    fn resume(&self);

    fn set_storage_types(&self, indices: &[usize], storage: StorageType) -> bool;
    fn set_skipped(&self, indices: &[usize], skipped: bool);

    fn save_location(&self) -> PathBuf;

    fn attribute(&self, key: &str) -> Option<String>;
    fn set_attribute(&self, key: &str, value: Option<String>);

    /// Suffix appended to files that are still downloading, e.g. `.!bt`.
    fn incomplete_suffix(&self) -> Option<String>;
}

/// A file together with the download that owns it.
#[derive(Clone, Debug)]
pub struct FileRef {
    pub download: Arc<dyn Download>,
    pub record: Arc<dyn FileRecord>,
}

impl FileRef {
    pub fn new(download: Arc<dyn Download>, record: Arc<dyn FileRecord>) -> Self {
        Self { download, record }
    }

    pub fn key(&self) -> FileKey {
        self.record.key()
    }
}

/// Interactive decisions the embedding UI has to make.
pub trait Prompter: Send + Sync {
    /// Shows the rename dialog. The answer comes back through
    /// [`crate::relocate::RenameQueue::complete`].
    fn ask_rename(&self, prompt: RenamePrompt);

    fn confirm_overwrite(&self, path: &Path) -> bool;

    fn confirm_retarget_size_mismatch(&self, file: &dyn FileRecord, target: &Path) -> bool;

    fn confirm_delete(&self, path: &Path) -> bool;
}

/// Groups files by owning download, keeping the order in which each
/// download was first seen.
pub fn group_by_download(files: &[FileRef]) -> Vec<(Arc<dyn Download>, Vec<Arc<dyn FileRecord>>)> {
    let mut groups: Vec<(Arc<dyn Download>, Vec<Arc<dyn FileRecord>>)> = Vec::new();
    for file in files {
        let id = file.download.id();
        match groups.iter_mut().find(|(d, _)| d.id() == id) {
            Some((_, records)) => records.push(file.record.clone()),
            None => groups.push((file.download.clone(), vec![file.record.clone()])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDownload;
    use strum::IntoEnumIterator;

    #[test]
    fn test_storage_families() {
        for storage in StorageType::iter() {
            let (compact, non_compact) = storage.family();
            assert!(compact.is_compact());
            assert!(!non_compact.is_compact());
        }
        assert_eq!(
            StorageType::Reorder.family(),
            (StorageType::ReorderCompact, StorageType::Reorder)
        );
    }

    #[test]
    fn test_group_by_download_keeps_first_seen_order() {
        let a = MemoryDownload::with_files("a", "/tmp/a", &[("1", 1), ("2", 1)]);
        let b = MemoryDownload::with_files("b", "/tmp/b", &[("1", 1)]);

        let files = vec![
            a.file_ref(1),
            b.file_ref(0),
            a.file_ref(0),
        ];
        let groups = group_by_download(&files);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.id(), a.id());
        assert_eq!(
            groups[0].1.iter().map(|r| r.index()).collect::<Vec<_>>(),
            vec![1, 0]
        );
        assert_eq!(groups[1].0.id(), b.id());
    }
}
