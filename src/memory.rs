// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-process download engine.
//!
//! Backs the command line tool (built from `.torrent` metadata) and the
//! tests. Links move real files on disk, everything else is bookkeeping.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::{Arc, Mutex, MutexGuard};

use sha1::{Digest, Sha1};

use crate::errors::FilesViewError;
use crate::model::{Download, FileRecord, FileRef, StorageType};
#[cfg(any(test, feature = "test-support"))]
use crate::model::Prompter;
#[cfg(any(test, feature = "test-support"))]
use crate::relocate::RenamePrompt;
use crate::torrent_file::Torrent;

#[derive(Debug, Default)]
struct MemoryFileState {
    downloaded: u64,
    skipped: bool,
    priority: i32,
    storage: StorageType,
    link: Option<PathBuf>,
    last_error: Option<String>,
    refuse_skip_changes: bool,
    refuse_links: bool,
}

#[derive(Debug)]
pub struct MemoryFile {
    download_id: String,
    index: usize,
    relative_path: String,
    root: PathBuf,
    length: u64,
    pad: bool,
    first_piece: u32,
    last_piece: u32,
    state: Mutex<MemoryFileState>,
}

impl MemoryFile {
    fn state(&self) -> MutexGuard<'_, MemoryFileState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_downloaded(&self, downloaded: u64) {
        self.state().downloaded = downloaded.min(self.length);
    }

    pub fn set_storage_type(&self, storage: StorageType) {
        self.state().storage = storage;
    }

    /// Makes subsequent `set_skipped` calls fail, as an engine would when a
    /// storage change is rejected.
    #[cfg(any(test, feature = "test-support"))]
    pub fn refuse_skip_changes(&self, refuse: bool) {
        self.state().refuse_skip_changes = refuse;
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn refuse_links(&self, refuse: bool) {
        self.state().refuse_links = refuse;
    }

    pub fn link(&self) -> Option<PathBuf> {
        self.state().link.clone()
    }
}

fn move_data(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(source, target).is_err() {
        // Different file systems: fall back to copy and delete.
        fs::copy(source, target)?;
        fs::remove_file(source)?;
    }
    Ok(())
}

impl FileRecord for MemoryFile {
    fn download_id(&self) -> String {
        self.download_id.clone()
    }

    fn index(&self) -> usize {
        self.index
    }

    fn relative_path(&self) -> String {
        self.relative_path.clone()
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn downloaded(&self) -> u64 {
        self.state().downloaded
    }

    fn is_skipped(&self) -> bool {
        self.state().skipped
    }

    fn set_skipped(&self, skipped: bool) -> bool {
        let mut state = self.state();
        if state.refuse_skip_changes {
            state.last_error = Some("storage type change rejected".to_string());
            return false;
        }
        state.skipped = skipped;
        true
    }

    fn priority(&self) -> i32 {
        self.state().priority
    }

    fn set_priority(&self, priority: i32) {
        self.state().priority = priority;
    }

    fn storage_type(&self) -> StorageType {
        self.state().storage
    }

    fn is_pad_file(&self) -> bool {
        self.pad
    }

    fn first_piece(&self) -> u32 {
        self.first_piece
    }

    fn last_piece(&self) -> u32 {
        self.last_piece
    }

    fn file_path(&self) -> PathBuf {
        self.state()
            .link
            .clone()
            .unwrap_or_else(|| self.original_path())
    }

    fn original_path(&self) -> PathBuf {
        self.root.join(&self.relative_path)
    }

    fn set_link(&self, target: &Path, dont_delete_existing: bool) -> bool {
        let source = self.file_path();
        let mut state = self.state();
        if state.refuse_links {
            state.last_error = Some(format!("link to {:?} refused", target));
            return false;
        }

        let keep_target = dont_delete_existing && target.exists();
        if source != target && !keep_target && source.exists() {
            if let Err(e) = move_data(&source, target) {
                tracing::warn!("Failed to move {:?} to {:?}: {}", source, target, e);
                state.last_error = Some(e.to_string());
                return false;
            }
        }

        state.link = if target == self.original_path() {
            None
        } else {
            Some(target.to_path_buf())
        };
        state.last_error = None;
        true
    }

    fn clear_link(&self) -> bool {
        let mut state = self.state();
        if state.refuse_links {
            return false;
        }
        state.link = None;
        true
    }

    fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }
}

#[derive(Debug, Default)]
struct MemoryDownloadState {
    paused: bool,
    pause_calls: usize,
    resume_calls: usize,
    attributes: HashMap<String, String>,
    unavailable: bool,
    refuse_storage_changes: bool,
}

#[derive(Debug)]
pub struct MemoryDownload {
    id: String,
    internal_name: String,
    display_name: String,
    save_location: PathBuf,
    persistent: bool,
    incomplete_suffix: Option<String>,
    files: Vec<Arc<MemoryFile>>,
    state: Mutex<MemoryDownloadState>,
}

/// Describes one file when assembling a [`MemoryDownload`].
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub segments: Vec<String>,
    pub length: u64,
    pub pad: bool,
}

impl MemoryDownload {
    pub fn new(
        id: String,
        display_name: &str,
        save_location: impl Into<PathBuf>,
        piece_length: u64,
        files: Vec<FileSpec>,
    ) -> Self {
        let save_location = save_location.into();
        let mut offset = 0u64;
        let piece_length = piece_length.max(1);

        let files = files
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let first_piece = (offset / piece_length) as u32;
                let end = offset + entry.length.max(1) - 1;
                let last_piece = (end / piece_length) as u32;
                offset += entry.length;

                Arc::new(MemoryFile {
                    download_id: id.clone(),
                    index,
                    relative_path: entry.segments.join(&MAIN_SEPARATOR.to_string()),
                    root: save_location.clone(),
                    length: entry.length,
                    pad: entry.pad,
                    first_piece,
                    last_piece,
                    state: Mutex::new(MemoryFileState::default()),
                })
            })
            .collect();

        Self {
            internal_name: id.clone(),
            id,
            display_name: display_name.to_string(),
            save_location,
            persistent: true,
            incomplete_suffix: None,
            files,
            state: Mutex::new(MemoryDownloadState::default()),
        }
    }

    /// Builds a download from `/`-separated paths. The id is derived from the name.
    pub fn with_files(
        name: &str,
        save_location: impl Into<PathBuf>,
        files: &[(&str, u64)],
    ) -> Arc<Self> {
        let specs = files
            .iter()
            .map(|(path, length)| FileSpec {
                segments: path.split('/').map(str::to_string).collect(),
                length: *length,
                pad: false,
            })
            .collect();
        let id = hex::encode(Sha1::digest(name.as_bytes()));
        Arc::new(Self::new(id, name, save_location, 16384, specs))
    }

    pub fn from_torrent(torrent: &Torrent, save_location: impl Into<PathBuf>) -> Self {
        let specs = torrent
            .file_list()
            .into_iter()
            .map(|(segments, length, pad)| FileSpec {
                segments,
                length,
                pad,
            })
            .collect();
        Self::new(
            torrent.info_hash_hex(),
            &torrent.info.name,
            save_location,
            torrent.info.piece_length.max(0) as u64,
            specs,
        )
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_incomplete_suffix(mut self, suffix: Option<String>) -> Self {
        self.incomplete_suffix = suffix;
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryDownloadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn file(&self, index: usize) -> Arc<MemoryFile> {
        self.files[index].clone()
    }

    pub fn files(&self) -> &[Arc<MemoryFile>] {
        &self.files
    }

    pub fn file_ref(self: &Arc<Self>, index: usize) -> FileRef {
        FileRef::new(self.clone(), self.files[index].clone())
    }

    pub fn file_refs(self: &Arc<Self>) -> Vec<FileRef> {
        (0..self.files.len()).map(|i| self.file_ref(i)).collect()
    }

    /// Simulates the engine dropping the download mid-traversal.
    #[cfg(any(test, feature = "test-support"))]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn refuse_storage_changes(&self, refuse: bool) {
        self.state().refuse_storage_changes = refuse;
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn set_paused(&self, paused: bool) {
        self.state().paused = paused;
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn pause_calls(&self) -> usize {
        self.state().pause_calls
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn resume_calls(&self) -> usize {
        self.state().resume_calls
    }
}

impl Download for MemoryDownload {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn internal_name(&self) -> String {
        self.internal_name.clone()
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn file_set(&self) -> Result<Vec<Arc<dyn FileRecord>>, FilesViewError> {
        if self.state().unavailable {
            return Err(FilesViewError::DownloadUnavailable(self.display_name.clone()));
        }
        Ok(self
            .files
            .iter()
            .map(|f| f.clone() as Arc<dyn FileRecord>)
            .collect())
    }

    fn is_persistent(&self) -> bool {
        self.persistent
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn pause(&self) -> bool {
        let mut state = self.state();
        state.pause_calls += 1;
        if state.paused {
            return false;
        }
        state.paused = true;
        true
    }

    fn resume(&self) {
        let mut state = self.state();
        state.resume_calls += 1;
        state.paused = false;
    }

    fn set_storage_types(&self, indices: &[usize], storage: StorageType) -> bool {
        if self.state().refuse_storage_changes {
            return false;
        }
        for &index in indices {
            if let Some(file) = self.files.get(index) {
                file.set_storage_type(storage);
            }
        }
        true
    }

    fn set_skipped(&self, indices: &[usize], skipped: bool) {
        for &index in indices {
            if let Some(file) = self.files.get(index) {
                file.set_skipped(skipped);
            }
        }
    }

    fn save_location(&self) -> PathBuf {
        self.save_location.clone()
    }

    fn attribute(&self, key: &str) -> Option<String> {
        self.state().attributes.get(key).cloned()
    }

    fn set_attribute(&self, key: &str, value: Option<String>) {
        let mut state = self.state();
        match value {
            Some(v) => {
                state.attributes.insert(key.to_string(), v);
            }
            None => {
                state.attributes.remove(key);
            }
        }
    }

    fn incomplete_suffix(&self) -> Option<String> {
        self.incomplete_suffix.clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
struct PromptLog {
    renames: Vec<RenamePrompt>,
    overwrites: Vec<PathBuf>,
    size_mismatches: usize,
    deletes: usize,
}

/// Answers every confirmation with a fixed value and remembers what was
/// asked. Rename prompts are kept until taken.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    allow_overwrite: bool,
    allow_size_mismatch: bool,
    allow_delete: bool,
    log: Mutex<PromptLog>,
}

#[cfg(any(test, feature = "test-support"))]
impl ScriptedPrompter {
    pub fn allowing_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn allowing_size_mismatch(mut self, allow: bool) -> Self {
        self.allow_size_mismatch = allow;
        self
    }

    pub fn allowing_delete(mut self, allow: bool) -> Self {
        self.allow_delete = allow;
        self
    }

    fn log(&self) -> MutexGuard<'_, PromptLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn take_rename_prompts(&self) -> Vec<RenamePrompt> {
        std::mem::take(&mut self.log().renames)
    }

    pub fn overwrite_confirmations(&self) -> Vec<PathBuf> {
        self.log().overwrites.clone()
    }

    pub fn size_mismatch_confirmations(&self) -> usize {
        self.log().size_mismatches
    }

    pub fn delete_confirmations(&self) -> usize {
        self.log().deletes
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Prompter for ScriptedPrompter {
    fn ask_rename(&self, prompt: RenamePrompt) {
        self.log().renames.push(prompt);
    }

    fn confirm_overwrite(&self, path: &Path) -> bool {
        self.log().overwrites.push(path.to_path_buf());
        self.allow_overwrite
    }

    fn confirm_retarget_size_mismatch(&self, _file: &dyn FileRecord, _target: &Path) -> bool {
        self.log().size_mismatches += 1;
        self.allow_size_mismatch
    }

    fn confirm_delete(&self, _path: &Path) -> bool {
        self.log().deletes += 1;
        self.allow_delete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_ranges_follow_offsets() {
        let download = MemoryDownload::new(
            "id".to_string(),
            "name",
            "/save",
            100,
            vec![
                FileSpec {
                    segments: vec!["a".into()],
                    length: 150,
                    pad: false,
                },
                FileSpec {
                    segments: vec!["b".into()],
                    length: 50,
                    pad: false,
                },
                FileSpec {
                    segments: vec!["c".into()],
                    length: 0,
                    pad: false,
                },
            ],
        );

        assert_eq!(download.file(0).first_piece(), 0);
        assert_eq!(download.file(0).last_piece(), 1);
        assert_eq!(download.file(1).first_piece(), 1);
        assert_eq!(download.file(1).last_piece(), 1);
        assert_eq!(download.file(2).first_piece(), 2);
    }

    #[test]
    fn test_pause_reports_only_own_transition() {
        let download = MemoryDownload::with_files("d", "/save", &[("a", 1)]);
        assert!(download.pause());
        assert!(!download.pause());
        download.resume();
        assert!(!download.is_paused());
        assert_eq!(download.pause_calls(), 2);
        assert_eq!(download.resume_calls(), 1);
    }

    #[test]
    fn test_set_link_moves_data() {
        let dir = tempfile::tempdir().unwrap();
        let download = MemoryDownload::with_files("d", dir.path(), &[("sub/a.bin", 3)]);
        let file = download.file(0);
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(file.original_path(), b"abc").unwrap();

        let target = dir.path().join("elsewhere").join("b.bin");
        assert!(file.set_link(&target, false));

        assert!(target.exists());
        assert!(!file.original_path().exists());
        assert_eq!(file.file_path(), target);
        assert!(file.is_relocated());

        let original = file.original_path();
        assert!(file.set_link(&original, false));
        assert!(file.link().is_none());
        assert!(original.exists());
    }

    #[test]
    fn test_refused_link_sets_last_error() {
        let download = MemoryDownload::with_files("d", "/save", &[("a", 1)]);
        let file = download.file(0);
        file.refuse_links(true);
        assert!(!file.set_link(Path::new("/elsewhere/a"), false));
        assert!(file.last_error().is_some());
        assert!(!file.is_relocated());
    }
}
