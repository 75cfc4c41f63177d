// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Moving files around on disk: renames, retargets, moves into another
//! directory and reverts to the original location.
//!
//! Interactive decisions go through [`Prompter`]; file system work is handed
//! to the single [`FileOpDispatcher`] worker; the UI hears back through
//! [`UiEvent`]s.

pub mod batch;
pub mod dispatcher;
pub mod queue;
pub mod retarget_text;

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub use batch::{BatchTiming, BatchTracker, BatchWait};
pub use dispatcher::{FileOp, FileOpClient, FileOpDispatcher, FileOpKind};
pub use queue::{suggest_rename_selection, RenameAnswer, RenamePrompt, RenameQueue};
pub use retarget_text::{batch_retarget_text, parse_batch_retarget};

use crate::errors::FilesViewError;
use crate::model::{Download, FileKey, FileRecord, FileRef, Prompter};
use crate::selection::MenuState;
use crate::tree::{split_path, SelectedFile};

/// Work the embedding UI has to do on its own thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    InvalidateRows(Vec<FileKey>),
    ShowError { title: String, message: String },
    /// Summary of a batch retarget, one `existing -> target` line per file.
    BatchResult(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateMode {
    /// Data follows the file; an occupied target is only overwritten after
    /// confirmation.
    Move,
    /// The file is pointed at data that may already exist at the target.
    Retarget,
}

#[derive(Debug, Clone)]
pub struct RelocateRequest {
    pub file: FileRef,
    pub target: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevertOptions {
    pub hard_link: bool,
    pub copy: bool,
    /// Keep the current file name instead of the original one.
    pub retain_names: bool,
}

/// A dispatched batch. Rows are invalidated once `finished` resolves.
#[derive(Debug)]
pub struct BatchHandle {
    pub files: Vec<FileKey>,
    task: JoinHandle<BatchWait>,
}

impl BatchHandle {
    pub async fn finished(self) -> BatchWait {
        match self.task.await {
            Ok(wait) => wait,
            Err(e) => {
                tracing::error!("Batch waiter failed: {}", e);
                BatchWait::TimedOut { completed: 0 }
            }
        }
    }
}

struct Batch {
    tracker: Arc<BatchTracker>,
    pause_attempted: HashSet<String>,
    paused: Vec<Arc<dyn Download>>,
    affected: Vec<FileKey>,
}

impl Batch {
    fn new() -> Self {
        Self {
            tracker: Arc::new(BatchTracker::new()),
            pause_attempted: HashSet::new(),
            paused: Vec::new(),
            affected: Vec::new(),
        }
    }

    // At most one pause per download; only our own pauses are undone later.
    fn pause(&mut self, download: &Arc<dyn Download>) {
        if self.pause_attempted.insert(download.id()) && download.pause() {
            self.paused.push(download.clone());
        }
    }
}

pub struct Relocator {
    client: FileOpClient,
    prompter: Arc<dyn Prompter>,
    event_tx: mpsc::UnboundedSender<UiEvent>,
    timing: BatchTiming,
    runtime: Handle,
    rename_queue: Arc<RenameQueue>,
}

impl Relocator {
    /// Spawns the file operation worker on `runtime`. It stops when
    /// `shutdown_tx` fires.
    pub fn start(
        runtime: Handle,
        prompter: Arc<dyn Prompter>,
        timing: BatchTiming,
        shutdown_tx: broadcast::Sender<()>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (dispatcher, client) = FileOpDispatcher::new(event_tx.clone(), shutdown_tx);
        runtime.spawn(dispatcher.run());

        let rename_queue = RenameQueue::new(prompter.clone(), client.clone(), event_tx.clone());
        let relocator = Self {
            client,
            prompter,
            event_tx,
            timing,
            runtime,
            rename_queue,
        };
        (relocator, event_rx)
    }

    pub fn rename_queue(&self) -> &Arc<RenameQueue> {
        &self.rename_queue
    }

    /// Queues one rename prompt per file.
    pub fn rename(&self, files: &[FileRef]) {
        for file in files {
            self.rename_queue.enqueue(file.clone());
        }
    }

    pub fn complete_rename(&self, prompt: RenamePrompt, answer: RenameAnswer) -> Result<(), FilesViewError> {
        self.rename_queue.complete(prompt, answer)
    }

    /// A retarget onto existing data is fine when the sizes agree; otherwise
    /// the user decides.
    pub fn check_retarget_ok(&self, file: &dyn FileRecord, target: &Path) -> bool {
        match std::fs::metadata(target) {
            Err(_) => true,
            Ok(meta) if meta.len() == file.length() => true,
            Ok(_) => self.prompter.confirm_retarget_size_mismatch(file, target),
        }
    }

    pub fn relocate(&self, requests: Vec<RelocateRequest>, mode: RelocateMode) -> Option<BatchHandle> {
        self.relocate_with_summary(requests, mode).0
    }

    /// Like [`relocate`](Self::relocate), also returning one
    /// `existing -> target` line per submitted move.
    fn relocate_with_summary(
        &self,
        requests: Vec<RelocateRequest>,
        mode: RelocateMode,
    ) -> (Option<BatchHandle>, Vec<String>) {
        let mut batch = Batch::new();
        let mut summary = Vec::new();

        for RelocateRequest { file, target } in requests {
            let existing = file.record.file_path();
            if target == existing {
                continue;
            }

            batch.pause(&file.download);

            let mut dont_delete_existing = false;
            if target.exists() {
                match mode {
                    RelocateMode::Retarget => {
                        if !self.check_retarget_ok(&*file.record, &target) {
                            tracing::debug!("Retarget of {} to {:?} declined", file.key(), target);
                            continue;
                        }
                        dont_delete_existing = true;
                    }
                    RelocateMode::Move => {
                        if existing.exists() && !self.prompter.confirm_overwrite(&target) {
                            tracing::debug!("Not overwriting {:?}", target);
                            continue;
                        }
                    }
                }
            }

            let line = format!("{} -> {}", existing.display(), target.display());
            let submitted = self.dispatch(
                &mut batch,
                file,
                existing,
                target,
                FileOpKind::Move {
                    dont_delete_existing,
                },
            );
            if submitted {
                summary.push(line);
            }
        }

        (self.finish(batch), summary)
    }

    /// Moves the files into `dir`. Files picked through a folder keep their
    /// layout below that folder.
    pub fn relocate_to_directory(&self, files: &[SelectedFile], dir: &Path) -> Option<BatchHandle> {
        let requests = files
            .iter()
            .filter_map(|selected| {
                let current = selected.file.record.file_path();
                let name = current.file_name()?;
                Some(RelocateRequest {
                    file: selected.file.clone(),
                    target: directory_target(selected, dir, name),
                })
            })
            .collect();
        self.relocate(requests, RelocateMode::Retarget)
    }

    /// Puts relocated files back where the download would keep them.
    pub fn revert(&self, files: &[FileRef], options: RevertOptions) -> Option<BatchHandle> {
        let mut batch = Batch::new();

        for file in files {
            let record = &file.record;
            if !record.is_relocated() {
                continue;
            }

            let source = record.file_path();
            let mut target = record.original_path();
            if options.retain_names {
                if let (Some(parent), Some(name)) = (target.parent(), source.file_name()) {
                    target = parent.join(name);
                }
            }
            if source == target {
                continue;
            }

            batch.pause(&file.download);

            if target.exists() {
                if let Err(e) = std::fs::remove_file(&target) {
                    tracing::warn!("Could not remove {:?} before revert: {}", target, e);
                }
            }

            let kind = if options.hard_link {
                FileOpKind::HardLink
            } else if options.copy {
                FileOpKind::Copy
            } else {
                FileOpKind::Move {
                    dont_delete_existing: true,
                }
            };
            self.dispatch(&mut batch, file.clone(), source, target, kind);
        }

        self.finish(batch)
    }

    /// Drops the links of relocated files in multi-file downloads. Data on
    /// disk stays where it is.
    pub fn clear_links(&self, files: &[FileRef]) -> Vec<FileKey> {
        let menu = MenuState::summarize(files);
        let cleared: Vec<FileKey> = files
            .iter()
            .filter(|f| menu.files_with_links.contains(&f.key()))
            .filter(|f| {
                let ok = f.record.clear_link();
                if !ok {
                    tracing::warn!("Could not clear link of {}", f.key());
                }
                ok
            })
            .map(|f| f.key())
            .collect();

        if !cleared.is_empty() {
            let _ = self.event_tx.send(UiEvent::InvalidateRows(cleared.clone()));
        }
        cleared
    }

    /// Applies an edited batch retarget listing. Nothing happens unless
    /// every line is valid. The [`UiEvent::BatchResult`] lists only the
    /// files that were actually handed to the worker.
    pub fn apply_batch_text(
        &self,
        text: &str,
        downloads: &[Arc<dyn Download>],
    ) -> Result<Option<BatchHandle>, FilesViewError> {
        let requests = parse_batch_retarget(text, downloads).map_err(FilesViewError::InvalidBatchText)?;
        if requests.is_empty() {
            return Ok(None);
        }

        let (handle, summary) = self.relocate_with_summary(requests, RelocateMode::Retarget);
        if !summary.is_empty() {
            let _ = self.event_tx.send(UiEvent::BatchResult(summary.join("\n")));
        }
        Ok(handle)
    }

    fn dispatch(&self, batch: &mut Batch, file: FileRef, source: PathBuf, target: PathBuf, kind: FileOpKind) -> bool {
        let tracker = batch.tracker.clone();
        batch.affected.push(file.key());
        let op = FileOp {
            file,
            source,
            target,
            kind,
            done: Box::new(move |ok| tracker.release(ok)),
        };
        // A rejected submit has already released its slot.
        match self.client.submit(op) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    fn finish(&self, batch: Batch) -> Option<BatchHandle> {
        let Batch {
            tracker,
            paused,
            affected,
            ..
        } = batch;

        if affected.is_empty() {
            for download in &paused {
                download.resume();
            }
            return None;
        }

        let timing = self.timing;
        let event_tx = self.event_tx.clone();
        let keys = affected.clone();
        let task = self.runtime.spawn(async move {
            let wait = tracker.wait(keys.len(), timing).await;
            for download in &paused {
                download.resume();
            }
            let _ = event_tx.send(UiEvent::InvalidateRows(keys));
            wait
        });

        Some(BatchHandle {
            files: affected,
            task,
        })
    }
}

fn directory_target(selected: &SelectedFile, dir: &Path, name: &OsStr) -> PathBuf {
    if let Some(folder) = &selected.folder {
        let relative = selected.file.record.relative_path();
        let segments = split_path(&relative);
        if let Some((_, parents)) = segments.split_last() {
            let below = parents.len() >= folder.len()
                && parents.iter().zip(folder).all(|(a, b)| *a == b.as_str());
            if below && parents.len() > folder.len() {
                let mut target = dir.to_path_buf();
                target.extend(&parents[folder.len()..]);
                return target.join(name);
            }
        }
    }
    dir.join(name)
}
