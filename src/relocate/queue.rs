// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::VecDeque;
use std::path::MAIN_SEPARATOR;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::errors::FilesViewError;
use crate::model::{FileRef, Prompter};
use crate::relocate::dispatcher::{FileOp, FileOpClient, FileOpKind};
use crate::relocate::UiEvent;

/// The rename dialog for one file. Handed to [`Prompter::ask_rename`] and
/// returned, by value, through [`RenameQueue::complete`].
#[derive(Debug)]
pub struct RenamePrompt {
    pub file: FileRef,
    /// Current file name, pre-entered in the dialog.
    pub suggested_name: String,
    /// Character range to pre-select, the name without its extension.
    pub selection: Option<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameAnswer {
    Submitted(String),
    Cancelled,
    /// Abandons this prompt and every rename still waiting.
    Escaped,
}

/// Range of `file_name` to pre-select for editing: everything before the
/// extension. An incomplete-download suffix such as `.!bt` is not treated
/// as the extension.
pub fn suggest_rename_selection(
    file_name: &str,
    incomplete_suffix: Option<&str>,
) -> Option<(usize, usize)> {
    let bytes = file_name.as_bytes();
    let mut pos = file_name.rfind('.')?;

    if pos > 0 && incomplete_suffix.is_some_and(|suffix| &file_name[pos..] == suffix) {
        pos -= 1;
        while pos > 0 && bytes[pos] != b'.' {
            pos -= 1;
        }
    }

    if pos > 0 {
        Some((0, file_name[..pos].chars().count()))
    } else {
        None
    }
}

fn validate_name(name: &str) -> Result<(), FilesViewError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains(MAIN_SEPARATOR);
    if invalid {
        return Err(FilesViewError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct QueueState {
    active: bool,
    pending: VecDeque<FileRef>,
}

/// Serializes rename dialogs: at most one is open, the rest wait in order.
pub struct RenameQueue {
    state: Mutex<QueueState>,
    prompter: Arc<dyn Prompter>,
    client: FileOpClient,
    event_tx: mpsc::UnboundedSender<UiEvent>,
}

impl RenameQueue {
    pub fn new(
        prompter: Arc<dyn Prompter>,
        client: FileOpClient,
        event_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            prompter,
            client,
            event_tx,
        })
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }

    pub fn enqueue(self: &Arc<Self>, file: FileRef) {
        self.state().pending.push_back(file);
        self.process_next();
    }

    fn process_next(self: &Arc<Self>) {
        let next = {
            let mut state = self.state();
            if state.active {
                None
            } else {
                let next = state.pending.pop_front();
                state.active = next.is_some();
                next
            }
        };

        if let Some(file) = next {
            let current = file.record.file_path();
            let suggested_name = current
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let suffix = file.download.incomplete_suffix();
            let selection = suggest_rename_selection(&suggested_name, suffix.as_deref());

            self.prompter.ask_rename(RenamePrompt {
                file,
                suggested_name,
                selection,
            });
        }
    }

    /// Resolves the open prompt. A submitted name pauses the download,
    /// renames in the background, and only then opens the next prompt.
    pub fn complete(self: &Arc<Self>, prompt: RenamePrompt, answer: RenameAnswer) -> Result<(), FilesViewError> {
        let name = {
            let mut state = self.state();
            state.active = false;
            match answer {
                RenameAnswer::Escaped => {
                    let dropped = state.pending.len();
                    state.pending.clear();
                    tracing::debug!("Rename abandoned, {} queued rename(s) dropped", dropped);
                    return Ok(());
                }
                RenameAnswer::Cancelled => None,
                RenameAnswer::Submitted(name) => Some(name),
            }
        };

        let Some(name) = name else {
            self.process_next();
            return Ok(());
        };

        if let Err(e) = validate_name(&name) {
            self.process_next();
            return Err(e);
        }

        let file = prompt.file;
        let existing = file.record.file_path();
        let target = match existing.parent() {
            Some(parent) => parent.join(&name),
            None => name.into(),
        };
        if target == existing {
            self.process_next();
            return Ok(());
        }

        let download = file.download.clone();
        let needs_resume = download.pause();
        let key = file.key();
        let queue = self.clone();

        tracing::info!("Renaming {:?} to {:?}", existing, target);
        self.client.submit(FileOp {
            file,
            source: existing,
            target,
            kind: FileOpKind::Move {
                dont_delete_existing: false,
            },
            done: Box::new(move |_ok| {
                if needs_resume {
                    download.resume();
                }
                let _ = queue.event_tx.send(UiEvent::InvalidateRows(vec![key]));
                queue.process_next();
            }),
        })
    }
}
