// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::FilesViewError;
use crate::model::{group_by_download, Download, FileKey, FileRecord, FileRef, Prompter, StorageType};

pub const PRIORITY_HIGH: i32 = 1;
pub const PRIORITY_NORMAL: i32 = 0;
pub const PRIORITY_LOW: i32 = -1;

/// How a raw priority value is presented.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityClass {
    High,
    Normal,
    Low,
    Numeric(i32),
}

impl PriorityClass {
    pub fn of(priority: i32) -> Self {
        match priority {
            PRIORITY_HIGH => PriorityClass::High,
            PRIORITY_NORMAL => PriorityClass::Normal,
            PRIORITY_LOW => PriorityClass::Low,
            other => PriorityClass::Numeric(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityAction {
    High,
    Normal,
    Low,
    Numeric(i32),
    NumericAuto,
    Skip,
    Delete,
}

/// What to do with data of a file that becomes do-not-download.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteAction {
    #[default]
    Keep,
    Delete,
    DeleteIfMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityEntry {
    pub index: usize,
    pub priority: i32,
    pub skipped: bool,
}

impl PriorityEntry {
    pub fn of(record: &dyn FileRecord) -> Self {
        Self {
            index: record.index(),
            priority: record.priority(),
            skipped: record.is_skipped(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipOutcome {
    /// This call paused the download; the caller resumes it.
    pub paused: bool,
    pub ok: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityOutcome {
    pub affected: Vec<FileKey>,
    /// Display names of downloads that rejected a storage change.
    pub failed: Vec<String>,
}

pub fn parse_numeric_priority(text: &str) -> Result<i32, FilesViewError> {
    text.trim()
        .parse::<i32>()
        .map_err(|_| FilesViewError::InvalidPriority(text.to_string()))
}

/// New priorities for one download when `selected` (in selection order)
/// should be downloaded first.
///
/// Selected files get a contiguous block, counting down by one from the
/// first selected file, placed above every other file that is still wanted.
/// Those other files keep their order and are only raised as far as needed
/// to make their values distinct. Skipped, unselected files are left alone.
/// Only changed values are returned.
///
/// Values are worked out in `i64`. When the block would end above
/// `i32::MAX`, the top of the order is pushed back down below the ceiling,
/// one step per file, so order and distinctness still hold.
pub fn auto_priorities(files: &[PriorityEntry], selected: &[usize]) -> BTreeMap<usize, i32> {
    let mut seen = HashSet::new();
    let selected: Vec<usize> = selected.iter().copied().filter(|i| seen.insert(*i)).collect();

    let mut unaffected: Vec<&PriorityEntry> = files
        .iter()
        .filter(|f| !f.skipped && !seen.contains(&f.index))
        .collect();
    unaffected.sort_by_key(|f| (f.priority, f.index));

    // (index, old value, new value), lowest first.
    let mut ordered: Vec<(usize, Option<i32>, i64)> = Vec::with_capacity(unaffected.len() + selected.len());
    let mut previous: Option<i64> = None;
    for file in unaffected {
        let priority = i64::from(file.priority);
        let value = match previous {
            Some(p) => priority.max(p + 1),
            None => priority,
        };
        ordered.push((file.index, Some(file.priority), value));
        previous = Some(value);
    }

    let next_priority = previous.map_or(0, |p| p + 1).max(0);
    let count = selected.len() as i64;
    for (rank, &index) in selected.iter().enumerate().rev() {
        ordered.push((index, None, next_priority + count - 1 - rank as i64));
    }

    let mut ceiling = i64::from(i32::MAX);
    for (_, _, value) in ordered.iter_mut().rev() {
        *value = (*value).min(ceiling);
        ceiling = *value - 1;
    }

    ordered
        .into_iter()
        .filter_map(|(index, old, value)| {
            let value = i32::try_from(value).unwrap_or(i32::MIN);
            (old != Some(value)).then_some((index, value))
        })
        .collect()
}

/// Target storage type for one file. `confirm_delete` is only consulted
/// when skipping would discard data that exists on disk.
pub fn plan_storage_type(
    existing: StorageType,
    skipped: bool,
    file_exists: bool,
    delete_action: DeleteAction,
    confirm_delete: impl FnOnce() -> bool,
) -> StorageType {
    let (compact, non_compact) = existing.family();

    if !skipped {
        return non_compact;
    }

    if file_exists {
        // Compact storage only keeps the first and last piece, so partial
        // data of a kept file would be lost.
        match delete_action {
            DeleteAction::Delete if confirm_delete() => compact,
            _ => non_compact,
        }
    } else if delete_action == DeleteAction::Keep {
        non_compact
    } else {
        compact
    }
}

/// Flips the skip flag of `files`, all owned by `download`, together with
/// the storage type change it implies. Skip flags only change when every
/// storage change was accepted.
pub fn set_skipped_for_download(
    download: &dyn Download,
    files: &[Arc<dyn FileRecord>],
    skipped: bool,
    delete_action: DeleteAction,
    prompt: bool,
    prompter: &dyn Prompter,
) -> SkipOutcome {
    if !download.is_persistent() {
        for file in files {
            file.set_skipped(skipped);
        }
        return SkipOutcome {
            paused: false,
            ok: true,
        };
    }

    let save_location = download.save_location();
    let root_exists =
        save_location.is_dir() || (files.len() <= 1 && save_location.exists());

    let mut changes: BTreeMap<StorageType, Vec<usize>> = BTreeMap::new();
    for file in files {
        let existing = file.storage_type();
        let target = if skipped {
            let path = file.file_path();
            let file_exists = (root_exists || !path.starts_with(&save_location)) && path.exists();
            plan_storage_type(existing, true, file_exists, delete_action, || {
                !prompt || prompter.confirm_delete(&path)
            })
        } else {
            plan_storage_type(existing, false, false, delete_action, || false)
        };

        if target != existing {
            changes.entry(target).or_default().push(file.index());
        }
    }

    let mut ok = true;
    let mut paused = false;
    if !changes.is_empty() {
        if changes.keys().any(|s| s.is_compact()) {
            paused = download.pause();
        }
        for (storage, indices) in &changes {
            if !download.set_storage_types(indices, *storage) {
                tracing::warn!(
                    "'{}' rejected storage type {} for {} file(s)",
                    download.display_name(),
                    storage,
                    indices.len()
                );
                ok = false;
            }
        }
    }

    if ok {
        let indices: Vec<usize> = files.iter().map(|f| f.index()).collect();
        download.set_skipped(&indices, skipped);
    }

    SkipOutcome { paused, ok }
}

fn finish_download(
    download: &Arc<dyn Download>,
    records: &[Arc<dyn FileRecord>],
    skipped: bool,
    delete_action: DeleteAction,
    prompt: bool,
    prompter: &dyn Prompter,
    outcome: &mut PriorityOutcome,
) {
    let result = set_skipped_for_download(
        download.as_ref(),
        records,
        skipped,
        delete_action,
        prompt,
        prompter,
    );
    if result.paused {
        download.resume();
    }
    if !result.ok {
        outcome.failed.push(download.display_name());
    }
    outcome.affected.extend(records.iter().map(|r| r.key()));
}

/// Bulk skip change across downloads.
pub fn set_skipped(
    files: &[FileRef],
    skipped: bool,
    delete_action: DeleteAction,
    prompt: bool,
    prompter: &dyn Prompter,
) -> PriorityOutcome {
    let mut outcome = PriorityOutcome::default();
    for (download, records) in group_by_download(files) {
        finish_download(
            &download,
            &records,
            skipped,
            delete_action,
            prompt,
            prompter,
            &mut outcome,
        );
    }
    outcome
}

/// Rewrites priorities of the selected files of one download and makes
/// sure they are downloaded.
pub fn apply_auto_priority(
    download: &Arc<dyn Download>,
    selected: &[Arc<dyn FileRecord>],
    prompter: &dyn Prompter,
) -> Result<PriorityOutcome, FilesViewError> {
    let all_files = download.file_set()?;
    let entries: Vec<PriorityEntry> = all_files.iter().map(|f| PriorityEntry::of(f.as_ref())).collect();
    let selected_indices: Vec<usize> = selected.iter().map(|f| f.index()).collect();

    let priorities = auto_priorities(&entries, &selected_indices);
    for file in &all_files {
        if let Some(&priority) = priorities.get(&file.index()) {
            file.set_priority(priority);
        }
    }
    tracing::debug!(
        "Auto priority for '{}': {} value(s) changed",
        download.display_name(),
        priorities.len()
    );

    let mut outcome = PriorityOutcome::default();
    finish_download(
        download,
        selected,
        false,
        DeleteAction::Keep,
        true,
        prompter,
        &mut outcome,
    );
    Ok(outcome)
}

pub fn change_priority(
    files: &[FileRef],
    action: PriorityAction,
    prompter: &dyn Prompter,
) -> Result<PriorityOutcome, FilesViewError> {
    let mut outcome = PriorityOutcome::default();
    if files.is_empty() {
        return Ok(outcome);
    }

    for (download, records) in group_by_download(files) {
        let fixed = match action {
            PriorityAction::High => Some(PRIORITY_HIGH),
            PriorityAction::Normal => Some(PRIORITY_NORMAL),
            PriorityAction::Low => Some(PRIORITY_LOW),
            PriorityAction::Numeric(value) => Some(value),
            PriorityAction::NumericAuto => {
                let result = apply_auto_priority(&download, &records, prompter)?;
                outcome.affected.extend(result.affected);
                outcome.failed.extend(result.failed);
                continue;
            }
            PriorityAction::Skip | PriorityAction::Delete => None,
        };

        if let Some(priority) = fixed {
            for record in &records {
                record.set_priority(priority);
            }
        }

        let (skipped, delete_action) = match action {
            PriorityAction::Skip => (true, DeleteAction::Keep),
            PriorityAction::Delete => (true, DeleteAction::Delete),
            _ => (false, DeleteAction::Keep),
        };
        finish_download(
            &download,
            &records,
            skipped,
            delete_action,
            true,
            prompter,
            &mut outcome,
        );
    }

    tracing::info!(
        "Priority {:?} applied to {} file(s)",
        action,
        outcome.affected.len()
    );
    Ok(outcome)
}
