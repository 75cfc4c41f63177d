// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::sync::{broadcast, mpsc};

use crate::errors::FilesViewError;
use crate::model::FileRef;
use crate::relocate::UiEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpKind {
    /// Relink and let the engine move the data.
    Move { dont_delete_existing: bool },
    /// Hard link the current data to the target, then relink.
    HardLink,
    /// Copy the current data to the target, then relink. The source stays.
    Copy,
}

impl FileOpKind {
    fn failure_title(self) -> &'static str {
        match self {
            FileOpKind::Move { .. } => "Move failed",
            FileOpKind::HardLink => "Hard link failed",
            FileOpKind::Copy => "Copy failed",
        }
    }
}

pub type Completion = Box<dyn FnOnce(bool) + Send>;

/// One queued relocation. `done` runs exactly once with the outcome.
pub struct FileOp {
    pub file: FileRef,
    pub source: PathBuf,
    pub target: PathBuf,
    pub kind: FileOpKind,
    pub done: Completion,
}

impl fmt::Debug for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileOp")
            .field("file", &self.file.key())
            .field("source", &self.source)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct FileOpClient {
    op_tx: mpsc::UnboundedSender<FileOp>,
}

impl FileOpClient {
    /// Queues `op`. If the dispatcher is gone the op completes as failed
    /// right away so batch waiters are not left hanging.
    pub fn submit(&self, op: FileOp) -> Result<(), FilesViewError> {
        self.op_tx.send(op).map_err(|mpsc::error::SendError(op)| {
            tracing::warn!("Dropping {:?}, dispatcher is shut down", op);
            (op.done)(false);
            FilesViewError::DispatcherShutdown
        })
    }
}

/// Single worker executing file operations strictly in submission order.
pub struct FileOpDispatcher {
    op_rx: mpsc::UnboundedReceiver<FileOp>,
    event_tx: mpsc::UnboundedSender<UiEvent>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl FileOpDispatcher {
    pub fn new(
        event_tx: mpsc::UnboundedSender<UiEvent>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> (Self, FileOpClient) {
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        let actor = Self {
            op_rx,
            event_tx,
            shutdown_rx: shutdown_tx.subscribe(),
        };
        (actor, FileOpClient { op_tx })
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                Some(op) = self.op_rx.recv() => self.execute(op).await,
                else => { break; }
            }
        }

        // Ops still queued never ran; report them as failed.
        self.op_rx.close();
        while let Ok(op) = self.op_rx.try_recv() {
            (op.done)(false);
        }
        tracing::debug!("File operation dispatcher stopped");
    }

    async fn execute(&self, op: FileOp) {
        let FileOp {
            file,
            source,
            target,
            kind,
            done,
        } = op;

        tracing::info!("{:?} {:?} -> {:?}", kind, source, target);

        let result = match kind {
            FileOpKind::Move {
                dont_delete_existing,
            } => relink(&file, &target, dont_delete_existing).await,
            FileOpKind::HardLink => match hard_link(&source, &target).await {
                Ok(()) => {
                    let linked = relink(&file, &target, true).await;
                    if linked.is_err() {
                        if let Err(e) = tokio::fs::remove_file(&target).await {
                            tracing::warn!("Could not remove hard link {:?}: {}", target, e);
                        }
                    }
                    linked
                }
                Err(e) => Err(e.to_string()),
            },
            FileOpKind::Copy => match copy(&source, &target).await {
                Ok(()) => relink(&file, &target, true).await,
                Err(e) => Err(e.to_string()),
            },
        };

        let ok = match result {
            Ok(()) => true,
            Err(error) => {
                let message = format!(
                    "Failed to relocate {} to {}: {}",
                    source.display(),
                    target.display(),
                    error
                );
                tracing::warn!("{}", message);
                let _ = self.event_tx.send(UiEvent::ShowError {
                    title: kind.failure_title().to_string(),
                    message,
                });
                false
            }
        };

        done(ok);
    }
}

async fn create_parent(target: &Path) -> std::io::Result<()> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

async fn hard_link(source: &Path, target: &Path) -> std::io::Result<()> {
    create_parent(target).await?;
    tokio::fs::hard_link(source, target).await
}

async fn copy(source: &Path, target: &Path) -> std::io::Result<()> {
    create_parent(target).await?;
    tokio::fs::copy(source, target).await.map(|_| ())
}

// The engine may move data while relinking, so it runs off the async workers.
async fn relink(file: &FileRef, target: &Path, dont_delete_existing: bool) -> Result<(), String> {
    let record = file.record.clone();
    let target = target.to_path_buf();
    let linked = tokio::task::spawn_blocking(move || {
        if record.set_link(&target, dont_delete_existing) {
            Ok(())
        } else {
            Err(record.last_error().unwrap_or_else(|| "unknown".to_string()))
        }
    })
    .await;

    match linked {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Relink task failed: {}", e);
            Err("unknown".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDownload;
    use crate::model::FileRecord;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    fn spawn_dispatcher() -> (
        FileOpClient,
        mpsc::UnboundedReceiver<UiEvent>,
        broadcast::Sender<()>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let (dispatcher, client) = FileOpDispatcher::new(event_tx, shutdown_tx.clone());
        tokio::spawn(dispatcher.run());
        (client, event_rx, shutdown_tx)
    }

    fn op(file: FileRef, target: PathBuf, kind: FileOpKind, done: Completion) -> FileOp {
        FileOp {
            source: file.record.file_path(),
            file,
            target,
            kind,
            done,
        }
    }

    #[tokio::test]
    async fn test_ops_run_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let d = MemoryDownload::with_files("order", dir.path(), &[("a", 1), ("b", 1), ("c", 1)]);
        for f in d.files() {
            fs::write(f.original_path(), b"x").unwrap();
        }
        let (client, _events, _shutdown) = spawn_dispatcher();

        let order = Arc::new(Mutex::new(Vec::new()));
        let (last_tx, last_rx) = oneshot::channel();
        let mut last_tx = Some(last_tx);
        for i in 0..3 {
            let order = order.clone();
            let signal = if i == 2 { last_tx.take() } else { None };
            let target = dir.path().join("moved").join(format!("{}", i));
            client
                .submit(op(
                    d.file_ref(i),
                    target,
                    FileOpKind::Move {
                        dont_delete_existing: false,
                    },
                    Box::new(move |ok| {
                        order.lock().unwrap().push((i, ok));
                        if let Some(tx) = signal {
                            let _ = tx.send(());
                        }
                    }),
                ))
                .unwrap();
        }
        last_rx.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![(0, true), (1, true), (2, true)]);
        assert!(dir.path().join("moved").join("1").exists());
        assert!(d.file(1).is_relocated());
    }

    #[tokio::test]
    async fn test_failed_link_reports_and_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let d = MemoryDownload::with_files("fail", dir.path(), &[("a", 1)]);
        fs::write(d.file(0).original_path(), b"x").unwrap();
        d.file(0).refuse_links(true);
        let (client, mut events, _shutdown) = spawn_dispatcher();

        let target = dir.path().join("linked");
        let (tx, rx) = oneshot::channel();
        client
            .submit(op(
                d.file_ref(0),
                target.clone(),
                FileOpKind::HardLink,
                Box::new(move |ok| {
                    let _ = tx.send(ok);
                }),
            ))
            .unwrap();

        assert!(!rx.await.unwrap());
        match events.recv().await {
            Some(UiEvent::ShowError { title, message }) => {
                assert_eq!(title, "Hard link failed");
                assert!(message.contains("refused"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        // The link created for this op is cleaned up again.
        assert!(!target.exists());
        assert!(d.file(0).original_path().exists());
    }

    #[tokio::test]
    async fn test_copy_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let d = MemoryDownload::with_files("copy", dir.path(), &[("a", 1)]);
        fs::write(d.file(0).original_path(), b"x").unwrap();
        let (client, _events, _shutdown) = spawn_dispatcher();

        let target = dir.path().join("copies").join("a");
        let (tx, rx) = oneshot::channel();
        client
            .submit(op(
                d.file_ref(0),
                target.clone(),
                FileOpKind::Copy,
                Box::new(move |ok| {
                    let _ = tx.send(ok);
                }),
            ))
            .unwrap();

        assert!(rx.await.unwrap());
        assert!(target.exists());
        assert!(d.file(0).original_path().exists());
        assert_eq!(d.file(0).file_path(), target);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails_the_op() {
        let d = MemoryDownload::with_files("down", "/save/down", &[("a", 1)]);
        let (client, _events, shutdown) = spawn_dispatcher();
        shutdown.send(()).unwrap();
        // Let the actor observe the shutdown and drop its receiver.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let outcome = Arc::new(Mutex::new(None));
        let seen = outcome.clone();
        let result = client.submit(op(
            d.file_ref(0),
            PathBuf::from("/save/down/b"),
            FileOpKind::Move {
                dont_delete_existing: false,
            },
            Box::new(move |ok| {
                *seen.lock().unwrap() = Some(ok);
            }),
        ));

        assert!(matches!(result, Err(FilesViewError::DispatcherShutdown)));
        assert_eq!(*outcome.lock().unwrap(), Some(false));
    }
}
