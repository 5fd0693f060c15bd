use crate::error::BackupError;
use crate::sync_client::SyncClient;
use crate::Result;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared between the task loop and the Ctrl-C handler: the interrupt flag, the
/// archive currently being written by the archiver and the sync client stopped for
/// the run
#[derive(Clone, Default)]
pub struct InterruptContext {
    interrupt_flag: Arc<AtomicBool>,
    active_archive: Arc<Mutex<Option<PathBuf>>>,
    stopped_sync_client: Arc<Mutex<Option<SyncClient>>>,
}

impl InterruptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an interrupt has been requested
    pub fn is_interrupted(&self) -> bool {
        self.interrupt_flag.load(Ordering::SeqCst)
    }

    /// Set interrupt state (mainly for testing)
    pub fn set_interrupted(&self, interrupted: bool) {
        self.interrupt_flag.store(interrupted, Ordering::SeqCst);
    }

    /// Track an archive while the archiver writes it
    pub fn register_archive(&self, archive_path: &Path) -> ArchiveGuard {
        if let Ok(mut active) = self.active_archive.lock() {
            *active = Some(archive_path.to_path_buf());
        }
        ArchiveGuard {
            context: self.clone(),
        }
    }

    pub fn active_archive(&self) -> Option<PathBuf> {
        self.active_archive
            .lock()
            .ok()
            .and_then(|active| active.clone())
    }

    /// Remove the partially written archive, if any. Returns whether a file was removed.
    pub fn cleanup_active_archive(&self, silent: bool) -> bool {
        let Some(archive) = self.active_archive.lock().ok().and_then(|mut a| a.take()) else {
            return false;
        };

        if !archive.is_file() {
            return false;
        }

        match std::fs::remove_file(&archive) {
            Ok(()) => {
                if !silent {
                    eprintln!("Cleaned up incomplete archive: {}", archive.display());
                }
                true
            }
            Err(e) => {
                if !silent {
                    eprintln!(
                        "Warning: Could not clean up incomplete archive {}: {e}",
                        archive.display()
                    );
                }
                false
            }
        }
    }

    /// Remember a sync client that must be started again before the process ends
    pub fn set_stopped_sync_client(&self, client: SyncClient) {
        if let Ok(mut stopped) = self.stopped_sync_client.lock() {
            *stopped = Some(client);
        }
    }

    /// Hand over the stopped sync client. Only the first caller gets it, so the client
    /// is restarted once whether the run ends normally or by Ctrl-C.
    pub fn take_stopped_sync_client(&self) -> Option<SyncClient> {
        self.stopped_sync_client
            .lock()
            .ok()
            .and_then(|mut stopped| stopped.take())
    }

    fn clear(&self) {
        if let Ok(mut active) = self.active_archive.lock() {
            *active = None;
        }
    }
}

/// Clears the tracked archive when the archiver returns. After an interrupt the path
/// stays registered so the handler can still remove it.
pub struct ArchiveGuard {
    context: InterruptContext,
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        if !self.context.is_interrupted() {
            self.context.clear();
        }
    }
}

/// Mark the run interrupted, remove the in-flight archive and restart a stopped sync
/// client. Returns whether a stopped sync client was asked to start.
pub fn handle_interrupt(context: &InterruptContext) -> bool {
    context.set_interrupted(true);
    eprintln!("\nInterrupted by user. Cleaning up...");
    context.cleanup_active_archive(false);

    match context.take_stopped_sync_client() {
        Some(client) => {
            client.start();
            true
        }
        None => false,
    }
}

/// Install the Ctrl-C handler: clean up through `handle_interrupt` and exit with 130
pub fn install_handler(context: &InterruptContext) -> Result<()> {
    let context = context.clone();
    ctrlc::set_handler(move || {
        handle_interrupt(&context);
        std::process::exit(BackupError::Interrupted.exit_code());
    })
    .map_err(|e| BackupError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
}
