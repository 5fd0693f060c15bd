use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A cloud-sync client (OneDrive by default) paused while archives are written, so
/// it does not upload or lock half-written files
#[derive(Debug, Clone)]
pub struct SyncClient {
    program: PathBuf,
}

impl SyncClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `%LOCALAPPDATA%\Microsoft\OneDrive\OneDrive.exe`, when LOCALAPPDATA is set
    pub fn onedrive() -> Option<Self> {
        std::env::var_os("LOCALAPPDATA").map(|local| {
            Self::new(
                PathBuf::from(local)
                    .join("Microsoft")
                    .join("OneDrive")
                    .join("OneDrive.exe"),
            )
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Ask the client to shut down and wait for the request to return.
    /// Failures are reported, never fatal.
    pub fn stop(&self) -> bool {
        println!("💤 Stopping sync client {}", self.program.display());
        match Command::new(&self.program).arg("/shutdown").output() {
            Ok(output) => {
                tracing::debug!("{} /shutdown exited with {}", self.program.display(), output.status);
                true
            }
            Err(e) => {
                eprintln!("Error stopping sync client: {e}");
                false
            }
        }
    }

    /// Start the client in the background without waiting for it.
    /// Failures are reported, never fatal.
    pub fn start(&self) -> bool {
        println!("\n🚀 Starting sync client {}", self.program.display());
        let spawned = Command::new(&self.program)
            .arg("/background")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                tracing::debug!("Sync client started with pid {}", child.id());
                true
            }
            Err(e) => {
                eprintln!("Error starting sync client: {e}");
                false
            }
        }
    }
}
