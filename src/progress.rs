#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
#[cfg(feature = "progress")]
use std::time::Duration;

/// Whether progress output makes sense: stdout is a terminal and we are not in CI
pub fn should_show_progress() -> bool {
    std::io::stdout().is_terminal() && !is_ci_environment()
}

fn is_ci_environment() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_URL", "BUILDKITE"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Spinner shown while the archiver subprocess runs (7z itself runs with `-bd`)
pub struct ArchiveSpinner {
    #[cfg(feature = "progress")]
    bar: Option<ProgressBar>,
}

impl ArchiveSpinner {
    #[cfg(feature = "progress")]
    pub fn start(archive_name: &str) -> Self {
        if !should_show_progress() {
            return Self { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
            bar.set_style(style);
        }
        bar.set_message(format!("Compressing {archive_name}"));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar: Some(bar) }
    }

    #[cfg(not(feature = "progress"))]
    pub fn start(_archive_name: &str) -> Self {
        Self {}
    }

    pub fn is_visible(&self) -> bool {
        #[cfg(feature = "progress")]
        {
            self.bar.is_some()
        }
        #[cfg(not(feature = "progress"))]
        {
            false
        }
    }

    pub fn finish(self) {
        #[cfg(feature = "progress")]
        {
            if let Some(bar) = self.bar {
                bar.finish_and_clear();
            }
        }
    }
}
