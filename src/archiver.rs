use crate::error::BackupError;
use crate::naming::{archive_path, target_folder};
use crate::progress::ArchiveSpinner;
use crate::signal::InterruptContext;
use crate::utils::{folder_exists, leaf_name, normalize_source, remove_file_if_exists};
use crate::Result;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Phrase 7-Zip prints when an archive was written without errors, matched
/// case-insensitively
pub const SUCCESS_MARKER: &str = "EVERYTHING IS OK";

/// Output reported for every task in dry-run mode
pub const DRY_RUN_OUTPUT: &str = "Everything is Ok";

/// The external archiver. Implementations return the captured standard output.
pub trait Archiver {
    fn program(&self) -> &str;

    fn execute(&self, args: &[String]) -> Result<String>;
}

/// The 7-Zip command line tool
#[derive(Debug, Clone)]
pub struct SevenZip {
    program: String,
}

impl SevenZip {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Archiver for SevenZip {
    fn program(&self) -> &str {
        &self.program
    }

    fn execute(&self, args: &[String]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| BackupError::ArchiverLaunch {
                program: self.program.clone(),
                source,
            })?;

        // The exit status is not used to decide success, only the printed marker
        tracing::debug!("{} exited with {}", self.program, output.status);
        if !output.stderr.is_empty() {
            tracing::warn!(
                "{} stderr: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Everything needed to compress one task's source folder
#[derive(Debug, Clone)]
pub struct CompressionRequest<'a> {
    pub source: &'a str,
    pub excludes: &'a [String],
    pub target_root: &'a str,
    pub base_name: &'a str,
    pub password: &'a str,
    pub protect_with_password: bool,
    pub compression_level: u8,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOutcome {
    pub raw_output: String,
    pub succeeded: bool,
    pub archive_path: PathBuf,
}

/// Success is decided by the archiver's printed marker, not by its exit status
pub fn is_success_output(output: &str) -> bool {
    output.to_uppercase().contains(SUCCESS_MARKER)
}

/// Position of the `-p{password}` switch in the argument list when one is emitted
pub const PASSWORD_ARG_INDEX: usize = 2;

fn emits_password(request: &CompressionRequest<'_>) -> bool {
    request.protect_with_password && !request.password.is_empty()
}

/// Build the 7-Zip argument list for a request
pub fn build_arguments(request: &CompressionRequest<'_>, archive_path: &str) -> Vec<String> {
    let mut args = vec!["a".to_string(), "-t7z".to_string()];

    if emits_password(request) {
        args.push(format!("-p{}", request.password));
    }

    let source = normalize_source(request.source);
    let leaf = leaf_name(&source).to_string();

    args.push(archive_path.to_string());
    args.push(source);
    args.push("-ssw".to_string()); // compress files open for writing
    args.push(format!("-mx{}", request.compression_level));
    args.push("-bd".to_string()); // no progress indicator

    for exclude in request.excludes {
        args.push(format!("-xr!{leaf}/{exclude}"));
    }

    args
}

/// Render arguments for display, masking the argument at `password_index`
pub fn display_arguments(args: &[String], password_index: Option<usize>) -> String {
    args.iter()
        .enumerate()
        .map(|(index, arg)| {
            if Some(index) == password_index {
                "-p******".to_string()
            } else if arg.contains(' ') {
                format!("\"{arg}\"")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Paths and command line computed for one task before anything is touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPlan {
    pub target_folder: PathBuf,
    pub archive_path: PathBuf,
    pub args: Vec<String>,
    pub password_index: Option<usize>,
    pub dry_run: bool,
}

impl CompressionPlan {
    /// The dated folder is computed once here and reused for the whole task
    pub fn new(request: &CompressionRequest<'_>, now: &NaiveDateTime) -> Self {
        let folder = target_folder(request.target_root, now);
        let archive = archive_path(&folder, request.base_name, now);
        let args = build_arguments(request, &archive);

        Self {
            target_folder: PathBuf::from(folder),
            archive_path: PathBuf::from(archive),
            args,
            password_index: emits_password(request).then_some(PASSWORD_ARG_INDEX),
            dry_run: request.dry_run,
        }
    }

    /// Printable command line with the password masked
    pub fn command_line(&self, program: &str) -> String {
        format!("{program} {}", display_arguments(&self.args, self.password_index))
    }
}

/// Run a compression plan.
///
/// In dry-run mode nothing is touched and the canned success output is returned.
/// Otherwise the target folder is created when missing, a colliding archive is
/// removed, the archiver runs, and a partial archive is deleted when the success
/// marker is missing from its output.
pub fn compress(
    plan: &CompressionPlan,
    archiver: &dyn Archiver,
    interrupts: &InterruptContext,
) -> Result<CompressionOutcome> {
    if plan.dry_run {
        return Ok(CompressionOutcome {
            raw_output: DRY_RUN_OUTPUT.to_string(),
            succeeded: true,
            archive_path: plan.archive_path.clone(),
        });
    }

    prepare_target(&plan.target_folder, &plan.archive_path)?;

    let raw_output = {
        let _guard = interrupts.register_archive(&plan.archive_path);
        let spinner = ArchiveSpinner::start(&archive_display_name(&plan.archive_path));
        let result = archiver.execute(&plan.args);
        spinner.finish();

        match result {
            Ok(output) => output,
            Err(e) if e.is_recoverable() => {
                eprintln!("{e}");
                String::new()
            }
            Err(e) => return Err(e),
        }
    };

    let succeeded = is_success_output(&raw_output);
    if !succeeded {
        let archive = plan.archive_path.display();
        match remove_file_if_exists(&plan.archive_path) {
            Ok(true) => tracing::info!("Removed incomplete archive {archive}"),
            Ok(false) => {}
            Err(e) => tracing::warn!("Could not remove incomplete archive {archive}: {e}"),
        }
    }

    Ok(CompressionOutcome {
        raw_output,
        succeeded,
        archive_path: plan.archive_path.clone(),
    })
}

fn archive_display_name(archive: &Path) -> String {
    archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.display().to_string())
}

fn prepare_target(folder: &Path, archive: &Path) -> Result<()> {
    if !folder_exists(folder) {
        tracing::debug!("Creating target folder {}", folder.display());
        fs::create_dir_all(folder).map_err(|source| BackupError::TargetFolder {
            path: folder.to_path_buf(),
            source,
        })?;
    }

    // A same-second archive from an earlier run is overwritten
    if let Err(e) = remove_file_if_exists(archive) {
        tracing::warn!("Could not remove existing archive {}: {e}", archive.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::io;
    use tempfile::tempdir;

    /// Stands in for 7z: writes the archive file it is asked for and prints canned output
    struct FakeArchiver {
        output: String,
        write_archive: bool,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl FakeArchiver {
        fn printing(output: &str) -> Self {
            Self {
                output: output.to_string(),
                write_archive: true,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Archiver for FakeArchiver {
        fn program(&self) -> &str {
            "fake-7z"
        }

        fn execute(&self, args: &[String]) -> Result<String> {
            self.calls.borrow_mut().push(args.to_vec());
            if self.write_archive {
                if let Some(path) = args.iter().find(|a| a.ends_with(".7z")) {
                    fs::write(path, "7z-bytes")?;
                }
            }
            Ok(self.output.clone())
        }
    }

    struct MissingArchiver;

    impl Archiver for MissingArchiver {
        fn program(&self) -> &str {
            "no-such-7z"
        }

        fn execute(&self, _args: &[String]) -> Result<String> {
            Err(BackupError::ArchiverLaunch {
                program: "no-such-7z".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not found"),
            })
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn request<'a>(
        source: &'a str,
        excludes: &'a [String],
        target_root: &'a str,
        dry_run: bool,
    ) -> CompressionRequest<'a> {
        CompressionRequest {
            source,
            excludes,
            target_root,
            base_name: "_home_u_docs",
            password: "",
            protect_with_password: false,
            compression_level: 3,
            dry_run,
        }
    }

    fn live_plan(root: &str) -> CompressionPlan {
        CompressionPlan::new(&request("/home/u/docs", &[], root, false), &now())
    }

    #[test]
    fn test_plan() {
        let excludes = vec!["*.bak".to_string()];
        let plan = CompressionPlan::new(&request("/home/u/docs/", &excludes, "/mnt/b", true), &now());

        assert_eq!(plan.target_folder, PathBuf::from("/mnt/b/202405/"));
        assert_eq!(
            plan.archive_path,
            PathBuf::from("/mnt/b/202405/_home_u_docs 20240517 083000.7z")
        );
        assert_eq!(plan.args[2], "/mnt/b/202405/_home_u_docs 20240517 083000.7z");
        assert_eq!(plan.args[3], "/home/u/docs");
        assert_eq!(plan.args.last().unwrap(), "-xr!docs/*.bak");
        assert!(plan.dry_run);
        assert_eq!(
            plan.command_line("7z"),
            "7z a -t7z \"/mnt/b/202405/_home_u_docs 20240517 083000.7z\" /home/u/docs -ssw -mx3 -bd -xr!docs/*.bak"
        );
    }

    #[test]
    fn test_is_success_output() {
        assert!(is_success_output("Everything is Ok"));
        assert!(is_success_output("EVERYTHING IS OK"));
        assert!(is_success_output("everything is ok"));
        assert!(is_success_output(
            "7-Zip 23.01\nScanning the drive:\n3 files\n\nEverything is Ok\n"
        ));

        assert!(!is_success_output(""));
        assert!(!is_success_output("Errors: 1\nSystem error"));
        assert!(!is_success_output("Everything is fine"));
    }

    #[test]
    fn test_build_arguments() {
        let excludes = vec!["*.tmp".to_string(), "cache/*".to_string()];
        let req = request("C:\\Users\\me\\Documents\\", &excludes, "D:\\Backup", false);

        let args = build_arguments(&req, "D:/Backup/202405/x.7z");
        assert_eq!(
            args,
            vec![
                "a",
                "-t7z",
                "D:/Backup/202405/x.7z",
                "C:/Users/me/Documents",
                "-ssw",
                "-mx3",
                "-bd",
                "-xr!Documents/*.tmp",
                "-xr!Documents/cache/*",
            ]
        );
    }

    #[test]
    fn test_build_arguments_password() {
        let mut req = request("/home/u/docs", &[], "/mnt/b", false);
        req.password = "s3cret";

        // Password given but task not protected
        assert!(!build_arguments(&req, "a.7z").iter().any(|a| a.starts_with("-p")));

        req.protect_with_password = true;
        let args = build_arguments(&req, "a.7z");
        assert_eq!(args[2], "-ps3cret");
        assert_eq!(args[3], "a.7z");

        // Protected task but no password given
        req.password = "";
        assert!(!build_arguments(&req, "a.7z").iter().any(|a| a.starts_with("-p")));
    }

    #[test]
    fn test_build_arguments_compression_level() {
        let mut req = request("/home/u/docs", &[], "/mnt/b", false);
        req.compression_level = 9;
        assert!(build_arguments(&req, "a.7z").contains(&"-mx9".to_string()));
    }

    #[test]
    fn test_display_arguments_masks_password() {
        let args = vec![
            "a".to_string(),
            "-t7z".to_string(),
            "-ps3cret".to_string(),
            "/mnt/b/202405/_home_u_docs 20240517 083000.7z".to_string(),
        ];
        let shown = display_arguments(&args, Some(PASSWORD_ARG_INDEX));
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("-p******"));
        assert!(shown.contains("\"/mnt/b/202405/_home_u_docs 20240517 083000.7z\""));
    }

    #[test]
    fn test_command_line_masks_only_the_password_switch() {
        let mut req = request("-private/docs", &[], "-pool", false);
        let plan = CompressionPlan::new(&req, &now());
        assert_eq!(plan.password_index, None);
        let shown = plan.command_line("7z");
        assert!(!shown.contains("-p******"));
        assert!(shown.contains("\"-pool/202405/_home_u_docs 20240517 083000.7z\""));
        assert!(shown.contains(" -private/docs "));

        req.protect_with_password = true;
        req.password = "s3cret";
        let plan = CompressionPlan::new(&req, &now());
        assert_eq!(plan.password_index, Some(PASSWORD_ARG_INDEX));
        let shown = plan.command_line("7z");
        assert!(shown.starts_with("7z a -t7z -p****** \"-pool/"));
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains(" -private/docs "));
    }

    #[test]
    fn test_compress_dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("target");
        let root_str = root.to_str().unwrap().to_string();

        let archiver = FakeArchiver::printing("Errors: 1");
        let plan = CompressionPlan::new(&request("/home/u/docs", &[], &root_str, true), &now());
        let outcome = compress(&plan, &archiver, &InterruptContext::new()).unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.raw_output, DRY_RUN_OUTPUT);
        assert!(archiver.calls.borrow().is_empty());
        assert!(!root.exists());
    }

    #[test]
    fn test_compress_success() {
        let dir = tempdir().unwrap();
        let root_str = dir.path().to_str().unwrap().to_string();

        let archiver = FakeArchiver::printing("Scanning\n\nEverything is Ok\n");
        let outcome = compress(&live_plan(&root_str), &archiver, &InterruptContext::new()).unwrap();

        assert!(outcome.succeeded);
        assert!(outcome.archive_path.exists());
        assert!(outcome
            .archive_path
            .to_str()
            .unwrap()
            .ends_with("202405/_home_u_docs 20240517 083000.7z"));
        assert!(dir.path().join("202405").is_dir());
        assert_eq!(archiver.calls.borrow().len(), 1);
    }

    #[test]
    fn test_compress_failure_removes_partial_archive() {
        let dir = tempdir().unwrap();
        let root_str = dir.path().to_str().unwrap().to_string();

        let archiver = FakeArchiver::printing("Errors: 1\nSystem error");
        let outcome = compress(&live_plan(&root_str), &archiver, &InterruptContext::new()).unwrap();

        assert!(!outcome.succeeded);
        assert_eq!(outcome.raw_output, "Errors: 1\nSystem error");
        assert!(!outcome.archive_path.exists());
    }

    #[test]
    fn test_compress_removes_colliding_archive_before_run() {
        let dir = tempdir().unwrap();
        let root_str = dir.path().to_str().unwrap().to_string();
        let folder = dir.path().join("202405");
        fs::create_dir_all(&folder).unwrap();
        let stale = folder.join("_home_u_docs 20240517 083000.7z");
        fs::write(&stale, "stale").unwrap();

        let mut archiver = FakeArchiver::printing("Everything is Ok");
        archiver.write_archive = false;
        compress(&live_plan(&root_str), &archiver, &InterruptContext::new()).unwrap();

        assert!(!stale.exists());
    }

    #[test]
    fn test_compress_launch_failure_is_failed_outcome() {
        let dir = tempdir().unwrap();
        let root_str = dir.path().to_str().unwrap().to_string();

        let outcome =
            compress(&live_plan(&root_str), &MissingArchiver, &InterruptContext::new()).unwrap();

        assert!(!outcome.succeeded);
        assert!(outcome.raw_output.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_compress_target_folder_failure_is_fatal() {
        let dir = tempdir().unwrap();
        // A file where the target root should be makes folder creation fail
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let root_str = blocker.to_str().unwrap().to_string();

        let result = compress(
            &live_plan(&root_str),
            &FakeArchiver::printing("Everything is Ok"),
            &InterruptContext::new(),
        );

        match result {
            Err(BackupError::TargetFolder { .. }) => (),
            other => panic!("Expected TargetFolder error, got {other:?}"),
        }
    }

    #[test]
    fn test_compress_clears_interrupt_tracking() {
        let dir = tempdir().unwrap();
        let root_str = dir.path().to_str().unwrap().to_string();
        let interrupts = InterruptContext::new();

        compress(
            &live_plan(&root_str),
            &FakeArchiver::printing("Everything is Ok"),
            &interrupts,
        )
        .unwrap();

        assert_eq!(interrupts.active_archive(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_seven_zip_launch_failure() {
        let archiver = SevenZip::new("/nonexistent/bin/7z");
        match archiver.execute(&["i".to_string()]) {
            Err(e @ BackupError::ArchiverLaunch { .. }) => assert!(e.is_recoverable()),
            other => panic!("Expected ArchiverLaunch error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_seven_zip_captures_stdout() {
        // `echo` prints its arguments, which is enough to check stdout capture
        let archiver = SevenZip::new("echo");
        let output = archiver
            .execute(&["Everything".to_string(), "is".to_string(), "Ok".to_string()])
            .unwrap();
        assert!(is_success_output(&output));
    }

    #[cfg(unix)]
    #[test]
    fn test_seven_zip_nonzero_exit_with_marker_is_success() {
        // Only the output is judged, never the exit status
        let archiver = SevenZip::new("sh");
        let output = archiver
            .execute(&["-c".to_string(), "echo Everything is Ok; exit 2".to_string()])
            .unwrap();
        assert!(is_success_output(&output));
    }

    #[cfg(unix)]
    #[test]
    fn test_compress_nonzero_exit_with_marker_keeps_archive() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let mut plan = live_plan(&root);
        let archive = plan.archive_path.display().to_string();
        plan.args = vec![
            "-c".to_string(),
            format!("touch \"{archive}\"; echo Everything is Ok; exit 2"),
        ];

        let outcome = compress(&plan, &SevenZip::new("sh"), &InterruptContext::new()).unwrap();
        assert!(outcome.succeeded);
        assert!(plan.archive_path.exists());
    }
}
