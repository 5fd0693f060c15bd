use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use simple_backup::{
    dump_config, get_settings_path, load_settings_from, load_tasks, parse_task_filter,
    BackupError, InterruptContext, ReportLog, RunOptions, SevenZip, Settings, SyncClient,
    TaskRunner,
};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let matches = build_cli().get_matches();
    let pause = matches.get_flag("pause");
    let exit_code = finish(run(&matches), pause, wait_for_operator);
    process::exit(exit_code);
}

/// Print a fatal error with its suggestions, then pause when asked, so the operator
/// can read the outcome before the console closes
fn finish(result: Result<i32, BackupError>, pause: bool, wait: impl FnOnce()) -> i32 {
    let exit_code = match result {
        Ok(exit_code) => exit_code,
        Err(error) => {
            eprintln!("Error: {error}");

            let suggestions = error.suggestions();
            if !suggestions.is_empty() {
                eprintln!("\nSuggestions:");
                for suggestion in suggestions {
                    eprintln!("  - {suggestion}");
                }
            }

            error.exit_code()
        }
    };

    if pause {
        wait();
    }
    exit_code
}

fn build_cli() -> Command {
    Command::new("simple-backup")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs a list of 7-Zip backup tasks")
        .long_about(
            "simple-backup compresses each configured folder into a dated 7z archive.\n\
             Example: /home/me/docs → <target>/202406/_home_me_docs 20240601 203000.7z\n\
             Runs are dry by default; pass --dry-run false to write archives.",
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Only print what would be done (default: true)")
                .value_name("BOOL")
                .value_parser(value_parser!(bool))
                .num_args(0..=1)
                .default_value("true")
                .default_missing_value("true"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Protect archives of tasks with protect-with-password set")
                .value_name("PASSWORD"),
        )
        .arg(
            Arg::new("target-folder")
                .long("target-folder")
                .help("Root folder receiving the dated archive folders")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("config-file")
                .long("config-file")
                .help("JSON file listing the backup tasks")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("logs-folder")
                .long("logs-folder")
                .help("Folder receiving the rotating report log")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("task-names")
                .long("task-names")
                .help("Comma-separated names of the tasks to run (default: all)")
                .value_name("NAMES"),
        )
        .arg(
            Arg::new("restart-sync-client")
                .long("restart-sync-client")
                .help("Stop the cloud-sync client during the run and restart it afterwards")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("pause")
                .long("pause")
                .help("Wait for Enter before exiting")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show debug diagnostics")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dump-config")
                .long("dump-config")
                .help("Display current configuration settings and exit")
                .action(ArgAction::SetTrue),
        )
}

/// Everything resolved from flags and settings before any task runs
#[derive(Debug)]
struct Invocation {
    options: RunOptions,
    config_file: PathBuf,
    logs_folder: Option<String>,
    archiver: String,
    sync_client: Option<SyncClient>,
}

fn resolve_invocation(matches: &ArgMatches, settings: &Settings) -> Result<Invocation, BackupError> {
    let dry_run = matches.get_one::<bool>("dry-run").copied().unwrap_or(true);

    let target_folder = matches
        .get_one::<String>("target-folder")
        .cloned()
        .or_else(|| settings.target_folder.clone())
        .filter(|folder| !folder.is_empty())
        .ok_or_else(|| {
            BackupError::validation("No target folder given. Use --target-folder or the settings file.")
        })?;

    let config_file = matches
        .get_one::<PathBuf>("config-file")
        .cloned()
        .or_else(|| settings.config_file.clone())
        .ok_or_else(|| {
            BackupError::validation("No task file given. Use --config-file or the settings file.")
        })?;

    let logs_folder = matches
        .get_one::<String>("logs-folder")
        .cloned()
        .or_else(|| settings.logs_folder.clone())
        .filter(|folder| !folder.is_empty());

    let task_filter = matches
        .get_one::<String>("task-names")
        .and_then(|names| parse_task_filter(names));

    let sync_client = if matches.get_flag("restart-sync-client") {
        let client = settings
            .sync_client
            .clone()
            .map(SyncClient::new)
            .or_else(SyncClient::onedrive)
            .ok_or_else(|| {
                BackupError::validation(
                    "No sync client known. Set 'sync_client' in the settings file.",
                )
            })?;
        Some(client)
    } else {
        None
    };

    Ok(Invocation {
        options: RunOptions {
            dry_run,
            password: matches
                .get_one::<String>("password")
                .cloned()
                .unwrap_or_default(),
            target_folder,
            task_filter,
            compression_level: settings.compression_level,
        },
        config_file,
        logs_folder,
        archiver: settings.archiver.clone(),
        sync_client,
    })
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(matches: &ArgMatches) -> Result<i32, BackupError> {
    init_tracing(matches.get_flag("verbose"));

    // Settings are optional; without a config directory the defaults apply
    let settings_path = match get_settings_path() {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    };
    let settings = match &settings_path {
        Some(path) => load_settings_from(path)?,
        None => simple_backup::default_settings(),
    };

    if matches.get_flag("dump-config") {
        dump_config(&settings, settings_path.as_deref());
        return Ok(0);
    }

    let invocation = resolve_invocation(matches, &settings)?;
    let tasks = load_tasks(&invocation.config_file)?;
    let options = &invocation.options;

    if options.dry_run {
        println!("Dry run: no archive, folder or report file will be written");
    }

    let interrupts = InterruptContext::new();
    signal_handler(&interrupts);

    if let Some(client) = &invocation.sync_client {
        if options.dry_run {
            println!("Dry run: would stop {}", client.program().display());
        } else {
            client.stop();
            // From here on whoever ends the run (this function or Ctrl-C) starts it again
            interrupts.set_stopped_sync_client(client.clone());
        }
    }

    let archiver = SevenZip::new(invocation.archiver.clone());
    let mut runner =
        TaskRunner::new(options, &archiver, io::stdout()).with_interrupts(interrupts.clone());
    if let Some(logs_folder) = &invocation.logs_folder {
        runner = runner.with_report(ReportLog::new(logs_folder, options.dry_run));
    }

    let summary = runner.run(&tasks);

    // The sync client is restarted even when the run failed
    if let Some(client) = &invocation.sync_client {
        if options.dry_run {
            println!("Dry run: would start {}", client.program().display());
        }
    }
    if let Some(client) = interrupts.take_stopped_sync_client() {
        client.start();
    }

    let summary = summary?;
    tracing::info!(
        "{} task(s): {} succeeded, {} failed, {} skipped",
        summary.total,
        summary.succeeded(),
        summary.failures.len(),
        summary.skipped
    );

    Ok(if summary.is_success() { 0 } else { 1 })
}

fn signal_handler(interrupts: &InterruptContext) {
    if let Err(e) = simple_backup::signal::install_handler(interrupts) {
        tracing::warn!("Could not install Ctrl-C handler: {e}");
    }
}

fn wait_for_operator() {
    println!("\nPress Enter to exit...");
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
}
