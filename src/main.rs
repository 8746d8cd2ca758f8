//! Media Gallery - command-line front end
//!
//! Lists albums and media the way a gallery UI would show them, edits the saved view
//! preferences, and runs journaled copy/move/rename/delete jobs with conflict prompts.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use media_gallery::cli::{Command, ListArgs, OperationOptions, PrefsAction};
use media_gallery::media::ItemDetails;
use media_gallery::ops::{
    BatchSummary, ConflictResolution, FileOperation, FileOperationExecutor, ItemState, Journal,
    OperationEvent, OperationHandle,
};
use media_gallery::{
    Cli, FsMediaIndex, FsProbe, MediaIndex, MediaItem, MediaItemMapper, MediaRepository,
    OperationError, Pipeline, PreferencesStore, RealFs, Resource, Settings, init_locale,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

// Initialize i18n for this binary
rust_i18n::i18n!("locales", fallback = "en");

// CLI Output Module
mod cli_output {
    //! Shared colors and layout for command-line output.

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    /// CLI theme colors
    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(&format!("{}\n", "─".repeat(60))));
    }

    /// Print a centered title
    pub fn print_title(title: &str) {
        let width: usize = 60;
        let padding = width.saturating_sub(title.chars().count()) / 2;
        let left_pad = " ".repeat(padding.saturating_sub(1));

        let _ = stdout().execute(Print(&format!(
            "{}{} {}{}\n",
            left_pad,
            "╔".bold().stylize(),
            title.bold().stylize(),
            "╗".bold().stylize(),
        )));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_success(msg: &str) {
        let _ = stdout().execute(Print(style("✓ ").with(CliTheme::SUCCESS).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_error(msg: &str) {
        let _ = stdout().execute(Print(style("✗ ").with(CliTheme::ERROR).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_hint(msg: &str) {
        let _ = stdout().execute(Print(style("→ ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    /// Print a key/value pair
    pub fn print_key_value(key: &str, value: &str, value_color: Option<Color>) {
        let key_styled = style(key).with(CliTheme::HINT);
        let value_styled = match value_color {
            Some(color) => style(value).with(color),
            None => style(value).bold(),
        };
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(key_styled));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(value_styled));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_stat(key: &str, value: &str, color: Color) {
        let key_styled = style(key).with(CliTheme::HINT);
        let value_styled = style(value).with(color).bold();
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(key_styled));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(value_styled));
        let _ = stdout().execute(Print("\n"));
    }

    /// Print one result line
    pub fn print_result(status_icon: &str, status_color: Color, source: &str, dest_or_msg: &str) {
        let icon_styled = style(status_icon).with(status_color).bold();
        let source_styled = style(source).italic();
        let msg_styled = style(dest_or_msg).with(CliTheme::HINT);

        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(icon_styled));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(source_styled));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(msg_styled));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_log_path(label: &str, path: &str) {
        let _ = stdout().execute(Print("\n"));
        let _ = stdout().execute(Print(style("  📁 ").with(CliTheme::ACCENT)));
        let _ = stdout().execute(Print(style(format!("{}: ", label)).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", path)));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

/// Convenience macro for translation
macro_rules! t {
    ($key:expr) => {
        rust_i18n::t!($key)
    };
    ($key:expr, $($tt:tt)*) => {
        rust_i18n::t!($key, $($tt)*)
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize locale based on system settings
    init_locale();

    let cli = Cli::parse();

    // Get the executable directory for the default data directory
    let exe_dir = get_executable_dir()?;
    let settings = load_settings(&cli, &exe_dir)?;
    let data_dir = settings.data_dir_or(&exe_dir.join("Data"));

    let log_path = get_log_path(&data_dir, cli.command.name());
    let _guard = setup_logging(&cli, &log_path)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = cli.command.name(),
        "Media gallery starting"
    );
    info!(log_file = %log_path.display(), "Log file location");
    if cli.verbose {
        info!(?settings, "Settings loaded");
    }

    let result = run(&cli, &settings, &data_dir).await;
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }

    if cli.verbose {
        cli_output::print_log_path(&t!("log_file"), &log_path.display().to_string());
    }
    result
}

async fn run(cli: &Cli, settings: &Settings, data_dir: &Path) -> Result<()> {
    match &cli.command {
        Command::List(args) => run_list(args, settings, data_dir).await,
        Command::Prefs { action } => run_prefs(action, data_dir),
        Command::Copy(args) => {
            let op = FileOperation::copy(args.sources.clone(), &args.destination);
            run_operation(op, &args.options, settings, data_dir).await
        }
        Command::Move(args) => {
            let op = FileOperation::move_to(args.sources.clone(), &args.destination);
            run_operation(op, &args.options, settings, data_dir).await
        }
        Command::Rename {
            source,
            new_name,
            options,
        } => {
            let op = FileOperation::rename(source, new_name);
            run_operation(op, options, settings, data_dir).await
        }
        Command::Delete { sources, options } => {
            let op = FileOperation::delete(sources.clone());
            run_operation(op, options, settings, data_dir).await
        }
        Command::Status { job } => run_status(*job, &build_executor(settings, data_dir)),
        Command::Resume => run_resume(&build_executor(settings, data_dir)).await,
        Command::Prune => {
            let removed = build_executor(settings, data_dir).prune_finished()?;
            cli_output::print_success(&t!("cli_pruned_jobs", count = removed));
            Ok(())
        }
        Command::InitConfig { path, force } => init_config(path, *force),
    }
}

// ============================================================================
// list / prefs
// ============================================================================

async fn run_list(args: &ListArgs, settings: &Settings, data_dir: &Path) -> Result<()> {
    use cli_output::*;

    let store = PreferencesStore::open(Settings::preferences_path(data_dir));
    let mut prefs = store.get();
    args.overrides.apply(&mut prefs);

    let probe: Arc<dyn FsProbe> = Arc::new(RealFs);
    let index: Arc<dyn MediaIndex> = Arc::new(FsMediaIndex::new(settings));
    let mapper = MediaItemMapper::new(settings, Arc::clone(&probe));
    let (_prefs_tx, prefs_rx) = watch::channel(prefs);
    let repo = MediaRepository::spawn(Pipeline::new(index, probe, mapper), prefs_rx);

    if !repo.check_existence(&args.root) {
        anyhow::bail!("{} {}", t!("cli_root_not_exist"), args.root.display());
    }

    let mut rx = repo.observe();
    repo.set_query(&args.root, args.search.clone());
    let items = loop {
        rx.changed().await.context("media repository stopped")?;
        let value = rx.borrow_and_update().clone();
        match value {
            Resource::Loading => continue,
            Resource::Success(items) => break items,
            Resource::Error(message) => anyhow::bail!(message),
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    print_separator();
    print_title(&args.root.display().to_string());
    print_separator();
    if items.is_empty() {
        print_hint(&t!("cli_no_items"));
        return Ok(());
    }

    for item in &items {
        print_item(item);
    }
    print_blank();
    print_stat(&t!("cli_items_total"), &items.len().to_string(), CliTheme::ACCENT);
    Ok(())
}

fn print_item(item: &MediaItem) {
    use cli_output::*;

    match item.details() {
        ItemDetails::Album {
            counts,
            files_count,
            is_volume,
            ..
        } => {
            let icon = if *is_volume { "◆" } else { "▣" };
            let detail = format!(
                "{} {} · {} {}",
                files_count,
                t!("files"),
                counts.nested_albums,
                t!("albums")
            );
            print_result(icon, CliTheme::ACCENT, item.name(), &detail);
        }
        ItemDetails::File { .. } => {
            let detail = format!(
                "{} · {}",
                format_size(item.size()),
                format_timestamp(item.creation_date())
            );
            print_result("•", CliTheme::SUCCESS, item.name(), &detail);
        }
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn run_prefs(action: &PrefsAction, data_dir: &Path) -> Result<()> {
    use cli_output::*;

    let store = PreferencesStore::open(Settings::preferences_path(data_dir));
    match action {
        PrefsAction::Show => {}
        PrefsAction::Set(args) => {
            store.update(|prefs| args.apply(prefs))?;
            print_success(&t!("cli_prefs_saved"));
        }
        PrefsAction::Reset => {
            store.reset()?;
            print_success(&t!("cli_prefs_reset"));
        }
    }

    print_separator();
    print_hint(&store.path().display().to_string());
    print_separator();
    print!("{}", store.get().to_toml()?);
    Ok(())
}

// ============================================================================
// file operations
// ============================================================================

fn build_executor(settings: &Settings, data_dir: &Path) -> FileOperationExecutor {
    let probe: Arc<dyn FsProbe> = Arc::new(RealFs);
    let mapper = MediaItemMapper::new(settings, Arc::clone(&probe));
    FileOperationExecutor::new(
        mapper,
        probe,
        Journal::new(Settings::jobs_dir(data_dir)),
        settings.worker_count(),
    )
}

async fn run_operation(
    op: FileOperation,
    options: &OperationOptions,
    settings: &Settings,
    data_dir: &Path,
) -> Result<()> {
    use cli_output::*;

    let op = match options.on_conflict {
        Some(resolution) => op.with_resolution(resolution),
        None => op,
    };
    let executor = build_executor(settings, data_dir);

    let handle = match executor.submit(vec![op], options.confirmation()) {
        Ok(handle) => handle,
        Err(OperationError::ProtectedItems(paths)) => {
            print_error(&t!("cli_protected_items"));
            for path in &paths {
                print_key_value(&path.display().to_string(), "", None);
            }
            print_hint(&t!("cli_protected_hint"));
            return Err(OperationError::ProtectedItems(paths).into());
        }
        Err(OperationError::PermissionDenied(paths)) => {
            print_error(&t!("cli_permission_denied"));
            for path in &paths {
                print_key_value(&path.display().to_string(), "", None);
            }
            return Err(OperationError::PermissionDenied(paths).into());
        }
        Err(e) => return Err(e.into()),
    };

    print_key_value(&t!("cli_job_id"), &handle.job_id().to_string(), None);
    let summary = drive(handle).await?;
    print_summary(&summary);
    Ok(())
}

/// Print progress until the batch finishes, prompting for conflicts
async fn drive(mut handle: OperationHandle) -> Result<BatchSummary> {
    use cli_output::*;

    let interactive = std::io::stdin().is_terminal();
    while let Some(event) = handle.next_event().await {
        let (item, source, state) = match event {
            OperationEvent::Finished(summary) => return Ok(summary),
            OperationEvent::ItemUpdate {
                item,
                source,
                state,
            } => (item, source, state),
        };
        let source_text = source.display().to_string();

        match state {
            ItemState::Queued | ItemState::Running => {}
            ItemState::Succeeded { destination } => {
                let detail = destination
                    .map(|d| format!("→ {}", d.display()))
                    .unwrap_or_default();
                print_result("✓", CliTheme::SUCCESS, &source_text, &detail);
            }
            ItemState::Skipped => {
                print_result("⊘", CliTheme::WARNING, &source_text, &t!("cli_item_skipped"));
            }
            ItemState::Cancelled => {
                print_result("-", CliTheme::HINT, &source_text, &t!("cli_item_cancelled"));
            }
            ItemState::Failed { failure } => {
                print_result("✗", CliTheme::ERROR, &source_text, &failure.to_string());
            }
            ItemState::Conflict { destination } => {
                // An earlier "apply to all" answer may already cover it
                if !matches!(handle.item_state(item), Some(ItemState::Conflict { .. })) {
                    continue;
                }
                if !interactive {
                    warn!(?destination, "Conflict without a terminal, skipping the rest");
                    handle.resolve(item, ConflictResolution::Skip, true);
                    continue;
                }
                match prompt_conflict(destination).await? {
                    Some((resolution, apply_to_all)) => {
                        handle.resolve(item, resolution, apply_to_all);
                    }
                    None => handle.stop(),
                }
            }
        }
    }

    Ok(handle.summary().unwrap_or_default())
}

/// Ask how to resolve a conflict; `None` stops the batch
async fn prompt_conflict(destination: PathBuf) -> Result<Option<(ConflictResolution, bool)>> {
    let question = format!(
        "{} {}\n{} ",
        t!("cli_conflict_prompt"),
        destination.display(),
        t!("cli_conflict_choices")
    );

    let answer = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
        loop {
            cli_output::print_warning(&question);
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let choice = match line.trim() {
                "s" => (ConflictResolution::Skip, false),
                "S" => (ConflictResolution::Skip, true),
                "o" => (ConflictResolution::Overwrite, false),
                "O" => (ConflictResolution::Overwrite, true),
                "k" => (ConflictResolution::KeepBoth, false),
                "K" => (ConflictResolution::KeepBoth, true),
                "q" | "Q" => return Ok(None),
                _ => continue,
            };
            return Ok(Some(choice));
        }
    })
    .await??;

    Ok(answer)
}

fn print_summary(summary: &BatchSummary) {
    use cli_output::*;

    print_separator();
    print_title(&t!("cli_operation_complete"));
    print_separator();
    print_blank();
    print_stat(&t!("stat_succeeded"), &summary.succeeded.to_string(), CliTheme::SUCCESS);
    print_stat(&t!("stat_skipped"), &summary.skipped.to_string(), CliTheme::WARNING);
    print_stat(&t!("stat_failed"), &summary.failed.to_string(), CliTheme::ERROR);
    print_stat(&t!("stat_cancelled"), &summary.cancelled.to_string(), CliTheme::HINT);
    print_blank();

    if summary.failed > 0 {
        print_warning(&t!("cli_failed_items_notice"));
    }
}

fn run_status(job: Option<Uuid>, executor: &FileOperationExecutor) -> Result<()> {
    use cli_output::*;

    if let Some(id) = job {
        let record = executor.status(id)?;
        print_separator();
        print_title(&t!("cli_job_status_title"));
        print_separator();
        print_key_value(&t!("cli_job_id"), &record.id.to_string(), None);
        print_key_value(
            &t!("cli_created_at"),
            &record.created_at.with_timezone(&Local).to_rfc3339(),
            None,
        );
        print_key_value(
            &t!("cli_updated_at"),
            &record.updated_at.with_timezone(&Local).to_rfc3339(),
            None,
        );
        print_blank();
        for item in &record.items {
            let state = serde_json::to_value(&item.state)?;
            let label = state
                .get("state")
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string();
            print_result("•", CliTheme::ACCENT, &item.source.display().to_string(), &label);
        }
        print_blank();
        print_hint(&record.summary().to_string());
        return Ok(());
    }

    let records = executor.jobs()?;
    if records.is_empty() {
        print_hint(&t!("cli_no_jobs"));
        return Ok(());
    }
    let now = Utc::now();
    for record in &records {
        let (label, color) = if record.is_finished() {
            (t!("cli_job_finished"), CliTheme::SUCCESS)
        } else if record.is_owned_at(now) {
            (t!("cli_job_running"), CliTheme::ACCENT)
        } else {
            (t!("cli_job_pending"), CliTheme::WARNING)
        };
        print_key_value(
            &record.id.to_string(),
            &format!("{} ({})", label, record.summary()),
            Some(color),
        );
    }
    Ok(())
}

async fn run_resume(executor: &FileOperationExecutor) -> Result<()> {
    let handles = executor.resume_pending()?;
    if handles.is_empty() {
        cli_output::print_hint(&t!("cli_nothing_to_resume"));
        return Ok(());
    }

    for handle in handles {
        cli_output::print_key_value(&t!("cli_job_id"), &handle.job_id().to_string(), None);
        let summary = drive(handle).await?;
        print_summary(&summary);
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} {}", t!("cli_config_exists"), path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Settings::sample_config())?;
    info!(path = %path.display(), "Sample settings written");
    cli_output::print_success(&format!("{} {}", t!("cli_config_written"), path.display()));
    Ok(())
}

// ============================================================================
// settings / logging
// ============================================================================

/// Get the directory where the executable is located
fn get_executable_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe()?;
    Ok(exe_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Log file path: `<data_dir>/logs/<command>_<timestamp>.log`
fn get_log_path(data_dir: &Path, command: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    data_dir
        .join("logs")
        .join(format!("{}_{}.log", command, timestamp))
}

/// Resolve config path - supports shorthand syntax
fn resolve_config_path(exe_dir: &Path, config_path: &Path) -> PathBuf {
    if config_path.exists() {
        return config_path.to_path_buf();
    }

    let with_extension = if config_path.extension().is_none() {
        config_path.with_extension("toml")
    } else {
        config_path.to_path_buf()
    };

    if with_extension.exists() {
        return with_extension;
    }

    let filename = config_path.file_name().unwrap_or(config_path.as_os_str());
    let mut in_config_dir = exe_dir.join("Config").join(filename);
    if in_config_dir.extension().is_none() {
        in_config_dir = in_config_dir.with_extension("toml");
    }

    if in_config_dir.exists() {
        return in_config_dir;
    }

    config_path.to_path_buf()
}

/// Load settings from file and apply CLI overrides
fn load_settings(cli: &Cli, exe_dir: &Path) -> Result<Settings> {
    let settings = match &cli.config {
        Some(config_path) => {
            let resolved = resolve_config_path(exe_dir, config_path);
            Settings::load_from_file(&resolved)?
        }
        None => Settings::default(),
    };
    Ok(cli.merge_with_settings(settings))
}

/// Setup logging (file + console)
fn setup_logging(cli: &Cli, log_path: &Path) -> Result<WorkerGuard> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_log_path_layout() {
        let path = get_log_path(Path::new("/data"), "copy");
        assert_eq!(path.parent(), Some(Path::new("/data/logs")));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("copy_") && name.ends_with(".log"));
    }

    #[test]
    fn test_resolve_config_path_adds_extension() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("gallery.toml");
        std::fs::write(&config, "").unwrap();

        let resolved = resolve_config_path(dir.path(), &dir.path().join("gallery"));
        assert_eq!(resolved, config);
    }
}
