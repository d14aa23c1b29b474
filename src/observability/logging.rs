use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Registry};

pub const LOG_FILE_PREFIX: &str = "lsporder.log";

pub struct LoggingConfig {
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
    pub rotation: Rotation,
    pub file_permissions: u32,
    pub max_log_files: Option<usize>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from("./logs"),
            rotation: Rotation::DAILY,
            file_permissions: 0o640, // rw-r-----
            max_log_files: Some(30),
        }
    }
}

pub fn init_logging(config: LoggingConfig) -> anyhow::Result<()> {
    if !config.console_output && !config.file_output {
        return Err(anyhow::anyhow!(
            "At least one output (console or file) must be enabled"
        ));
    }

    // RUST_LOG wins over the configured level
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_target(true)
    });

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&config.log_dir)?;
        fs::set_permissions(&config.log_dir, Permissions::from_mode(0o750))?;

        if let Some(max_files) = config.max_log_files {
            cleanup_old_log_files(&config.log_dir, max_files)?;
        }

        let appender = SecureFileAppender::new(
            config.rotation,
            config.log_dir.clone(),
            LOG_FILE_PREFIX,
            config.file_permissions,
        );

        Some(
            fmt::layer()
                .json()
                .with_writer(Mutex::new(appender))
                .with_current_span(true)
                .with_span_list(true),
        )
    } else {
        None
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Keep the `max_files` most recently modified log files, including rotated
/// `lsporder.log.<date>` files
pub(crate) fn cleanup_old_log_files(log_dir: &Path, max_files: usize) -> anyhow::Result<()> {
    let mut log_files: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();

            let is_log = path.extension().is_some_and(|ext| ext == "log")
                || path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
            if path.is_file() && is_log {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((path, modified))
            } else {
                None
            }
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(max_files) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to remove old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

fn set_file_permissions(file_path: &Path, mode: u32) -> anyhow::Result<()> {
    fs::set_permissions(file_path, Permissions::from_mode(mode))?;
    Ok(())
}

/// Rolling appender that keeps restrictive permissions on the files it creates
struct SecureFileAppender {
    inner: RollingFileAppender,
    permissions: u32,
    log_dir: PathBuf,
}

impl SecureFileAppender {
    fn new(
        rotation: Rotation,
        directory: PathBuf,
        file_name_prefix: &str,
        permissions: u32,
    ) -> Self {
        let inner = RollingFileAppender::new(rotation, &directory, file_name_prefix);
        Self {
            inner,
            permissions,
            log_dir: directory,
        }
    }

    fn ensure_file_permissions(&self) {
        if let Ok(entries) = fs::read_dir(&self.log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_ours = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
                if path.is_file() && is_ours {
                    if let Err(e) = set_file_permissions(&path, self.permissions) {
                        eprintln!("Failed to set permissions on log file {:?}: {}", path, e);
                    }
                }
            }
        }
    }
}

impl std::io::Write for SecureFileAppender {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let result = self.inner.write(buf);
        // Best effort
        self.ensure_file_permissions();
        result
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
