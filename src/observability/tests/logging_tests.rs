#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;
    use tracing_appender::rolling::Rotation;

    use crate::observability::logging::{cleanup_old_log_files, init_logging, LoggingConfig};

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();

        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output);
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.rotation, Rotation::DAILY);
        assert_eq!(config.file_permissions, 0o640);
        assert_eq!(config.max_log_files, Some(30));
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..Default::default()
        };

        assert!(init_logging(config).is_err());
    }

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for i in 0..5 {
            let path = temp_dir.path().join(format!("lsporder.{i}.log"));
            std::fs::write(&path, "line").unwrap();
            // Distinct modification times
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        std::fs::write(temp_dir.path().join("keep.txt"), "not a log").unwrap();

        cleanup_old_log_files(temp_dir.path(), 2).unwrap();

        let mut remaining: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["keep.txt", "lsporder.3.log", "lsporder.4.log"]);
    }
}
