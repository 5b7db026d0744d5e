//! Optional debug dump of fetched archive entries to a dated directory
//! (C11, spec.md §2 "File-logger (optional)", §6 "optional debug-log
//! directory"). Entirely inert when not configured — the fetch orchestrator
//! holds an `Option<FileLogger>` and skips straight past a `None`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileLogError {
    #[error("writing debug dump to {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Writes every fetched archive entry under `base_dir/<date>/<kind>-<entry>`,
/// one file per entry, for operator troubleshooting (spec.md §1 Non-goals:
/// "does not persist raw EBICS XML beyond optional debug dumping" — this is
/// that one optional exception).
pub struct FileLogger {
    base_dir: PathBuf,
}

impl FileLogger {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileLogger { base_dir: base_dir.into() }
    }

    pub async fn dump(&self, kind: &str, entry_name: &str, bytes: &[u8], now: DateTime<Utc>) -> Result<(), FileLogError> {
        let dated_dir = self.base_dir.join(now.format("%Y-%m-%d").to_string());
        tokio::fs::create_dir_all(&dated_dir)
            .await
            .map_err(|e| FileLogError::Io { path: dated_dir.clone(), source: e })?;

        let sanitized_entry = entry_name.replace(['/', '\\'], "_");
        let path = dated_dir.join(format!("{kind}-{sanitized_entry}"));
        tokio::fs::write(&path, bytes).await.map_err(|e| FileLogError::Io { path, source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nexus-filelog-test-{}-{}", std::process::id(), line!()));
        dir
    }

    #[tokio::test]
    async fn dumps_an_entry_under_a_dated_subdirectory() {
        let dir = temp_dir();
        let logger = FileLogger::new(&dir);
        let now = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc);

        logger.dump("notification", "camt054.xml", b"<Document/>", now).await.unwrap();

        let expected = dir.join("2024-03-01").join("notification-camt054.xml");
        let contents = tokio::fs::read(&expected).await.unwrap();
        assert_eq!(contents, b"<Document/>");
    }

    #[tokio::test]
    async fn sanitizes_path_separators_in_entry_names() {
        let dir = temp_dir();
        let logger = FileLogger::new(&dir);
        let now = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z").unwrap().with_timezone(&Utc);

        logger.dump("notification", "sub/dir/entry.xml", b"data", now).await.unwrap();

        let expected = dir.join("2024-03-01").join("notification-sub_dir_entry.xml");
        assert!(tokio::fs::metadata(&expected).await.is_ok());
    }
}
