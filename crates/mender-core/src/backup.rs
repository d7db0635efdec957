use crate::error::MenderError;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<name>.backup.<timestamp>` inside `backups_dir`; never reuses an existing
/// path, appending `.1`, `.2`, ... within the same second.
pub fn next_backup_path(source: &Path, backups_dir: &Path, stamp: &str) -> PathBuf {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let base = backups_dir.join(format!("{name}.backup.{stamp}"));
    if !base.exists() {
        return base;
    }

    let mut n = 1;
    loop {
        let candidate = backups_dir.join(format!("{name}.backup.{stamp}.{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Copies `source` into `backups_dir`, returning the backup path once the copy
/// has completed.
pub fn backup_file(source: &Path, backups_dir: &Path) -> Result<PathBuf, MenderError> {
    fs::create_dir_all(backups_dir).map_err(|err| {
        MenderError::io(
            format!("failed creating backups dir {}", backups_dir.display()),
            err,
        )
    })?;

    let stamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
    let backup = next_backup_path(source, backups_dir, &stamp);
    fs::copy(source, &backup).map_err(|err| {
        MenderError::io(
            format!(
                "failed creating backup {} -> {}",
                source.display(),
                backup.display()
            ),
            err,
        )
    })?;

    info!(source = %source.display(), backup = %backup.display(), "backup written");
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::{backup_file, next_backup_path};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn backup_is_byte_identical() {
        let dir = tempdir().expect("tempdir should work");
        let source = dir.path().join("script.py");
        let bytes = b"print('hi')\n\xff\xfe raw bytes".to_vec();
        fs::write(&source, &bytes).expect("write should work");

        let backup = backup_file(&source, &dir.path().join("backups")).expect("backup");
        assert_ne!(backup, source);
        assert_eq!(fs::read(&backup).expect("read backup"), bytes);
        let name = backup
            .file_name()
            .and_then(|name| name.to_str())
            .expect("utf-8 name");
        assert!(name.starts_with("script.py.backup."), "{name}");
    }

    #[test]
    fn collisions_get_numeric_suffix() {
        let dir = tempdir().expect("tempdir should work");
        let source = dir.path().join("a.sh");
        let stamp = "20240101_120000";

        let first = next_backup_path(&source, dir.path(), stamp);
        fs::write(&first, "x").expect("write should work");
        let second = next_backup_path(&source, dir.path(), stamp);
        fs::write(&second, "y").expect("write should work");
        let third = next_backup_path(&source, dir.path(), stamp);

        assert_eq!(first, dir.path().join("a.sh.backup.20240101_120000"));
        assert_eq!(second, dir.path().join("a.sh.backup.20240101_120000.1"));
        assert_eq!(third, dir.path().join("a.sh.backup.20240101_120000.2"));
    }

    #[test]
    fn repeated_backups_never_overwrite() {
        let dir = tempdir().expect("tempdir should work");
        let source = dir.path().join("x.rb");
        let backups = dir.path().join("backups");

        fs::write(&source, "v1").expect("write should work");
        let first = backup_file(&source, &backups).expect("backup");
        fs::write(&source, "v2").expect("write should work");
        let second = backup_file(&source, &backups).expect("backup");

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(first).expect("read"), "v1");
        assert_eq!(fs::read_to_string(second).expect("read"), "v2");
    }
}
