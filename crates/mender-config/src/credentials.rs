use crate::Paths;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;

/// Reads the stored API key. When the credential file is missing, `prompt` is
/// asked once and a non-empty answer is persisted owner-only.
pub fn load_api_key<F>(paths: &Paths, prompt: F) -> Result<Option<String>>
where
    F: FnOnce() -> Result<Option<String>>,
{
    let path = paths.api_key_file();
    if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading credential file {}", path.display()))?;
        let key = raw.trim();
        return Ok((!key.is_empty()).then(|| key.to_string()));
    }

    let Some(key) = prompt()? else {
        return Ok(None);
    };
    let key = key.trim().to_string();
    if key.is_empty() {
        return Ok(None);
    }
    write_api_key(paths, &key)?;
    Ok(Some(key))
}

pub fn write_api_key(paths: &Paths, key: &str) -> Result<()> {
    paths.ensure()?;
    let path = paths.api_key_file();

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&path)
        .with_context(|| format!("failed creating credential file {}", path.display()))?;
    file.write_all(key.as_bytes())
        .with_context(|| format!("failed writing credential file {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed restricting {}", path.display()))?;
    }

    info!(path = %path.display(), "stored API key");
    Ok(())
}
