use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const PROVIDERS_FILE: &str = "providers.toml";

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Cannot determine configuration directory")?
        .join("claimmap"))
}

/// Default provider file location, e.g. `~/.config/claimmap/providers.toml`.
pub fn default_providers_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(PROVIDERS_FILE))
}

/// Resolves the provider file from the command line or the default location.
pub fn resolve_providers(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => {
            let path = default_providers_path()?;
            if !path.exists() {
                anyhow::bail!(
                    "No provider file given and {} does not exist. Use --providers or set CLAIMMAP_PROVIDERS",
                    path.display()
                );
            }
            Ok(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve_providers(Some(Path::new("/tmp/custom.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }

    #[test]
    fn test_default_location() {
        if let Ok(path) = default_providers_path() {
            assert!(path.ends_with("claimmap/providers.toml"));
        }
    }
}
