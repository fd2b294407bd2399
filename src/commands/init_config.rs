use crate::config::Config;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Writes a config file holding every default, ready for editing.
pub fn run(path: Option<PathBuf>, force: bool) -> Result<()> {
    let config = Config::default();

    let target = match path {
        Some(path) => path,
        None => match Config::default_path() {
            Some(path) => path,
            None => bail!("No config directory on this platform; pass --path"),
        },
    };

    if target.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", target.display());
    }

    config.save_to(&target)?;
    println!("Wrote default configuration to {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        run(Some(path.clone()), false).unwrap();
        assert!(run(Some(path.clone()), false).is_err());
        run(Some(path.clone()), true).unwrap();

        assert_eq!(Config::from_path(&path).unwrap(), Config::default());
    }
}
