//! Centralized path management for toolbelt.
//!
//! Directories are lazily initialized and cached.
//! Call `set_config_dir` before first access to override (CLI `--config`, tests).

use std::path::PathBuf;
use std::sync::OnceLock;

static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// ~/.config/toolbelt (or platform equivalent)
pub fn config_dir() -> &'static PathBuf {
    CONFIG_DIR.get_or_init(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("toolbelt")
    })
}

/// Override config dir (must be called before first access).
///
/// Returns `false` if the directory was already initialized.
pub fn set_config_dir(path: PathBuf) -> bool {
    CONFIG_DIR.set(path).is_ok()
}

/// Config file path: config_dir()/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_ends_with_toolbelt() {
        let dir = config_dir();
        assert!(
            dir.ends_with("toolbelt"),
            "config_dir should end with 'toolbelt': {:?}",
            dir
        );
    }

    #[test]
    fn config_file_is_toml() {
        let path = config_file();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }

    #[test]
    fn late_override_is_rejected() {
        let _ = config_dir();
        assert!(!set_config_dir(PathBuf::from("/tmp/elsewhere")));
    }
}
