//! Settings file resolution and loading.

use std::path::{Path, PathBuf};

use image_harvest::Settings;

use crate::error::{CliError, CliResult};

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "IMAGE_HARVEST_CONFIG";

const SETTINGS_RELATIVE: &str = ".image-harvest/settings.json";

/// Resolve the settings file path, if any applies.
///
/// Order: explicit path, `IMAGE_HARVEST_CONFIG`, `./.image-harvest/settings.json`,
/// then `$HOME/.image-harvest/settings.json`. `None` means built-in defaults.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    let env = std::env::var(CONFIG_ENV).ok();
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from);
    resolve_in(explicit, env.as_deref(), Path::new("."), home.as_deref())
}

fn resolve_in(
    explicit: Option<&str>,
    env: Option<&str>,
    cwd: &Path,
    home: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let local = cwd.join(SETTINGS_RELATIVE);
    if local.exists() {
        return Some(local);
    }

    home.map(|h| h.join(SETTINGS_RELATIVE)).filter(|p| p.exists())
}

/// Load settings from `path`, or defaults when no file applies.
pub fn load_settings(path: Option<&Path>) -> CliResult<Settings> {
    let Some(path) = path else {
        tracing::debug!("No settings file, using defaults");
        return Ok(Settings::default());
    };

    let raw = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("Cannot read {}: {e}", path.display())))?;
    let settings: Settings = serde_json::from_str(&raw)
        .map_err(|e| CliError::Config(format!("Invalid settings in {}: {e}", path.display())))?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_harvest::{InvocationOrigin, SearchMode};

    fn write_settings(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join(SETTINGS_RELATIVE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_resolution_order() {
        let cwd = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();

        assert_eq!(resolve_in(None, None, cwd.path(), Some(home.path())), None);

        let home_file = write_settings(home.path(), "{}");
        assert_eq!(
            resolve_in(None, None, cwd.path(), Some(home.path())),
            Some(home_file)
        );

        let local_file = write_settings(cwd.path(), "{}");
        assert_eq!(
            resolve_in(None, None, cwd.path(), Some(home.path())),
            Some(local_file)
        );

        assert_eq!(
            resolve_in(None, Some("/etc/ih.json"), cwd.path(), Some(home.path())),
            Some(PathBuf::from("/etc/ih.json"))
        );
        assert_eq!(
            resolve_in(Some("mine.json"), Some("/etc/ih.json"), cwd.path(), None),
            Some(PathBuf::from("mine.json"))
        );
    }

    #[test]
    fn test_load_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_settings(
            dir.path(),
            r#"{"imgFullParse": true, "searchModeAction": "selectUpload"}"#,
        );
        let settings = load_settings(Some(&path)).unwrap();
        assert!(settings.img_full_parse);
        assert_eq!(settings.search_mode(InvocationOrigin::Action), SearchMode::SelectUpload);
        assert_eq!(settings.search_mode(InvocationOrigin::ContextMenu), SearchMode::Select);

        assert_eq!(load_settings(None).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_settings_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_settings(dir.path(), "{ not json");
        assert!(matches!(load_settings(Some(&bad)), Err(CliError::Config(_))));
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_settings(Some(&missing)), Err(CliError::Config(_))));
    }
}
