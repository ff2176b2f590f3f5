use std::env;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use clap::ValueEnum;
use directories::ProjectDirs;

pub static CRATE_NAME: &str = env!("CARGO_CRATE_NAME");

/// Runtime configuration, assembled from the CLI arguments.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub mud: MudConfig,
    pub lua: LuaConfig,
    pub ui: UiConfig,
}

/// Server endpoint and wire-level options.
#[derive(Debug, Clone)]
pub struct MudConfig {
    pub host: String,
    pub port: u16,
    pub encoding: String,
    pub iac_debug: bool,
}

impl Default for MudConfig {
    fn default() -> Self {
        Self {
            host: "mud.pkuxkx.net".to_owned(),
            port: 8080,
            encoding: "UTF-8".to_owned(),
            iac_debug: false,
        }
    }
}

/// Lua robot configuration.
#[derive(Debug, Clone)]
pub struct LuaConfig {
    pub enable: bool,
    pub path: PathBuf,
}

impl Default for LuaConfig {
    fn default() -> Self {
        Self {
            enable: true,
            path: PathBuf::from("lua"),
        }
    }
}

/// Console/UI knobs, consumed by the UI shim.
#[derive(Debug, Clone)]
pub struct UiConfig {
    pub ambiguous_width: AmbiguousWidth,
    pub history_lines: usize,
    pub rttv_height: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            ambiguous_width: AmbiguousWidth::Auto,
            history_lines: 100_000,
            rttv_height: 10,
        }
    }
}

/// How East-Asian ambiguous-width glyphs are padded for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum AmbiguousWidth {
    /// Double on Unix-likes, single on Windows.
    Auto,
    /// Leave text untouched.
    Single,
    /// Pad with a matching glyph (box-drawing aware).
    Double,
    /// Pad with a plain space.
    Space,
}

#[must_use]
pub fn data_dir() -> &'static Path {
    static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();
    DATA_DIR.get_or_init(|| {
        match env::var(format!("{}_DATA", CRATE_NAME.to_uppercase())).ok() {
            // User env var specified path is the first priority.
            Some(custom_path) => PathBuf::from(custom_path),
            None => match project_directory() {
                Some(proj_dirs) => proj_dirs.data_local_dir().into(),
                // As a last resort, pwd and a subdir.
                None => PathBuf::from(".").join(".data"),
            },
        }
    })
}

pub fn project_directory() -> Option<&'static ProjectDirs> {
    static PROJECT_DIR: OnceLock<Option<ProjectDirs>> = OnceLock::new();
    PROJECT_DIR
        .get_or_init(|| ProjectDirs::from("", CRATE_NAME, CRATE_NAME))
        .as_ref()
}

#[must_use]
#[allow(clippy::module_name_repetitions)]
pub fn version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION
        .get_or_init(|| {
            let data_dir_path = data_dir().display().to_string();
            format!(
                "{CRATE_NAME} v{}\n\nData directory: {data_dir_path}",
                env!("CARGO_PKG_VERSION")
            )
        })
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.mud.host, "mud.pkuxkx.net");
        assert_eq!(config.mud.port, 8080);
        assert_eq!(config.mud.encoding, "UTF-8");
        assert!(!config.mud.iac_debug);
        assert!(config.lua.enable);
        assert_eq!(config.lua.path, PathBuf::from("lua"));
        assert_eq!(config.ui.ambiguous_width, AmbiguousWidth::Auto);
        assert_eq!(config.ui.history_lines, 100_000);
        assert_eq!(config.ui.rttv_height, 10);
    }

    #[test]
    fn version_is_stable() {
        assert_eq!(version(), version());
        assert!(version().contains(CRATE_NAME));
    }
}
