use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

use crate::config::{AmbiguousWidth, Config, LuaConfig, MudConfig, UiConfig};

#[derive(Debug, Clone, Parser)]
#[command(author, about, version = crate::config::version())]
pub struct Args {
    #[arg(
        short = 'H',
        long,
        value_name = "IP/DOMAIN",
        default_value = "mud.pkuxkx.net",
        help = "MUD server host."
    )]
    pub host: String,

    #[arg(
        short = 'P',
        long,
        value_name = "PORT",
        default_value_t = 8080,
        help = "MUD server port."
    )]
    pub port: u16,

    #[arg(
        long,
        value_name = "NAME",
        default_value = "UTF-8",
        help = "Server character encoding (e.g. UTF-8, GBK, GB18030, Big5)."
    )]
    pub encoding: String,

    #[arg(long, help = "Echo telnet IAC negotiation traffic to the screen.")]
    pub iac_debug: bool,

    #[arg(
        long = "lua.enable",
        value_name = "BOOL",
        default_value_t = true,
        action = ArgAction::Set,
        help = "Load the Lua robot at startup."
    )]
    pub lua_enable: bool,

    #[arg(
        short = 'p',
        long = "lua.path",
        value_name = "PATH",
        default_value = "lua",
        help = "Lua plugin directory (holds main.lua)."
    )]
    pub lua_path: PathBuf,

    #[arg(
        long = "ui.ambiguous-width",
        value_enum,
        value_name = "MODE",
        default_value = "auto",
        help = "East-Asian ambiguous-width glyph handling."
    )]
    pub ambiguous_width: AmbiguousWidth,

    #[arg(
        long = "ui.history-lines",
        value_name = "COUNT",
        default_value_t = 100_000,
        help = "Screen history line count."
    )]
    pub history_lines: usize,

    #[arg(
        long = "ui.rttv-height",
        value_name = "ROWS",
        default_value_t = 10,
        help = "Height of the real-time status area."
    )]
    pub rttv_height: u16,

    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "INFO",
        help = "Log level filter. RMUD_LOG overrides with a full filter expression."
    )]
    pub log_level: LevelFilter,

    #[arg(
        long,
        value_name = "PATH",
        help = "Write the log to this file instead of the data directory."
    )]
    pub log_file: Option<PathBuf>,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            mud: MudConfig {
                host: args.host.clone(),
                port: args.port,
                encoding: args.encoding.clone(),
                iac_debug: args.iac_debug,
            },
            lua: LuaConfig {
                enable: args.lua_enable,
                path: args.lua_path.clone(),
            },
            ui: UiConfig {
                ambiguous_width: args.ambiguous_width,
                history_lines: args.history_lines,
                rttv_height: args.rttv_height,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["rmud"]);
        let config = Config::from(&args);
        assert_eq!(config.mud.host, "mud.pkuxkx.net");
        assert_eq!(config.mud.port, 8080);
        assert!(config.lua.enable);
        assert_eq!(config.lua.path, PathBuf::from("lua"));
    }

    #[test]
    fn contractual_flag_names() {
        let args = Args::parse_from([
            "rmud",
            "-H",
            "example.org",
            "-P",
            "4000",
            "--encoding",
            "GBK",
            "--iac-debug",
            "--lua.enable",
            "false",
            "-p",
            "scripts",
            "--ui.ambiguous-width",
            "double",
            "--ui.history-lines",
            "500",
            "--ui.rttv-height",
            "4",
        ]);
        let config = Config::from(&args);
        assert_eq!(config.mud.host, "example.org");
        assert_eq!(config.mud.port, 4000);
        assert_eq!(config.mud.encoding, "GBK");
        assert!(config.mud.iac_debug);
        assert!(!config.lua.enable);
        assert_eq!(config.lua.path, PathBuf::from("scripts"));
        assert_eq!(config.ui.ambiguous_width, AmbiguousWidth::Double);
        assert_eq!(config.ui.history_lines, 500);
        assert_eq!(config.ui.rttv_height, 4);
    }
}
