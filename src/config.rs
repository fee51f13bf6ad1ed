use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::DaemonError;

/// How the panel is asked to pick up new font metrics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelRelaunch {
    /// Spawn a restart command (default `xfce4-panel -r`).
    Command(String),
    /// Ask the panel to terminate gracefully over the session bus and let
    /// external supervision bring it back.
    DbusTerminate,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Trailing delay after the last resolution change before icons are
    /// re-laid out. Observed deployments use 2000-2500 ms.
    pub geometry_debounce: Duration,
    /// Trailing delay after the last scaling/font settings change.
    pub scaling_debounce: Duration,
    pub panel_relaunch: PanelRelaunch,
    /// Process name of the window manager whose theme variant is managed.
    pub wm_process: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            geometry_debounce: Duration::from_millis(2000),
            scaling_debounce: Duration::from_millis(250),
            panel_relaunch: PanelRelaunch::Command("xfce4-panel -r".to_owned()),
            wm_process: "xfwm4".to_owned(),
        }
    }
}

pub fn load_or_create_default() -> Result<RuntimeConfig, DaemonError> {
    let path = config_path()?;
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                DaemonError::Config(format!(
                    "failed to create config directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        fs::write(&path, default_config_template()).map_err(|err| {
            DaemonError::Config(format!(
                "failed to write default config {}: {err}",
                path.display()
            ))
        })?;
        tracing::info!(path = %path.display(), "created default hidpid.conf");
    }

    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<RuntimeConfig, DaemonError> {
    let content = fs::read_to_string(path).map_err(|err| {
        DaemonError::Config(format!("failed to read config {}: {err}", path.display()))
    })?;

    let values = parse_key_values(&content)?;
    let mut config = RuntimeConfig::default();

    if let Some(ms) = parse_optional_u64(&values, "geometry_debounce_ms")? {
        config.geometry_debounce = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_optional_u64(&values, "scaling_debounce_ms")? {
        config.scaling_debounce = Duration::from_millis(ms);
    }
    if config.geometry_debounce.is_zero() || config.scaling_debounce.is_zero() {
        return Err(DaemonError::Config(
            "debounce delays must be greater than 0".to_owned(),
        ));
    }

    if let Some(value) = values.get("wm_process") {
        if value.is_empty() {
            return Err(DaemonError::Config("wm_process must not be empty".to_owned()));
        }
        config.wm_process = value.clone();
    }

    let panel_command = values
        .get("panel_command")
        .cloned()
        .unwrap_or_else(|| "xfce4-panel -r".to_owned());
    match values.get("panel_relaunch").map(String::as_str) {
        None | Some("command") => {
            config.panel_relaunch = PanelRelaunch::Command(panel_command);
        }
        Some("dbus-terminate") => {
            config.panel_relaunch = PanelRelaunch::DbusTerminate;
        }
        Some(other) => {
            return Err(DaemonError::Config(format!(
                "panel_relaunch must be \"command\" or \"dbus-terminate\", got \"{other}\""
            )));
        }
    }

    Ok(config)
}

fn parse_key_values(content: &str) -> Result<HashMap<String, String>, DaemonError> {
    let mut values = HashMap::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(DaemonError::Config(format!(
                "line {}: expected `key = value`, got \"{line}\"",
                lineno + 1
            )));
        };
        values.insert(key.trim().to_owned(), value.trim().to_owned());
    }
    Ok(values)
}

fn parse_optional_u64(
    values: &HashMap<String, String>,
    key: &str,
) -> Result<Option<u64>, DaemonError> {
    match values.get(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            DaemonError::Config(format!("{key} must be a non-negative integer, got \"{raw}\""))
        }),
    }
}

fn config_path() -> Result<PathBuf, DaemonError> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg).join("hidpid").join("hidpid.conf"));
    }

    if let Some(home) = std::env::var_os("HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home)
            .join(".config")
            .join("hidpid")
            .join("hidpid.conf"));
    }

    Err(DaemonError::Config(
        "unable to resolve config path: HOME and XDG_CONFIG_HOME are unset".to_owned(),
    ))
}

fn default_config_template() -> &'static str {
    r#"# hidpid configuration
#
# Delay (ms) after the last resolution change before the desktop icons are
# re-laid out.
#geometry_debounce_ms = 2000

# Delay (ms) after the last scaling/font change before the panel and window
# manager theme are updated.
#scaling_debounce_ms = 250

# How the panel is asked to relaunch: "command" runs panel_command,
# "dbus-terminate" asks the panel to exit gracefully over the session bus
# and relies on session supervision to restart it.
#panel_relaunch = command
#panel_command = xfce4-panel -r

# Window manager process whose theme variant is kept in sync.
#wm_process = xfwm4
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_str(content: &str) -> Result<RuntimeConfig, DaemonError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        load_from_path(file.path())
    }

    #[test]
    fn empty_config_yields_defaults() {
        let config = load_str("").unwrap();
        assert_eq!(config.geometry_debounce, Duration::from_millis(2000));
        assert_eq!(config.scaling_debounce, Duration::from_millis(250));
        assert_eq!(config.wm_process, "xfwm4");
        assert_eq!(
            config.panel_relaunch,
            PanelRelaunch::Command("xfce4-panel -r".to_owned())
        );
    }

    #[test]
    fn template_parses_to_defaults() {
        let config = load_str(default_config_template()).unwrap();
        assert_eq!(config.geometry_debounce, Duration::from_millis(2000));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load_str(
            "geometry_debounce_ms = 2500\n\
             scaling_debounce_ms = 300\n\
             panel_relaunch = dbus-terminate\n\
             wm_process = marco\n",
        )
        .unwrap();
        assert_eq!(config.geometry_debounce, Duration::from_millis(2500));
        assert_eq!(config.scaling_debounce, Duration::from_millis(300));
        assert_eq!(config.panel_relaunch, PanelRelaunch::DbusTerminate);
        assert_eq!(config.wm_process, "marco");
    }

    #[test]
    fn zero_debounce_is_rejected() {
        assert!(load_str("geometry_debounce_ms = 0\n").is_err());
    }

    #[test]
    fn unknown_relaunch_strategy_is_rejected() {
        assert!(load_str("panel_relaunch = respawn\n").is_err());
    }

    #[test]
    fn malformed_line_is_rejected() {
        assert!(load_str("geometry_debounce_ms\n").is_err());
    }
}
