use std::{
    io::{self, Read},
    os::fd::{AsFd, AsRawFd, BorrowedFd},
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::{DaemonError, Result, actions::SessionSettings};

pub const INTERFACE_SCHEMA: &str = "org.mate.interface";
pub const FONT_SCHEMA: &str = "org.mate.font-rendering";
pub const BACKGROUND_SCHEMA: &str = "org.mate.background";

pub const SCALING_FACTOR_KEY: &str = "window-scaling-factor";
pub const DPI_KEY: &str = "dpi";
pub const ICONS_VISIBLE_KEY: &str = "show-desktop-icons";

const WM_THEME_CHANNEL: &str = "xfwm4";
const WM_THEME_PROPERTY: &str = "/general/theme";

/// Settings store access through the `gsettings` and `xfconf-query` CLIs.
/// Every call is a short, bounded local child process; failures map to
/// `DaemonError::Settings` and the caller decides whether they matter.
pub struct DesktopSettings;

impl DesktopSettings {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DesktopSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSettings for DesktopSettings {
    fn set_icons_visible(&self, visible: bool) -> Result<()> {
        let value = if visible { "true" } else { "false" };
        run_checked(
            "gsettings",
            &["set", BACKGROUND_SCHEMA, ICONS_VISIBLE_KEY, value],
        )
    }

    fn scaling_factor(&self) -> Result<i32> {
        let raw = run_output("gsettings", &["get", INTERFACE_SCHEMA, SCALING_FACTOR_KEY])?;
        let value = unquote_gvariant(&raw);
        value.parse::<i32>().map_err(|_| {
            DaemonError::Settings(format!(
                "{SCALING_FACTOR_KEY} is not an integer: \"{value}\""
            ))
        })
    }

    fn window_theme(&self) -> Result<String> {
        // Keep the raw output: the trailing newline is handled by the
        // suffix computation.
        run_output("xfconf-query", &["-c", WM_THEME_CHANNEL, "-p", WM_THEME_PROPERTY])
    }

    fn set_window_theme(&self, theme: &str) -> Result<()> {
        run_checked(
            "xfconf-query",
            &["-c", WM_THEME_CHANNEL, "-p", WM_THEME_PROPERTY, "-s", theme],
        )
    }
}

fn run_output(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .stderr(Stdio::null())
        .output()
        .map_err(|err| DaemonError::Settings(format!("failed to run {program}: {err}")))?;
    if !output.status.success() {
        return Err(DaemonError::Settings(format!(
            "{program} {} exited with {}",
            args.join(" "),
            output.status
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|_| DaemonError::Settings(format!("{program} produced non-utf8 output")))
}

fn run_checked(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| DaemonError::Settings(format!("failed to run {program}: {err}")))?;
    if !status.success() {
        return Err(DaemonError::Settings(format!(
            "{program} {} exited with {status}",
            args.join(" ")
        )));
    }
    Ok(())
}

/// Strips the textual GVariant decoration from `gsettings get` output:
/// surrounding single quotes and a leading type annotation like `uint32 `.
pub fn unquote_gvariant(raw: &str) -> String {
    let mut value = raw.trim();
    if let Some((prefix, rest)) = value.split_once(' ')
        && matches!(prefix, "uint32" | "int32" | "uint64" | "int64" | "double")
    {
        value = rest.trim();
    }
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
        .to_owned()
}

/// One `gsettings monitor <schema>` child feeding changed-key notifications
/// into the event loop through a non-blocking pipe.
pub struct SettingsMonitor {
    schema: &'static str,
    child: Child,
    stdout: ChildStdout,
    pending: Vec<u8>,
}

pub struct MonitorDrain {
    pub keys: Vec<String>,
    pub closed: bool,
}

impl SettingsMonitor {
    pub fn spawn(schema: &'static str) -> Result<Self> {
        let mut child = Command::new("gsettings")
            .args(["monitor", schema])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                DaemonError::Settings(format!("failed to spawn gsettings monitor {schema}: {err}"))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DaemonError::Settings(format!("gsettings monitor {schema} has no stdout pipe"))
        })?;
        set_nonblocking(stdout.as_raw_fd()).map_err(|err| {
            DaemonError::Settings(format!(
                "failed to make gsettings monitor {schema} pipe non-blocking: {err}"
            ))
        })?;

        Ok(Self {
            schema,
            child,
            stdout,
            pending: Vec::new(),
        })
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }

    /// Reads everything currently available and returns the key names of all
    /// complete notification lines. `closed` is set when the child hung up.
    pub fn drain(&mut self) -> io::Result<MonitorDrain> {
        let mut closed = false;
        let mut buf = [0u8; 1024];
        loop {
            match self.stdout.read(&mut buf) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        let mut keys = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(key) = parse_monitor_line(&line) {
                keys.push(key);
            }
        }
        Ok(MonitorDrain { keys, closed })
    }
}

impl AsFd for SettingsMonitor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stdout.as_fd()
    }
}

impl Drop for SettingsMonitor {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn set_nonblocking(fd: i32) -> io::Result<()> {
    // Safety: fd is a valid pipe fd owned by the child handle for the whole
    // lifetime of this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `gsettings monitor` prints one `key: value` line per change.
pub fn parse_monitor_line(line: &str) -> Option<String> {
    let (key, _) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some(key.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_line_yields_key_name() {
        assert_eq!(
            parse_monitor_line("window-scaling-factor: uint32 2").as_deref(),
            Some("window-scaling-factor")
        );
        assert_eq!(parse_monitor_line("dpi: 96.0").as_deref(), Some("dpi"));
    }

    #[test]
    fn monitor_line_without_separator_is_ignored() {
        assert_eq!(parse_monitor_line("not a notification"), None);
        assert_eq!(parse_monitor_line(": orphan value"), None);
    }

    #[test]
    fn gvariant_unquoting() {
        assert_eq!(unquote_gvariant("'Default'\n"), "Default");
        assert_eq!(unquote_gvariant("uint32 2"), "2");
        assert_eq!(unquote_gvariant("2\n"), "2");
        assert_eq!(unquote_gvariant("'Traditional Ok'"), "Traditional Ok");
    }
}
