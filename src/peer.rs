use std::{
    ffi::OsStr,
    process::{Command, Stdio},
};

use sysinfo::{ProcessesToUpdate, System};

use crate::{
    DaemonError, Result,
    actions::PeerControl,
    config::PanelRelaunch,
};

const PANEL_TERMINATE_COMMAND: &str = "dbus-send --session --dest=org.xfce.Panel \
     /org/xfce/Panel org.xfce.Panel.Terminate boolean:true";

/// Coordination with the panel and the window manager: relaunch requests are
/// fire-and-forget spawned commands, presence is a process-table scan.
pub struct PanelPeer {
    relaunch: PanelRelaunch,
    wm_process: String,
}

impl PanelPeer {
    pub fn new(relaunch: PanelRelaunch, wm_process: String) -> Self {
        Self {
            relaunch,
            wm_process,
        }
    }
}

impl PeerControl for PanelPeer {
    fn request_panel_relaunch(&self) -> Result<()> {
        match &self.relaunch {
            PanelRelaunch::Command(command) => spawn_shell(command),
            PanelRelaunch::DbusTerminate => spawn_shell(PANEL_TERMINATE_COMMAND),
        }
    }

    fn is_window_manager_running(&self) -> bool {
        // Safety: getuid never fails.
        let uid = unsafe { libc::getuid() };

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        system.processes().values().any(|process| {
            matches_peer(
                process.name(),
                process.user_id().map(|owner| **owner),
                &self.wm_process,
                uid,
            )
        })
    }
}

/// A peer matches only on an exact name hit owned by the given uid. Entries
/// whose owner could not be read (permission, exit race) never match.
fn matches_peer(name: &OsStr, owner_uid: Option<u32>, expected_name: &str, uid: u32) -> bool {
    name == OsStr::new(expected_name) && owner_uid == Some(uid)
}

fn spawn_shell(command: &str) -> Result<()> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd.spawn()
        .map(drop)
        .map_err(|err| DaemonError::Peer(format!("failed to spawn \"{command}\": {err}")))
}

#[cfg(test)]
mod tests {
    use super::matches_peer;
    use std::ffi::OsStr;

    #[test]
    fn exact_name_and_uid_match() {
        assert!(matches_peer(OsStr::new("xfwm4"), Some(1000), "xfwm4", 1000));
    }

    #[test]
    fn same_name_under_other_uid_does_not_match() {
        assert!(!matches_peer(OsStr::new("xfwm4"), Some(0), "xfwm4", 1000));
    }

    #[test]
    fn unreadable_owner_does_not_match() {
        assert!(!matches_peer(OsStr::new("xfwm4"), None, "xfwm4", 1000));
    }

    #[test]
    fn name_match_is_exact_not_substring() {
        assert!(!matches_peer(OsStr::new("xfwm4-session"), Some(1000), "xfwm4", 1000));
    }
}
