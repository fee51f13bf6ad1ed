use crate::{Result, state::Controller};

/// The settings-store surface the corrective actions run against.
pub trait SessionSettings {
    fn set_icons_visible(&self, visible: bool) -> Result<()>;
    /// Read at action time, never at event time, so the action always acts
    /// on the settled value.
    fn scaling_factor(&self) -> Result<i32>;
    fn window_theme(&self) -> Result<String>;
    fn set_window_theme(&self, theme: &str) -> Result<()>;
}

/// Coordination with the panel and the window manager process.
pub trait PeerControl {
    /// Fire-and-forget: a missing panel is not an error worth surfacing.
    fn request_panel_relaunch(&self) -> Result<()>;
    fn is_window_manager_running(&self) -> bool;
}

impl Controller {
    /// Toggles desktop-icon visibility off and back on, forcing the desktop
    /// shell to recompute the icon grid for the current geometry and DPI.
    pub fn refresh_icons(&mut self) {
        tracing::debug!("re-laying out desktop icons");
        for visible in [false, true] {
            if let Err(err) = self.settings.set_icons_visible(visible) {
                tracing::debug!("icon visibility write failed: {err}");
            }
        }
    }

    /// Reacts to a settled scaling/font change: asks the panel to relaunch,
    /// rewrites the window manager theme variant if the window manager is
    /// ours and running, then re-lays out the icons.
    pub fn apply_scaling_change(&mut self) {
        if let Err(err) = self.peer.request_panel_relaunch() {
            tracing::debug!("panel relaunch request failed: {err}");
        }

        if self.peer.is_window_manager_running() {
            self.update_wm_theme();
        } else {
            tracing::debug!(
                process = %self.config.wm_process,
                "window manager not running, leaving theme untouched"
            );
        }

        self.refresh_icons();
    }

    fn update_wm_theme(&mut self) {
        let raw = match self.settings.window_theme() {
            Ok(raw) if !raw.trim().is_empty() => raw,
            Ok(_) => {
                tracing::debug!("theme query returned empty output, skipping theme update");
                return;
            }
            Err(err) => {
                tracing::debug!("theme query failed, skipping theme update: {err}");
                return;
            }
        };

        let factor = match self.settings.scaling_factor() {
            Ok(factor) => factor,
            Err(err) => {
                tracing::warn!("failed to read scaling factor: {err}");
                return;
            }
        };

        let theme = rescaled_theme(&raw, factor);
        match self.settings.set_window_theme(&theme) {
            Ok(()) => tracing::info!(%theme, factor, "updated window manager theme"),
            Err(err) => tracing::warn!(%theme, "failed to set window manager theme: {err}"),
        }
    }
}

/// Computes the theme name for a scaling factor: the base name is the query
/// output up to the earliest of a newline, `-hdpi` or `-xhdpi` (the query
/// output carries a trailing newline, and the current theme may already be a
/// scaled variant), with `-hdpi` appended for factor 2 and `-xhdpi` above 2.
pub fn rescaled_theme(raw: &str, scaling_factor: i32) -> String {
    let boundary = ["\n", "-hdpi", "-xhdpi"]
        .iter()
        .filter_map(|marker| raw.find(marker))
        .min()
        .unwrap_or(raw.len());
    let base = &raw[..boundary];

    if scaling_factor == 2 {
        format!("{base}-hdpi")
    } else if scaling_factor > 2 {
        format!("{base}-xhdpi")
    } else {
        base.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::rescaled_theme;

    #[test]
    fn plain_theme_keeps_name_at_factor_one() {
        assert_eq!(rescaled_theme("Default", 1), "Default");
        assert_eq!(rescaled_theme("Default\n", 1), "Default");
    }

    #[test]
    fn existing_suffix_is_stripped_before_append() {
        assert_eq!(rescaled_theme("Default-hdpi\n", 1), "Default");
        assert_eq!(rescaled_theme("Default-hdpi\n", 2), "Default-hdpi");
        assert_eq!(rescaled_theme("Default-hdpi\n", 3), "Default-xhdpi");
        assert_eq!(rescaled_theme("Default-xhdpi", 2), "Default-hdpi");
        assert_eq!(rescaled_theme("Default-xhdpi", 1), "Default");
    }

    #[test]
    fn factor_above_two_gets_xhdpi() {
        assert_eq!(rescaled_theme("Default", 3), "Default-xhdpi");
        assert_eq!(rescaled_theme("Default", 4), "Default-xhdpi");
    }

    #[test]
    fn factor_at_or_below_one_gets_no_suffix() {
        assert_eq!(rescaled_theme("Default", 0), "Default");
        assert_eq!(rescaled_theme("Default-hdpi", 0), "Default");
    }

    #[test]
    fn newline_before_suffix_wins_as_boundary() {
        // Trailing-newline noise from the query is cut even when a suffix
        // marker appears later in the buffer.
        assert_eq!(rescaled_theme("Default\nnoise-hdpi", 2), "Default-hdpi");
    }
}
