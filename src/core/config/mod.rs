use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Runtime tunables of the emulator. Every field has the default the
/// emulator ships with; a YAML file and command-line switches can
/// override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Disables every interactive feature and runs the program straight
    /// through. Used by automated runs.
    pub dummy_mode: bool,
    /// Whether § color tags become terminal escapes or are stripped.
    pub enable_colors: bool,
    /// Begin execution already paused in step-through mode.
    pub start_in_breaking_mode: bool,
    /// Hook the user-interrupt signal (Ctrl-C).
    pub install_sigint_handler: bool,
    /// Faults put the emulator into step-through mode.
    pub break_at_faults: bool,
    /// Pause one last time on HLT before terminating.
    pub break_at_halt: bool,
    /// Use the infix ARIT disassembly notation.
    pub extended_notation: bool,
    /// A program-counter wrap past the end of memory is a fault rather
    /// than a warning.
    pub fault_on_loop_around: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dummy_mode: false,
            enable_colors: true,
            start_in_breaking_mode: true,
            install_sigint_handler: true,
            break_at_faults: true,
            break_at_halt: true,
            extended_notation: true,
            fault_on_loop_around: true,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        serde_yaml::from_str(&text).map_err(|e| format!("cannot parse {}: {}", path.display(), e))
    }

    /// A configuration for non-interactive runs, as used by tests.
    pub fn dummy() -> Self {
        Self {
            dummy_mode: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_flags() {
        let config = Config::default();
        assert!(!config.dummy_mode);
        assert!(config.enable_colors);
        assert!(config.start_in_breaking_mode);
        assert!(config.install_sigint_handler);
        assert!(config.break_at_faults);
        assert!(config.break_at_halt);
        assert!(config.extended_notation);
        assert!(config.fault_on_loop_around);
    }

    #[test]
    fn yaml_overrides_individual_fields() {
        let config: Config =
            serde_yaml::from_str("break-at-faults: false\nextended-notation: false\n").unwrap();
        assert!(!config.break_at_faults);
        assert!(!config.extended_notation);
        assert!(config.break_at_halt);
    }
}
