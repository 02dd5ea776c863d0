use serde::{Deserialize, Serialize};

use crate::commit::IntegrityPolicy;

/// Verbosity level controlling tracing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Suppress all output except errors
    Quiet,
    /// Normal output (info level)
    Normal,
    /// Verbose output (debug level)
    Verbose,
    /// Maximum output (trace level)
    Trace,
}

impl From<(bool, u8)> for Verbosity {
    /// Convert from (quiet_flag, verbose_count) to Verbosity.
    ///
    /// - quiet=true -> Quiet (regardless of verbose count)
    /// - verbose=0  -> Normal
    /// - verbose=1  -> Verbose
    /// - verbose=2+ -> Trace
    fn from((quiet, verbose_count): (bool, u8)) -> Self {
        if quiet {
            Verbosity::Quiet
        } else {
            match verbose_count {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

impl Verbosity {
    /// Return the tracing filter string for this verbosity level.
    pub fn as_tracing_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

/// Defaults for `cp` and `sync`, overridable per run from the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncDefaults {
    /// Capacity of the queue between scanning and copying.
    pub queue_capacity: usize,
    /// Scan the whole tree before copying anything.
    pub two_pass: bool,
    /// Keep going after errors.
    pub force: bool,
    /// Honor `.docignore` markers.
    pub docignore: bool,
    /// Record copied entries in the destination's commit log.
    pub record_commits: bool,
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            two_pass: false,
            force: false,
            docignore: true,
            record_commits: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IntegritySettings {
    pub policy: IntegrityPolicy,
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocConfig {
    pub sync: SyncDefaults,
    pub integrity: IntegritySettings,
}
