//! Pipeline configuration.
//!
//! The primary-package selector is read from the environment exactly once,
//! when the configuration is built; the passes receive the immutable
//! result by reference. The environment variable stays the external
//! on/off switch, but no pass touches process-global state while running.

/// Environment variable selecting the primary build unit. Only the exact
/// value `"1"` enables instrumentation.
pub const PRIMARY_PACKAGE_ENV: &str = "CARGO_PRIMARY_PACKAGE";

/// Immutable pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// True when this compilation unit is the primary build unit. When
    /// false every pass reports no change and leaves the IR untouched.
    pub primary_package: bool,
    /// Per-pass enable switches. The build system drives subsets of the
    /// pipeline for different experiments; disabling a pass never
    /// reorders the remaining ones.
    pub passes: PassToggles,
}

/// One switch per pass, all enabled by default.
#[derive(Debug, Clone)]
pub struct PassToggles {
    pub marker_planter: bool,
    pub debug_anchor: bool,
    pub function_tracker: bool,
    pub inst_counter: bool,
    pub line_coverage: bool,
    pub heap_tracker: bool,
    pub external_calls: bool,
    pub cycle_counter: bool,
}

impl Default for PassToggles {
    fn default() -> Self {
        Self {
            marker_planter: true,
            debug_anchor: true,
            function_tracker: true,
            inst_counter: true,
            line_coverage: true,
            heap_tracker: true,
            external_calls: true,
            cycle_counter: true,
        }
    }
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        let primary = std::env::var(PRIMARY_PACKAGE_ENV)
            .map(|v| v == "1")
            .unwrap_or(false);
        Config { primary_package: primary, passes: PassToggles::default() }
    }

    /// A configuration with the primary selector forced on. Used by tests
    /// and by hosts that make the selection themselves.
    pub fn primary() -> Self {
        Config { primary_package: true, passes: PassToggles::default() }
    }

    /// A configuration with the primary selector forced off.
    pub fn non_primary() -> Self {
        Config { primary_package: false, passes: PassToggles::default() }
    }
}
