//! A global store of flags that can impact the analysis.
//!
//! WARNING: Currently only supports a single consistent configuration amongst threads (i.e., cannot
//! have different configurations for different scans in the same process).

/// The global configuration store. Its fields are expected to be accessed across the program via
/// the global [`CONFIG`](static@CONFIG).
pub struct CheckConfig {
    /// When an expression is too complex to evaluate structurally, fall back to checking whether
    /// any currently-tainted symbol's name occurs within the expression's rendered text. This is a
    /// deliberately conservative heuristic: one identifier being a substring of another produces a
    /// false positive, and taint hidden behind renaming produces a false negative. Findings that
    /// relied on it are marked as textual matches.
    pub textual_taint_fallback: bool,
    /// Treat every statically-known CPUID leaf as untrusted, rather than only the cataloged
    /// leaves. Audit mode; greatly increases finding counts.
    pub cpuid_flag_all_known_leaves: bool,
    /// Honor the exporter's infeasible-call-site marks and skip those call sites entirely.
    pub honor_feasibility_oracle: bool,
    /// Report tainted values passed as arguments to cataloged printing functions (as warnings).
    /// Disabling cuts noise when a subsystem logs raw host values heavily.
    pub report_args_to_safe_functions: bool,
}

impl CheckConfig {
    /// Internal method: sets up initialization
    #[allow(static_mut_refs)]
    fn from_initialized() -> Self {
        let init = unsafe {
            INTERNAL_CONFIG_INITIALIZER
                .take()
                .expect("Should be initialized only once")
        };
        init.unwrap_or_default()
    }

    /// Initialize with the given command line configuration. Should only be called once, and should
    /// only be called from `main`.
    #[allow(static_mut_refs)]
    pub fn initialize(command_line_config: Vec<CommandLineCheckConfig>) {
        let prev = unsafe { INTERNAL_CONFIG_INITIALIZER.replace(Some(command_line_config.into())) };
        assert!(prev.is_some(), "Performed double initialization");
        lazy_static::initialize(&CONFIG);
    }
}

/// Internal initialization detail.
static mut INTERNAL_CONFIG_INITIALIZER: Option<Option<CheckConfig>> = Some(None);

lazy_static::lazy_static! {
    /// The global configuration store
    pub static ref CONFIG: CheckConfig = CheckConfig::from_initialized();
}

#[derive(clap::ArgEnum, Clone, Debug)]
/// Analysis configuration parameters
pub enum CommandLineCheckConfig {
    DisableTextualTaintFallback,
    EnableCpuidFlagAllKnownLeaves,
    IgnoreInfeasibleMarks,
    DisableSafeFunctionArgReports,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            textual_taint_fallback: true,
            cpuid_flag_all_known_leaves: false,
            honor_feasibility_oracle: true,
            report_args_to_safe_functions: true,
        }
    }
}

impl From<Vec<CommandLineCheckConfig>> for CheckConfig {
    fn from(v: Vec<CommandLineCheckConfig>) -> Self {
        use CommandLineCheckConfig::*;
        let mut r = CheckConfig::default();
        for v in v {
            match v {
                DisableTextualTaintFallback => {
                    r.textual_taint_fallback = false;
                }
                EnableCpuidFlagAllKnownLeaves => {
                    r.cpuid_flag_all_known_leaves = true;
                }
                IgnoreInfeasibleMarks => {
                    r.honor_feasibility_oracle = false;
                }
                DisableSafeFunctionArgReports => {
                    r.report_args_to_safe_functions = false;
                }
            }
        }
        r
    }
}
