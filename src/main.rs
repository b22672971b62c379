use hostflow::*;

use std::path::PathBuf;

use clap::Parser;

/// Locate unvalidated host input in confidential-computing guest code
#[derive(Parser, Debug)]
#[clap(about, version, author)]
enum Args {
    /// Scan a sparse-exported translation unit for unvalidated host reads
    ScanExport {
        /// Path to a `.sparse-ast` export, produced by the sparse exporter plugin
        exported_ast: PathBuf,
        /// Path to output file for findings
        ///
        /// If this file is not provided, findings are printed to stdout.
        #[clap(long)]
        findings_file: Option<PathBuf>,
        /// Output the taint flows observed during the scan as a GraphViz `.dot` file to the given
        /// path
        #[clap(long)]
        dot_taint_graph: Option<PathBuf>,
        /// Disable terminal logging, even for high severity alerts. Strongly discouraged for normal
        /// use.
        #[clap(long)]
        debug_disable_terminal_logging: bool,
        /// Force blocking for terminal logging. If too many messages are being spewed the logger,
        /// by default, does not block, but instead dumps a dropped-messages alert. This option
        /// forces it to block and dump even if too many are being sent.
        #[clap(long)]
        debug_forced_blocking_terminal_logging: bool,
        /// Path to send log (as JSON) to
        ///
        /// Error or higher severity alerts will still continue being shown at stderr (in addition
        /// to being added to the log)
        #[clap(long = "--log")]
        log_file: Option<PathBuf>,
        /// Debug level (repeat for more: 0-warn, 1-info, 2-debug, 3-trace)
        #[clap(short, long, parse(from_occurrences))]
        debug: usize,
        /// Advanced configuration options to tweak the check behavior
        #[clap(short = 'Z', long, arg_enum)]
        advanced_config: Vec<check_config::CommandLineCheckConfig>,
    },
}

fn main() {
    let args = Args::parse();

    match args {
        Args::ScanExport {
            exported_ast,
            findings_file,
            dot_taint_graph,
            debug_disable_terminal_logging,
            debug_forced_blocking_terminal_logging,
            log_file,
            debug,
            advanced_config,
        } => {
            let _log_guard = slog_scope::set_global_logger(crate::log::FileAndTermDrain::new(
                debug,
                debug_disable_terminal_logging,
                debug_forced_blocking_terminal_logging,
                log_file,
            ));

            check_config::CheckConfig::initialize(advanced_config);

            let unit = sparse_lifter::lift_from(
                &std::fs::read_to_string(exported_ast).expect("Export file could not be read"),
            );
            if let Err(why) = unit.try_confirm_valid() {
                panic!("Export failed cross-reference validation: {}", why);
            }

            let check = host_input_check::HostInputCheck::scan(&unit);

            if let Some(path) = dot_taint_graph {
                use std::io::Write;
                write!(
                    std::fs::File::create(path).unwrap(),
                    "{}",
                    check.graph().generate_dot()
                )
                .unwrap();
            }

            let findings = findings::FindingsFile::new(check.into_findings());
            if let Some(path) = findings_file {
                use std::io::Write;
                write!(
                    std::fs::File::create(path).unwrap(),
                    "{}",
                    findings.serialize()
                )
                .unwrap();
            } else {
                println!("{}", findings.serialize());
            }

            log::trace!("Done");
        }
    }
}
