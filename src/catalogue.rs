//! Immutable tables of the host-input primitives the analysis recognizes.
//!
//! A confidential-computing guest receives data from the host/hypervisor
//! through a small set of primitives: port I/O, MMIO reads, MSR reads, CPUID
//! queries, and hypercalls. These tables name those primitives for the Linux
//! guest, plus the output and printing primitives used to downgrade severity.
//! Initialized once, read-only for the lifetime of the process.

use lazy_static::lazy_static;

use crate::check_config::CONFIG;
use crate::containers::unordered::{UnorderedMap, UnorderedSet};

lazy_static! {
    pub static ref CATALOGUE: Catalogue = Catalogue::new();
}

/// How a cataloged source function hands over host data.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SourceKind {
    /// The host-influenced value is the function's return value.
    Plain,
    /// The host-influenced data lands in the argument positions given by the
    /// 1-based bitmask (bit `n` set means the `n`-th argument is written).
    ArgMask(u32),
}

/// Catalogue entry for a source function.
#[derive(Clone, Copy, Debug)]
pub struct SourceInfo {
    pub kind: SourceKind,
    /// Whether the CPUID leaf policy gates reporting of this source.
    pub cpuid: bool,
    /// For leaf-gated sources, the 0-based index of the leaf argument.
    /// `None` (with `cpuid` set) means the leaf is never statically visible
    /// at the call site, e.g. `native_cpuid` taking a register block.
    pub leaf_arg: Option<usize>,
}

/// The software-defined hypervisor CPUID leaf range.
const HYPERVISOR_LEAF_RANGE: std::ops::RangeInclusive<u64> = 0x4000_0000..=0x4000_00ff;

/// Well-known identification leaves inside the hypervisor range: vendor
/// identification and interface identification. Reading these is how a guest
/// discovers who it is running under, so they are not treated as untrusted
/// data sources.
const HYPERVISOR_ID_LEAVES: [u64; 2] = [0x4000_0000, 0x4000_0001];

pub struct Catalogue {
    /// Functions whose return value comes from the host.
    plain_sources: UnorderedSet<&'static str>,
    /// Functions that write host data through argument positions.
    arg_sources: UnorderedMap<&'static str, u32>,
    /// CPUID-family functions, subject to the leaf policy.
    cpuid_sources: UnorderedSet<&'static str>,
    /// 0-based position of the leaf argument for CPUID-family functions
    /// where the leaf is visible at the call site.
    cpuid_leaf_arg: UnorderedMap<&'static str, usize>,
    /// Output primitives (port/MMIO writes); host data flowing back out has
    /// lower safety impact than host data being consumed.
    sinks: UnorderedSet<&'static str>,
    /// Printing/reporting helpers; host data reaching only these is
    /// lower impact.
    safe: UnorderedSet<&'static str>,
    /// Source-only macros whose bodies are never traversed by the exporter.
    /// The mask designates captured destination arguments, 1-based as for
    /// `arg_sources`.
    macro_sources: UnorderedMap<&'static str, u32>,
    /// CPUID leaves whose contents a confidential guest cannot verify
    /// (host-supplied cache, topology, and frequency data).
    untrusted_cpuid_leaves: UnorderedSet<u64>,
}

impl Catalogue {
    fn new() -> Self {
        let plain_sources = [
            // MMIO reads
            "readb",
            "readw",
            "readl",
            "readq",
            "readl_relaxed",
            "readq_relaxed",
            "ioread8",
            "ioread16",
            "ioread32",
            "ioread64",
            // Port reads
            "inb",
            "inw",
            "inl",
            // CPUID single-register forms (leaf-gated below)
            "cpuid_eax",
            "cpuid_ebx",
            "cpuid_ecx",
            "cpuid_edx",
            // Hypercalls returning a host-chosen value
            "kvm_hypercall0",
            "kvm_hypercall1",
            "kvm_hypercall2",
            "kvm_hypercall3",
            "kvm_hypercall4",
        ]
        .into_iter()
        .collect();

        let arg_sources = [
            // memcpy_fromio(dest, src, count)
            ("memcpy_fromio", 0b10u32),
            // String port reads: insb(port, addr, count)
            ("insb", 0b100),
            ("insw", 0b100),
            ("insl", 0b100),
            // Repeated MMIO reads: ioread8_rep(addr, buffer, count)
            ("ioread8_rep", 0b100),
            ("ioread16_rep", 0b100),
            ("ioread32_rep", 0b100),
            // rdmsrl_on_cpu(cpu, msr_no, q)
            ("rdmsrl_on_cpu", 0b1000),
            // rdmsr_on_cpu(cpu, msr_no, l, h)
            ("rdmsr_on_cpu", 0b11000),
            // cpuid(leaf, eax, ebx, ecx, edx)
            ("cpuid", 0b111100),
            // cpuid_count(leaf, count, eax, ebx, ecx, edx)
            ("cpuid_count", 0b1111000),
            // native_cpuid(eax, ebx, ecx, edx): registers are in/out, the
            // leaf arrives inside the block and is never a visible constant
            ("native_cpuid", 0b11110),
        ]
        .into_iter()
        .collect();

        let cpuid_sources = [
            "cpuid",
            "cpuid_count",
            "native_cpuid",
            "cpuid_eax",
            "cpuid_ebx",
            "cpuid_ecx",
            "cpuid_edx",
        ]
        .into_iter()
        .collect();

        let cpuid_leaf_arg = [
            ("cpuid", 0usize),
            ("cpuid_count", 0),
            ("cpuid_eax", 0),
            ("cpuid_ebx", 0),
            ("cpuid_ecx", 0),
            ("cpuid_edx", 0),
        ]
        .into_iter()
        .collect();

        let sinks = [
            "writeb", "writew", "writel", "writeq", "iowrite8", "iowrite16", "iowrite32",
            "iowrite64", "outb", "outw", "outl", "outsb", "outsw", "outsl", "memcpy_toio",
        ]
        .into_iter()
        .collect();

        let safe = [
            "printk",
            "pr_err",
            "pr_warn",
            "pr_info",
            "pr_debug",
            "dev_err",
            "dev_warn",
            "dev_info",
            "dev_dbg",
            "seq_printf",
            "snprintf",
            "sprintf",
            "trace_printk",
        ]
        .into_iter()
        .collect();

        let macro_sources = [
            // rdmsr(msr, low, high) captures `low` and `high` by name
            ("rdmsr", 0b1100u32),
            // rdmsrl(msr, val) captures `val` by name
            ("rdmsrl", 0b100),
        ]
        .into_iter()
        .collect();

        let untrusted_cpuid_leaves = [
            0x2u64, // cache and TLB descriptors
            0x4,    // deterministic cache parameters
            0x5,    // MONITOR/MWAIT
            0x6,    // thermal and power management
            0x9,    // direct cache access
            0xb,    // extended topology
            0x16,   // processor frequency
            0x1f,   // v2 extended topology
        ]
        .into_iter()
        .collect();

        Self {
            plain_sources,
            arg_sources,
            cpuid_sources,
            cpuid_leaf_arg,
            sinks,
            safe,
            macro_sources,
            untrusted_cpuid_leaves,
        }
    }

    /// Look up `name` in the source tables.
    pub fn source_info(&self, name: &str) -> Option<SourceInfo> {
        let cpuid = self.cpuid_sources.contains(name);
        let leaf_arg = if cpuid {
            self.cpuid_leaf_arg.get(name).copied()
        } else {
            None
        };
        if let Some(&mask) = self.arg_sources.get(name) {
            Some(SourceInfo {
                kind: SourceKind::ArgMask(mask),
                cpuid,
                leaf_arg,
            })
        } else if self.plain_sources.contains(name) {
            Some(SourceInfo {
                kind: SourceKind::Plain,
                cpuid,
                leaf_arg,
            })
        } else {
            None
        }
    }

    pub fn is_sink(&self, name: &str) -> bool {
        self.sinks.contains(name)
    }

    pub fn is_safe(&self, name: &str) -> bool {
        self.safe.contains(name)
    }

    /// Captured-destination mask of a source-only macro, if `name` is one.
    pub fn macro_capture_mask(&self, name: &str) -> Option<u32> {
        self.macro_sources.get(name).copied()
    }

    /// Whether a CPUID-family call with the given statically-known leaf (or
    /// `None` when the leaf is not statically determinable) must be flagged.
    pub fn cpuid_leaf_flagged(&self, leaf: Option<u64>) -> bool {
        let leaf = match leaf {
            // Not statically determinable: flag conservatively.
            None => return true,
            Some(leaf) => leaf,
        };
        if CONFIG.cpuid_flag_all_known_leaves {
            return true;
        }
        self.untrusted_cpuid_leaves.contains(&leaf)
            || (HYPERVISOR_LEAF_RANGE.contains(&leaf) && !HYPERVISOR_ID_LEAVES.contains(&leaf))
    }
}

/// The 1-based argument positions designated by a catalogue bitmask, in
/// ascending order.
pub fn mask_arg_positions(mask: u32) -> Vec<usize> {
    (1..u32::BITS as usize)
        .filter(|&n| mask & (1 << n) != 0)
        .collect()
}
