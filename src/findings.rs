//! Finding records, their stable fingerprints, and the findings-file format.
//!
//! The findings file is the engine's whole output contract: the downstream
//! subsystem filter and the annotation-transfer tool both key off
//! `(fingerprint, severity, message, location)`, so serialization here must
//! stay byte-stable for identical inputs.

/// A trait that indicates that `Self` can be parsed from a string.
pub trait Parseable: Sized {
    /// Parse from the given string, returning `None` if unsuccessful
    fn parse_from(s: &str) -> Option<Self>;
}

/// Severity of a finding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Severity {
    /// High confidence: unvalidated host data reaching a sensitive sink, a
    /// return boundary, or escaping local scope.
    Error,
    /// Host data reaching a cataloged safe sink, or an ambiguous/heuristic
    /// context.
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

impl Parseable for Severity {
    fn parse_from(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            _ => None,
        }
    }
}

/// A single report against one call site or propagation point.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Finding {
    pub severity: Severity,
    /// Stable identity across analysis runs on different code versions.
    pub fingerprint: u64,
    pub file: String,
    pub line: u32,
    pub function: String,
    pub message: String,
}

/// Seed and multiplier of the classic djb2 string hash.
const FINGERPRINT_SEED: u64 = 5381;
const FINGERPRINT_MULTIPLIER: u64 = 33;

/// Token markers whose spelling changes from one compilation to the next:
/// the exporter's synthesized-temporary prefix and its anonymous-entity
/// marker. A primary text containing either would make the fingerprint
/// unstable, so a fixed literal is hashed instead and the fingerprint then
/// depends only on structural position.
const UNSTABLE_TOKEN_MARKERS: [&str; 2] = ["__cctmp", "__anon"];
const UNSTABLE_TEXT_SUBSTITUTE: &str = "synthetic expression";

fn stable_primary_text(text: &str) -> &str {
    if UNSTABLE_TOKEN_MARKERS.iter().any(|m| text.contains(m)) {
        UNSTABLE_TEXT_SUBSTITUTE
    } else {
        text
    }
}

/// Fingerprint of a finding: djb2 over the canonical primary text, folded
/// with the finding's line offset from the enclosing function's start as one
/// final multiplicative round. Line offsets (rather than absolute lines) let
/// a finding keep its identity when unrelated edits shift the whole function.
pub fn fingerprint(primary_text: &str, line_offset: u32) -> u64 {
    let mut h = FINGERPRINT_SEED;
    for b in stable_primary_text(primary_text).bytes() {
        h = h
            .wrapping_mul(FINGERPRINT_MULTIPLIER)
            .wrapping_add(u64::from(b));
    }
    h.wrapping_mul(FINGERPRINT_MULTIPLIER)
        .wrapping_add(u64::from(line_offset))
}

/// The serializable set of findings for one scanned unit.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FindingsFile {
    /// Findings in emission (program) order.
    pub findings: Vec<Finding>,
}

impl FindingsFile {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    /// Serialize the findings
    pub fn serialize(&self) -> String {
        let mut res = String::new();
        self.serialize_to(&mut res).unwrap();
        res
    }

    /// Serialize to the given string
    fn serialize_to(&self, f: &mut String) -> std::fmt::Result {
        use std::fmt::Write;

        writeln!(f, "FINDINGS")?;
        for finding in &self.findings {
            writeln!(
                f,
                "\t{}\t{:016x}\t{}\t{}\t{}\t{}",
                finding.severity,
                finding.fingerprint,
                finding.file,
                finding.line,
                finding.function,
                finding.message,
            )?;
        }
        writeln!(f)?;
        Ok(())
    }
}

impl Parseable for FindingsFile {
    fn parse_from(s: &str) -> Option<Self> {
        let mut s = s.lines().peekable();

        assert_eq!(s.next().unwrap(), "FINDINGS");

        let mut ret = Self::default();
        while s.peek().map_or(false, |l| l.starts_with('\t')) {
            let line = s.next().unwrap();
            let mut fields = line.trim_start_matches('\t').splitn(6, '\t');

            let severity = Severity::parse_from(fields.next()?)?;
            let fingerprint = u64::from_str_radix(fields.next()?, 16).ok()?;
            let file = fields.next()?.to_owned();
            let line = fields.next()?.parse().ok()?;
            let function = fields.next()?.to_owned();
            let message = fields.next()?.to_owned();

            ret.findings.push(Finding {
                severity,
                fingerprint,
                file,
                line,
                function,
                message,
            });
        }

        Some(ret)
    }
}
