//! Classification of calls to cataloged source functions.
//!
//! Runs once per source call site and produces the single diagnosis for that
//! site: where the read value lands (if anywhere), and how severe the lack of
//! validation is. Taint that the classifier attaches to a destination symbol
//! feeds every later evaluator and propagation query in the same function;
//! propagation itself lives in [`crate::host_input_check`].

use itertools::Itertools;

use crate::ast::{ExprId, ExprKind, StmtId, StmtKind, SymbolId, TypeClass, Unit};
use crate::catalogue::{mask_arg_positions, SourceKind, CATALOGUE};
use crate::check_config::CONFIG;
use crate::findings::Severity;
use crate::log::*;
use crate::taint_state::TaintTracker;

/// Outcome of classifying one source call site: everything the emitter needs
/// besides the enclosing function's identity.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnosis {
    pub severity: Severity,
    pub message: String,
    /// Canonical text of the implicated expression, hashed into the finding
    /// fingerprint.
    pub primary_text: String,
    pub line: u32,
    /// The destination symbol newly marked as holding host data, when the
    /// classification reduced to a local store.
    pub marked: Option<SymbolId>,
}

impl Diagnosis {
    fn new(severity: Severity, message: String, primary_text: String, line: u32) -> Self {
        Self {
            severity,
            message,
            primary_text,
            line,
            marked: None,
        }
    }
}

/// Reduced shape of a destination expression.
enum DestShape {
    /// A structure member is written directly.
    Member(ExprId),
    /// The write lands in a named symbol.
    Symbol(SymbolId),
    /// Not reducible to a symbol reference.
    Irreducible(ExprId),
}

pub struct CallSiteClassifier<'a> {
    unit: &'a Unit,
    tracker: &'a mut TaintTracker,
}

impl<'a> CallSiteClassifier<'a> {
    pub fn new(unit: &'a Unit, tracker: &'a mut TaintTracker) -> Self {
        Self { unit, tracker }
    }

    /// Classify one call to a cataloged source function against its directly
    /// enclosing statement. `None` means the site is deliberately skipped:
    /// an infeasible path, or a CPUID leaf outside the untrusted set.
    pub fn classify(&mut self, call: ExprId, enclosing: StmtId) -> Option<Diagnosis> {
        let line = self.unit.expr(call).line;
        let name = match self.unit.callee_name(call) {
            Some(n) => n.to_owned(),
            None => {
                error!("source call without a resolvable callee name"; "expr" => ?call);
                return None;
            }
        };
        let info = match CATALOGUE.source_info(&name) {
            Some(i) => i,
            None => {
                error!("classifier invoked for an uncataloged function"; "function" => &name);
                return None;
            }
        };

        if CONFIG.honor_feasibility_oracle && self.unit.infeasible_calls.contains(&call) {
            trace!("skipping infeasible call site"; "function" => &name, "line" => line);
            return None;
        }

        if info.cpuid && !self.cpuid_leaf_untrusted(call, info.leaf_arg, &name) {
            return None;
        }

        // Argument-carrying sources name their destination themselves.
        if let SourceKind::ArgMask(mask) = info.kind {
            return self.classify_arg_carrying(call, &name, mask, line);
        }

        // Otherwise the enclosing statement decides what happens to the
        // returned value.
        match &self.unit.stmt(enclosing).kind {
            StmtKind::Expression { expr } => {
                Some(self.classify_expression_statement(call, &name, *expr, line))
            }
            StmtKind::Declaration { sym, .. } => {
                Some(self.classify_symbol_destination(&name, *sym, line))
            }
            StmtKind::Return { value } => {
                let direct = value.map_or(false, |v| self.unit.strip_value_wrappers(v) == call);
                let message = if direct {
                    format!("host data from '{}' returned directly", name)
                } else {
                    format!("host data from '{}' returned within a larger expression", name)
                };
                Some(Diagnosis::new(
                    Severity::Error,
                    message,
                    self.unit.render_expr(call),
                    line,
                ))
            }
            StmtKind::If { .. } | StmtKind::Switch { .. } => Some(Diagnosis::new(
                Severity::Warning,
                format!(
                    "host data from '{}' used in a condition without validation",
                    name
                ),
                self.unit.render_expr(call),
                line,
            )),
            StmtKind::Loop {
                pre_cond, post_cond, ..
            } => Some(self.classify_loop_header(call, &name, *pre_cond, *post_cond, line)),
            StmtKind::Block { .. } => Some(Diagnosis::new(
                Severity::Error,
                format!("read from '{}' in an ambiguous block position", name),
                self.unit.render_expr(call),
                line,
            )),
            StmtKind::Other { text } => Some(Diagnosis::new(
                Severity::Error,
                format!("statement shape not covered for read from '{}': {}", name, text),
                self.unit.render_expr(call),
                line,
            )),
        }
    }

    /// A CPUID-family call is only worth flagging when its leaf is in the
    /// untrusted set, or cannot be determined statically.
    fn cpuid_leaf_untrusted(&self, call: ExprId, leaf_arg: Option<usize>, name: &str) -> bool {
        let leaf = leaf_arg
            .and_then(|index| self.call_arg(call, index))
            .and_then(|a| self.unit.const_value(a))
            .map(|v| v as u64);
        if CATALOGUE.cpuid_leaf_flagged(leaf) {
            return true;
        }
        trace!("cpuid leaf outside the untrusted set";
               "function" => name,
               "leaf" => leaf.map_or_else(|| "non-constant".to_owned(), |v| format!("{:#x}", v)));
        false
    }

    fn call_arg(&self, call: ExprId, index: usize) -> Option<ExprId> {
        match &self.unit.expr(call).kind {
            ExprKind::Call { args, .. } => args.get(index).copied(),
            _ => None,
        }
    }

    fn classify_arg_carrying(
        &mut self,
        call: ExprId,
        name: &str,
        mask: u32,
        line: u32,
    ) -> Option<Diagnosis> {
        let positions = mask_arg_positions(mask);
        if positions.len() >= 2 {
            // Values split across several out-parameters are reported once,
            // with no per-argument destination tracking.
            return Some(Diagnosis::new(
                Severity::Warning,
                format!(
                    "'{}' stores host data through arguments {}",
                    name,
                    positions.iter().join(", ")
                ),
                self.unit.render_expr(call),
                line,
            ));
        }
        let position = positions[0];
        let dest = match self.call_arg(call, position - 1) {
            Some(d) => d,
            None => {
                error!("cataloged out-parameter missing at call site";
                       "function" => name, "argument" => position, "line" => line);
                return None;
            }
        };
        Some(self.classify_destination(name, dest, line))
    }

    fn classify_expression_statement(
        &mut self,
        call: ExprId,
        name: &str,
        top: ExprId,
        line: u32,
    ) -> Diagnosis {
        if !self.unit.expr_contains(top, call) {
            // Fallback for a traversal handing us a statement whose
            // expression does not include the call.
            return Diagnosis::new(
                Severity::Warning,
                format!("potential read of host data via '{}'", name),
                self.unit.render_expr(call),
                line,
            );
        }
        let (outer, void_discard) = self.unit.strip_value_wrappers_noting_void_discard(top);
        match &self.unit.expr(outer).kind {
            ExprKind::Call { .. } if outer == call => {
                let message = if void_discard {
                    format!("empty read from '{}'", name)
                } else {
                    format!("read from '{}' with no assignment of the result", name)
                };
                Diagnosis::new(
                    Severity::Warning,
                    message,
                    self.unit.render_expr(call),
                    line,
                )
            }
            ExprKind::Call { callee, .. } => {
                // The read feeds straight into another call's argument list.
                let outer_name = match self.unit.callee_name(outer) {
                    Some(n) => n.to_owned(),
                    None => self.unit.render_expr(*callee),
                };
                let benign = CATALOGUE.is_sink(&outer_name) || CATALOGUE.is_safe(&outer_name);
                Diagnosis::new(
                    if benign {
                        Severity::Warning
                    } else {
                        Severity::Error
                    },
                    format!("host data from '{}' passed directly to '{}'", name, outer_name),
                    self.unit.render_expr(call),
                    line,
                )
            }
            ExprKind::Assign { lhs, .. } | ExprKind::Binary { lhs, .. } => {
                self.classify_destination(name, *lhs, line)
            }
            _ => Diagnosis::new(
                Severity::Warning,
                format!("read from '{}' with no assignment of the result", name),
                self.unit.render_expr(call),
                line,
            ),
        }
    }

    fn classify_loop_header(
        &mut self,
        call: ExprId,
        name: &str,
        pre_cond: Option<ExprId>,
        post_cond: Option<ExprId>,
        line: u32,
    ) -> Diagnosis {
        let cond = [pre_cond, post_cond]
            .into_iter()
            .flatten()
            .find(|&c| self.unit.expr_contains(c, call));
        if let Some(cond) = cond {
            if let Some(dest) = self.comparison_isolates(cond, call) {
                return self.classify_destination(name, dest, line);
            }
        }
        Diagnosis::new(
            Severity::Error,
            format!("host data from '{}' controls a loop", name),
            self.unit.render_expr(call),
            line,
        )
    }

    /// `sym < readX(...)` style loop conditions bind the read against one
    /// symbol; that symbol is the destination to track.
    fn comparison_isolates(&self, cond: ExprId, call: ExprId) -> Option<ExprId> {
        if let ExprKind::Binary { op, lhs, rhs } =
            &self.unit.expr(self.unit.strip_value_wrappers(cond)).kind
        {
            if op.is_comparison() {
                let l = self.unit.strip_value_wrappers(*lhs);
                let r = self.unit.strip_value_wrappers(*rhs);
                if l == call && matches!(self.unit.expr(r).kind, ExprKind::Symbol { .. }) {
                    return Some(r);
                }
                if r == call && matches!(self.unit.expr(l).kind, ExprKind::Symbol { .. }) {
                    return Some(l);
                }
            }
        }
        None
    }

    fn classify_destination(&mut self, name: &str, dest: ExprId, line: u32) -> Diagnosis {
        match self.reduce_destination(dest) {
            DestShape::Member(m) => Diagnosis::new(
                Severity::Error,
                format!(
                    "host data from '{}' stored to a member of the structure: '{}'",
                    name,
                    self.unit.render_expr(m)
                ),
                self.unit.render_expr(m),
                line,
            ),
            DestShape::Irreducible(e) => Diagnosis::new(
                Severity::Error,
                format!(
                    "destination of '{}' is not a plain symbol: '{}' ({})",
                    name,
                    self.unit.render_expr(e),
                    self.unit.expr(e).kind.kind_name()
                ),
                self.unit.render_expr(e),
                line,
            ),
            DestShape::Symbol(sym) => self.classify_symbol_destination(name, sym, line),
        }
    }

    /// The destination reduced to a named symbol: taint it if it stays in
    /// the current frame, report an escape if it does not.
    fn classify_symbol_destination(&mut self, name: &str, sym: SymbolId, line: u32) -> Diagnosis {
        let symbol = self.unit.symbol(sym);
        if !self.tracker.is_local_scope(sym) {
            return Diagnosis::new(
                Severity::Error,
                format!("host data from '{}' escapes through '{}'", name, symbol.name),
                symbol.name.clone(),
                line,
            );
        }
        self.tracker.mark_from_host(sym);
        let severity = if self.unit.ctype(symbol.ty).class == TypeClass::Int {
            Severity::Warning
        } else {
            Severity::Error
        };
        let mut d = Diagnosis::new(
            severity,
            format!("host data from '{}' stored in '{}'", name, symbol.name),
            symbol.name.clone(),
            line,
        );
        d.marked = Some(sym);
        d
    }

    /// Strip value wrappers, descend the left spine of index/pointer
    /// arithmetic chains, and name what is actually written.
    fn reduce_destination(&self, dest: ExprId) -> DestShape {
        let cur = self.unit.leftmost_operand(dest);
        match &self.unit.expr(cur).kind {
            ExprKind::Member { .. } => DestShape::Member(cur),
            ExprKind::Symbol { sym } => DestShape::Symbol(*sym),
            _ => DestShape::Irreducible(cur),
        }
    }
}
