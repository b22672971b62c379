//! Recursive taint query over expressions.
//!
//! Answers "may this expression carry a host-derived value?" against the
//! current [`TaintTracker`] state. Call expressions always answer no here:
//! source calls are classified and reported exactly once by
//! [`crate::call_classifier`], and answering yes for them would double-report
//! every source call that appears inside a larger expression.

use crate::ast::{ExprId, ExprKind, Unit};
use crate::check_config::CONFIG;
use crate::log::*;
use crate::taint_state::TaintTracker;

/// How a taint answer was reached. Textual answers come from the
/// substring-containment fallback and are reported as such; they must never
/// be presented with structural confidence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Confidence {
    Structural,
    Textual,
}

fn combine(a: Option<Confidence>, b: Option<Confidence>) -> Option<Confidence> {
    match (a, b) {
        (Some(Confidence::Structural), _) | (_, Some(Confidence::Structural)) => {
            Some(Confidence::Structural)
        }
        (Some(Confidence::Textual), _) | (_, Some(Confidence::Textual)) => {
            Some(Confidence::Textual)
        }
        (None, None) => None,
    }
}

/// A read-only view over the unit and tracker that evaluates expression
/// taint.
pub struct TaintEvaluator<'a> {
    unit: &'a Unit,
    tracker: &'a TaintTracker,
}

impl<'a> TaintEvaluator<'a> {
    pub fn new(unit: &'a Unit, tracker: &'a TaintTracker) -> Self {
        Self { unit, tracker }
    }

    /// Whether the expression may carry a host-derived value.
    pub fn is_tainted(&self, e: ExprId) -> bool {
        self.tainted_with_confidence(e).is_some()
    }

    /// Like [`Self::is_tainted`], but reports whether the answer is
    /// structural or came from the textual fallback.
    pub fn tainted_with_confidence(&self, e: ExprId) -> Option<Confidence> {
        match &self.unit.expr(e).kind {
            // Source calls are the classifier's concern; everything else a
            // call returns is unknown, not tainted.
            ExprKind::Call { .. } => None,
            ExprKind::Literal { .. } => None,
            ExprKind::Symbol { sym } => {
                if self.tracker.is_tainted(*sym) {
                    Some(Confidence::Structural)
                } else {
                    None
                }
            }
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs, .. }
            | ExprKind::Comma { lhs, rhs } => combine(
                self.tainted_with_confidence(*lhs),
                self.tainted_with_confidence(*rhs),
            ),
            ExprKind::Conditional {
                cond,
                then_val,
                else_val,
            } => combine(
                self.tainted_with_confidence(*cond),
                combine(
                    self.tainted_with_confidence(*then_val),
                    self.tainted_with_confidence(*else_val),
                ),
            ),
            ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } => {
                // Value-preserving wrappers are transparent.
                self.tainted_with_confidence(*operand)
            }
            ExprKind::Deref { operand } => {
                let inner = self.unit.strip_value_wrappers(*operand);
                match &self.unit.expr(inner).kind {
                    ExprKind::Symbol { sym } => {
                        if self.tracker.is_tainted(*sym) {
                            Some(Confidence::Structural)
                        } else {
                            None
                        }
                    }
                    _ => self.textual_fallback(e),
                }
            }
            ExprKind::Member { base, .. } => {
                // `p->f` and `s.f` carry taint when the underlying symbol
                // does.
                let inner = self.unit.strip_value_wrappers(*base);
                match &self.unit.expr(inner).kind {
                    ExprKind::Symbol { sym } => {
                        if self.tracker.is_tainted(*sym) {
                            Some(Confidence::Structural)
                        } else {
                            None
                        }
                    }
                    _ => self.textual_fallback(e),
                }
            }
            ExprKind::Opaque { .. } => self.textual_fallback(e),
        }
    }

    /// Substring containment of any tracked tainted symbol's name in the
    /// expression's rendered text. Conservative by construction: `val` being
    /// a substring of `validated` is a false positive we accept, and taint
    /// laundered through an alias the text never names is a false negative
    /// we accept.
    fn textual_fallback(&self, e: ExprId) -> Option<Confidence> {
        if !CONFIG.textual_taint_fallback {
            return None;
        }
        let text = self.unit.render_expr(e);
        for sym in self.tracker.tainted_symbols() {
            let name = &self.unit.symbol(sym).name;
            if !name.is_empty() && text.contains(name.as_str()) {
                debug!(
                    "textual taint fallback matched";
                    "text" => &text,
                    "tainted_sym" => name,
                );
                return Some(Confidence::Textual);
            }
        }
        None
    }
}
