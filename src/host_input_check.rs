//! The host-input scan over one translation unit.
//!
//! Implements [`FunctionListener`]: keeps the per-function taint state
//! current as the traversal arrives, hands every cataloged source call to the
//! [`CallSiteClassifier`], emits the propagation findings of its own hooks,
//! and assembles `Finding` records with stable fingerprints.

use crate::ast::{ExprId, ExprKind, FuncId, StmtId, StmtKind, Storage, SymbolId, Unit};
use crate::call_classifier::{CallSiteClassifier, Diagnosis};
use crate::catalogue::{mask_arg_positions, CATALOGUE};
use crate::check_config::CONFIG;
use crate::findings::{self, Finding, Severity};
use crate::log::*;
use crate::taint_eval::{Confidence, TaintEvaluator};
use crate::taint_graph::{FlowKind, TaintGraph};
use crate::taint_state::TaintTracker;
use crate::traverse::{FunctionListener, TraversalDriver};

/// The engine's listener over a unit traversal: per-function tracker state,
/// accumulated findings, and the debug flow graph.
#[derive(Default)]
pub struct HostInputCheck {
    tracker: TaintTracker,
    findings: Vec<Finding>,
    graph: TaintGraph,
    current_function: Option<String>,
}

impl HostInputCheck {
    pub fn new() -> Self {
        Default::default()
    }

    /// Scan every function of `unit` and return the completed check.
    pub fn scan(unit: &Unit) -> Self {
        let mut check = Self::new();
        TraversalDriver::new(unit, &mut check).run();
        check
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn graph(&self) -> &TaintGraph {
        &self.graph
    }

    pub fn into_findings(self) -> Vec<Finding> {
        self.findings
    }

    /// Tracker access for inspecting post-scan state.
    pub fn tracker(&self) -> &TaintTracker {
        &self.tracker
    }

    fn tainted(&self, unit: &Unit, e: ExprId) -> Option<Confidence> {
        TaintEvaluator::new(unit, &self.tracker).tainted_with_confidence(e)
    }

    /// Heuristic answers must stay distinguishable from structural ones all
    /// the way into the findings file.
    fn with_confidence(message: String, confidence: Confidence) -> String {
        match confidence {
            Confidence::Structural => message,
            Confidence::Textual => format!("{} (textual match)", message),
        }
    }

    fn storage_label(&self, unit: &Unit, sym: SymbolId) -> String {
        match &self.current_function {
            Some(f) => format!("{}::{}", f, unit.symbol(sym).name),
            None => unit.symbol(sym).name.clone(),
        }
    }

    fn source_label(name: &str) -> String {
        format!("{}()", name)
    }

    fn push_finding(
        &mut self,
        unit: &Unit,
        severity: Severity,
        message: String,
        primary_text: &str,
        line: u32,
    ) {
        let function = match &self.current_function {
            Some(f) => f.clone(),
            None => {
                error!("finding emitted outside any function"; "message" => &message);
                return;
            }
        };
        let offset = match self.tracker.function_start_line(&function) {
            Some(start) => line.saturating_sub(start),
            None => {
                error!("no recorded start line for the current function"; "function" => &function);
                0
            }
        };
        let fingerprint = findings::fingerprint(primary_text, offset);
        info!("finding";
              "severity" => %severity,
              "message" => &message,
              "file" => &unit.path,
              "line" => line,
              "function" => &function);
        self.findings.push(Finding {
            severity,
            fingerprint,
            file: unit.path.clone(),
            line,
            function,
            message,
        });
    }

    /// The tainted symbols an expression reads from, for graph edges.
    fn tainted_symbols_in(&self, unit: &Unit, e: ExprId) -> Vec<SymbolId> {
        fn walk(unit: &Unit, tracker: &TaintTracker, e: ExprId, out: &mut Vec<SymbolId>) {
            match &unit.expr(e).kind {
                ExprKind::Symbol { sym } => {
                    if tracker.is_tainted(*sym) && !out.contains(sym) {
                        out.push(*sym);
                    }
                }
                ExprKind::Literal { .. } | ExprKind::Opaque { .. } | ExprKind::Call { .. } => {}
                ExprKind::Deref { operand }
                | ExprKind::Unary { operand, .. }
                | ExprKind::Cast { operand, .. } => walk(unit, tracker, *operand, out),
                ExprKind::Member { base, .. } => walk(unit, tracker, *base, out),
                ExprKind::Binary { lhs, rhs, .. }
                | ExprKind::Assign { lhs, rhs, .. }
                | ExprKind::Comma { lhs, rhs } => {
                    walk(unit, tracker, *lhs, out);
                    walk(unit, tracker, *rhs, out);
                }
                ExprKind::Conditional {
                    cond,
                    then_val,
                    else_val,
                } => {
                    walk(unit, tracker, *cond, out);
                    walk(unit, tracker, *then_val, out);
                    walk(unit, tracker, *else_val, out);
                }
            }
        }
        let mut out = vec![];
        walk(unit, &self.tracker, e, &mut out);
        out
    }

    fn record_propagation(&mut self, unit: &Unit, from: ExprId, to: SymbolId) {
        let to_label = self.storage_label(unit, to);
        for sym in self.tainted_symbols_in(unit, from) {
            let from_label = self.storage_label(unit, sym);
            self.graph
                .record_flow(from_label, to_label.clone(), FlowKind::Propagation);
        }
    }

    /// Taint reached `sym` through an assignment or initializer: mark it,
    /// and report the propagation.
    fn propagate_into_symbol(
        &mut self,
        unit: &Unit,
        sym: SymbolId,
        from: ExprId,
        confidence: Confidence,
        line: u32,
    ) {
        let local = self.tracker.is_local_scope(sym);
        if local {
            self.tracker.mark_tainted(sym);
        }
        self.record_propagation(unit, from, sym);
        let symbol = unit.symbol(sym);
        if symbol.is_synthesized() {
            // Compiler temporaries carry taint onward but are not worth a
            // report of their own.
            return;
        }
        let severity = if local {
            Severity::Warning
        } else {
            Severity::Error
        };
        let message = if local {
            format!("tainted value assigned to '{}'", symbol.name)
        } else {
            format!("tainted value escapes through '{}'", symbol.name)
        };
        self.push_finding(
            unit,
            severity,
            Self::with_confidence(message, confidence),
            &symbol.name,
            line,
        );
    }

    /// Taint reached a structure member. The base symbol keys all later
    /// member-taint queries, so the taint attaches there.
    fn propagate_into_member(
        &mut self,
        unit: &Unit,
        base: SymbolId,
        member: ExprId,
        from: ExprId,
        arrow: bool,
        confidence: Confidence,
        line: u32,
    ) {
        let local = self.tracker.is_local_scope(base);
        if local {
            self.tracker.mark_tainted(base);
        }
        self.record_propagation(unit, from, base);
        let rendered = unit.render_expr(member);
        // An arrow store lands in whatever the base points at, which is not
        // this frame's storage.
        let stays_local = local && !arrow;
        let severity = if stays_local {
            Severity::Warning
        } else {
            Severity::Error
        };
        let message = if stays_local {
            format!("tainted value assigned to '{}'", rendered)
        } else {
            format!("tainted value escapes through '{}'", rendered)
        };
        self.push_finding(
            unit,
            severity,
            Self::with_confidence(message, confidence),
            &rendered,
            line,
        );
    }
}

impl FunctionListener for HostInputCheck {
    fn enter_function(&mut self, unit: &Unit, f: FuncId) {
        let function = unit.function(f);
        self.tracker.reset();
        self.current_function = Some(function.name.clone());
        let func_sym = unit
            .symbols
            .iter()
            .position(|s| s.storage == Storage::Func && s.name == function.name)
            .map(SymbolId);
        self.tracker
            .record_function_entry(func_sym, function.name.clone(), function.start_line);
        for param in unit.params_of(f) {
            self.tracker.declare(param);
        }
    }

    fn declaration(&mut self, unit: &Unit, sym: SymbolId, init: Option<ExprId>, _stmt: StmtId) {
        // Statics keep their value across calls and are never in local
        // scope.
        if unit.symbol(sym).storage == Storage::Local {
            self.tracker.declare(sym);
        }
        let init = match init {
            Some(i) => i,
            None => return,
        };
        // A call initializer is the classifier's case, not propagation.
        if matches!(
            unit.expr(unit.strip_value_wrappers(init)).kind,
            ExprKind::Call { .. }
        ) {
            return;
        }
        if let Some(confidence) = self.tainted(unit, init) {
            self.propagate_into_symbol(unit, sym, init, confidence, unit.expr(init).line);
        }
    }

    fn assignment(&mut self, unit: &Unit, assign: ExprId, _stmt: StmtId) {
        let (lhs, rhs) = match &unit.expr(assign).kind {
            ExprKind::Assign { lhs, rhs, .. } => (*lhs, *rhs),
            _ => return,
        };
        // A call right-hand side is classified at the call site instead.
        if matches!(
            unit.expr(unit.strip_value_wrappers(rhs)).kind,
            ExprKind::Call { .. }
        ) {
            return;
        }
        let confidence = match self.tainted(unit, rhs) {
            Some(c) => c,
            None => return,
        };
        let line = unit.expr(assign).line;
        let dest = unit.leftmost_operand(lhs);
        match &unit.expr(dest).kind {
            ExprKind::Symbol { sym } => {
                self.propagate_into_symbol(unit, *sym, rhs, confidence, line)
            }
            ExprKind::Member { base, arrow, .. } => {
                let arrow = *arrow;
                match &unit.expr(unit.strip_value_wrappers(*base)).kind {
                    ExprKind::Symbol { sym } => self
                        .propagate_into_member(unit, *sym, dest, rhs, arrow, confidence, line),
                    _ => {
                        trace!("tainted store to an unresolvable member";
                               "dest" => unit.render_expr(dest))
                    }
                }
            }
            _ => {
                trace!("tainted store to an unresolvable destination";
                       "dest" => unit.render_expr(dest))
            }
        }
    }

    fn call(&mut self, unit: &Unit, call: ExprId, _stmt: StmtId) {
        if CONFIG.honor_feasibility_oracle && unit.infeasible_calls.contains(&call) {
            return;
        }
        let (callee, args) = match &unit.expr(call).kind {
            ExprKind::Call { callee, args } => (*callee, args.clone()),
            _ => return,
        };
        let name = match unit.callee_name(call) {
            Some(n) => n.to_owned(),
            None => unit.render_expr(callee),
        };
        // A source-only macro's arguments are capture destinations, not
        // inputs; the statement hook handles them.
        if CATALOGUE.macro_capture_mask(&name).is_some() {
            return;
        }
        if CATALOGUE.is_safe(&name) && !CONFIG.report_args_to_safe_functions {
            return;
        }
        let benign = CATALOGUE.is_safe(&name) || CATALOGUE.is_sink(&name);
        let line = unit.expr(call).line;
        for arg in args {
            // Only plain symbols and arithmetic over them; aggregates and
            // nested calls answer elsewhere.
            let eligible = matches!(
                unit.expr(unit.strip_value_wrappers(arg)).kind,
                ExprKind::Symbol { .. } | ExprKind::Binary { .. }
            );
            if !eligible {
                continue;
            }
            if let Some(confidence) = self.tainted(unit, arg) {
                let severity = if benign {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                let message =
                    Self::with_confidence(format!("tainted value passed to '{}'", name), confidence);
                let rendered = unit.render_expr(arg);
                self.push_finding(unit, severity, message, &rendered, line);
            }
        }
    }

    fn source_call(&mut self, unit: &Unit, call: ExprId, stmt: StmtId) {
        let diagnosis = CallSiteClassifier::new(unit, &mut self.tracker).classify(call, stmt);
        let Diagnosis {
            severity,
            message,
            primary_text,
            line,
            marked,
        } = match diagnosis {
            Some(d) => d,
            None => return,
        };
        if let (Some(sym), Some(name)) = (marked, unit.callee_name(call)) {
            let to = self.storage_label(unit, sym);
            self.graph
                .record_flow(Self::source_label(name), to, FlowKind::Source);
        }
        self.push_finding(unit, severity, message, &primary_text, line);
    }

    fn function_return(&mut self, unit: &Unit, value: Option<ExprId>, _stmt: StmtId) {
        let value = match value {
            Some(v) => v,
            None => return,
        };
        if let Some(confidence) = self.tainted(unit, value) {
            let rendered = unit.render_expr(value);
            self.push_finding(
                unit,
                Severity::Error,
                Self::with_confidence("tainted value returned".to_owned(), confidence),
                &rendered,
                unit.expr(value).line,
            );
        }
    }

    fn statement(&mut self, unit: &Unit, stmt: StmtId) {
        // rdmsr()-style macros capture their destinations by name. Macro
        // bodies never appear in the traversal, so the capture site is the
        // only place their taint can attach.
        let expr = match &unit.stmt(stmt).kind {
            StmtKind::Expression { expr } => *expr,
            _ => return,
        };
        let top = unit.strip_value_wrappers(expr);
        let (name, args) = match (unit.callee_name(top), &unit.expr(top).kind) {
            (Some(n), ExprKind::Call { args, .. }) => (n.to_owned(), args.clone()),
            _ => return,
        };
        let mask = match CATALOGUE.macro_capture_mask(&name) {
            Some(m) => m,
            None => return,
        };
        for position in mask_arg_positions(mask) {
            let arg = match args.get(position - 1) {
                Some(a) => *a,
                None => {
                    error!("macro capture position missing at call site";
                           "macro" => &name, "argument" => position);
                    continue;
                }
            };
            if let ExprKind::Symbol { sym } = unit.expr(unit.strip_value_wrappers(arg)).kind {
                debug!("macro capture taints symbol";
                       "macro" => &name, "symbol" => &unit.symbol(sym).name);
                self.tracker.mark_tainted(sym);
                let to = self.storage_label(unit, sym);
                self.graph
                    .record_flow(Self::source_label(&name), to, FlowKind::Source);
            }
        }
    }

    fn loop_header(&mut self, unit: &Unit, cond: ExprId, _stmt: StmtId) {
        if let Some(confidence) = self.tainted(unit, cond) {
            let rendered = unit.render_expr(cond);
            self.push_finding(
                unit,
                Severity::Error,
                Self::with_confidence("tainted value controls a loop".to_owned(), confidence),
                &rendered,
                unit.expr(cond).line,
            );
        }
    }

    fn exit_function(&mut self, unit: &Unit, f: FuncId) {
        debug!("function scan complete";
               "function" => &unit.function(f).name,
               "tainted_symbols" => self.tracker.tainted_symbols().len());
        self.current_function = None;
    }
}
