//! In-order traversal of function bodies, reported to a listener.
//!
//! The analysis is flow sensitive but single pass: the driver visits each
//! function once, in program order, evaluating expressions innermost first,
//! and invokes the listener at every point the analysis cares about. The
//! listener mutates its own per-function state as the callbacks arrive.

use crate::ast::{ExprId, ExprKind, FuncId, StmtId, StmtKind, SymbolId, Unit};
use crate::catalogue::CATALOGUE;

/// The callbacks a function-body analysis receives from [`TraversalDriver`].
///
/// Invocation order within one function is fixed: `enter_function`, then the
/// body's statements in program order (each statement's `statement` callback
/// before its children, expressions evaluated innermost first), then
/// `exit_function`.
pub trait FunctionListener {
    /// The traversal is entering `f`. Parameter symbols are available via
    /// [`Unit::params_of`].
    fn enter_function(&mut self, unit: &Unit, f: FuncId);
    /// A local declaration statement, before its initializer is walked.
    fn declaration(&mut self, unit: &Unit, sym: SymbolId, init: Option<ExprId>, stmt: StmtId);
    /// An assignment expression, after both of its operands were walked.
    fn assignment(&mut self, unit: &Unit, assign: ExprId, stmt: StmtId);
    /// Any call expression, after its arguments were walked.
    fn call(&mut self, unit: &Unit, call: ExprId, stmt: StmtId);
    /// A call to a cataloged source function, right after its `call` callback.
    fn source_call(&mut self, unit: &Unit, call: ExprId, stmt: StmtId);
    /// A return statement, after its value expression was walked.
    fn function_return(&mut self, unit: &Unit, value: Option<ExprId>, stmt: StmtId);
    /// Every statement, before its children.
    fn statement(&mut self, unit: &Unit, stmt: StmtId);
    /// A loop condition, at its evaluation point in program order: an entry
    /// condition after the loop pre-statement, an exit condition after the
    /// body.
    fn loop_header(&mut self, unit: &Unit, cond: ExprId, stmt: StmtId);
    /// The traversal is leaving `f`.
    fn exit_function(&mut self, unit: &Unit, f: FuncId);
}

/// Drives a [`FunctionListener`] over the functions of a [`Unit`].
pub struct TraversalDriver<'a, L: FunctionListener> {
    unit: &'a Unit,
    listener: &'a mut L,
}

impl<'a, L: FunctionListener> TraversalDriver<'a, L> {
    pub fn new(unit: &'a Unit, listener: &'a mut L) -> Self {
        Self { unit, listener }
    }

    /// Traverse every function in the unit, in definition order.
    pub fn run(&mut self) {
        for f in 0..self.unit.functions.len() {
            self.run_function(FuncId(f));
        }
    }

    /// Traverse a single function.
    pub fn run_function(&mut self, f: FuncId) {
        self.listener.enter_function(self.unit, f);
        let body = self.unit.function(f).body;
        self.walk_stmt(body);
        self.listener.exit_function(self.unit, f);
    }

    fn walk_stmt(&mut self, s: StmtId) {
        self.listener.statement(self.unit, s);
        match &self.unit.stmt(s).kind {
            StmtKind::Expression { expr } => self.walk_expr(*expr, s),
            StmtKind::Declaration { sym, init } => {
                self.listener.declaration(self.unit, *sym, *init, s);
                if let Some(init) = init {
                    self.walk_expr(*init, s);
                }
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.walk_expr(*value, s);
                }
                self.listener.function_return(self.unit, *value, s);
            }
            StmtKind::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                let (then_stmt, else_stmt) = (*then_stmt, *else_stmt);
                self.walk_expr(*cond, s);
                self.walk_stmt(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.walk_stmt(else_stmt);
                }
            }
            StmtKind::Switch { cond, body } => {
                let body = *body;
                self.walk_expr(*cond, s);
                self.walk_stmt(body);
            }
            StmtKind::Loop {
                pre_stmt,
                pre_cond,
                post_cond,
                post_stmt,
                body,
            } => {
                let (pre_stmt, pre_cond, post_cond, post_stmt, body) =
                    (*pre_stmt, *pre_cond, *post_cond, *post_stmt, *body);
                if let Some(pre_stmt) = pre_stmt {
                    self.walk_stmt(pre_stmt);
                }
                if let Some(pre_cond) = pre_cond {
                    self.walk_expr(pre_cond, s);
                    self.listener.loop_header(self.unit, pre_cond, s);
                }
                self.walk_stmt(body);
                if let Some(post_stmt) = post_stmt {
                    self.walk_stmt(post_stmt);
                }
                if let Some(post_cond) = post_cond {
                    self.walk_expr(post_cond, s);
                    self.listener.loop_header(self.unit, post_cond, s);
                }
            }
            StmtKind::Block { stmts } => {
                for child in stmts.clone() {
                    self.walk_stmt(child);
                }
            }
            StmtKind::Other { .. } => {}
        }
    }

    /// Evaluation order within an expression: operands first, then the
    /// operation itself. This makes nested reads dispatch before the calls
    /// and assignments that consume them.
    fn walk_expr(&mut self, e: ExprId, enclosing: StmtId) {
        match &self.unit.expr(e).kind {
            ExprKind::Symbol { .. } | ExprKind::Literal { .. } | ExprKind::Opaque { .. } => {}
            ExprKind::Deref { operand }
            | ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. } => self.walk_expr(*operand, enclosing),
            ExprKind::Member { base, .. } => self.walk_expr(*base, enclosing),
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Comma { lhs, rhs } => {
                let (lhs, rhs) = (*lhs, *rhs);
                self.walk_expr(lhs, enclosing);
                self.walk_expr(rhs, enclosing);
            }
            ExprKind::Assign { lhs, rhs, .. } => {
                let (lhs, rhs) = (*lhs, *rhs);
                self.walk_expr(lhs, enclosing);
                self.walk_expr(rhs, enclosing);
                self.listener.assignment(self.unit, e, enclosing);
            }
            ExprKind::Conditional {
                cond,
                then_val,
                else_val,
            } => {
                let (cond, then_val, else_val) = (*cond, *then_val, *else_val);
                self.walk_expr(cond, enclosing);
                self.walk_expr(then_val, enclosing);
                self.walk_expr(else_val, enclosing);
            }
            ExprKind::Call { args, .. } => {
                for arg in args.clone() {
                    self.walk_expr(arg, enclosing);
                }
                self.listener.call(self.unit, e, enclosing);
                let cataloged = self
                    .unit
                    .callee_name(e)
                    .map_or(false, |n| CATALOGUE.source_info(n).is_some());
                if cataloged {
                    self.listener.source_call(self.unit, e, enclosing);
                }
            }
        }
    }
}
