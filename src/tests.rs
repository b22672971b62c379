//! Fixtures and tests for the host-input scan.
//!
//! Fixtures build lifted units programmatically, mirroring the C snippet
//! named in each comment. Tests assert finding counts, severities, message
//! fragments, fingerprints, and post-scan tracker state.

use crate::ast::{
    AssignOp, ExprId, ExprKind, FuncId, Storage, StmtId, StmtKind, SymbolId, TypeClass, TypeId,
    Unit,
};

#[cfg(test)]
use crate::ast::{BinOp, UnOp};
#[cfg(test)]
use crate::findings::{fingerprint, FindingsFile, Parseable, Severity};
#[cfg(test)]
use crate::host_input_check::HostInputCheck;

/// Scaffolding for a unit with one function under scan: the usual types plus
/// helpers that cut down on arena boilerplate. The function is always named
/// `probe` and is always [`FuncId`] 0.
pub struct Fixture {
    pub unit: Unit,
    pub t_int: TypeId,
    pub t_ptr: TypeId,
    pub t_struct_ptr: TypeId,
    pub t_void: TypeId,
    pub t_func: TypeId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut unit = Unit::new("drivers/virt/coco/fixture.c");
        let t_int = unit.add_type(TypeClass::Int, "int");
        let t_ptr = unit.add_type(TypeClass::Ptr, "void *");
        let t_struct_ptr = unit.add_type(TypeClass::Ptr, "struct dev_state *");
        let t_void = unit.add_type(TypeClass::Void, "void");
        let t_func = unit.add_type(TypeClass::Other, "function");
        Self {
            unit,
            t_int,
            t_ptr,
            t_struct_ptr,
            t_void,
            t_func,
        }
    }

    pub fn param(&mut self, name: &str, ty: TypeId) -> SymbolId {
        self.unit.add_symbol(name, Storage::Param, ty, Some(FuncId(0)))
    }

    pub fn local(&mut self, name: &str, ty: TypeId) -> SymbolId {
        self.unit.add_symbol(name, Storage::Local, ty, Some(FuncId(0)))
    }

    pub fn global(&mut self, name: &str, ty: TypeId) -> SymbolId {
        self.unit.add_symbol(name, Storage::Global, ty, None)
    }

    pub fn sym(&mut self, sym: SymbolId, line: u32) -> ExprId {
        self.unit.add_expr(line, ExprKind::Symbol { sym })
    }

    pub fn lit(&mut self, value: i128, line: u32) -> ExprId {
        self.unit.add_expr(line, ExprKind::Literal { value })
    }

    /// A direct call through a fresh `Func` symbol named `name`.
    pub fn call(&mut self, name: &str, args: Vec<ExprId>, line: u32) -> ExprId {
        let t_func = self.t_func;
        let callee_sym = self.unit.add_symbol(name, Storage::Func, t_func, None);
        let callee = self.unit.add_expr(line, ExprKind::Symbol { sym: callee_sym });
        self.unit.add_expr(line, ExprKind::Call { callee, args })
    }

    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId, line: u32) -> ExprId {
        self.unit.add_expr(
            line,
            ExprKind::Assign {
                op: AssignOp::Plain,
                lhs,
                rhs,
            },
        )
    }

    pub fn expr_stmt(&mut self, expr: ExprId, line: u32) -> StmtId {
        self.unit.add_stmt(line, StmtKind::Expression { expr })
    }

    pub fn decl_stmt(&mut self, sym: SymbolId, init: Option<ExprId>, line: u32) -> StmtId {
        self.unit.add_stmt(line, StmtKind::Declaration { sym, init })
    }

    /// Wrap `stmts` in a block and register it as the body of `probe`,
    /// starting at line 10.
    pub fn finish(self, stmts: Vec<StmtId>) -> Unit {
        self.finish_at(stmts, 10)
    }

    /// Like [`Self::finish`], with an explicit function start line.
    pub fn finish_at(mut self, stmts: Vec<StmtId>, start_line: u32) -> Unit {
        let body = self.unit.add_stmt(start_line + 1, StmtKind::Block { stmts });
        self.unit.add_function("probe", start_line, body);
        if let Err(why) = self.unit.try_confirm_valid() {
            panic!("fixture failed cross-reference validation: {}", why);
        }
        self.unit
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// `int v; v = readl(addr);` in a function starting at `base` — the
/// canonical warning-severity read. Returns the unit, `v`, and the call
/// expression.
pub fn local_int_read_at(base: u32) -> (Unit, SymbolId, ExprId) {
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let v = fx.local("v", fx.t_int);
    let decl = fx.decl_stmt(v, None, base + 2);
    let addr_ref = fx.sym(addr, base + 3);
    let read = fx.call("readl", vec![addr_ref], base + 3);
    let v_ref = fx.sym(v, base + 3);
    let assign = fx.assign(v_ref, read, base + 3);
    let stmt = fx.expr_stmt(assign, base + 3);
    (fx.finish_at(vec![decl, stmt], base), v, read)
}

/// The exported form of:
///
/// ```c
/// static int probe(void *addr)     /* line 3 */
/// {
///     int v;                       /* line 5 */
///     v = readl(addr);             /* line 6 */
///     return v;                    /* line 7 */
/// }
/// ```
pub const EXPORTED_PROBE: &str = "SPARSE_AST\n\n\
    UNIT\ndrivers/virt/coco/probe.c\n\n\
    TYPES\n0\tint\tint\n1\tptr\tvoid *\n2\tother\tfunction\n\n\
    SYMBOLS\n0\tprobe\tfunc\t2\t-\n1\taddr\tparam\t1\t0\n2\tv\tlocal\t0\t0\n3\treadl\tfunc\t2\t-\n\n\
    EXPRS\n0\t6\tsym\t2\n1\t6\tsym\t3\n2\t6\tsym\t1\n3\t6\tcall\t1\t1\t2\n4\t6\tassign\t=\t0\t3\n5\t7\tsym\t2\n\n\
    STMTS\n0\t5\tdecl\t2\t-\n1\t6\texpr\t4\n2\t7\tret\t5\n3\t4\tblock\t3\t0\t1\t2\n\n\
    FUNCTIONS\n0\tprobe\t3\t3\n";

#[test]
fn local_int_destination_is_warning() {
    let (unit, v, _) = local_int_read_at(10);
    let check = HostInputCheck::scan(&unit);
    let findings = check.findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("stored in 'v'"));
    assert!(check.tracker().is_tainted(v));
}

#[test]
fn pointer_destination_is_error() {
    // char *p; p = readq(addr);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let p = fx.local("p", fx.t_ptr);
    let decl = fx.decl_stmt(p, None, 12);
    let addr_ref = fx.sym(addr, 13);
    let read = fx.call("readq", vec![addr_ref], 13);
    let p_ref = fx.sym(p, 13);
    let assign = fx.assign(p_ref, read, 13);
    let stmt = fx.expr_stmt(assign, 13);
    let unit = fx.finish(vec![decl, stmt]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("stored in 'p'"));
}

#[test]
fn escaping_destination_is_error_regardless_of_type() {
    // g = readl(addr); with g a file-scope int
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let g = fx.global("g", fx.t_int);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let g_ref = fx.sym(g, 12);
    let assign = fx.assign(g_ref, read, 12);
    let stmt = fx.expr_stmt(assign, 12);
    let unit = fx.finish(vec![stmt]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("escapes through 'g'"));
}

#[test]
fn taint_is_transitive_through_assignment() {
    // int a; int b; a = readl(addr); b = a + 1;
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let a = fx.local("a", fx.t_int);
    let b = fx.local("b", fx.t_int);
    let decl_a = fx.decl_stmt(a, None, 12);
    let decl_b = fx.decl_stmt(b, None, 13);
    let addr_ref = fx.sym(addr, 14);
    let read = fx.call("readl", vec![addr_ref], 14);
    let a_ref = fx.sym(a, 14);
    let read_assign = fx.assign(a_ref, read, 14);
    let s1 = fx.expr_stmt(read_assign, 14);
    let a_ref2 = fx.sym(a, 15);
    let one = fx.lit(1, 15);
    let sum = fx.unit.add_expr(
        15,
        ExprKind::Binary {
            op: BinOp::Add,
            lhs: a_ref2,
            rhs: one,
        },
    );
    let b_ref = fx.sym(b, 15);
    let sum_assign = fx.assign(b_ref, sum, 15);
    let s2 = fx.expr_stmt(sum_assign, 15);
    let unit = fx.finish(vec![decl_a, decl_b, s1, s2]);

    let check = HostInputCheck::scan(&unit);
    assert!(check.tracker().is_tainted(a));
    assert!(check.tracker().is_tainted(b));
    let findings = check.findings();
    assert_eq!(findings.len(), 2, "{:#?}", findings);
    assert_eq!(findings[1].severity, Severity::Warning);
    assert!(findings[1].message.contains("tainted value assigned to 'b'"));
}

/// `int v; v = cpuid_eax(leaf);` with the leaf either a constant or an
/// `int` parameter.
#[cfg(test)]
fn cpuid_eax_unit(leaf: Option<i128>) -> Unit {
    let mut fx = Fixture::new();
    let n = fx.param("n", fx.t_int);
    let v = fx.local("v", fx.t_int);
    let decl = fx.decl_stmt(v, None, 12);
    let leaf = match leaf {
        Some(value) => fx.lit(value, 13),
        None => fx.sym(n, 13),
    };
    let read = fx.call("cpuid_eax", vec![leaf], 13);
    let v_ref = fx.sym(v, 13);
    let assign = fx.assign(v_ref, read, 13);
    let stmt = fx.expr_stmt(assign, 13);
    fx.finish(vec![decl, stmt])
}

#[test]
fn cpuid_vendor_leaf_is_never_flagged() {
    let unit = cpuid_eax_unit(Some(0x0));
    let findings = HostInputCheck::scan(&unit).into_findings();
    assert!(findings.is_empty(), "{:#?}", findings);
}

#[test]
fn cpuid_untrusted_leaf_is_always_flagged() {
    let unit = cpuid_eax_unit(Some(0x4));
    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("stored in 'v'"));
}

#[test]
fn cpuid_non_constant_leaf_is_flagged_conservatively() {
    let unit = cpuid_eax_unit(None);
    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
}

#[test]
fn cpuid_hypervisor_range_excludes_identification_leaves() {
    use crate::catalogue::CATALOGUE;
    assert!(!CATALOGUE.cpuid_leaf_flagged(Some(0x0)));
    assert!(!CATALOGUE.cpuid_leaf_flagged(Some(0x4000_0000)));
    assert!(!CATALOGUE.cpuid_leaf_flagged(Some(0x4000_0001)));
    assert!(CATALOGUE.cpuid_leaf_flagged(Some(0x4000_0002)));
    assert!(CATALOGUE.cpuid_leaf_flagged(Some(0x4)));
    assert!(CATALOGUE.cpuid_leaf_flagged(None));
}

#[test]
fn read_returned_directly_is_a_single_error() {
    // return readl(addr);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let ret = fx.unit.add_stmt(12, StmtKind::Return { value: Some(read) });
    let unit = fx.finish(vec![ret]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("returned directly"));
}

#[test]
fn read_returned_within_a_larger_expression() {
    // return readl(addr) + 1;
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let one = fx.lit(1, 12);
    let sum = fx.unit.add_expr(
        12,
        ExprKind::Binary {
            op: BinOp::Add,
            lhs: read,
            rhs: one,
        },
    );
    let ret = fx.unit.add_stmt(12, StmtKind::Return { value: Some(sum) });
    let unit = fx.finish(vec![ret]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("returned within a larger expression"));
}

#[test]
fn out_parameter_source_references_its_destination() {
    // char *buf; memcpy_fromio(buf, src, n);
    let mut fx = Fixture::new();
    let src = fx.param("src", fx.t_ptr);
    let n = fx.param("n", fx.t_int);
    let buf = fx.local("buf", fx.t_ptr);
    let decl = fx.decl_stmt(buf, None, 12);
    let buf_ref = fx.sym(buf, 13);
    let src_ref = fx.sym(src, 13);
    let n_ref = fx.sym(n, 13);
    let read = fx.call("memcpy_fromio", vec![buf_ref, src_ref, n_ref], 13);
    let stmt = fx.expr_stmt(read, 13);
    let unit = fx.finish(vec![decl, stmt]);

    let check = HostInputCheck::scan(&unit);
    let findings = check.findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("'buf'"));
    assert!(check.tracker().is_tainted(buf));
}

#[test]
fn member_store_is_an_error() {
    // struct dev_state *p; p->residue = readq(addr);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let p = fx.local("p", fx.t_struct_ptr);
    let decl = fx.decl_stmt(p, None, 12);
    let p_ref = fx.sym(p, 13);
    let member = fx.unit.add_expr(
        13,
        ExprKind::Member {
            base: p_ref,
            field: "residue".into(),
            arrow: true,
        },
    );
    let addr_ref = fx.sym(addr, 13);
    let read = fx.call("readq", vec![addr_ref], 13);
    let assign = fx.assign(member, read, 13);
    let stmt = fx.expr_stmt(assign, 13);
    let unit = fx.finish(vec![decl, stmt]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("member of the structure"));
    assert!(findings[0].message.contains("p->residue"));
}

#[test]
fn infeasible_call_site_yields_no_findings() {
    let (mut unit, _, read) = local_int_read_at(10);
    unit.infeasible_calls.insert(read);
    let findings = HostInputCheck::scan(&unit).into_findings();
    assert!(findings.is_empty(), "{:#?}", findings);
}

#[test]
fn multi_out_parameter_read_reports_once() {
    // cpuid(0x4, &eax, &ebx, &ecx, &edx);
    let mut fx = Fixture::new();
    let regs: Vec<SymbolId> = ["eax", "ebx", "ecx", "edx"]
        .into_iter()
        .map(|name| fx.local(name, fx.t_int))
        .collect();
    let mut stmts: Vec<StmtId> = regs
        .iter()
        .map(|&sym| fx.decl_stmt(sym, None, 12))
        .collect();
    let leaf = fx.lit(0x4, 13);
    let mut args = vec![leaf];
    for &sym in &regs {
        let r = fx.sym(sym, 13);
        args.push(fx.unit.add_expr(
            13,
            ExprKind::Unary {
                op: UnOp::AddressOf,
                operand: r,
            },
        ));
    }
    let read = fx.call("cpuid", args, 13);
    stmts.push(fx.expr_stmt(read, 13));
    let unit = fx.finish(stmts);

    let check = HostInputCheck::scan(&unit);
    let findings = check.findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("arguments 2, 3, 4, 5"));
    // Combined findings perform no per-argument destination tracking.
    for &sym in &regs {
        assert!(!check.tracker().is_tainted(sym));
    }
}

#[test]
fn macro_capture_taints_its_destination() {
    // u64 val; u64 low; rdmsrl(MSR_EFER, val); low = val;
    let mut fx = Fixture::new();
    let val = fx.local("val", fx.t_int);
    let low = fx.local("low", fx.t_int);
    let decl_val = fx.decl_stmt(val, None, 12);
    let decl_low = fx.decl_stmt(low, None, 13);
    let msr = fx.lit(0xc000_0080, 14);
    let val_ref = fx.sym(val, 14);
    let capture = fx.call("rdmsrl", vec![msr, val_ref], 14);
    let s1 = fx.expr_stmt(capture, 14);
    let val_ref2 = fx.sym(val, 15);
    let low_ref = fx.sym(low, 15);
    let assign = fx.assign(low_ref, val_ref2, 15);
    let s2 = fx.expr_stmt(assign, 15);
    let unit = fx.finish(vec![decl_val, decl_low, s1, s2]);

    let check = HostInputCheck::scan(&unit);
    assert!(check.tracker().is_tainted(val));
    assert!(check.tracker().is_tainted(low));
    let findings = check.findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("tainted value assigned to 'low'"));
}

#[test]
fn tainted_arguments_name_the_callee() {
    // int v; v = readl(addr); printk(v); parse_caps(v);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let v = fx.local("v", fx.t_int);
    let decl = fx.decl_stmt(v, None, 12);
    let addr_ref = fx.sym(addr, 13);
    let read = fx.call("readl", vec![addr_ref], 13);
    let v_ref = fx.sym(v, 13);
    let assign = fx.assign(v_ref, read, 13);
    let s1 = fx.expr_stmt(assign, 13);
    let v_ref2 = fx.sym(v, 14);
    let print = fx.call("printk", vec![v_ref2], 14);
    let s2 = fx.expr_stmt(print, 14);
    let v_ref3 = fx.sym(v, 15);
    let consume = fx.call("parse_caps", vec![v_ref3], 15);
    let s3 = fx.expr_stmt(consume, 15);
    let unit = fx.finish(vec![decl, s1, s2, s3]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 3, "{:#?}", findings);
    assert_eq!(findings[1].severity, Severity::Warning);
    assert!(findings[1].message.contains("passed to 'printk'"));
    assert_eq!(findings[2].severity, Severity::Error);
    assert!(findings[2].message.contains("passed to 'parse_caps'"));
}

#[test]
fn textual_fallback_is_marked_heuristic() {
    // int v; int cfg; v = readl(addr); cfg = <unparsable using v>;
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let v = fx.local("v", fx.t_int);
    let cfg = fx.local("cfg", fx.t_int);
    let decl_v = fx.decl_stmt(v, None, 12);
    let decl_cfg = fx.decl_stmt(cfg, None, 13);
    let addr_ref = fx.sym(addr, 14);
    let read = fx.call("readl", vec![addr_ref], 14);
    let v_ref = fx.sym(v, 14);
    let read_assign = fx.assign(v_ref, read, 14);
    let s1 = fx.expr_stmt(read_assign, 14);
    let opaque = fx.unit.add_expr(
        15,
        ExprKind::Opaque {
            text: "v ^ rotate".into(),
        },
    );
    let cfg_ref = fx.sym(cfg, 15);
    let assign = fx.assign(cfg_ref, opaque, 15);
    let s2 = fx.expr_stmt(assign, 15);
    let unit = fx.finish(vec![decl_v, decl_cfg, s1, s2]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 2, "{:#?}", findings);
    assert_eq!(findings[1].severity, Severity::Warning);
    assert!(findings[1].message.contains("(textual match)"));
}

#[test]
fn void_discard_is_an_empty_read() {
    // (void)readl(addr);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let t_void = fx.t_void;
    let cast = fx.unit.add_expr(
        12,
        ExprKind::Cast {
            ty: t_void,
            operand: read,
        },
    );
    let stmt = fx.expr_stmt(cast, 12);
    let unit = fx.finish(vec![stmt]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("empty read"));
}

#[test]
fn unassigned_read_is_a_no_assignment_warning() {
    // readl(addr);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let stmt = fx.expr_stmt(read, 12);
    let unit = fx.finish(vec![stmt]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("no assignment"));
}

#[test]
fn read_in_a_condition_is_a_warning() {
    // if (readl(addr)) { }
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let then_stmt = fx.unit.add_stmt(12, StmtKind::Block { stmts: vec![] });
    let branch = fx.unit.add_stmt(
        12,
        StmtKind::If {
            cond: read,
            then_stmt,
            else_stmt: None,
        },
    );
    let unit = fx.finish(vec![branch]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("condition"));
}

#[test]
fn loop_comparison_isolates_the_bound_symbol() {
    // int i; while (i < readl(addr)) { }
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let i = fx.local("i", fx.t_int);
    let decl = fx.decl_stmt(i, None, 12);
    let i_ref = fx.sym(i, 13);
    let addr_ref = fx.sym(addr, 13);
    let read = fx.call("readl", vec![addr_ref], 13);
    let cond = fx.unit.add_expr(
        13,
        ExprKind::Binary {
            op: BinOp::Lt,
            lhs: i_ref,
            rhs: read,
        },
    );
    let body = fx.unit.add_stmt(13, StmtKind::Block { stmts: vec![] });
    let header = fx.unit.add_stmt(
        13,
        StmtKind::Loop {
            pre_stmt: None,
            pre_cond: Some(cond),
            post_cond: None,
            post_stmt: None,
            body,
        },
    );
    let unit = fx.finish(vec![decl, header]);

    let check = HostInputCheck::scan(&unit);
    assert!(check.tracker().is_tainted(i));
    let findings = check.findings();
    assert_eq!(findings.len(), 2, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("stored in 'i'"));
    assert_eq!(findings[1].severity, Severity::Error);
    assert!(findings[1].message.contains("controls a loop"));
}

#[test]
fn unbound_read_in_a_loop_header_is_an_error() {
    // while (readl(addr)) { }
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let body = fx.unit.add_stmt(12, StmtKind::Block { stmts: vec![] });
    let header = fx.unit.add_stmt(
        12,
        StmtKind::Loop {
            pre_stmt: None,
            pre_cond: Some(read),
            post_cond: None,
            post_stmt: None,
            body,
        },
    );
    let unit = fx.finish(vec![header]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("controls a loop"));
}

#[test]
fn read_passed_to_a_sink_is_a_warning() {
    // outb(inb(port), port);
    let mut fx = Fixture::new();
    let port = fx.param("port", fx.t_int);
    let port_ref = fx.sym(port, 12);
    let inner = fx.call("inb", vec![port_ref], 12);
    let port_ref2 = fx.sym(port, 12);
    let outer = fx.call("outb", vec![inner, port_ref2], 12);
    let stmt = fx.expr_stmt(outer, 12);
    let unit = fx.finish(vec![stmt]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("passed directly to 'outb'"));
}

#[test]
fn read_passed_to_an_unknown_callee_is_an_error() {
    // parse_caps(readl(addr));
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let outer = fx.call("parse_caps", vec![read], 12);
    let stmt = fx.expr_stmt(outer, 12);
    let unit = fx.finish(vec![stmt]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(findings[0].message.contains("passed directly to 'parse_caps'"));
}

#[test]
fn declaration_initializer_is_classified() {
    // int v = readl(addr);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let v = fx.local("v", fx.t_int);
    let addr_ref = fx.sym(addr, 12);
    let read = fx.call("readl", vec![addr_ref], 12);
    let decl = fx.decl_stmt(v, Some(read), 12);
    let unit = fx.finish(vec![decl]);

    let check = HostInputCheck::scan(&unit);
    let findings = check.findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("stored in 'v'"));
    assert!(check.tracker().is_tainted(v));
}

#[test]
fn malformed_call_site_does_not_stop_the_scan() {
    // memcpy_fromio(); v = readl(addr);
    let mut fx = Fixture::new();
    let addr = fx.param("addr", fx.t_ptr);
    let v = fx.local("v", fx.t_int);
    let broken = fx.call("memcpy_fromio", vec![], 12);
    let s1 = fx.expr_stmt(broken, 12);
    let decl = fx.decl_stmt(v, None, 13);
    let addr_ref = fx.sym(addr, 14);
    let read = fx.call("readl", vec![addr_ref], 14);
    let v_ref = fx.sym(v, 14);
    let assign = fx.assign(v_ref, read, 14);
    let s2 = fx.expr_stmt(assign, 14);
    let unit = fx.finish(vec![s1, decl, s2]);

    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 1, "{:#?}", findings);
    assert!(findings[0].message.contains("stored in 'v'"));
}

#[test]
fn fingerprint_depends_on_text_and_offset_only() {
    assert_eq!(fingerprint("v", 3), fingerprint("v", 3));
    assert_ne!(fingerprint("v", 3), fingerprint("v", 4));
    assert_ne!(fingerprint("v", 3), fingerprint("w", 3));
}

#[test]
fn unstable_tokens_hash_as_fixed_text() {
    assert_eq!(fingerprint("__cctmp4 + x", 7), fingerprint("__cctmp9 + y", 7));
    assert_eq!(fingerprint("__anon_struct_12", 7), fingerprint("__cctmp0", 7));
    assert_ne!(fingerprint("__cctmp4 + x", 7), fingerprint("__cctmp4 + x", 8));
}

#[test]
fn fingerprints_survive_whole_function_shifts() {
    let (near, _, _) = local_int_read_at(10);
    let (far, _, _) = local_int_read_at(110);
    let near = HostInputCheck::scan(&near).into_findings();
    let far = HostInputCheck::scan(&far).into_findings();
    assert_eq!(near.len(), 1);
    assert_eq!(far.len(), 1);
    assert_ne!(near[0].line, far[0].line);
    assert_eq!(near[0].fingerprint, far[0].fingerprint);
}

#[test]
fn lifts_an_exported_unit() {
    let unit = crate::sparse_lifter::lift_from(EXPORTED_PROBE);
    assert_eq!(unit.path, "drivers/virt/coco/probe.c");
    assert_eq!(unit.types.len(), 3);
    assert_eq!(unit.symbols.len(), 4);
    assert_eq!(unit.functions.len(), 1);
    assert_eq!(unit.functions[0].name, "probe");
    assert_eq!(unit.functions[0].start_line, 3);
    assert!(unit.try_confirm_valid().is_ok());
    assert_eq!(unit.render_expr(ExprId(4)), "v = readl(addr)");
}

#[test]
fn scans_a_lifted_unit() {
    let unit = crate::sparse_lifter::lift_from(EXPORTED_PROBE);
    let findings = HostInputCheck::scan(&unit).into_findings();
    assert_eq!(findings.len(), 2, "{:#?}", findings);

    assert_eq!(findings[0].severity, Severity::Warning);
    assert!(findings[0].message.contains("stored in 'v'"));
    assert_eq!(findings[0].line, 6);
    assert_eq!(findings[0].fingerprint, fingerprint("v", 3));

    assert_eq!(findings[1].severity, Severity::Error);
    assert!(findings[1].message.contains("returned"));
    assert_eq!(findings[1].line, 7);
    assert_eq!(findings[1].fingerprint, fingerprint("v", 4));
}

#[test]
fn lifted_infeasible_marks_suppress_findings() {
    let exported = format!("{}\nINFEASIBLE\n3\n", EXPORTED_PROBE);
    let unit = crate::sparse_lifter::lift_from(&exported);
    let findings = HostInputCheck::scan(&unit).into_findings();
    assert!(findings.is_empty(), "{:#?}", findings);
}

#[test]
fn findings_file_round_trips() {
    let (unit, _, _) = local_int_read_at(10);
    let file = FindingsFile::new(HostInputCheck::scan(&unit).into_findings());
    let reparsed = FindingsFile::parse_from(&file.serialize()).unwrap();
    assert_eq!(file, reparsed);
}
