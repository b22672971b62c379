//! A lifter from the sparse exporter's `.sparse-ast` dump.
//!
//! The exporter plugin runs inside the sparse-based C front end after
//! semantic analysis and serializes each translation unit: type and symbol
//! tables, flat expression and statement arenas, function records, and the
//! call sites its path analysis proved unreachable. A malformed dump is a
//! tooling bug, not an analysis condition, so this module panics with a
//! descriptive message instead of degrading.

use itertools::Itertools;

use crate::ast::{
    AssignOp, BinOp, ExprId, ExprKind, FuncId, Storage, StmtId, StmtKind, SymbolId, TypeClass,
    TypeId, UnOp, Unit,
};

/// Lift a `.sparse-ast` export to a [`Unit`] the scan can run over.
pub fn lift_from(exported: &str) -> Unit {
    assert!(
        exported.starts_with("SPARSE_AST"),
        "Not a SPARSE_AST export (starts with {:?})",
        exported.lines().next()
    );

    let mut sections = exported
        .trim()
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty());
    assert_eq!(sections.next(), Some("SPARSE_AST"));

    // Sections arrive in fixed order.
    let unit_section = section(&mut sections, "UNIT");
    let types_section = section(&mut sections, "TYPES");
    let symbols_section = section(&mut sections, "SYMBOLS");
    let exprs_section = section(&mut sections, "EXPRS");
    let stmts_section = section(&mut sections, "STMTS");
    let functions_section = section(&mut sections, "FUNCTIONS");
    let infeasible_section = match sections.next() {
        Some(s) => {
            let rest = s
                .strip_prefix("INFEASIBLE")
                .unwrap_or_else(|| panic!("Expected `INFEASIBLE`, got {:?}", s.lines().next()));
            rest.lines().map(str::trim).filter(|l| !l.is_empty()).collect()
        }
        None => vec![],
    };
    if let Some(extra) = sections.next() {
        panic!("Unexpected trailing section {:?}", extra.lines().next());
    }

    let path = match &*unit_section {
        [path] => *path,
        rows => panic!("Expected exactly one source path in `UNIT`, got {:?}", rows),
    };
    let mut unit = Unit::new(path);

    for row in types_section {
        let (tid, class, display) = row
            .splitn(3, '\t')
            .collect_tuple()
            .unwrap_or_else(|| panic!("Malformed `TYPES` row {:?}", row));
        assert_eq!(
            parse_index(tid, "type"),
            unit.types.len(),
            "Type ids must be dense and in order"
        );
        let class = TypeClass::from_token(class)
            .unwrap_or_else(|| panic!("Unknown type class `{}` in {:?}", class, row));
        unit.add_type(class, display);
    }

    for row in symbols_section {
        let (sid, name, storage, tid, fid) = row
            .split('\t')
            .collect_tuple()
            .unwrap_or_else(|| panic!("Malformed `SYMBOLS` row {:?}", row));
        assert_eq!(
            parse_index(sid, "symbol"),
            unit.symbols.len(),
            "Symbol ids must be dense and in order"
        );
        let storage = Storage::from_token(storage)
            .unwrap_or_else(|| panic!("Unknown storage class `{}` in {:?}", storage, row));
        let declared_in = (fid != "-").then(|| FuncId(parse_index(fid, "function")));
        unit.add_symbol(name, storage, TypeId(parse_index(tid, "type")), declared_in);
    }

    for row in exprs_section {
        let fields: Vec<&str> = row.split('\t').collect();
        assert!(fields.len() >= 3, "Malformed `EXPRS` row {:?}", row);
        assert_eq!(
            parse_index(fields[0], "expression"),
            unit.exprs.len(),
            "Expression ids must be dense and in order"
        );
        let line = parse_line(fields[1], row);
        let kind = match (fields[2], &fields[3..]) {
            ("sym", [sym]) => ExprKind::Symbol {
                sym: SymbolId(parse_index(sym, "symbol")),
            },
            ("lit", [value]) => ExprKind::Literal {
                value: parse_int_literal(value),
            },
            ("deref", [operand]) => ExprKind::Deref {
                operand: expr_id(operand),
            },
            ("member", [base, field, access]) => ExprKind::Member {
                base: expr_id(base),
                field: (*field).to_owned(),
                arrow: match *access {
                    "arrow" => true,
                    "dot" => false,
                    t => panic!("Unknown member access `{}` in {:?}", t, row),
                },
            },
            ("unop", [op, operand]) => ExprKind::Unary {
                op: UnOp::from_token(op)
                    .unwrap_or_else(|| panic!("Unknown unary operator `{}` in {:?}", op, row)),
                operand: expr_id(operand),
            },
            ("cast", [ty, operand]) => ExprKind::Cast {
                ty: TypeId(parse_index(ty, "type")),
                operand: expr_id(operand),
            },
            ("binop", [op, lhs, rhs]) => ExprKind::Binary {
                op: BinOp::from_token(op)
                    .unwrap_or_else(|| panic!("Unknown binary operator `{}` in {:?}", op, row)),
                lhs: expr_id(lhs),
                rhs: expr_id(rhs),
            },
            ("assign", [op, lhs, rhs]) => ExprKind::Assign {
                op: AssignOp::from_token(op)
                    .unwrap_or_else(|| panic!("Unknown assignment operator `{}` in {:?}", op, row)),
                lhs: expr_id(lhs),
                rhs: expr_id(rhs),
            },
            ("cond", [cond, then_val, else_val]) => ExprKind::Conditional {
                cond: expr_id(cond),
                then_val: expr_id(then_val),
                else_val: expr_id(else_val),
            },
            ("comma", [lhs, rhs]) => ExprKind::Comma {
                lhs: expr_id(lhs),
                rhs: expr_id(rhs),
            },
            ("call", [callee, argc, args @ ..]) => {
                assert_eq!(
                    parse_index(argc, "argument count"),
                    args.len(),
                    "Argument count mismatch in {:?}",
                    row
                );
                ExprKind::Call {
                    callee: expr_id(callee),
                    args: args.iter().map(|a| expr_id(a)).collect(),
                }
            }
            // Opaque text may itself contain tabs.
            ("opaque", text) => ExprKind::Opaque {
                text: text.join("\t"),
            },
            (kind, payload) => panic!(
                "Unknown expression kind `{}` with payload {:?} in {:?}",
                kind, payload, row
            ),
        };
        unit.add_expr(line, kind);
    }

    for row in stmts_section {
        let fields: Vec<&str> = row.split('\t').collect();
        assert!(fields.len() >= 3, "Malformed `STMTS` row {:?}", row);
        assert_eq!(
            parse_index(fields[0], "statement"),
            unit.stmts.len(),
            "Statement ids must be dense and in order"
        );
        let line = parse_line(fields[1], row);
        let kind = match (fields[2], &fields[3..]) {
            ("expr", [expr]) => StmtKind::Expression {
                expr: expr_id(expr),
            },
            ("decl", [sym, init]) => StmtKind::Declaration {
                sym: SymbolId(parse_index(sym, "symbol")),
                init: opt_expr_id(init),
            },
            ("ret", [value]) => StmtKind::Return {
                value: opt_expr_id(value),
            },
            ("if", [cond, then_stmt, else_stmt]) => StmtKind::If {
                cond: expr_id(cond),
                then_stmt: stmt_id(then_stmt),
                else_stmt: opt_stmt_id(else_stmt),
            },
            ("switch", [cond, body]) => StmtKind::Switch {
                cond: expr_id(cond),
                body: stmt_id(body),
            },
            ("loop", [pre_stmt, pre_cond, post_cond, post_stmt, body]) => StmtKind::Loop {
                pre_stmt: opt_stmt_id(pre_stmt),
                pre_cond: opt_expr_id(pre_cond),
                post_cond: opt_expr_id(post_cond),
                post_stmt: opt_stmt_id(post_stmt),
                body: stmt_id(body),
            },
            ("block", [count, stmts @ ..]) => {
                assert_eq!(
                    parse_index(count, "statement count"),
                    stmts.len(),
                    "Statement count mismatch in {:?}",
                    row
                );
                StmtKind::Block {
                    stmts: stmts.iter().map(|s| stmt_id(s)).collect(),
                }
            }
            ("other", text) => StmtKind::Other {
                text: text.join("\t"),
            },
            (kind, payload) => panic!(
                "Unknown statement kind `{}` with payload {:?} in {:?}",
                kind, payload, row
            ),
        };
        unit.add_stmt(line, kind);
    }

    for row in functions_section {
        let (fid, name, start_line, body) = row
            .split('\t')
            .collect_tuple()
            .unwrap_or_else(|| panic!("Malformed `FUNCTIONS` row {:?}", row));
        assert_eq!(
            parse_index(fid, "function"),
            unit.functions.len(),
            "Function ids must be dense and in order"
        );
        unit.add_function(name, parse_line(start_line, row), stmt_id(body));
    }

    for row in infeasible_section {
        unit.infeasible_calls.insert(expr_id(row));
    }

    unit
}

fn section<'a>(
    sections: &mut impl Iterator<Item = &'a str>,
    header: &'static str,
) -> Vec<&'a str> {
    let s = sections
        .next()
        .unwrap_or_else(|| panic!("Expected a `{}` section, found end of input", header));
    if s == header {
        // A section with no rows.
        return vec![];
    }
    s.strip_prefix(header)
        .and_then(|rest| rest.strip_prefix('\n'))
        .unwrap_or_else(|| panic!("Expected `{}`, got {:?}", header, s.lines().next()))
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect()
}

fn parse_index(tok: &str, what: &str) -> usize {
    tok.parse()
        .unwrap_or_else(|_| panic!("Malformed {} id `{}`", what, tok))
}

fn parse_line(tok: &str, row: &str) -> u32 {
    tok.parse()
        .unwrap_or_else(|_| panic!("Malformed line number `{}` in {:?}", tok, row))
}

fn expr_id(tok: &str) -> ExprId {
    ExprId(parse_index(tok, "expression"))
}

fn stmt_id(tok: &str) -> StmtId {
    StmtId(parse_index(tok, "statement"))
}

fn opt_expr_id(tok: &str) -> Option<ExprId> {
    (tok != "-").then(|| expr_id(tok))
}

fn opt_stmt_id(tok: &str) -> Option<StmtId> {
    (tok != "-").then(|| stmt_id(tok))
}

/// Integer literals arrive in decimal or `0x` hex, optionally negative.
fn parse_int_literal(tok: &str) -> i128 {
    let parsed = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16)
    } else if let Some(hex) = tok.strip_prefix("-0x").or_else(|| tok.strip_prefix("-0X")) {
        i128::from_str_radix(hex, 16).map(|v| -v)
    } else {
        tok.parse()
    };
    parsed.unwrap_or_else(|_| panic!("Malformed integer literal `{}`", tok))
}
