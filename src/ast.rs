//! Lifted C abstract syntax for a single translation unit.
//!
//! This is the in-memory form of what the sparse-based exporter emits: flat
//! arenas of expressions and statements linked by index, plus symbol and type
//! tables. The arenas keep the deep mutual recursion over node kinds cheap to
//! walk and trivial to validate.

use crate::containers::unordered::UnorderedSet;

/// An index into [`Unit::types`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub usize);

/// An index into [`Unit::symbols`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub usize);

/// An index into [`Unit::exprs`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub usize);

/// An index into [`Unit::stmts`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub usize);

/// An index into [`Unit::functions`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

impl std::fmt::Debug for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Ty({})", self.0)
    }
}
impl std::fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}
impl std::fmt::Debug for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "E({})", self.0)
    }
}
impl std::fmt::Debug for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "St({})", self.0)
    }
}
impl std::fmt::Debug for FuncId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Fn({})", self.0)
    }
}

/// Coarse classification of a C type, as determined by the exporter. The
/// analysis only ever needs to distinguish "plain integer" destinations from
/// everything else, but the finer split keeps diagnostics readable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeClass {
    /// Plain integer types (including `char` and enums).
    Int,
    /// Any pointer type.
    Ptr,
    /// Struct or union types.
    Struct,
    /// Array types.
    Array,
    /// `void`
    Void,
    /// Anything else (function types, floats, ...).
    Other,
}

impl TypeClass {
    pub fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "int" => TypeClass::Int,
            "ptr" => TypeClass::Ptr,
            "struct" => TypeClass::Struct,
            "array" => TypeClass::Array,
            "void" => TypeClass::Void,
            "other" => TypeClass::Other,
            _ => return None,
        })
    }
}

/// A C type as the exporter saw it.
#[derive(Clone, Debug)]
pub struct CType {
    pub class: TypeClass,
    /// Human-readable rendering, e.g. `unsigned long` or `struct foo *`.
    pub display: String,
}

/// Storage class of a symbol.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Storage {
    /// Block-scope variable.
    Local,
    /// Function parameter.
    Param,
    /// File- or program-scope variable.
    Global,
    /// `static` variable (function- or file-scope).
    Static,
    /// A function.
    Func,
}

impl Storage {
    pub fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "local" => Storage::Local,
            "param" => Storage::Param,
            "global" => Storage::Global,
            "static" => Storage::Static,
            "func" => Storage::Func,
            _ => return None,
        })
    }
}

/// A named storage location with a declared type and an enclosing function
/// identity (`None` for file-scope symbols).
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub storage: Storage,
    pub ty: TypeId,
    pub declared_in: Option<FuncId>,
}

impl Symbol {
    /// Whether this symbol is one of the exporter's synthesized temporaries
    /// rather than something that appears in the source.
    pub fn is_synthesized(&self) -> bool {
        self.name.starts_with("__cctmp")
    }
}

/// A binary operator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
}

impl BinOp {
    pub fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Mod,
            "&" => BinOp::BitAnd,
            "|" => BinOp::BitOr,
            "^" => BinOp::BitXor,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "&&" => BinOp::LogicalAnd,
            "||" => BinOp::LogicalOr,
            _ => return None,
        })
    }

    /// Whether this operator compares its operands (yields a truth value).
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
        };
        write!(f, "{}", s)
    }
}

/// A unary operator. Dereference is its own expression kind since the
/// analysis treats it differently from value-preserving wrappers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    Neg,
    BitNot,
    LogicalNot,
    AddressOf,
}

impl UnOp {
    pub fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "preinc" => UnOp::PreInc,
            "predec" => UnOp::PreDec,
            "postinc" => UnOp::PostInc,
            "postdec" => UnOp::PostDec,
            "neg" => UnOp::Neg,
            "bitnot" => UnOp::BitNot,
            "lognot" => UnOp::LogicalNot,
            "addrof" => UnOp::AddressOf,
            _ => return None,
        })
    }

    fn is_postfix(self) -> bool {
        matches!(self, UnOp::PostInc | UnOp::PostDec)
    }

    fn token_for_render(self) -> &'static str {
        match self {
            UnOp::PreInc | UnOp::PostInc => "++",
            UnOp::PreDec | UnOp::PostDec => "--",
            UnOp::Neg => "-",
            UnOp::BitNot => "~",
            UnOp::LogicalNot => "!",
            UnOp::AddressOf => "&",
        }
    }
}

/// An assignment operator: plain `=` or a compound form like `+=`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AssignOp {
    Plain,
    Compound(BinOp),
}

impl AssignOp {
    pub fn from_token(tok: &str) -> Option<Self> {
        if tok == "=" {
            return Some(AssignOp::Plain);
        }
        let inner = tok.strip_suffix('=')?;
        BinOp::from_token(inner).map(AssignOp::Compound)
    }
}

impl std::fmt::Display for AssignOp {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AssignOp::Plain => write!(f, "="),
            AssignOp::Compound(op) => write!(f, "{}=", op),
        }
    }
}

/// The kind of an expression node.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ExprKind {
    /// Reference to a declared symbol.
    Symbol { sym: SymbolId },
    /// Integer literal. Wide enough to hold any C integer constant.
    Literal { value: i128 },
    /// `*operand`
    Deref { operand: ExprId },
    /// `base.field` (`arrow == false`) or `base->field` (`arrow == true`)
    Member {
        base: ExprId,
        field: String,
        arrow: bool,
    },
    /// A pre/post operation, e.g. `++x` or `x--`, or another unary operator.
    Unary { op: UnOp, operand: ExprId },
    /// `(type)operand`
    Cast { ty: TypeId, operand: ExprId },
    /// A binary, comparison, or logical operation.
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    /// An assignment expression.
    Assign { op: AssignOp, lhs: ExprId, rhs: ExprId },
    /// `cond ? then_val : else_val`
    Conditional {
        cond: ExprId,
        then_val: ExprId,
        else_val: ExprId,
    },
    /// `lhs, rhs`
    Comma { lhs: ExprId, rhs: ExprId },
    /// A call; `callee` is usually a symbol reference but may be anything for
    /// indirect calls.
    Call { callee: ExprId, args: Vec<ExprId> },
    /// A construct the exporter could not model structurally; only its
    /// rendered text survives.
    Opaque { text: String },
}

impl ExprKind {
    /// A short human-readable name for the node kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExprKind::Symbol { .. } => "symbol",
            ExprKind::Literal { .. } => "literal",
            ExprKind::Deref { .. } => "dereference",
            ExprKind::Member { .. } => "member access",
            ExprKind::Unary { .. } => "unary operation",
            ExprKind::Cast { .. } => "cast",
            ExprKind::Binary { .. } => "binary operation",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::Conditional { .. } => "conditional",
            ExprKind::Comma { .. } => "comma",
            ExprKind::Call { .. } => "call",
            ExprKind::Opaque { .. } => "opaque",
        }
    }
}

/// An expression node: a kind plus the source line it starts on.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ExprNode {
    pub line: u32,
    pub kind: ExprKind,
}

/// The kind of a statement node.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StmtKind {
    /// An expression evaluated for its effect.
    Expression { expr: ExprId },
    /// A declaration, with its optional initializer.
    Declaration { sym: SymbolId, init: Option<ExprId> },
    /// `return;` or `return value;`
    Return { value: Option<ExprId> },
    If {
        cond: ExprId,
        then_stmt: StmtId,
        else_stmt: Option<StmtId>,
    },
    Switch { cond: ExprId, body: StmtId },
    /// Any of C's three loop forms, normalized. A `for (pre; cond; post)`
    /// carries all of `pre_stmt`, `pre_cond`, and `post_stmt`; a `do ... while`
    /// carries only `post_cond`.
    Loop {
        pre_stmt: Option<StmtId>,
        pre_cond: Option<ExprId>,
        post_cond: Option<ExprId>,
        post_stmt: Option<StmtId>,
        body: StmtId,
    },
    /// `{ ... }`
    Block { stmts: Vec<StmtId> },
    /// A statement kind the exporter does not model (asm, labels, gotos,
    /// ...); only its rendered text survives.
    Other { text: String },
}

impl StmtKind {
    /// A short human-readable name for the node kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StmtKind::Expression { .. } => "expression statement",
            StmtKind::Declaration { .. } => "declaration",
            StmtKind::Return { .. } => "return",
            StmtKind::If { .. } => "if",
            StmtKind::Switch { .. } => "switch",
            StmtKind::Loop { .. } => "loop",
            StmtKind::Block { .. } => "block",
            StmtKind::Other { .. } => "other",
        }
    }
}

/// A statement node: a kind plus the source line it starts on.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StmtNode {
    pub line: u32,
    pub kind: StmtKind,
}

/// A function definition.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    /// The line of the function definition itself; finding fingerprints are
    /// computed relative to this.
    pub start_line: u32,
    pub body: StmtId,
}

/// A lifted translation unit.
#[derive(Debug, Default)]
pub struct Unit {
    /// Path of the C source file this unit was exported from.
    pub path: String,
    pub types: Vec<CType>,
    pub symbols: Vec<Symbol>,
    pub exprs: Vec<ExprNode>,
    pub stmts: Vec<StmtNode>,
    pub functions: Vec<Function>,
    /// Call expressions the exporter's path analysis proved unreachable.
    pub infeasible_calls: UnorderedSet<ExprId>,
}

impl Unit {
    /// Build a new, empty unit for the given source path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn add_type(&mut self, class: TypeClass, display: impl Into<String>) -> TypeId {
        self.types.push(CType {
            class,
            display: display.into(),
        });
        TypeId(self.types.len() - 1)
    }

    pub fn add_symbol(
        &mut self,
        name: impl Into<String>,
        storage: Storage,
        ty: TypeId,
        declared_in: Option<FuncId>,
    ) -> SymbolId {
        self.symbols.push(Symbol {
            name: name.into(),
            storage,
            ty,
            declared_in,
        });
        SymbolId(self.symbols.len() - 1)
    }

    pub fn add_expr(&mut self, line: u32, kind: ExprKind) -> ExprId {
        self.exprs.push(ExprNode { line, kind });
        ExprId(self.exprs.len() - 1)
    }

    pub fn add_stmt(&mut self, line: u32, kind: StmtKind) -> StmtId {
        self.stmts.push(StmtNode { line, kind });
        StmtId(self.stmts.len() - 1)
    }

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        start_line: u32,
        body: StmtId,
    ) -> FuncId {
        self.functions.push(Function {
            name: name.into(),
            start_line,
            body,
        });
        FuncId(self.functions.len() - 1)
    }

    pub fn expr(&self, e: ExprId) -> &ExprNode {
        &self.exprs[e.0]
    }

    pub fn stmt(&self, s: StmtId) -> &StmtNode {
        &self.stmts[s.0]
    }

    pub fn symbol(&self, s: SymbolId) -> &Symbol {
        &self.symbols[s.0]
    }

    pub fn ctype(&self, t: TypeId) -> &CType {
        &self.types[t.0]
    }

    pub fn function(&self, f: FuncId) -> &Function {
        &self.functions[f.0]
    }

    /// Parameters of `f`, in declaration order.
    pub fn params_of(&self, f: FuncId) -> Vec<SymbolId> {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, sym)| sym.storage == Storage::Param && sym.declared_in == Some(f))
            .map(|(i, _)| SymbolId(i))
            .collect()
    }

    /// The name of the function a call expression invokes, if it is a direct
    /// call through a plain symbol.
    pub fn callee_name(&self, call: ExprId) -> Option<&str> {
        match &self.expr(call).kind {
            ExprKind::Call { callee, .. } => match &self.expr(*callee).kind {
                ExprKind::Symbol { sym } => Some(&self.symbol(*sym).name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Strip value-preserving wrappers (pre/post operations, other unary
    /// operators, and casts) off an expression. Dereferences and member
    /// accesses are left alone; they change what location is being named.
    pub fn strip_value_wrappers(&self, e: ExprId) -> ExprId {
        self.strip_value_wrappers_noting_void_discard(e).0
    }

    /// Like [`Self::strip_value_wrappers`], but also reports whether any of
    /// the stripped casts was a cast to `void` (an explicit value discard).
    pub fn strip_value_wrappers_noting_void_discard(&self, e: ExprId) -> (ExprId, bool) {
        let mut e = e;
        let mut void_discard = false;
        loop {
            match &self.expr(e).kind {
                ExprKind::Unary { operand, .. } => e = *operand,
                ExprKind::Cast { ty, operand } => {
                    if self.ctype(*ty).class == TypeClass::Void {
                        void_discard = true;
                    }
                    e = *operand;
                }
                _ => return (e, void_discard),
            }
        }
    }

    /// Descend a left-associated binary chain (index/pointer arithmetic) to
    /// its leftmost operand, stripping wrappers between steps.
    pub fn leftmost_operand(&self, e: ExprId) -> ExprId {
        let mut e = self.strip_value_wrappers(e);
        while let ExprKind::Binary { lhs, .. } = &self.expr(e).kind {
            e = self.strip_value_wrappers(*lhs);
        }
        e
    }

    /// Whether the expression tree rooted at `haystack` contains `needle`.
    pub fn expr_contains(&self, haystack: ExprId, needle: ExprId) -> bool {
        if haystack == needle {
            return true;
        }
        match &self.expr(haystack).kind {
            ExprKind::Symbol { .. } | ExprKind::Literal { .. } | ExprKind::Opaque { .. } => false,
            ExprKind::Deref { operand }
            | ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. } => self.expr_contains(*operand, needle),
            ExprKind::Member { base, .. } => self.expr_contains(*base, needle),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs, .. }
            | ExprKind::Comma { lhs, rhs } => {
                self.expr_contains(*lhs, needle) || self.expr_contains(*rhs, needle)
            }
            ExprKind::Conditional {
                cond,
                then_val,
                else_val,
            } => {
                self.expr_contains(*cond, needle)
                    || self.expr_contains(*then_val, needle)
                    || self.expr_contains(*else_val, needle)
            }
            ExprKind::Call { callee, args } => {
                self.expr_contains(*callee, needle)
                    || args.iter().any(|&a| self.expr_contains(a, needle))
            }
        }
    }

    /// The statically known constant value of an expression, if any, after
    /// stripping wrappers. No folding is attempted beyond that; the exporter
    /// already folds what the front end could.
    pub fn const_value(&self, e: ExprId) -> Option<i128> {
        match &self.expr(self.strip_value_wrappers(e)).kind {
            ExprKind::Literal { value } => Some(*value),
            _ => None,
        }
    }

    /// Canonical rendering of an expression, used for diagnostics, the
    /// textual taint fallback, and finding fingerprints. Deterministic for a
    /// given tree; not intended to be re-parseable C.
    pub fn render_expr(&self, e: ExprId) -> String {
        match &self.expr(e).kind {
            ExprKind::Symbol { sym } => self.symbol(*sym).name.clone(),
            ExprKind::Literal { value } => format!("{}", value),
            ExprKind::Deref { operand } => format!("*{}", self.render_expr(*operand)),
            ExprKind::Member { base, field, arrow } => format!(
                "{}{}{}",
                self.render_expr(*base),
                if *arrow { "->" } else { "." },
                field
            ),
            ExprKind::Unary { op, operand } => {
                if op.is_postfix() {
                    format!("{}{}", self.render_expr(*operand), op.token_for_render())
                } else {
                    format!("{}{}", op.token_for_render(), self.render_expr(*operand))
                }
            }
            ExprKind::Cast { ty, operand } => format!(
                "({}){}",
                self.ctype(*ty).display,
                self.render_expr(*operand)
            ),
            ExprKind::Binary { op, lhs, rhs } => format!(
                "{} {} {}",
                self.render_expr(*lhs),
                op,
                self.render_expr(*rhs)
            ),
            ExprKind::Assign { op, lhs, rhs } => format!(
                "{} {} {}",
                self.render_expr(*lhs),
                op,
                self.render_expr(*rhs)
            ),
            ExprKind::Conditional {
                cond,
                then_val,
                else_val,
            } => format!(
                "{} ? {} : {}",
                self.render_expr(*cond),
                self.render_expr(*then_val),
                self.render_expr(*else_val)
            ),
            ExprKind::Comma { lhs, rhs } => {
                format!("{}, {}", self.render_expr(*lhs), self.render_expr(*rhs))
            }
            ExprKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|&a| self.render_expr(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({})", self.render_expr(*callee), args)
            }
            ExprKind::Opaque { text } => text.clone(),
        }
    }

    /// Confirms the cross-reference validity of the whole unit.
    pub fn try_confirm_valid(&self) -> Result<(), String> {
        macro_rules! confirm {
            ($cond:expr, $($why:tt)+) => {
                if !$cond {
                    return Err(format!($($why)+));
                }
            };
        }
        let expr_ok = |e: ExprId| e.0 < self.exprs.len();
        let stmt_ok = |s: StmtId| s.0 < self.stmts.len();

        for (i, sym) in self.symbols.iter().enumerate() {
            confirm!(
                sym.ty.0 < self.types.len(),
                "Symbol {:?} ({}) refers to out-of-range {:?}",
                SymbolId(i),
                sym.name,
                sym.ty
            );
            if let Some(f) = sym.declared_in {
                confirm!(
                    f.0 < self.functions.len(),
                    "Symbol {:?} ({}) refers to out-of-range {:?}",
                    SymbolId(i),
                    sym.name,
                    f
                );
            }
        }
        for (i, node) in self.exprs.iter().enumerate() {
            let this = ExprId(i);
            match &node.kind {
                ExprKind::Symbol { sym } => {
                    confirm!(
                        sym.0 < self.symbols.len(),
                        "{:?} refers to out-of-range {:?}",
                        this,
                        sym
                    );
                }
                ExprKind::Literal { .. } | ExprKind::Opaque { .. } => {}
                ExprKind::Deref { operand } | ExprKind::Unary { operand, .. } => {
                    confirm!(expr_ok(*operand), "{:?} refers to out-of-range operand", this);
                }
                ExprKind::Member { base, .. } => {
                    confirm!(expr_ok(*base), "{:?} refers to out-of-range base", this);
                }
                ExprKind::Cast { ty, operand } => {
                    confirm!(ty.0 < self.types.len(), "{:?} refers to out-of-range {:?}", this, ty);
                    confirm!(expr_ok(*operand), "{:?} refers to out-of-range operand", this);
                }
                ExprKind::Binary { lhs, rhs, .. }
                | ExprKind::Assign { lhs, rhs, .. }
                | ExprKind::Comma { lhs, rhs } => {
                    confirm!(expr_ok(*lhs), "{:?} refers to out-of-range lhs", this);
                    confirm!(expr_ok(*rhs), "{:?} refers to out-of-range rhs", this);
                }
                ExprKind::Conditional {
                    cond,
                    then_val,
                    else_val,
                } => {
                    confirm!(expr_ok(*cond), "{:?} refers to out-of-range condition", this);
                    confirm!(expr_ok(*then_val), "{:?} refers to out-of-range then-value", this);
                    confirm!(expr_ok(*else_val), "{:?} refers to out-of-range else-value", this);
                }
                ExprKind::Call { callee, args } => {
                    confirm!(expr_ok(*callee), "{:?} refers to out-of-range callee", this);
                    for (n, a) in args.iter().enumerate() {
                        confirm!(expr_ok(*a), "{:?} refers to out-of-range argument {}", this, n);
                    }
                }
            }
        }
        for (i, node) in self.stmts.iter().enumerate() {
            let this = StmtId(i);
            match &node.kind {
                StmtKind::Expression { expr } => {
                    confirm!(expr_ok(*expr), "{:?} refers to out-of-range expression", this);
                }
                StmtKind::Declaration { sym, init } => {
                    confirm!(
                        sym.0 < self.symbols.len(),
                        "{:?} declares out-of-range {:?}",
                        this,
                        sym
                    );
                    if let Some(init) = init {
                        confirm!(expr_ok(*init), "{:?} refers to out-of-range initializer", this);
                    }
                }
                StmtKind::Return { value } => {
                    if let Some(value) = value {
                        confirm!(expr_ok(*value), "{:?} refers to out-of-range value", this);
                    }
                }
                StmtKind::If {
                    cond,
                    then_stmt,
                    else_stmt,
                } => {
                    confirm!(expr_ok(*cond), "{:?} refers to out-of-range condition", this);
                    confirm!(stmt_ok(*then_stmt), "{:?} refers to out-of-range then-branch", this);
                    if let Some(e) = else_stmt {
                        confirm!(stmt_ok(*e), "{:?} refers to out-of-range else-branch", this);
                    }
                }
                StmtKind::Switch { cond, body } => {
                    confirm!(expr_ok(*cond), "{:?} refers to out-of-range condition", this);
                    confirm!(stmt_ok(*body), "{:?} refers to out-of-range body", this);
                }
                StmtKind::Loop {
                    pre_stmt,
                    pre_cond,
                    post_cond,
                    post_stmt,
                    body,
                } => {
                    if let Some(s) = pre_stmt {
                        confirm!(stmt_ok(*s), "{:?} refers to out-of-range pre-statement", this);
                    }
                    if let Some(e) = pre_cond {
                        confirm!(expr_ok(*e), "{:?} refers to out-of-range pre-condition", this);
                    }
                    if let Some(e) = post_cond {
                        confirm!(expr_ok(*e), "{:?} refers to out-of-range post-condition", this);
                    }
                    if let Some(s) = post_stmt {
                        confirm!(stmt_ok(*s), "{:?} refers to out-of-range post-statement", this);
                    }
                    confirm!(stmt_ok(*body), "{:?} refers to out-of-range body", this);
                }
                StmtKind::Block { stmts } => {
                    for (n, s) in stmts.iter().enumerate() {
                        confirm!(stmt_ok(*s), "{:?} refers to out-of-range statement {}", this, n);
                    }
                }
                StmtKind::Other { .. } => {}
            }
        }
        for (i, func) in self.functions.iter().enumerate() {
            confirm!(
                stmt_ok(func.body),
                "{:?} ({}) refers to out-of-range body",
                FuncId(i),
                func.name
            );
            confirm!(
                func.start_line >= 1,
                "{:?} ({}) has invalid start line {}",
                FuncId(i),
                func.name,
                func.start_line
            );
        }
        for &e in self.infeasible_calls.iter() {
            confirm!(expr_ok(e), "Infeasible mark refers to out-of-range {:?}", e);
            confirm!(
                matches!(self.expr(e).kind, ExprKind::Call { .. }),
                "Infeasible mark on non-call {:?}",
                e
            );
        }
        Ok(())
    }
}
