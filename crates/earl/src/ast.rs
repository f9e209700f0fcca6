//! AST shape consumed by the evaluator, produced by `earl::parser`.

use std::rc::Rc;

use crate::error::SourceLoc;

/// Attribute bitset: `pub`, `world`, `ref`, `const`, `experimental`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attrs(u8);

impl Attrs {
    pub const PUB: Self = Self(1 << 0);
    pub const WORLD: Self = Self(1 << 1);
    pub const REF: Self = Self(1 << 2);
    pub const CONST: Self = Self(1 << 3);
    pub const EXPERIMENTAL: Self = Self(1 << 4);

    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn has(self, flag: Self) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn set(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    #[must_use]
    pub fn is_pub(self) -> bool {
        self.has(Self::PUB)
    }

    #[must_use]
    pub fn is_world(self) -> bool {
        self.has(Self::WORLD)
    }

    #[must_use]
    pub fn is_ref(self) -> bool {
        self.has(Self::REF)
    }

    #[must_use]
    pub fn is_const(self) -> bool {
        self.has(Self::CONST)
    }

    #[must_use]
    pub fn is_experimental(self) -> bool {
        self.has(Self::EXPERIMENTAL)
    }
}

impl std::ops::BitOr for Attrs {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A declared-type annotation on a parameter.
pub type TypeAnnotation = crate::value::ValueKind;

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Rc<str>,
    pub ty: Option<TypeAnnotation>,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// Statement node.
#[derive(Debug, Clone)]
pub enum Stmt {
    Def {
        name: Rc<str>,
        params: Vec<Param>,
        attrs: Attrs,
        body: Rc<Block>,
        loc: SourceLoc,
    },
    Let {
        names: Vec<Rc<str>>,
        attrs: Attrs,
        value: Expr,
        loc: SourceLoc,
    },
    Block(Block),
    Mut {
        target: Expr,
        op: Option<BinOp>,
        value: Expr,
        loc: SourceLoc,
    },
    ExprStmt(Expr),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Box<Stmt>>,
        loc: SourceLoc,
    },
    Return(Option<Expr>, SourceLoc),
    Break(SourceLoc),
    Continue(SourceLoc),
    While {
        cond: Expr,
        body: Block,
        loc: SourceLoc,
    },
    Loop {
        body: Block,
        loc: SourceLoc,
    },
    For {
        var: Rc<str>,
        start: Expr,
        end: Expr,
        body: Block,
        loc: SourceLoc,
    },
    Foreach {
        vars: Vec<Rc<str>>,
        iterable: Expr,
        body: Block,
        loc: SourceLoc,
    },
    Import {
        path: Rc<str>,
        almost: bool,
        alias: Option<Rc<str>>,
        loc: SourceLoc,
    },
    Mod(Rc<str>, SourceLoc),
    Class {
        name: Rc<str>,
        attrs: Attrs,
        ctor_params: Vec<Rc<str>>,
        members: Vec<Stmt>,
        methods: Vec<Stmt>,
        loc: SourceLoc,
    },
    Match {
        expr: Expr,
        arms: Vec<(Expr, Expr)>,
        loc: SourceLoc,
    },
    Enum {
        name: Rc<str>,
        variants: Vec<Rc<str>>,
        loc: SourceLoc,
    },
    Use {
        alias: Rc<str>,
        command: Rc<str>,
        loc: SourceLoc,
    },
    Exec(Rc<str>, SourceLoc),
    With {
        names: Vec<Rc<str>>,
        exprs: Vec<Expr>,
        body: Block,
        loc: SourceLoc,
    },
    MultilineBash(Rc<str>, SourceLoc),
    Try {
        body: Block,
        err_name: Rc<str>,
        catch_body: Block,
        loc: SourceLoc,
    },
    Info(Rc<str>, SourceLoc),
    Pipe(Vec<Expr>, SourceLoc),
    BashLiteral(Rc<str>, SourceLoc),
}

impl Stmt {
    #[must_use]
    pub fn loc(&self) -> SourceLoc {
        match self {
            Self::Def { loc, .. }
            | Self::Let { loc, .. }
            | Self::Mut { loc, .. }
            | Self::If { loc, .. }
            | Self::Return(_, loc)
            | Self::Break(loc)
            | Self::Continue(loc)
            | Self::While { loc, .. }
            | Self::Loop { loc, .. }
            | Self::For { loc, .. }
            | Self::Foreach { loc, .. }
            | Self::Import { loc, .. }
            | Self::Mod(_, loc)
            | Self::Class { loc, .. }
            | Self::Match { loc, .. }
            | Self::Enum { loc, .. }
            | Self::Use { loc, .. }
            | Self::Exec(_, loc)
            | Self::With { loc, .. }
            | Self::MultilineBash(_, loc)
            | Self::Try { loc, .. }
            | Self::Info(_, loc)
            | Self::Pipe(_, loc)
            | Self::BashLiteral(_, loc) => loc.clone(),
            Self::Block(b) => b.loc.clone(),
            Self::ExprStmt(e) => e.loc(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub loc: SourceLoc,
}

/// Closure captured in a `Case`/`Match` arm pattern test.
#[derive(Debug, Clone)]
pub struct PredicateLit {
    pub op: BinOp,
    pub rhs: Box<Expr>,
}

/// Expression node, flattened to a single enum since the evaluator dispatches
/// on it either way.
#[derive(Debug, Clone)]
pub enum Expr {
    Binary(Box<Expr>, BinOp, Box<Expr>, SourceLoc),
    Unary(UnOp, Box<Expr>, SourceLoc),

    Ident(Rc<str>, SourceLoc),
    IntLit(i64, SourceLoc),
    FloatLit(f64, SourceLoc),
    StrLit(Rc<str>, SourceLoc),
    CharLit(u8, SourceLoc),
    BoolLit(bool, SourceLoc),
    NoneLit(SourceLoc),
    ListLit(Vec<Expr>, SourceLoc),
    TupleLit(Vec<Expr>, SourceLoc),
    DictLit(Box<Expr>, Vec<(Expr, Expr)>, SourceLoc),

    FuncCall(Box<Expr>, Vec<Expr>, SourceLoc),
    Get(Box<Expr>, Rc<str>, SourceLoc),
    ModAccess(Rc<str>, Box<Expr>, SourceLoc),
    ArrayAccess(Box<Expr>, Box<Expr>, SourceLoc),
    Slice(Option<Box<Expr>>, Option<Box<Expr>>, SourceLoc),
    Range(Box<Expr>, Box<Expr>, bool, SourceLoc),

    Closure {
        params: Vec<Param>,
        attrs: Attrs,
        body: Rc<Block>,
        loc: SourceLoc,
    },

    FStr(Rc<str>, SourceLoc),
    Case {
        expr: Box<Expr>,
        arms: Vec<(CaseArm, Expr)>,
        default: Option<Box<Expr>>,
        loc: SourceLoc,
    },
    Predicate(PredicateLit, SourceLoc),
}

/// Either a literal value pattern or a captured predicate in a `case` arm.
#[derive(Debug, Clone)]
pub enum CaseArm {
    Value(Expr),
    Predicate(PredicateLit),
}

impl Expr {
    #[must_use]
    pub fn loc(&self) -> SourceLoc {
        match self {
            Self::Binary(.., loc)
            | Self::Unary(.., loc)
            | Self::Ident(_, loc)
            | Self::IntLit(_, loc)
            | Self::FloatLit(_, loc)
            | Self::StrLit(_, loc)
            | Self::CharLit(_, loc)
            | Self::BoolLit(_, loc)
            | Self::NoneLit(loc)
            | Self::ListLit(_, loc)
            | Self::TupleLit(_, loc)
            | Self::DictLit(.., loc)
            | Self::FuncCall(.., loc)
            | Self::Get(.., loc)
            | Self::ModAccess(.., loc)
            | Self::ArrayAccess(.., loc)
            | Self::Slice(.., loc)
            | Self::Range(.., loc)
            | Self::Closure { loc, .. }
            | Self::FStr(_, loc)
            | Self::Case { loc, .. }
            | Self::Predicate(_, loc) => loc.clone(),
        }
    }
}

/// Whole parsed program: a flat vector of top-level statements.
pub type Program = Vec<Stmt>;
