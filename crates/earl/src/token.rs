//! Token shape consumed by the parser and referenced by the evaluator for error
//! anchoring.

use std::rc::Rc;

use crate::error::SourceLoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TokenKind {
    // literals
    Ident,
    IntLit,
    FloatLit,
    StrLit,
    CharLit,
    FStrLit,

    // keywords
    Let,
    Fn,
    Return,
    If,
    Else,
    While,
    For,
    Loop,
    In,
    Import,
    Mod,
    Class,
    True,
    False,
    None,
    Some,
    Match,
    When,
    Break,
    Continue,
    Use,
    Exec,
    With,
    As,
    Almost,
    Enum,
    Try,
    Catch,
    Info,
    Pipeline,
    Bash,
    Shell,

    // attributes
    AttrPub,
    AttrWorld,
    AttrRef,
    AttrConst,
    AttrExperimental,

    // type keywords
    TyInt,
    TyFloat,
    TyBool,
    TyStr,
    TyChar,
    TyList,
    TyTuple,
    TyOption,
    TyFile,
    TyClosure,
    TyUnit,
    TyTime,

    // punctuation / operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    DotDotEq,
    Colon,
    ColonColon,
    Semicolon,
    Arrow,
    FatArrow,
    Pipe,

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Amp,
    Caret,
    Bang,
    Tilde,
    Shl,
    Shr,

    Eq,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,

    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,

    Eof,
}

/// A single lexical token.
///
/// `next` links tokens for error-context printing: callers that
/// want to show "near here" context walk forward from the offending token.
#[derive(Debug, Clone)]
pub struct Token {
    pub lexeme: Rc<str>,
    pub kind: TokenKind,
    pub loc: SourceLoc,
}

impl Token {
    #[must_use]
    pub fn new(lexeme: impl Into<Rc<str>>, kind: TokenKind, loc: SourceLoc) -> Self {
        Self { lexeme: lexeme.into(), kind, loc }
    }
}
