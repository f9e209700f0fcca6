//! Recursive-descent parser producing the `ast.rs` tree: a statement/
//! expression split with precedence-climbing for binary operators, written
//! as ordinary Rust match arms instead of generated tables since the
//! grammar has no ambiguity requiring one.

use std::rc::Rc;

use crate::ast::{Attrs, BinOp, Block, CaseArm, Expr, Param, PredicateLit, Program, Stmt, UnOp};
use crate::error::{EarlError, EarlResult, SourceLoc};
use crate::token::{Token, TokenKind};

pub fn parse(tokens: Vec<Token>) -> EarlResult<Program> {
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn loc(&self) -> SourceLoc {
        self.peek().loc.clone()
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> EarlResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(EarlError::syntax(self.loc(), format!("expected {what}, found `{}`", self.peek().lexeme)))
        }
    }

    fn expect_ident(&mut self) -> EarlResult<Rc<str>> {
        let tok = self.expect(TokenKind::Ident, "identifier")?;
        Ok(tok.lexeme)
    }

    fn parse_program(mut self) -> EarlResult<Program> {
        let mut stmts = Vec::new();
        while !self.check(TokenKind::Eof) {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn attrs(&mut self) -> Attrs {
        let mut attrs = Attrs::empty();
        loop {
            let flag = match self.peek_kind() {
                TokenKind::AttrPub => Attrs::PUB,
                TokenKind::AttrWorld => Attrs::WORLD,
                TokenKind::AttrRef => Attrs::REF,
                TokenKind::AttrConst => Attrs::CONST,
                TokenKind::AttrExperimental => Attrs::EXPERIMENTAL,
                _ => break,
            };
            self.advance();
            attrs.set(flag);
        }
        attrs
    }

    fn block(&mut self) -> EarlResult<Block> {
        let loc = self.loc();
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) {
            stmts.push(self.statement()?);
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Block { stmts, loc })
    }

    fn statement(&mut self) -> EarlResult<Stmt> {
        let attrs_loc = self.loc();
        let leading_attrs = self.attrs();
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::Fn => self.def_stmt(leading_attrs, loc),
            TokenKind::Let => self.let_stmt(leading_attrs, loc),
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::If => self.if_stmt(loc),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) { None } else { Some(self.expr()?) };
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Return(value, loc))
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Break(loc))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Continue(loc))
            }
            TokenKind::While => self.while_stmt(loc),
            TokenKind::Loop => {
                self.advance();
                let body = self.block()?;
                Ok(Stmt::Loop { body, loc })
            }
            TokenKind::For => self.for_stmt(loc),
            TokenKind::Import => self.import_stmt(loc),
            TokenKind::Mod => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Mod(name, loc))
            }
            TokenKind::Class => self.class_stmt(leading_attrs, loc),
            TokenKind::Match => self.match_stmt(loc),
            TokenKind::Use => self.use_stmt(loc),
            TokenKind::Exec => {
                self.advance();
                let e = self.expr()?;
                let src = self.expr_to_shell_literal(&e)?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Exec(src, loc))
            }
            TokenKind::With => self.with_stmt(loc),
            TokenKind::Enum => self.enum_stmt(loc),
            TokenKind::Try => self.try_stmt(loc),
            TokenKind::Info => {
                self.advance();
                let msg = self.expect(TokenKind::StrLit, "string literal")?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Info(msg.lexeme, loc))
            }
            TokenKind::Pipeline => {
                self.advance();
                let mut exprs = vec![self.expr()?];
                while self.matches(TokenKind::Comma) {
                    exprs.push(self.expr()?);
                }
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Pipe(exprs, loc))
            }
            TokenKind::Bash => {
                self.advance();
                let script = self.expect(TokenKind::StrLit, "shell script string")?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::MultilineBash(script.lexeme, loc))
            }
            TokenKind::Shell => {
                self.advance();
                let text = self.expect(TokenKind::StrLit, "shell command string")?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::BashLiteral(text.lexeme, loc))
            }
            _ => {
                let _ = attrs_loc;
                self.expr_or_mut_stmt(loc)
            }
        }
    }

    fn expr_to_shell_literal(&self, e: &Expr) -> EarlResult<Rc<str>> {
        match e {
            Expr::StrLit(s, _) => Ok(s.clone()),
            other => Err(EarlError::syntax(other.loc(), "expected string literal")),
        }
    }

    fn def_stmt(&mut self, attrs: Attrs, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let name = self.expect_ident()?;
        let params = self.param_list()?;
        let body = Rc::new(self.block()?);
        Ok(Stmt::Def { name, params, attrs, body, loc })
    }

    fn param_list(&mut self) -> EarlResult<Vec<Param>> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            let attrs = self.attrs();
            let name = self.expect_ident()?;
            let ty = if self.matches(TokenKind::Colon) { Some(self.type_annotation()?) } else { None };
            params.push(Param { name, ty, attrs });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(params)
    }

    fn type_annotation(&mut self) -> EarlResult<crate::value::ValueKind> {
        use crate::value::ValueKind;
        let loc = self.loc();
        let kind = match self.advance().kind {
            TokenKind::TyInt => ValueKind::Int,
            TokenKind::TyFloat => ValueKind::Float,
            TokenKind::TyBool => ValueKind::Bool,
            TokenKind::TyStr => ValueKind::Str,
            TokenKind::TyChar => ValueKind::Char,
            TokenKind::TyList => ValueKind::List,
            TokenKind::TyTuple => ValueKind::Tuple,
            TokenKind::TyOption => ValueKind::Option,
            TokenKind::TyFile => ValueKind::File,
            TokenKind::TyClosure => ValueKind::Closure,
            TokenKind::TyUnit => ValueKind::Void,
            TokenKind::TyTime => ValueKind::Time,
            _ => return Err(EarlError::syntax(loc, "expected type keyword")),
        };
        Ok(kind)
    }

    fn let_stmt(&mut self, attrs: Attrs, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let mut names = vec![self.expect_ident()?];
        while self.matches(TokenKind::Comma) {
            names.push(self.expect_ident()?);
        }
        self.expect(TokenKind::Eq, "`=`")?;
        let value = self.expr()?;
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(Stmt::Let { names, attrs, value, loc })
    }

    fn if_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let cond = self.expr()?;
        let then_branch = self.block()?;
        let else_branch = if self.matches(TokenKind::Else) {
            if self.check(TokenKind::If) {
                Some(Box::new(self.if_stmt(self.loc())?))
            } else {
                Some(Box::new(Stmt::Block(self.block()?)))
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch, loc })
    }

    fn while_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let cond = self.expr()?;
        let body = self.block()?;
        Ok(Stmt::While { cond, body, loc })
    }

    fn for_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let first = self.expect_ident()?;
        if self.matches(TokenKind::Comma) {
            let mut vars = vec![first];
            loop {
                vars.push(self.expect_ident()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::In, "`in`")?;
            let iterable = self.expr()?;
            let body = self.block()?;
            return Ok(Stmt::Foreach { vars, iterable, body, loc });
        }
        self.expect(TokenKind::In, "`in`")?;
        let start = self.expr()?;
        if self.matches(TokenKind::DotDot) || self.matches(TokenKind::DotDotEq) {
            let end = self.expr()?;
            let body = self.block()?;
            return Ok(Stmt::For { var: first, start, end, body, loc });
        }
        let body = self.block()?;
        Ok(Stmt::Foreach { vars: vec![first], iterable: start, body, loc })
    }

    fn import_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let almost = self.matches(TokenKind::Almost);
        let path_tok = self.expect(TokenKind::StrLit, "string literal path")?;
        let alias = if self.matches(TokenKind::As) { Some(self.expect_ident()?) } else { None };
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(Stmt::Import { path: path_tok.lexeme, almost, alias, loc })
    }

    fn class_stmt(&mut self, attrs: Attrs, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let name = self.expect_ident()?;
        let ctor_params = if self.check(TokenKind::LParen) {
            self.param_list()?.into_iter().map(|p| p.name).collect()
        } else {
            Vec::new()
        };
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut members = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let member_attrs_loc = self.loc();
            let member_attrs = self.attrs();
            if self.check(TokenKind::Fn) {
                methods.push(self.def_stmt(member_attrs, self.loc())?);
            } else if self.check(TokenKind::Let) {
                members.push(self.let_stmt(member_attrs, self.loc())?);
            } else {
                return Err(EarlError::syntax(member_attrs_loc, "expected `let` or `fn` in class body"));
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Stmt::Class { name, attrs, ctor_params, members, methods, loc })
    }

    fn match_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let expr = self.expr()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut arms = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let pattern = self.expr()?;
            self.expect(TokenKind::FatArrow, "`=>`")?;
            let body = self.expr()?;
            self.expect(TokenKind::Semicolon, "`;`")?;
            arms.push((pattern, body));
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Stmt::Match { expr, arms, loc })
    }

    fn use_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let alias = self.expect_ident()?;
        self.expect(TokenKind::Eq, "`=`")?;
        let command_tok = self.expect(TokenKind::StrLit, "shell command string")?;
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(Stmt::Use { alias, command: command_tok.lexeme, loc })
    }

    fn with_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let mut names = vec![self.expect_ident()?];
        self.expect(TokenKind::Eq, "`=`")?;
        let mut exprs = vec![self.expr()?];
        while self.matches(TokenKind::Comma) {
            names.push(self.expect_ident()?);
            self.expect(TokenKind::Eq, "`=`")?;
            exprs.push(self.expr()?);
        }
        let body = self.block()?;
        Ok(Stmt::With { names, exprs, body, loc })
    }

    fn enum_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let name = self.expect_ident()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut variants = vec![self.expect_ident()?];
        while self.matches(TokenKind::Comma) {
            if self.check(TokenKind::RBrace) {
                break;
            }
            variants.push(self.expect_ident()?);
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Stmt::Enum { name, variants, loc })
    }

    fn try_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        self.advance();
        let body = self.block()?;
        self.expect(TokenKind::Catch, "`catch`")?;
        let err_name = self.expect_ident()?;
        let catch_body = self.block()?;
        Ok(Stmt::Try { body, err_name, catch_body, loc })
    }

    fn expr_or_mut_stmt(&mut self, loc: SourceLoc) -> EarlResult<Stmt> {
        let target = self.expr()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Mod),
            TokenKind::AmpEq => Some(BinOp::BitAnd),
            TokenKind::PipeEq => Some(BinOp::BitOr),
            TokenKind::CaretEq => Some(BinOp::BitXor),
            TokenKind::ShlEq => Some(BinOp::Shl),
            TokenKind::ShrEq => Some(BinOp::Shr),
            _ => {
                self.expect(TokenKind::Semicolon, "`;`")?;
                return Ok(Stmt::ExprStmt(target));
            }
        };
        self.advance();
        let value = self.expr()?;
        self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(Stmt::Mut { target, op, value, loc })
    }

    fn expr(&mut self) -> EarlResult<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.check(TokenKind::OrOr) {
            let loc = self.loc();
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::Or, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.bitor_expr()?;
        while self.check(TokenKind::AndAnd) {
            let loc = self.loc();
            self.advance();
            let rhs = self.bitor_expr()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::And, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn bitor_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.bitxor_expr()?;
        while self.check(TokenKind::Pipe) {
            let loc = self.loc();
            self.advance();
            let rhs = self.bitxor_expr()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::BitOr, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn bitxor_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.bitand_expr()?;
        while self.check(TokenKind::Caret) {
            let loc = self.loc();
            self.advance();
            let rhs = self.bitand_expr()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::BitXor, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn bitand_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.eq_expr()?;
        while self.check(TokenKind::Amp) {
            let loc = self.loc();
            self.advance();
            let rhs = self.eq_expr()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::BitAnd, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn eq_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.cmp_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.cmp_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.shift_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.shift_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn shift_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.range_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.range_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn range_expr(&mut self) -> EarlResult<Expr> {
        let lhs = self.add_expr()?;
        let loc = self.loc();
        if self.matches(TokenKind::DotDot) {
            let rhs = self.add_expr()?;
            return Ok(Expr::Range(Box::new(lhs), Box::new(rhs), false, loc));
        }
        if self.matches(TokenKind::DotDotEq) {
            let rhs = self.add_expr()?;
            return Ok(Expr::Range(Box::new(lhs), Box::new(rhs), true, loc));
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.mul_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> EarlResult<Expr> {
        let mut lhs = self.pow_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.pow_expr()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs), loc);
        }
        Ok(lhs)
    }

    /// Right-associative.
    fn pow_expr(&mut self) -> EarlResult<Expr> {
        let lhs = self.unary_expr()?;
        if self.check(TokenKind::StarStar) {
            let loc = self.loc();
            self.advance();
            let rhs = self.pow_expr()?;
            return Ok(Expr::Binary(Box::new(lhs), BinOp::Pow, Box::new(rhs), loc));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> EarlResult<Expr> {
        let loc = self.loc();
        let op = match self.peek_kind() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.unary_expr()?;
            return Ok(Expr::Unary(op, Box::new(rhs), loc));
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> EarlResult<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            let loc = self.loc();
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(TokenKind::RParen) {
                        args.push(self.expr()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "`)`")?;
                    expr = Expr::FuncCall(Box::new(expr), args, loc);
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    expr = Expr::Get(Box::new(expr), name, loc);
                }
                TokenKind::ColonColon => {
                    self.advance();
                    let name = self.expect_ident()?;
                    if let Expr::Ident(module, mloc) = expr {
                        expr = Expr::ModAccess(module, Box::new(Expr::Ident(name, mloc.clone())), loc);
                    } else {
                        return Err(EarlError::syntax(loc, "`::` may only follow a module identifier"));
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    if self.check(TokenKind::Colon) {
                        self.advance();
                        let end = if self.check(TokenKind::RBracket) { None } else { Some(Box::new(self.expr()?)) };
                        self.expect(TokenKind::RBracket, "`]`")?;
                        expr = Expr::ArrayAccess(Box::new(expr), Box::new(Expr::Slice(None, end, loc.clone())), loc);
                        continue;
                    }
                    let first = self.expr()?;
                    if self.matches(TokenKind::Colon) {
                        let end = if self.check(TokenKind::RBracket) { None } else { Some(Box::new(self.expr()?)) };
                        self.expect(TokenKind::RBracket, "`]`")?;
                        expr = Expr::ArrayAccess(Box::new(expr), Box::new(Expr::Slice(Some(Box::new(first)), end, loc.clone())), loc);
                    } else {
                        self.expect(TokenKind::RBracket, "`]`")?;
                        expr = Expr::ArrayAccess(Box::new(expr), Box::new(first), loc);
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary_expr(&mut self) -> EarlResult<Expr> {
        let loc = self.loc();
        match self.peek_kind() {
            TokenKind::IntLit => {
                let tok = self.advance();
                let n: i64 = tok.lexeme.parse().map_err(|_| EarlError::syntax(loc.clone(), "invalid integer literal"))?;
                Ok(Expr::IntLit(n, loc))
            }
            TokenKind::FloatLit => {
                let tok = self.advance();
                let n: f64 = tok.lexeme.parse().map_err(|_| EarlError::syntax(loc.clone(), "invalid float literal"))?;
                Ok(Expr::FloatLit(n, loc))
            }
            TokenKind::StrLit => {
                let tok = self.advance();
                Ok(Expr::StrLit(tok.lexeme, loc))
            }
            TokenKind::FStrLit => {
                let tok = self.advance();
                Ok(Expr::FStr(tok.lexeme, loc))
            }
            TokenKind::CharLit => {
                let tok = self.advance();
                let byte = tok.lexeme.as_bytes().first().copied().unwrap_or(0);
                Ok(Expr::CharLit(byte, loc))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit(true, loc))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit(false, loc))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::NoneLit(loc))
            }
            TokenKind::Some => {
                self.advance();
                self.expect(TokenKind::LParen, "`(`")?;
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(Expr::FuncCall(Box::new(Expr::Ident(Rc::from("some"), loc.clone())), vec![inner], loc))
            }
            TokenKind::Ident => {
                let tok = self.advance();
                Ok(Expr::Ident(tok.lexeme, loc))
            }
            TokenKind::LParen => {
                self.advance();
                let first = self.expr()?;
                if self.matches(TokenKind::Comma) {
                    let mut items = vec![first];
                    while !self.check(TokenKind::RParen) {
                        items.push(self.expr()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "`)`")?;
                    return Ok(Expr::TupleLit(items, loc));
                }
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(first)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    items.push(self.expr()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "`]`")?;
                Ok(Expr::ListLit(items, loc))
            }
            TokenKind::Pipe => self.closure_expr(loc),
            TokenKind::Match => self.case_expr(loc),
            TokenKind::If => {
                self.advance();
                let op = self.predicate_op()?;
                let rhs = self.add_expr()?;
                Ok(Expr::Predicate(PredicateLit { op, rhs: Box::new(rhs) }, loc))
            }
            other => Err(EarlError::syntax(loc, format!("unexpected token `{other}`"))),
        }
    }

    fn predicate_op(&mut self) -> EarlResult<BinOp> {
        let loc = self.loc();
        let op = match self.peek_kind() {
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::NotEq,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::LtEq => BinOp::LtEq,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::GtEq => BinOp::GtEq,
            _ => return Err(EarlError::syntax(loc, "expected comparison operator in predicate")),
        };
        self.advance();
        Ok(op)
    }

    fn closure_expr(&mut self, loc: SourceLoc) -> EarlResult<Expr> {
        self.advance();
        let mut params = Vec::new();
        while !self.check(TokenKind::Pipe) {
            let attrs = self.attrs();
            let name = self.expect_ident()?;
            let ty = if self.matches(TokenKind::Colon) { Some(self.type_annotation()?) } else { None };
            params.push(Param { name, ty, attrs });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Pipe, "`|`")?;
        let attrs = self.attrs();
        let body = Rc::new(self.block()?);
        Ok(Expr::Closure { params, attrs, body, loc })
    }

    fn case_expr(&mut self, loc: SourceLoc) -> EarlResult<Expr> {
        self.advance();
        let expr = self.expr()?;
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut arms = Vec::new();
        let mut default = None;
        while !self.check(TokenKind::RBrace) {
            if self.matches(TokenKind::Else) {
                self.expect(TokenKind::FatArrow, "`=>`")?;
                default = Some(Box::new(self.expr()?));
                self.expect(TokenKind::Semicolon, "`;`")?;
                continue;
            }
            let arm = if self.check(TokenKind::If) {
                self.advance();
                let op = self.predicate_op()?;
                let rhs = self.add_expr()?;
                CaseArm::Predicate(PredicateLit { op, rhs: Box::new(rhs) })
            } else {
                CaseArm::Value(self.expr()?)
            };
            self.expect(TokenKind::FatArrow, "`=>`")?;
            let body = self.expr()?;
            self.expect(TokenKind::Semicolon, "`;`")?;
            arms.push((arm, body));
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Expr::Case { expr: Box::new(expr), arms, default, loc })
    }
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::ast::{Expr, Stmt};
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Vec<Stmt> {
        let file: std::rc::Rc<str> = "<test>".into();
        parse(lex(src, &file).unwrap()).unwrap()
    }

    #[test]
    fn parses_let_and_arithmetic_precedence() {
        let prog = parse_src("let x = 1 + 2 * 3;");
        match &prog[0] {
            Stmt::Let { value: Expr::Binary(_, crate::ast::BinOp::Add, rhs, _), .. } => {
                assert!(matches!(**rhs, Expr::Binary(_, crate::ast::BinOp::Mul, _, _)));
            }
            other => panic!("unexpected stmt {other:?}"),
        }
    }

    #[test]
    fn parses_function_and_call() {
        let prog = parse_src("fn add(a, b) { return a + b; } add(1, 2);");
        assert!(matches!(prog[0], Stmt::Def { .. }));
        assert!(matches!(prog[1], Stmt::ExprStmt(Expr::FuncCall(..))));
    }

    #[test]
    fn parses_class_with_method() {
        let prog = parse_src("class Point(x, y) { let x = x; fn sum() { return this.x; } }");
        match &prog[0] {
            Stmt::Class { methods, members, .. } => {
                assert_eq!(methods.len(), 1);
                assert_eq!(members.len(), 1);
            }
            other => panic!("unexpected stmt {other:?}"),
        }
    }

    #[test]
    fn parses_if_while_for() {
        let prog = parse_src("if true { } else { } while true { } for i in 0..10 { }");
        assert!(matches!(prog[0], Stmt::If { .. }));
        assert!(matches!(prog[1], Stmt::While { .. }));
        assert!(matches!(prog[2], Stmt::For { .. }));
    }

    #[test]
    fn parses_enum_decl() {
        let prog = parse_src("enum Color { Red, Green, Blue }");
        match &prog[0] {
            Stmt::Enum { name, variants, .. } => {
                assert_eq!(&**name, "Color");
                assert_eq!(variants.len(), 3);
            }
            other => panic!("unexpected stmt {other:?}"),
        }
    }

    #[test]
    fn parses_try_catch() {
        let prog = parse_src(r#"try { panic("x"); } catch err { print(err); }"#);
        match &prog[0] {
            Stmt::Try { body, err_name, catch_body, .. } => {
                assert_eq!(body.stmts.len(), 1);
                assert_eq!(&**err_name, "err");
                assert_eq!(catch_body.stmts.len(), 1);
            }
            other => panic!("unexpected stmt {other:?}"),
        }
    }

    #[test]
    fn parses_info_pipeline_and_shell_forms() {
        let prog = parse_src(r#"info "hello"; pipeline 1, 2, 3; bash "echo a"; shell "echo b";"#);
        assert!(matches!(&prog[0], Stmt::Info(msg, _) if &**msg == "hello"));
        match &prog[1] {
            Stmt::Pipe(exprs, _) => assert_eq!(exprs.len(), 3),
            other => panic!("unexpected stmt {other:?}"),
        }
        assert!(matches!(&prog[2], Stmt::MultilineBash(s, _) if &**s == "echo a"));
        assert!(matches!(&prog[3], Stmt::BashLiteral(s, _) if &**s == "echo b"));
    }
}
