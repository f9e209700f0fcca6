//! Source text -> token stream: a single forward pass over a `Vec<char>`
//! producing one flat token list via a keyword table, with no in-place
//! token mutation needed downstream.

use std::rc::Rc;

use crate::error::{EarlError, EarlResult, SourceLoc};
use crate::token::{Token, TokenKind};

fn keyword(word: &str) -> Option<TokenKind> {
    use TokenKind::{
        Almost, As, Bash, Break, Catch, Class, Continue, Else, Enum, Exec, False, Fn, For, If, Import, In, Info, Let, Loop, Match,
        Mod, None as KwNone, Pipeline, Return, Shell, Some as KwSome, True, Try, Use, When, While, With,
    };
    Some(match word {
        "let" => Let,
        "fn" => Fn,
        "return" => Return,
        "if" => If,
        "else" => Else,
        "while" => While,
        "for" => For,
        "loop" => Loop,
        "in" => In,
        "import" => Import,
        "mod" => Mod,
        "class" => Class,
        "true" => True,
        "false" => False,
        "none" => KwNone,
        "some" => KwSome,
        "match" => Match,
        "when" => When,
        "break" => Break,
        "continue" => Continue,
        "use" => Use,
        "exec" => Exec,
        "with" => With,
        "as" => As,
        "almost" => Almost,
        "enum" => Enum,
        "try" => Try,
        "catch" => Catch,
        "info" => Info,
        "pipeline" => Pipeline,
        "bash" => Bash,
        "shell" => Shell,
        _ => return type_keyword(word),
    })
}

fn type_keyword(word: &str) -> Option<TokenKind> {
    use TokenKind::{TyBool, TyChar, TyClosure, TyFile, TyFloat, TyInt, TyList, TyOption, TyStr, TyTime, TyTuple, TyUnit};
    Some(match word {
        "int" => TyInt,
        "float" => TyFloat,
        "bool" => TyBool,
        "str" => TyStr,
        "char" => TyChar,
        "list" => TyList,
        "tuple" => TyTuple,
        "option" => TyOption,
        "file" => TyFile,
        "closure" => TyClosure,
        "unit" => TyUnit,
        "time" => TyTime,
        _ => return None,
    })
}

/// Scans the whole of `src` up front and returns the token list terminated by
/// an `Eof` token. `file` is only used for error/location reporting.
pub fn lex(src: &str, file: &Rc<str>) -> EarlResult<Vec<Token>> {
    Lexer::new(src, file).run()
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    file: &'a Rc<str>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, file: &'a Rc<str>) -> Self {
        Self { chars: src.chars().collect(), pos: 0, line: 1, col: 1, file, tokens: Vec::new() }
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc::new(self.file.clone(), self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn matches(&mut self, expect: char) -> bool {
        if self.peek() == Some(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<Rc<str>>, loc: SourceLoc) {
        self.tokens.push(Token::new(lexeme, kind, loc));
    }

    fn run(mut self) -> EarlResult<Vec<Token>> {
        while let Some(c) = self.peek() {
            let loc = self.loc();
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '#' => self.skip_line_comment(),
                '"' => self.string_literal(loc)?,
                '\'' => self.char_literal(loc)?,
                '0'..='9' => self.number_literal(loc),
                c if c == '_' || c.is_alphabetic() => self.ident_or_keyword(loc),
                '@' => self.attribute(loc)?,
                '$' => self.fstring(loc)?,
                _ => self.punct(loc)?,
            }
        }
        let eof_loc = self.loc();
        self.push(TokenKind::Eof, "", eof_loc);
        Ok(self.tokens)
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn string_literal(&mut self, loc: SourceLoc) -> EarlResult<()> {
        self.advance();
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => s.push(self.escape()?),
                Some(c) => s.push(c),
                None => return Err(EarlError::syntax(loc, "unterminated string literal")),
            }
        }
        self.push(TokenKind::StrLit, s, loc);
        Ok(())
    }

    fn fstring(&mut self, loc: SourceLoc) -> EarlResult<()> {
        self.advance();
        if self.peek() != Some('"') {
            return Err(EarlError::syntax(loc, "expected `\"` after `$`"));
        }
        self.advance();
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => s.push(self.escape()?),
                Some(c) => s.push(c),
                None => return Err(EarlError::syntax(loc, "unterminated f-string literal")),
            }
        }
        self.push(TokenKind::FStrLit, s, loc);
        Ok(())
    }

    fn escape(&mut self) -> EarlResult<char> {
        let loc = self.loc();
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('$') => Ok('$'),
            Some(other) => Ok(other),
            None => Err(EarlError::syntax(loc, "unterminated escape sequence")),
        }
    }

    fn char_literal(&mut self, loc: SourceLoc) -> EarlResult<()> {
        self.advance();
        let c = match self.advance() {
            Some('\\') => self.escape()?,
            Some(c) => c,
            None => return Err(EarlError::syntax(loc, "unterminated char literal")),
        };
        if !self.matches('\'') {
            return Err(EarlError::syntax(loc, "expected closing `'` in char literal"));
        }
        self.push(TokenKind::CharLit, c.to_string(), loc);
        Ok(())
    }

    fn number_literal(&mut self, loc: SourceLoc) {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            self.push(TokenKind::FloatLit, text, loc);
        } else {
            self.push(TokenKind::IntLit, text, loc);
        }
    }

    fn ident_or_keyword(&mut self, loc: SourceLoc) {
        let start = self.pos;
        while self.peek().is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = keyword(&text).unwrap_or(TokenKind::Ident);
        self.push(kind, text, loc);
    }

    fn attribute(&mut self, loc: SourceLoc) -> EarlResult<()> {
        self.advance();
        let start = self.pos;
        while self.peek().is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            self.advance();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let kind = match text.as_str() {
            "pub" => TokenKind::AttrPub,
            "world" => TokenKind::AttrWorld,
            "ref" => TokenKind::AttrRef,
            "const" => TokenKind::AttrConst,
            "experimental" => TokenKind::AttrExperimental,
            other => return Err(EarlError::syntax(loc, format!("unknown attribute `@{other}`"))),
        };
        self.push(kind, format!("@{text}"), loc);
        Ok(())
    }

    fn punct(&mut self, loc: SourceLoc) -> EarlResult<()> {
        let c = self.advance().expect("checked by caller");
        use TokenKind::{
            Amp, AmpEq, AndAnd, Arrow, Bang, Caret, CaretEq, Colon, ColonColon, Comma, Dot, DotDot, DotDotEq, Eq, EqEq, FatArrow, Gt,
            GtEq, LBrace, LBracket, LParen, Lt, LtEq, Minus, MinusEq, NotEq, OrOr, Percent, PercentEq, Pipe, PipeEq, Plus, PlusEq,
            RBrace, RBracket, RParen, Semicolon, Shl, ShlEq, Shr, ShrEq, Slash, SlashEq, Star, StarEq, StarStar, Tilde,
        };
        let (kind, lexeme): (TokenKind, &str) = match c {
            '(' => (LParen, "("),
            ')' => (RParen, ")"),
            '{' => (LBrace, "{"),
            '}' => (RBrace, "}"),
            '[' => (LBracket, "["),
            ']' => (RBracket, "]"),
            ',' => (Comma, ","),
            ':' => {
                if self.matches(':') {
                    (ColonColon, "::")
                } else {
                    (Colon, ":")
                }
            }
            ';' => (Semicolon, ";"),
            '.' => {
                if self.matches('.') {
                    if self.matches('=') {
                        (DotDotEq, "..=")
                    } else {
                        (DotDot, "..")
                    }
                } else {
                    (Dot, ".")
                }
            }
            '+' => {
                if self.matches('=') {
                    (PlusEq, "+=")
                } else {
                    (Plus, "+")
                }
            }
            '-' => {
                if self.matches('=') {
                    (MinusEq, "-=")
                } else if self.matches('>') {
                    (Arrow, "->")
                } else {
                    (Minus, "-")
                }
            }
            '*' => {
                if self.matches('*') {
                    (StarStar, "**")
                } else if self.matches('=') {
                    (StarEq, "*=")
                } else {
                    (Star, "*")
                }
            }
            '/' => {
                if self.matches('=') {
                    (SlashEq, "/=")
                } else {
                    (Slash, "/")
                }
            }
            '%' => {
                if self.matches('=') {
                    (PercentEq, "%=")
                } else {
                    (Percent, "%")
                }
            }
            '&' => {
                if self.matches('&') {
                    (AndAnd, "&&")
                } else if self.matches('=') {
                    (AmpEq, "&=")
                } else {
                    (Amp, "&")
                }
            }
            '|' => {
                if self.matches('|') {
                    (OrOr, "||")
                } else if self.matches('=') {
                    (PipeEq, "|=")
                } else {
                    (Pipe, "|")
                }
            }
            '^' => {
                if self.matches('=') {
                    (CaretEq, "^=")
                } else {
                    (Caret, "^")
                }
            }
            '!' => {
                if self.matches('=') {
                    (NotEq, "!=")
                } else {
                    (Bang, "!")
                }
            }
            '~' => (Tilde, "~"),
            '=' => {
                if self.matches('=') {
                    (EqEq, "==")
                } else if self.matches('>') {
                    (FatArrow, "=>")
                } else {
                    (Eq, "=")
                }
            }
            '<' => {
                if self.matches('<') {
                    if self.matches('=') {
                        (ShlEq, "<<=")
                    } else {
                        (Shl, "<<")
                    }
                } else if self.matches('=') {
                    (LtEq, "<=")
                } else {
                    (Lt, "<")
                }
            }
            '>' => {
                if self.matches('>') {
                    if self.matches('=') {
                        (ShrEq, ">>=")
                    } else {
                        (Shr, ">>")
                    }
                } else if self.matches('=') {
                    (GtEq, ">=")
                } else {
                    (Gt, ">")
                }
            }
            other => return Err(EarlError::syntax(loc, format!("unexpected character `{other}`"))),
        };
        self.push(kind, lexeme, loc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::lex;
    use crate::token::TokenKind;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let file: std::rc::Rc<str> = "<test>".into();
        lex(src, &file).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_let_binding() {
        assert_eq!(
            kinds("let x = 1 + 2;"),
            vec![
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::IntLit,
                TokenKind::Plus,
                TokenKind::IntLit,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_attrs_and_range() {
        assert_eq!(
            kinds("@pub @const let r = 0..10;"),
            vec![
                TokenKind::AttrPub,
                TokenKind::AttrConst,
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::IntLit,
                TokenKind::DotDot,
                TokenKind::IntLit,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        let file: std::rc::Rc<str> = "<test>".into();
        assert!(lex("\"abc", &file).is_err());
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("# a comment\n1"), vec![TokenKind::IntLit, TokenKind::Eof]);
    }

    #[test]
    fn lexes_new_statement_keywords() {
        assert_eq!(
            kinds("enum try catch info pipeline bash shell"),
            vec![
                TokenKind::Enum,
                TokenKind::Try,
                TokenKind::Catch,
                TokenKind::Info,
                TokenKind::Pipeline,
                TokenKind::Bash,
                TokenKind::Shell,
                TokenKind::Eof,
            ]
        );
    }
}
