#![doc = include_str!("../../../README.md")]
#![expect(clippy::too_many_lines, reason = "dispatch tables and match ladders stay flat")]
#![expect(clippy::module_name_repetitions, reason = "descriptor/holder names mirror the grammar they model")]

mod ast;
mod config;
mod context;
mod error;
mod eval;
mod holder;
mod intrinsics;
mod io;
mod lexer;
mod module_loader;
mod parser;
mod repl;
mod scope;
mod token;
mod value;

pub use crate::{
    ast::{Attrs, BinOp, Block, Expr, Program, Stmt, UnOp},
    config::{MemValue, PersistentMem, RuntimeConfig},
    context::Context,
    error::{EarlError, EarlResult, ErrorKind, SourceLoc},
    eval::{eval_program, eval_stmt, Evaluator},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    module_loader::ModuleLoader,
    repl::ReplSession,
    value::{Value, ValueKind},
};

/// Lexes and parses `src` into a `Program`, the entry point a
/// one-shot file run and the REPL's `eval_line` both reduce to.
pub fn parse_source(src: &str, file: &std::rc::Rc<str>) -> EarlResult<Program> {
    let tokens = lexer::lex(src, file)?;
    parser::parse(tokens)
}

/// Runs `program` to completion in a fresh `World`, the shape a non-REPL file
/// invocation uses.
pub fn run_program(out: &mut dyn PrintWriter, cfg: &mut RuntimeConfig, loader: &mut ModuleLoader, file: std::rc::Rc<str>, program: &Program) -> EarlResult<Value> {
    let world = Context::new_world(file);
    let mut ev = Evaluator::new(out, cfg, loader);
    eval_program(&mut ev, &world, program)
}

/// Reads, lexes, parses, and runs the file at `path` end-to-end — the
/// reduction `earl-cli`'s file-run mode drives to produce its 0/1 exit code.
pub fn run_file(out: &mut dyn PrintWriter, cfg: &mut RuntimeConfig, loader: &mut ModuleLoader, path: &std::path::Path) -> EarlResult<Value> {
    let src = std::fs::read_to_string(path).map_err(|e| EarlError::fatal(SourceLoc::unknown(), format!("cannot read {}: {e}", path.display())))?;
    let file: std::rc::Rc<str> = path.display().to_string().into();
    let program = parse_source(&src, &file)?;
    run_program(out, cfg, loader, file, &program)
}

#[cfg(test)]
mod tests {
    use super::{parse_source, run_program, CollectStringPrint, ModuleLoader, RuntimeConfig};

    #[test]
    fn end_to_end_let_and_print() {
        let program = parse_source("let x = 1 + 2; print(x);", &std::rc::Rc::from("<test>")).unwrap();
        let mut out = CollectStringPrint::new();
        let mut cfg = RuntimeConfig::default();
        let mut loader = ModuleLoader::new(vec![]);
        run_program(&mut out, &mut cfg, &mut loader, std::rc::Rc::from("<test>"), &program).unwrap();
        assert_eq!(out.output(), "3");
    }

    #[test]
    fn const_reassignment_is_a_type_error() {
        let program = parse_source("const let x = 1; x = 2;", &std::rc::Rc::from("<test>")).unwrap();
        let mut out = CollectStringPrint::new();
        let mut cfg = RuntimeConfig::default();
        let mut loader = ModuleLoader::new(vec![]);
        let err = run_program(&mut out, &mut cfg, &mut loader, std::rc::Rc::from("<test>"), &program).unwrap_err();
        assert_eq!(err.kind, super::ErrorKind::Type);
    }
}
