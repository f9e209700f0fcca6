//! The tree-walking evaluator: statement/expression dispatch, function/closure
//! invocation, class instantiation, and the `Mut` lvalue-resolution needed for
//! non-identifier assignment targets.
//!
//! One `Evaluator` struct is threaded through mutually recursive
//! `eval_stmt`/`eval_expr`, against an owner-chained `Context`
//! (`context.rs`) rather than a single global namespace stack.
//! `intrinsics::call_member`'s injected `invoke` closure and
//! `holder::VariableHolder`'s injected `on_mutate` closure both terminate
//! here, which is the only module allowed to depend on every other piece of
//! the runtime.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Attrs, BinOp, Block, CaseArm, Expr, Program, Stmt};
use crate::context::{Context, ContextKind, ImportDepth, ImportedModule};
use crate::error::{EarlError, EarlResult, SourceLoc};
use crate::holder::{ClassDescriptor, ClosureDescriptor, EnumDescriptor, FunctionHolder, ParamDesc, VariableHolder};
use crate::intrinsics;
use crate::io::PrintWriter;
use crate::module_loader::ModuleLoader;
use crate::value::{compatible, shared, DictKey, EarlDict, EarlString, Value, ValueKind};

/// Threaded through every `eval_stmt`/`eval_expr` call: I/O sink, the flag
/// set, and the module cache. `aliases` backs `use`
/// — there is no dedicated alias table on
/// `Context`, and the mapping is process-wide rather than scope-local.
pub struct Evaluator<'a> {
    pub out: &'a mut dyn PrintWriter,
    pub cfg: &'a mut crate::config::RuntimeConfig,
    pub loader: &'a mut ModuleLoader,
    aliases: HashMap<String, String>,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub fn new(out: &'a mut dyn PrintWriter, cfg: &'a mut crate::config::RuntimeConfig, loader: &'a mut ModuleLoader) -> Self {
        Self { out, cfg, loader, aliases: HashMap::new() }
    }
}

/// Pushes a scope frame on construction, pops it on drop — guarantees the
/// pop runs on every exit path, including an early `?` return or a `Return`
/// sentinel bubbling through. Applied to every block, not just `with`.
struct ScopeGuard<'c> {
    ctx: &'c Rc<RefCell<Context>>,
}

impl<'c> ScopeGuard<'c> {
    fn new(ctx: &'c Rc<RefCell<Context>>) -> Self {
        ctx.borrow_mut().push_scope();
        Self { ctx }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.ctx.borrow_mut().pop_scope();
    }
}

/// Runs every top-level statement of a freshly parsed program into `world`.
pub fn eval_program(ev: &mut Evaluator, world: &Rc<RefCell<Context>>, program: &Program) -> EarlResult<Value> {
    let mut last = Value::Void;
    for stmt in program {
        last = eval_stmt(ev, world, stmt)?;
    }
    Ok(last)
}

fn eval_block(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, block: &Block) -> EarlResult<Value> {
    let _guard = ScopeGuard::new(ctx);
    let mut result = Value::Void;
    for stmt in &block.stmts {
        result = eval_stmt(ev, ctx, stmt)?;
        if matches!(result, Value::Return(_) | Value::Break | Value::Continue) {
            return Ok(result);
        }
    }
    let _ = &result;
    Ok(Value::Void)
}

/// A function/closure body gets its own scope and, if
/// `!disable_implicit_returns`, yields its last `ExprStmt`'s value when no
/// explicit `return` fires.
fn eval_function_body(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, block: &Block, implicit_returns: bool) -> EarlResult<Value> {
    let _guard = ScopeGuard::new(ctx);
    let mut last_expr_value = Value::Void;
    for (i, stmt) in block.stmts.iter().enumerate() {
        let is_last = i + 1 == block.stmts.len();
        if is_last && implicit_returns {
            if let Stmt::ExprStmt(e) = stmt {
                last_expr_value = eval_expr(ev, ctx, e)?;
                continue;
            }
        }
        match eval_stmt(ev, ctx, stmt)? {
            Value::Return(inner) => return Ok(*inner),
            Value::Break | Value::Continue => {
                return Err(EarlError::fatal(stmt.loc(), "`break`/`continue` outside of a loop"));
            }
            _ => {}
        }
    }
    Ok(last_expr_value)
}

fn eval_args(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, exprs: &[Expr]) -> EarlResult<Vec<Value>> {
    exprs.iter().map(|e| eval_expr(ev, ctx, e)).collect()
}

fn typecheck(declared: ValueKind, arg: &Value, loc: &SourceLoc) -> EarlResult<()> {
    let actual = arg.kind();
    if compatible(declared, actual) {
        Ok(())
    } else {
        Err(EarlError::ty(loc.clone(), format!("expected {declared}, got {actual}")))
    }
}

/// Binds call arguments into a freshly created function/closure context:
/// type-checks against a declared annotation, binds `ref` parameters to the
/// caller's shared handle and everything else to a deep copy, and carries
/// the `const` attribute through
/// so later `Mut`s on the parameter are rejected.
fn load_parameters(new_ctx: &Rc<RefCell<Context>>, params: &[ParamDesc], args: Vec<Value>, loc: &SourceLoc) -> EarlResult<()> {
    if args.len() != params.len() {
        return Err(EarlError::ty(loc.clone(), format!("expected {} argument(s), got {}", params.len(), args.len())));
    }
    for (param, arg) in params.iter().zip(args) {
        if let Some(declared) = param.ty {
            typecheck(declared, &arg, loc)?;
        }
        let bound = if param.attrs.is_ref() { arg } else { arg.copy() };
        let holder = VariableHolder::new(param.name.clone(), bound, param.attrs);
        new_ctx.borrow_mut().vars.add_force(param.name.to_string(), Rc::new(RefCell::new(holder)));
    }
    Ok(())
}

fn invoke_function(ev: &mut Evaluator, func: &Rc<FunctionHolder>, args: Vec<Value>, caller: &Rc<RefCell<Context>>, this: std::option::Option<&Rc<RefCell<Context>>>, loc: &SourceLoc) -> EarlResult<Value> {
    let new_ctx = match this {
        Some(instance) => Context::new_method_function(instance, caller),
        std::option::Option::None => Context::new_function(caller, func.is_world()),
    };
    load_parameters(&new_ctx, &func.params, args, loc)?;
    eval_function_body(ev, &new_ctx, &func.body, !ev.cfg.disable_implicit_returns)
}

fn invoke_closure(ev: &mut Evaluator, desc: &Rc<ClosureDescriptor>, args: Vec<Value>, caller: &Rc<RefCell<Context>>, loc: &SourceLoc) -> EarlResult<Value> {
    let captured = desc.captured.upgrade().ok_or_else(|| EarlError::fatal(loc.clone(), "closure's captured context no longer exists"))?;
    let new_ctx = Context::new_closure_invocation(&captured, caller);
    load_parameters(&new_ctx, &desc.params, args, loc)?;
    eval_function_body(ev, &new_ctx, &desc.body, !ev.cfg.disable_implicit_returns)
}

/// Invokes whatever `value` holds as a callee:
/// `Closure`, `FunctionRef`, or `ClassRef` treated as instantiation.
fn invoke_value(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, value: &Value, args: Vec<Value>, loc: &SourceLoc) -> EarlResult<Value> {
    match value {
        Value::Closure(desc) => invoke_closure(ev, desc, args, ctx, loc),
        Value::FunctionRef(f) => invoke_function(ev, f, args, ctx, std::option::Option::None, loc),
        Value::ClassRef(c) => instantiate_class(ev, ctx, c, args, loc),
        other => Err(EarlError::ty(loc.clone(), format!("{} is not callable", other.kind()))),
    }
}

/// Class instantiation: a fresh `Class` context owned by the
/// instantiating context's nearest World, constructor args staged in a
/// temporary map visible to member `Let`s in declaration order, then methods
/// registered into the instance's own function table.
fn instantiate_class(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, cls: &Rc<ClassDescriptor>, args: Vec<Value>, loc: &SourceLoc) -> EarlResult<Value> {
    if cls.ctor_params.len() != args.len() {
        return Err(EarlError::ty(loc.clone(), format!("`{}` expects {} constructor argument(s), got {}", cls.name, cls.ctor_params.len(), args.len())));
    }
    let inst_ctx = Context::new_class_instance(ctx, cls.clone());
    {
        let inst = inst_ctx.borrow();
        if let ContextKind::Class { ctor_tmp, .. } = &inst.kind {
            let mut map = indexmap::IndexMap::with_hasher(ahash::RandomState::new());
            for (name, value) in cls.ctor_params.iter().zip(args) {
                map.insert(name.to_string(), value);
            }
            *ctor_tmp.borrow_mut() = std::option::Option::Some(map);
        }
    }
    for member_stmt in &cls.members {
        eval_stmt(ev, &inst_ctx, member_stmt)?;
    }
    {
        let inst = inst_ctx.borrow();
        if let ContextKind::Class { ctor_tmp, .. } = &inst.kind {
            *ctor_tmp.borrow_mut() = std::option::Option::None;
        }
    }
    for (name, f) in &cls.methods {
        Context::function_add(&inst_ctx, name.clone(), f.clone())?;
    }
    Ok(Value::Instance(inst_ctx))
}

// ---------------- statements ----------------

pub fn eval_stmt(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, stmt: &Stmt) -> EarlResult<Value> {
    match stmt {
        Stmt::Let { names, attrs, value, loc } => eval_let(ev, ctx, names, *attrs, value, loc),
        Stmt::Mut { target, op, value, loc } => eval_mut(ev, ctx, target, *op, value, loc),
        Stmt::Block(b) => eval_block(ev, ctx, b),
        Stmt::ExprStmt(e) => {
            eval_expr(ev, ctx, e)?;
            Ok(Value::Void)
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            if eval_expr(ev, ctx, cond)?.boolean() {
                eval_block(ev, ctx, then_branch)
            } else if let Some(else_stmt) = else_branch {
                eval_stmt(ev, ctx, else_stmt)
            } else {
                Ok(Value::Void)
            }
        }
        Stmt::Return(expr, _loc) => {
            let v = match expr {
                Some(e) => eval_expr(ev, ctx, e)?,
                std::option::Option::None => Value::Void,
            };
            Ok(Value::Return(Box::new(v)))
        }
        Stmt::Break(_) => Ok(Value::Break),
        Stmt::Continue(_) => Ok(Value::Continue),
        Stmt::While { cond, body, .. } => eval_while(ev, ctx, cond, body),
        Stmt::Loop { body, .. } => eval_loop(ev, ctx, body),
        Stmt::For { var, start, end, body, loc } => eval_for(ev, ctx, var, start, end, body, loc),
        Stmt::Foreach { vars, iterable, body, loc } => eval_foreach(ev, ctx, vars, iterable, body, loc),
        Stmt::Def { name, params, attrs, body, .. } => {
            let holder = Rc::new(FunctionHolder { name: name.clone(), params: params.iter().map(ParamDesc::from).collect(), attrs: *attrs, body: body.clone(), info: std::option::Option::None });
            Context::function_add(ctx, name.clone(), holder)?;
            Ok(Value::Void)
        }
        Stmt::Class { name, attrs, ctor_params, members, methods, .. } => {
            let methods_built: Vec<(Rc<str>, Rc<FunctionHolder>)> = methods
                .iter()
                .filter_map(|m| match m {
                    Stmt::Def { name, params, attrs, body, .. } => {
                        Some((name.clone(), Rc::new(FunctionHolder { name: name.clone(), params: params.iter().map(ParamDesc::from).collect(), attrs: *attrs, body: body.clone(), info: std::option::Option::None })))
                    }
                    _ => None,
                })
                .collect();
            let descriptor = Rc::new(ClassDescriptor {
                name: name.clone(),
                attrs: *attrs,
                ctor_params: ctor_params.clone(),
                members: members.clone(),
                methods: methods_built,
                owner: Rc::downgrade(&Context::get_world(ctx)),
            });
            Context::class_add(ctx, descriptor);
            Ok(Value::Void)
        }
        Stmt::Enum { name, variants, .. } => {
            let mut entries = indexmap::IndexMap::with_hasher(ahash::RandomState::new());
            for (i, v) in variants.iter().enumerate() {
                entries.insert(v.to_string(), Value::Int(i as i64));
            }
            Context::enum_add(ctx, Rc::new(EnumDescriptor { name: name.clone(), entries }));
            Ok(Value::Void)
        }
        Stmt::Import { path, almost, alias, loc } => eval_import(ev, ctx, path, *almost, alias.as_deref(), loc),
        Stmt::Mod(id, _loc) => {
            Context::set_module_id(ctx, id.to_string());
            Ok(Value::Void)
        }
        Stmt::Match { expr, arms, .. } => {
            let scrut = eval_expr(ev, ctx, expr)?;
            for (pat, body_expr) in arms {
                let pv = eval_expr(ev, ctx, pat)?;
                if scrut.eq(&pv) {
                    eval_expr(ev, ctx, body_expr)?;
                    return Ok(Value::Void);
                }
            }
            Ok(Value::Void)
        }
        Stmt::With { names, exprs, body, loc } => {
            if names.len() != exprs.len() {
                return Err(EarlError::ty(loc.clone(), "`with` requires one expression per bound name"));
            }
            let _guard = ScopeGuard::new(ctx);
            for (name, e) in names.iter().zip(exprs.iter()) {
                let v = eval_expr(ev, ctx, e)?;
                Context::variable_add(ctx, VariableHolder::new(name.clone(), v, Attrs::empty()))?;
            }
            eval_block(ev, ctx, body)
        }
        Stmt::Try { body, err_name, catch_body, .. } => match eval_block(ev, ctx, body) {
            Ok(v) => Ok(v),
            Err(e) if e.kind.is_catchable() => {
                let _guard = ScopeGuard::new(ctx);
                Context::variable_add(ctx, VariableHolder::new(err_name.clone(), Value::str_from(&e.message), Attrs::empty()))?;
                eval_block(ev, ctx, catch_body)
            }
            Err(e) => Err(e),
        },
        Stmt::Use { alias, command, .. } => {
            ev.aliases.insert(alias.to_string(), command.to_string());
            Ok(Value::Void)
        }
        Stmt::Exec(cmd, loc) => run_shell_stmt(&expand_alias(&ev.aliases, cmd), loc, ev.cfg.error_on_bash_fail),
        Stmt::MultilineBash(script, loc) => run_shell_stmt(&expand_alias(&ev.aliases, script), loc, ev.cfg.error_on_bash_fail),
        Stmt::BashLiteral(text, loc) => run_shell_stmt(&expand_alias(&ev.aliases, text), loc, ev.cfg.error_on_bash_fail),
        Stmt::Info(msg, _loc) => {
            if ev.cfg.verbose {
                ev.out.write_line(msg)?;
            }
            Ok(Value::Void)
        }
        Stmt::Pipe(exprs, _loc) => {
            for e in exprs {
                eval_expr(ev, ctx, e)?;
            }
            Ok(Value::Void)
        }
    }
}

/// Expands a `use`-declared alias occupying the command's first word:
/// `use ll = "ls -la"` then `ll /tmp` runs `ls -la /tmp`.
fn expand_alias(aliases: &HashMap<String, String>, cmd: &str) -> String {
    let Some((head, rest)) = cmd.split_once(' ') else {
        return aliases.get(cmd).cloned().unwrap_or_else(|| cmd.to_owned());
    };
    match aliases.get(head) {
        Some(expansion) => format!("{expansion} {rest}"),
        std::option::Option::None => cmd.to_owned(),
    }
}

fn run_shell_stmt(cmd: &str, loc: &SourceLoc, error_on_fail: bool) -> EarlResult<Value> {
    match std::process::Command::new("sh").arg("-c").arg(cmd).status() {
        Ok(status) if status.success() || !error_on_fail => Ok(Value::Void),
        Ok(status) => Err(EarlError::fatal(loc.clone(), format!("`{cmd}` exited with status {:?}", status.code()))),
        Err(e) => Err(EarlError::fatal(loc.clone(), format!("failed to run `{cmd}`: {e}"))),
    }
}

fn eval_let(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, names: &[Rc<str>], attrs: Attrs, value: &Expr, loc: &SourceLoc) -> EarlResult<Value> {
    let v = eval_expr(ev, ctx, value)?;
    if names.len() == 1 {
        Context::variable_add(ctx, VariableHolder::new(names[0].clone(), v, attrs))?;
        return Ok(Value::Void);
    }
    let parts = destructure(&v, loc)?;
    if parts.len() != names.len() {
        return Err(EarlError::ty(loc.clone(), "`let` destructuring arity mismatch"));
    }
    for (name, part) in names.iter().zip(parts) {
        Context::variable_add(ctx, VariableHolder::new(name.clone(), part, attrs))?;
    }
    Ok(Value::Void)
}

fn destructure(v: &Value, loc: &SourceLoc) -> EarlResult<Vec<Value>> {
    match v {
        Value::Tuple(t) => Ok(t.iter().map(Value::copy).collect()),
        Value::List(l) => Ok(l.borrow().iter().map(Value::copy).collect()),
        other => Err(EarlError::ty(loc.clone(), format!("expected a Tuple or List to destructure, got {}", other.kind()))),
    }
}

fn eval_while(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, cond: &Expr, body: &Block) -> EarlResult<Value> {
    loop {
        if !eval_expr(ev, ctx, cond)?.boolean() {
            break;
        }
        match eval_block(ev, ctx, body)? {
            Value::Break => break,
            other @ Value::Return(_) => return Ok(other),
            _ => {}
        }
    }
    Ok(Value::Void)
}

fn eval_loop(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, body: &Block) -> EarlResult<Value> {
    loop {
        match eval_block(ev, ctx, body)? {
            Value::Break => break,
            other @ Value::Return(_) => return Ok(other),
            _ => {}
        }
    }
    Ok(Value::Void)
}

fn eval_for(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, var: &Rc<str>, start: &Expr, end: &Expr, body: &Block, loc: &SourceLoc) -> EarlResult<Value> {
    let (Value::Int(lo), Value::Int(hi)) = (eval_expr(ev, ctx, start)?, eval_expr(ev, ctx, end)?) else {
        return Err(EarlError::ty(loc.clone(), "`for` range endpoints must be Int"));
    };
    for i in lo..hi {
        let _guard = ScopeGuard::new(ctx);
        Context::variable_add(ctx, VariableHolder::new(var.clone(), Value::Int(i), Attrs::empty()))?;
        match eval_block(ev, ctx, body)? {
            Value::Break => break,
            other @ Value::Return(_) => return Ok(other),
            _ => {}
        }
    }
    Ok(Value::Void)
}

fn eval_foreach(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, vars: &[Rc<str>], iterable: &Expr, body: &Block, loc: &SourceLoc) -> EarlResult<Value> {
    let it = eval_expr(ev, ctx, iterable)?;
    let elements = iterable_elements(&it, loc)?;
    for elem in elements {
        let _guard = ScopeGuard::new(ctx);
        bind_foreach_vars(ctx, vars, elem, loc)?;
        match eval_block(ev, ctx, body)? {
            Value::Break => break,
            other @ Value::Return(_) => return Ok(other),
            _ => {}
        }
    }
    Ok(Value::Void)
}

fn iterable_elements(v: &Value, loc: &SourceLoc) -> EarlResult<Vec<Value>> {
    match v {
        Value::List(l) => Ok(l.borrow().iter().map(Value::copy).collect()),
        Value::Tuple(t) => Ok(t.iter().map(Value::copy).collect()),
        Value::Str(s) => {
            let text = s.borrow().as_str();
            Ok(text.bytes().map(Value::Char).collect())
        }
        Value::Dict(d) => Ok(d.borrow().entries.iter().map(|(k, v)| Value::Tuple(Rc::new(vec![k.to_value(), v.copy()]))).collect()),
        other => Err(EarlError::ty(loc.clone(), format!("{} is not iterable", other.kind()))),
    }
}

fn bind_foreach_vars(ctx: &Rc<RefCell<Context>>, vars: &[Rc<str>], elem: Value, loc: &SourceLoc) -> EarlResult<()> {
    if vars.len() == 1 {
        return Context::variable_add(ctx, VariableHolder::new(vars[0].clone(), elem, Attrs::empty()));
    }
    let parts = destructure(&elem, loc)?;
    if parts.len() != vars.len() {
        return Err(EarlError::ty(loc.clone(), "`foreach` destructuring arity mismatch"));
    }
    for (name, v) in vars.iter().zip(parts) {
        Context::variable_add(ctx, VariableHolder::new(name.clone(), v, Attrs::empty()))?;
    }
    Ok(())
}

fn eval_import(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, path: &str, almost: bool, alias: std::option::Option<&str>, loc: &SourceLoc) -> EarlResult<Value> {
    let importer_file = Context::file_path(&Context::get_world(ctx));
    let canonical = ev.loader.resolve(path, &importer_file, loc)?;
    let guessed_id = canonical.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let world = match ev.loader.get(&canonical) {
        Some(cached) => cached,
        std::option::Option::None => {
            let src = std::fs::read_to_string(&canonical).map_err(|e| EarlError::fatal(loc.clone(), format!("cannot read `{}`: {e}", canonical.display())))?;
            let file_rc: Rc<str> = Rc::from(canonical.to_string_lossy().as_ref());
            let tokens = crate::lexer::lex(&src, &file_rc)?;
            let program = crate::parser::parse(tokens)?;
            let new_world = Context::new_world(file_rc);
            Context::set_module_id(&new_world, guessed_id.clone());
            for s in &program {
                eval_stmt(ev, &new_world, s)?;
            }
            ev.loader.insert(canonical.clone(), new_world.clone());
            new_world
        }
    };
    let final_id = {
        let id = Context::module_id(&world);
        if id.is_empty() {
            guessed_id
        } else {
            id
        }
    };
    let depth = if almost { ImportDepth::Almost } else { ImportDepth::Full };
    let key = alias.map(str::to_owned).unwrap_or(final_id);
    let world_ctx = Context::get_world(ctx);
    Context::add_import(&world_ctx, key, ImportedModule { world, depth, alias: alias.map(str::to_owned) });
    Ok(Value::Void)
}

// ---------------- `Mut` lvalue resolution ----------------

enum LValue {
    Var(Rc<RefCell<VariableHolder>>),
    ListIndex(crate::value::Shared<Vec<Value>>, usize),
    DictEntry(crate::value::Shared<EarlDict>, DictKey),
    StrChar(crate::value::Shared<EarlString>, usize),
    InstanceField(Rc<RefCell<Context>>, Rc<str>),
}

fn resolve_lvalue(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, expr: &Expr) -> EarlResult<LValue> {
    match expr {
        Expr::Ident(name, loc) => {
            let holder = Context::variable_get(ctx, name).ok_or_else(|| EarlError::undeclared(loc.clone(), name))?;
            Ok(LValue::Var(holder))
        }
        Expr::Get(recv_expr, member, loc) => match eval_expr(ev, ctx, recv_expr)? {
            Value::Instance(inst_ctx) => Ok(LValue::InstanceField(inst_ctx, member.clone())),
            other => Err(EarlError::ty(loc.clone(), format!("cannot assign to a member of {}", other.kind()))),
        },
        Expr::ArrayAccess(left, index, loc) => {
            let recv = eval_expr(ev, ctx, left)?;
            let idx = eval_expr(ev, ctx, index)?;
            match (recv, idx) {
                (Value::List(l), Value::Int(i)) => {
                    if i < 0 || i as usize >= l.borrow().len() {
                        return Err(EarlError::fatal(loc.clone(), "index out of range"));
                    }
                    Ok(LValue::ListIndex(l, i as usize))
                }
                (Value::Str(s), Value::Int(i)) => {
                    if i < 0 || i as usize >= s.borrow().len() {
                        return Err(EarlError::fatal(loc.clone(), "index out of range"));
                    }
                    Ok(LValue::StrChar(s, i as usize))
                }
                (Value::Dict(d), key) => {
                    let k = DictKey::from_value(&key).ok_or_else(|| EarlError::ty(loc.clone(), "Dict key must be a scalar kind"))?;
                    Ok(LValue::DictEntry(d, k))
                }
                (other, _) => Err(EarlError::ty(loc.clone(), format!("cannot assign into {}", other.kind()))),
            }
        }
        other => Err(EarlError::ty(other.loc(), "expression is not assignable")),
    }
}

fn combine(old: &Value, op: std::option::Option<BinOp>, rhs: Value, loc: &SourceLoc) -> EarlResult<Value> {
    match op {
        Some(o) => old.binop(o, &rhs, loc),
        std::option::Option::None => Ok(rhs),
    }
}

/// Assigns through a `VariableHolder`, then fires its `observe` listener (if
/// any) with the post-assignment value.
fn assign_to_holder(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, holder: &Rc<RefCell<VariableHolder>>, op: std::option::Option<BinOp>, rhs: Value, loc: &SourceLoc) -> EarlResult<()> {
    match op {
        Some(o) => holder.borrow_mut().spec_mutate(o, &rhs, loc, |_, _| Ok(()))?,
        std::option::Option::None => holder.borrow_mut().mutate(rhs, loc, |_, _| Ok(()))?,
    }
    let listener = holder.borrow().listener.clone();
    if let Some(cb) = listener {
        let nv = holder.borrow().value.copy();
        invoke_value(ev, ctx, &cb, vec![nv], loc)?;
    }
    Ok(())
}

/// `toggle` flips a Bool receiver in place and returns `Void`, so it needs
/// write access to the receiver's lvalue rather than just its copied
/// `Value`. Resolves `recv_expr` as an lvalue itself; returns `None` when the
/// receiver isn't assignable or doesn't currently hold a Bool, letting
/// `eval_method_call` fall through to the generic dispatch (which reports a
/// typed error for a non-assignable Bool, or an undeclared-member error for
/// anything else).
fn eval_toggle(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, recv_expr: &Expr, loc: &SourceLoc) -> std::option::Option<EarlResult<Value>> {
    let lvalue = resolve_lvalue(ev, ctx, recv_expr).ok()?;
    let Value::Bool(b) = read_lvalue(&lvalue, loc).ok()? else {
        return std::option::Option::None;
    };
    std::option::Option::Some(write_toggle(ev, ctx, lvalue, b, loc))
}

fn read_lvalue(lvalue: &LValue, loc: &SourceLoc) -> EarlResult<Value> {
    match lvalue {
        LValue::Var(holder) => Ok(holder.borrow().value.clone()),
        LValue::InstanceField(inst_ctx, member) => Context::variable_get(inst_ctx, member)
            .map(|h| h.borrow().value.clone())
            .ok_or_else(|| EarlError::undeclared(loc.clone(), member)),
        LValue::ListIndex(l, i) => Ok(l.borrow()[*i].clone()),
        LValue::DictEntry(d, k) => d.borrow().entries.get(k).cloned().ok_or_else(|| EarlError::fatal(loc.clone(), "no such Dict key")),
        LValue::StrChar(..) => Err(EarlError::ty(loc.clone(), "`toggle` expects a Bool receiver")),
    }
}

fn write_toggle(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, lvalue: LValue, b: bool, loc: &SourceLoc) -> EarlResult<Value> {
    match lvalue {
        LValue::Var(holder) => assign_to_holder(ev, ctx, &holder, std::option::Option::None, Value::Bool(!b), loc)?,
        LValue::InstanceField(inst_ctx, member) => {
            let holder = Context::variable_get(&inst_ctx, &member).ok_or_else(|| EarlError::undeclared(loc.clone(), &member))?;
            assign_to_holder(ev, ctx, &holder, std::option::Option::None, Value::Bool(!b), loc)?;
        }
        LValue::ListIndex(l, i) => l.borrow_mut()[i] = Value::Bool(!b),
        LValue::DictEntry(d, k) => {
            d.borrow_mut().entries.insert(k, Value::Bool(!b));
        }
        LValue::StrChar(..) => unreachable!("read_lvalue already rejected StrChar"),
    }
    Ok(Value::Void)
}

fn eval_mut(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, target: &Expr, op: std::option::Option<BinOp>, value: &Expr, loc: &SourceLoc) -> EarlResult<Value> {
    let lvalue = resolve_lvalue(ev, ctx, target)?;
    let rhs = eval_expr(ev, ctx, value)?;
    match lvalue {
        LValue::Var(holder) => assign_to_holder(ev, ctx, &holder, op, rhs, loc)?,
        LValue::InstanceField(inst_ctx, member) => {
            let holder = Context::variable_get(&inst_ctx, &member).ok_or_else(|| EarlError::undeclared(loc.clone(), &member))?;
            assign_to_holder(ev, ctx, &holder, op, rhs, loc)?;
        }
        LValue::ListIndex(l, i) => {
            let old = l.borrow()[i].copy();
            let new_val = combine(&old, op, rhs, loc)?;
            l.borrow_mut()[i] = new_val;
        }
        LValue::DictEntry(d, k) => {
            let mut dict = d.borrow_mut();
            let old = dict.entries.get(&k).map(Value::copy);
            let new_val = match (op, old) {
                (Some(o), Some(old)) => old.binop(o, &rhs, loc)?,
                _ => rhs,
            };
            dict.entries.insert(k, new_val);
        }
        LValue::StrChar(s, i) => {
            let old = Value::Char(*EarlString::externalize(&s, i)?.borrow());
            let new_val = combine(&old, op, rhs, loc)?;
            let Value::Char(c) = new_val else {
                return Err(EarlError::ty(loc.clone(), "a string character slot requires a Char value"));
            };
            *EarlString::externalize(&s, i)?.borrow_mut() = c;
        }
    }
    Ok(Value::Void)
}

// ---------------- expressions ----------------

pub fn eval_expr(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, expr: &Expr) -> EarlResult<Value> {
    match expr {
        Expr::IntLit(i, _) => Ok(Value::Int(*i)),
        Expr::FloatLit(f, _) => Ok(Value::Float(*f)),
        Expr::StrLit(s, _) => Ok(Value::str_from(s.as_ref())),
        Expr::CharLit(c, _) => Ok(Value::Char(*c)),
        Expr::BoolLit(b, _) => Ok(Value::Bool(*b)),
        Expr::NoneLit(_) => Ok(Value::Option(std::option::Option::None)),
        Expr::Ident(name, loc) => eval_ident(ctx, name, loc),
        Expr::ListLit(items, _) => {
            let vals = eval_args(ev, ctx, items)?;
            Ok(Value::List(shared(vals)))
        }
        Expr::TupleLit(items, _) => {
            let vals = eval_args(ev, ctx, items)?;
            Ok(Value::Tuple(Rc::new(vals)))
        }
        Expr::DictLit(type_kw, pairs, loc) => eval_dict_lit(ev, ctx, type_kw, pairs, loc),
        Expr::FuncCall(callee, args, loc) => eval_func_call(ev, ctx, callee, args, loc),
        Expr::Get(recv, member, loc) => eval_get(ev, ctx, recv, member, loc),
        Expr::ModAccess(ident, right, loc) => eval_mod_access(ev, ctx, ident, right, loc),
        Expr::ArrayAccess(left, index, loc) => eval_array_access(ev, ctx, left, index, loc),
        Expr::Slice(start, end, _loc) => {
            let s = match start {
                Some(e) => eval_expr(ev, ctx, e)?,
                std::option::Option::None => Value::Void,
            };
            let e = match end {
                Some(expr) => eval_expr(ev, ctx, expr)?,
                std::option::Option::None => Value::Void,
            };
            Ok(Value::Slice(Box::new(s), Box::new(e)))
        }
        Expr::Range(a, b, inclusive, loc) => eval_range(ev, ctx, a, b, *inclusive, loc),
        Expr::Closure { params, attrs, body, .. } => Ok(Value::Closure(Rc::new(ClosureDescriptor {
            params: params.iter().map(ParamDesc::from).collect(),
            attrs: *attrs,
            body: body.clone(),
            captured: Rc::downgrade(ctx),
        }))),
        Expr::FStr(template, loc) => eval_fstr(ev, ctx, template, loc),
        Expr::Case { expr, arms, default, .. } => eval_case(ev, ctx, expr, arms, default.as_deref()),
        Expr::Binary(lhs, op, rhs, loc) => eval_binary(ev, ctx, lhs, *op, rhs, loc),
        Expr::Unary(op, inner, loc) => {
            let v = eval_expr(ev, ctx, inner)?;
            v.unaryop(*op, loc)
        }
        Expr::Predicate(p, _loc) => {
            let rhs = eval_expr(ev, ctx, &p.rhs)?;
            Ok(Value::Predicate(Rc::new(crate::value::PredicateValue { op: p.op, rhs: Box::new(rhs) })))
        }
    }
}

/// `Ident` resolves in order: local variable, declared function, declared
/// class, then an intrinsic-name error fallback.
fn eval_ident(ctx: &Rc<RefCell<Context>>, name: &str, loc: &SourceLoc) -> EarlResult<Value> {
    if let Some(holder) = Context::variable_get(ctx, name) {
        return Ok(holder.borrow().value.clone());
    }
    if let Some(f) = Context::function_get(ctx, name) {
        return Ok(Value::FunctionRef(f));
    }
    if let Some(c) = Context::class_get(ctx, name) {
        return Ok(Value::ClassRef(c));
    }
    if let Some(e) = Context::enum_get(ctx, name) {
        return Ok(Value::Enum(e));
    }
    Err(EarlError::undeclared(loc.clone(), name))
}

fn eval_dict_lit(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, type_kw: &Expr, pairs: &[(Expr, Expr)], loc: &SourceLoc) -> EarlResult<Value> {
    let key_kind_val = eval_expr(ev, ctx, type_kw)?;
    let Value::TypeKW(kind) = key_kind_val else {
        return Err(EarlError::ty(loc.clone(), "Dict literal requires a TypeKW naming the key kind"));
    };
    let key_kind = match kind {
        ValueKind::Int => crate::value::DictKeyKind::Int,
        ValueKind::Str => crate::value::DictKeyKind::Str,
        ValueKind::Char => crate::value::DictKeyKind::Char,
        ValueKind::Float => crate::value::DictKeyKind::Float,
        other => return Err(EarlError::ty(loc.clone(), format!("{other} cannot key a Dict"))),
    };
    let mut dict = EarlDict::new(key_kind);
    for (k_expr, v_expr) in pairs {
        let k = eval_expr(ev, ctx, k_expr)?;
        let v = eval_expr(ev, ctx, v_expr)?;
        let key = DictKey::from_value(&k).ok_or_else(|| EarlError::ty(loc.clone(), "Dict key must be a scalar kind"))?;
        if key.kind() != key_kind {
            return Err(EarlError::ty(loc.clone(), "Dict key kind mismatch"));
        }
        dict.entries.insert(key, v);
    }
    Ok(Value::Dict(shared(dict)))
}

fn eval_func_call(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, callee: &Expr, arg_exprs: &[Expr], loc: &SourceLoc) -> EarlResult<Value> {
    if let Expr::Ident(name, _) = callee {
        if name.as_ref() == "observe" {
            return eval_observe(ev, ctx, arg_exprs, loc);
        }
        if intrinsics::is_free_intrinsic_name(name) {
            let args = eval_args(ev, ctx, arg_exprs)?;
            return intrinsics::call_free(name, args, loc, ev.out, ev.cfg).unwrap_or_else(|| Err(EarlError::undeclared(loc.clone(), name)));
        }
        if let Some(holder) = Context::variable_get(ctx, name) {
            let value = holder.borrow().value.clone();
            let args = eval_args(ev, ctx, arg_exprs)?;
            return invoke_value(ev, ctx, &value, args, loc);
        }
        if let Some(f) = Context::function_get(ctx, name) {
            let args = eval_args(ev, ctx, arg_exprs)?;
            return invoke_function(ev, &f, args, ctx, std::option::Option::None, loc);
        }
        if let Some(cls) = Context::class_get(ctx, name) {
            let args = eval_args(ev, ctx, arg_exprs)?;
            return instantiate_class(ev, ctx, &cls, args, loc);
        }
        return Err(EarlError::undeclared(loc.clone(), name));
    }
    if let Expr::Get(recv_expr, member, mloc) = callee {
        return eval_method_call(ev, ctx, recv_expr, member, arg_exprs, mloc);
    }
    let value = eval_expr(ev, ctx, callee)?;
    let args = eval_args(ev, ctx, arg_exprs)?;
    invoke_value(ev, ctx, &value, args, loc)
}

/// `observe(var, callback)` must see the raw holder, not a copied `Value`, so
/// it is special-cased here instead of flowing through `intrinsics::call_free`.
fn eval_observe(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, arg_exprs: &[Expr], loc: &SourceLoc) -> EarlResult<Value> {
    let [var_expr, cb_expr] = arg_exprs else {
        return Err(EarlError::ty(loc.clone(), "`observe` expects (variable, callback)"));
    };
    let Expr::Ident(name, ident_loc) = var_expr else {
        return Err(EarlError::ty(loc.clone(), "`observe`'s first argument must be a plain identifier"));
    };
    let holder = Context::variable_get(ctx, name).ok_or_else(|| EarlError::undeclared(ident_loc.clone(), name))?;
    let callback = eval_expr(ev, ctx, cb_expr)?;
    holder.borrow_mut().listener = Some(callback);
    Ok(Value::Void)
}

fn eval_get(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, recv_expr: &Expr, member: &str, loc: &SourceLoc) -> EarlResult<Value> {
    let recv = eval_expr(ev, ctx, recv_expr)?;
    match &recv {
        Value::Instance(inst_ctx) => {
            if let Some(holder) = Context::variable_get(inst_ctx, member) {
                return Ok(holder.borrow().value.clone());
            }
            if let Some(f) = inst_ctx.borrow().funcs.get(member).cloned() {
                return Ok(Value::FunctionRef(f));
            }
            Err(EarlError::undeclared(loc.clone(), member))
        }
        Value::Module(mod_ctx) => Context::module_member_get(mod_ctx, member).ok_or_else(|| EarlError::undeclared(loc.clone(), member)),
        other => intrinsics::call_member(other, member, vec![], loc, |f, a| invoke_value(ev, ctx, f, a, loc)).unwrap_or_else(|| Err(EarlError::undeclared(loc.clone(), member))),
    }
}

fn eval_method_call(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, recv_expr: &Expr, member: &str, arg_exprs: &[Expr], loc: &SourceLoc) -> EarlResult<Value> {
    if member == "toggle" {
        if let std::option::Option::Some(result) = eval_toggle(ev, ctx, recv_expr, loc) {
            return result;
        }
    }
    let recv = eval_expr(ev, ctx, recv_expr)?;
    match &recv {
        Value::Instance(inst_ctx) => {
            if let Some(f) = inst_ctx.borrow().funcs.get(member).cloned() {
                let args = eval_args(ev, ctx, arg_exprs)?;
                return invoke_function(ev, &f, args, ctx, Some(inst_ctx), loc);
            }
            if let Some(holder) = Context::variable_get(inst_ctx, member) {
                let value = holder.borrow().value.clone();
                let args = eval_args(ev, ctx, arg_exprs)?;
                return invoke_value(ev, ctx, &value, args, loc);
            }
            Err(EarlError::undeclared(loc.clone(), member))
        }
        Value::Module(mod_ctx) => {
            let value = Context::module_member_get(mod_ctx, member).ok_or_else(|| EarlError::undeclared(loc.clone(), member))?;
            let args = eval_args(ev, ctx, arg_exprs)?;
            invoke_value(ev, ctx, &value, args, loc)
        }
        _ => {
            let args = eval_args(ev, ctx, arg_exprs)?;
            intrinsics::call_member(&recv, member, args, loc, |f, a| invoke_value(ev, ctx, f, a, loc)).unwrap_or_else(|| Err(EarlError::undeclared(loc.clone(), member)))
        }
    }
}

fn eval_mod_access(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, ident: &str, right: &Expr, loc: &SourceLoc) -> EarlResult<Value> {
    if let Some(en) = Context::enum_get(ctx, ident) {
        if let Expr::Ident(variant, vloc) = right {
            return en.entries.get(variant.as_ref()).cloned().ok_or_else(|| EarlError::undeclared(vloc.clone(), variant));
        }
    }
    let world = Context::get_world(ctx);
    let module = Context::get_import(&world, ident).ok_or_else(|| EarlError::undeclared(loc.clone(), ident))?;
    match right {
        Expr::Ident(member, mloc) => Context::module_member_get(&module, member).ok_or_else(|| EarlError::undeclared(mloc.clone(), member)),
        Expr::FuncCall(callee, arg_exprs, call_loc) => {
            let Expr::Ident(fname, fname_loc) = callee.as_ref() else {
                return Err(EarlError::ty(loc.clone(), "unsupported module call expression"));
            };
            let value = Context::module_member_get(&module, fname).ok_or_else(|| EarlError::undeclared(fname_loc.clone(), fname))?;
            let args = eval_args(ev, ctx, arg_exprs)?;
            invoke_value(ev, ctx, &value, args, call_loc)
        }
        _ => Err(EarlError::ty(loc.clone(), "unsupported module access expression")),
    }
}

fn eval_array_access(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, left: &Expr, index: &Expr, loc: &SourceLoc) -> EarlResult<Value> {
    let recv = eval_expr(ev, ctx, left)?;
    let idx = eval_expr(ev, ctx, index)?;
    let member_name = if matches!(recv, Value::Dict(_)) { "get" } else { "nth" };
    intrinsics::call_member(&recv, member_name, vec![idx], loc, |f, a| invoke_value(ev, ctx, f, a, loc))
        .unwrap_or_else(|| Err(EarlError::ty(loc.clone(), format!("cannot index {}", recv.kind()))))
}

fn eval_range(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, a: &Expr, b: &Expr, inclusive: bool, loc: &SourceLoc) -> EarlResult<Value> {
    let av = eval_expr(ev, ctx, a)?;
    let bv = eval_expr(ev, ctx, b)?;
    match (av, bv) {
        (Value::Int(lo), Value::Int(hi)) => {
            let hi = if inclusive { hi + 1 } else { hi };
            Ok(Value::List(shared((lo..hi).map(Value::Int).collect())))
        }
        (Value::Char(lo), Value::Char(hi)) => {
            let hi = if inclusive { hi + 1 } else { hi };
            Ok(Value::List(shared((lo..hi).map(Value::Char).collect())))
        }
        (lo, hi) => Err(EarlError::ty(loc.clone(), format!("range endpoints must both be Int or both Char, got {} and {}", lo.kind(), hi.kind()))),
    }
}

/// Interpolates `{expr}` segments by lexing/parsing the enclosed text as a
/// standalone expression statement and re-evaluating it in the surrounding
/// scope.
fn eval_fstr(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, template: &str, loc: &SourceLoc) -> EarlResult<Value> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut inner = String::new();
        for c2 in chars.by_ref() {
            if c2 == '}' {
                break;
            }
            inner.push(c2);
        }
        let tokens = crate::lexer::lex(&inner, &loc.file)?;
        let program = crate::parser::parse(tokens)?;
        let value = match program.first() {
            Some(Stmt::ExprStmt(e)) => eval_expr(ev, ctx, e)?,
            _ => return Err(EarlError::syntax(loc.clone(), "invalid f-string interpolation")),
        };
        out.push_str(&value.to_display_string());
    }
    Ok(Value::str_from(out))
}

fn eval_case(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, scrut_expr: &Expr, arms: &[(CaseArm, Expr)], default: std::option::Option<&Expr>) -> EarlResult<Value> {
    let scrut = eval_expr(ev, ctx, scrut_expr)?;
    for (arm, rhs) in arms {
        let matched = match arm {
            CaseArm::Predicate(p) => {
                let rhs_val = eval_expr(ev, ctx, &p.rhs)?;
                let predicate = crate::value::PredicateValue { op: p.op, rhs: Box::new(rhs_val) };
                predicate.check(&scrut)?
            }
            CaseArm::Value(v) => {
                let vv = eval_expr(ev, ctx, v)?;
                scrut.eq(&vv)
            }
        };
        if matched {
            return eval_expr(ev, ctx, rhs);
        }
    }
    match default {
        Some(d) => eval_expr(ev, ctx, d),
        std::option::Option::None => Ok(Value::Void),
    }
}

fn eval_binary(ev: &mut Evaluator, ctx: &Rc<RefCell<Context>>, lhs: &Expr, op: BinOp, rhs: &Expr, loc: &SourceLoc) -> EarlResult<Value> {
    match op {
        BinOp::And => {
            let l = eval_expr(ev, ctx, lhs)?;
            if !l.boolean() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(ev, ctx, rhs)?.boolean()))
        }
        BinOp::Or => {
            let l = eval_expr(ev, ctx, lhs)?;
            if l.boolean() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(ev, ctx, rhs)?.boolean()))
        }
        _ => {
            let l = eval_expr(ev, ctx, lhs)?;
            let r = eval_expr(ev, ctx, rhs)?;
            l.binop(op, &r, loc)
        }
    }
}
