//! Named containers for variables and callables.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::ast::{Attrs, Block, Param};
use crate::context::Context;
use crate::error::{EarlError, EarlResult, SourceLoc};
use crate::value::Value;

/// `{ name, value, attrs, info-string, optional event-listener callback }`
///. `mutate`/`spec_mutate` route every write through here so
/// the const check and `observe` listener fire uniformly.
#[derive(Debug)]
pub struct VariableHolder {
    pub name: Rc<str>,
    pub value: Value,
    pub attrs: Attrs,
    pub info: std::option::Option<String>,
    pub listener: std::option::Option<Value>,
}

impl VariableHolder {
    #[must_use]
    pub fn new(name: Rc<str>, value: Value, attrs: Attrs) -> Self {
        Self { name, value, attrs, info: std::option::Option::None, listener: std::option::Option::None }
    }

    fn check_const(&self, loc: &SourceLoc) -> EarlResult<()> {
        if self.attrs.is_const() {
            return Err(EarlError::ty(loc.clone(), format!("cannot mutate const variable `{}`", self.name)));
        }
        Ok(())
    }

    /// Plain `=` assignment. `on_mutate` is supplied by
    /// the evaluator and invokes the listener closure
    /// if one is installed; `holder.rs` has no call machinery of its own.
    pub fn mutate(&mut self, new: Value, loc: &SourceLoc, mut on_mutate: impl FnMut(&Value, &Value) -> EarlResult<()>) -> EarlResult<()> {
        self.check_const(loc)?;
        self.value = new;
        if let std::option::Option::Some(listener) = self.listener.clone() {
            on_mutate(&listener, &self.value)?;
        }
        Ok(())
    }

    /// Compound `op=` assignment.
    pub fn spec_mutate(&mut self, op: crate::ast::BinOp, rhs: &Value, loc: &SourceLoc, on_mutate: impl FnMut(&Value, &Value) -> EarlResult<()>) -> EarlResult<()> {
        self.check_const(loc)?;
        let new = self.value.binop(op, rhs, loc)?;
        self.mutate(new, loc, on_mutate)
    }
}

/// One formal parameter's binding behavior.
#[derive(Debug, Clone)]
pub struct ParamDesc {
    pub name: Rc<str>,
    pub ty: std::option::Option<crate::value::ValueKind>,
    pub attrs: Attrs,
}

impl From<&Param> for ParamDesc {
    fn from(p: &Param) -> Self {
        Self { name: p.name.clone(), ty: p.ty, attrs: p.attrs }
    }
}

/// `{ name, declaration, parameter descriptors, attrs, info, owning context }`.
#[derive(Debug)]
pub struct FunctionHolder {
    pub name: Rc<str>,
    pub params: Vec<ParamDesc>,
    pub attrs: Attrs,
    pub body: Rc<Block>,
    pub info: std::option::Option<String>,
}

impl FunctionHolder {
    #[must_use]
    pub fn is_world(&self) -> bool {
        self.attrs.is_world()
    }

    #[must_use]
    pub fn is_pub(&self) -> bool {
        self.attrs.is_pub()
    }
}

/// A closure literal: captured parameter list, body, and defining context.
/// The captured context is a *weak* reference so a closure stored back into
/// the variable it was defined alongside does not keep that context alive
/// forever.
#[derive(Debug)]
pub struct ClosureDescriptor {
    pub params: Vec<ParamDesc>,
    pub attrs: Attrs,
    pub body: Rc<Block>,
    pub captured: Weak<RefCell<Context>>,
}

/// `Class` descriptor: id, attrs, constructor parameter names, member `Let`
/// statements, method `Def` statements.
#[derive(Debug)]
pub struct ClassDescriptor {
    pub name: Rc<str>,
    pub attrs: Attrs,
    pub ctor_params: Vec<Rc<str>>,
    pub members: Vec<crate::ast::Stmt>,
    pub methods: Vec<(Rc<str>, Rc<FunctionHolder>)>,
    /// The World (or enclosing context) the class was declared in — instances
    /// are owned by this context's nearest World.
    pub owner: Weak<RefCell<Context>>,
}

/// `id -> entries map`.
#[derive(Debug)]
pub struct EnumDescriptor {
    pub name: Rc<str>,
    pub entries: indexmap::IndexMap<String, Value, ahash::RandomState>,
}
