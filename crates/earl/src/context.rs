//! The four context kinds (`World`/`Function`/`Class`/`Closure`), unified
//! behind one `Context` struct so the owner-chain walk is a single piece of
//! code instead of four parallel implementations, with ownership represented
//! as shared handles.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::{EarlError, EarlResult, SourceLoc};
use crate::holder::{ClassDescriptor, EnumDescriptor, FunctionHolder, VariableHolder};
use crate::scope::Scope;
use crate::value::Value;

/// Import depth recorded on a `World`: `Full` re-exports
/// transitively, `Almost` exposes this module's own `pub` bindings but not
/// its imports' bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDepth {
    Full,
    Almost,
}

#[derive(Debug)]
pub struct ImportedModule {
    pub world: Rc<RefCell<Context>>,
    pub depth: ImportDepth,
    pub alias: std::option::Option<String>,
}

#[derive(Debug)]
pub enum ContextKind {
    World {
        file: Rc<str>,
        module_id: RefCell<String>,
        imports: RefCell<IndexMap<String, ImportedModule, ahash::RandomState>>,
        repl_appended: RefCell<bool>,
    },
    Function {
        world_attr: bool,
    },
    Class {
        /// Populated only during constructor argument binding.
        ctor_tmp: RefCell<std::option::Option<IndexMap<String, Value, ahash::RandomState>>>,
        descriptor: Rc<ClassDescriptor>,
    },
    /// Created when invoking a closure body; always ascends for both variable
    /// and function/class lookup.
    Closure,
}

/// A lexical/dynamic scope frame. Every context owns its own variable scope
/// stack and its own function/class/enum tables; the owner chain is what
/// makes lookups recurse outward.
#[derive(Debug)]
pub struct Context {
    pub kind: ContextKind,
    pub vars: Scope<Rc<RefCell<VariableHolder>>>,
    pub funcs: Scope<Rc<FunctionHolder>>,
    pub classes: RefCell<IndexMap<String, Rc<ClassDescriptor>>>,
    pub enums: RefCell<IndexMap<String, Rc<EnumDescriptor>>>,
    /// Caller context for `Function` kinds; `None` otherwise.
    pub immediate_owner: std::option::Option<Rc<RefCell<Context>>>,
    /// Nearest enclosing `World`/`Class` of `immediate_owner` for `Function`,
    /// the defining context for `Closure`, the declaring context for `Class`
    /// instances, `None` for the root `World`.
    pub owner: std::option::Option<Rc<RefCell<Context>>>,
}

impl Context {
    #[must_use]
    pub fn new_world(file: Rc<str>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            kind: ContextKind::World {
                file,
                module_id: RefCell::new(String::new()),
                imports: RefCell::new(IndexMap::with_hasher(ahash::RandomState::new())),
                repl_appended: RefCell::new(false),
            },
            vars: Scope::new(),
            funcs: Scope::new(),
            classes: RefCell::new(IndexMap::new()),
            enums: RefCell::new(IndexMap::new()),
            immediate_owner: std::option::Option::None,
            owner: std::option::Option::None,
        }))
    }

    /// Walks `from` up through `Function` contexts until a `World`/`Class` is
    /// found.
    fn nearest_world_or_class(from: &Rc<RefCell<Self>>) -> Rc<RefCell<Self>> {
        let mut cur = from.clone();
        loop {
            let next = {
                let c = cur.borrow();
                match &c.kind {
                    ContextKind::World { .. } | ContextKind::Class { .. } => return cur.clone(),
                    ContextKind::Function { .. } => c.owner.clone().or_else(|| c.immediate_owner.clone()),
                    ContextKind::Closure => c.owner.clone(),
                }
            };
            match next {
                std::option::Option::Some(n) => cur = n,
                std::option::Option::None => return cur,
            }
        }
    }

    #[must_use]
    pub fn new_function(caller: &Rc<RefCell<Self>>, world_attr: bool) -> Rc<RefCell<Self>> {
        let owner = Self::nearest_world_or_class(caller);
        Rc::new(RefCell::new(Self {
            kind: ContextKind::Function { world_attr },
            vars: Scope::new(),
            funcs: Scope::new(),
            classes: RefCell::new(IndexMap::new()),
            enums: RefCell::new(IndexMap::new()),
            immediate_owner: std::option::Option::Some(caller.clone()),
            owner: std::option::Option::Some(owner),
        }))
    }

    #[must_use]
    pub fn new_class_instance(owner_ctx: &Rc<RefCell<Self>>, descriptor: Rc<ClassDescriptor>) -> Rc<RefCell<Self>> {
        let owner = Self::nearest_world_or_class(owner_ctx);
        Rc::new(RefCell::new(Self {
            kind: ContextKind::Class { ctor_tmp: RefCell::new(std::option::Option::None), descriptor },
            vars: Scope::new(),
            funcs: Scope::new(),
            classes: RefCell::new(IndexMap::new()),
            enums: RefCell::new(IndexMap::new()),
            immediate_owner: std::option::Option::None,
            owner: std::option::Option::Some(owner),
        }))
    }

    /// Function context for a method call: owner is the
    /// instance's `Class` context directly, not the caller's nearest
    /// World/Class, so member variables resolve via the instance.
    #[must_use]
    pub fn new_method_function(instance: &Rc<RefCell<Self>>, caller: &Rc<RefCell<Self>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            kind: ContextKind::Function { world_attr: false },
            vars: Scope::new(),
            funcs: Scope::new(),
            classes: RefCell::new(IndexMap::new()),
            enums: RefCell::new(IndexMap::new()),
            immediate_owner: std::option::Option::Some(caller.clone()),
            owner: std::option::Option::Some(instance.clone()),
        }))
    }

    #[must_use]
    pub fn new_closure_invocation(captured: &Rc<RefCell<Self>>, caller: &Rc<RefCell<Self>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            kind: ContextKind::Closure,
            vars: Scope::new(),
            funcs: Scope::new(),
            classes: RefCell::new(IndexMap::new()),
            enums: RefCell::new(IndexMap::new()),
            immediate_owner: std::option::Option::Some(caller.clone()),
            owner: std::option::Option::Some(captured.clone()),
        }))
    }

    pub fn push_scope(&mut self) {
        self.vars.push();
        self.funcs.push();
    }

    pub fn pop_scope(&mut self) {
        self.vars.pop();
        self.funcs.pop();
    }

    #[must_use]
    pub fn world_attr(&self) -> bool {
        matches!(self.kind, ContextKind::Function { world_attr: true })
    }

    /// Returns the `World` this context ultimately belongs to, ascending
    /// through `owner`.
    #[must_use]
    pub fn get_world(this: &Rc<RefCell<Self>>) -> Rc<RefCell<Self>> {
        let mut cur = this.clone();
        loop {
            let is_world = matches!(cur.borrow().kind, ContextKind::World { .. });
            if is_world {
                return cur;
            }
            let next = cur.borrow().owner.clone().or_else(|| cur.borrow().immediate_owner.clone());
            match next {
                std::option::Option::Some(n) => cur = n,
                std::option::Option::None => return cur,
            }
        }
    }

    // ---- variable lookup ----

    #[must_use]
    pub fn variable_exists(this: &Rc<RefCell<Self>>, name: &str) -> bool {
        Self::variable_get(this, name).is_some()
    }

    /// Implements the five-rule owner-chain lookup algorithm.
    #[must_use]
    pub fn variable_get(this: &Rc<RefCell<Self>>, name: &str) -> std::option::Option<Rc<RefCell<VariableHolder>>> {
        let c = this.borrow();
        match &c.kind {
            ContextKind::World { .. } => c.vars.get(name).cloned().or_else(|| c.owner.clone().and_then(|o| Self::variable_get(&o, name))),
            ContextKind::Function { world_attr } => {
                if let std::option::Option::Some(h) = c.vars.get(name) {
                    return std::option::Option::Some(h.clone());
                }
                if *world_attr {
                    // `@world`: ascend the live caller chain,
                    // so intermediate callers' locals are visible too.
                    c.immediate_owner.clone().and_then(|o| Self::variable_get(&o, name))
                } else {
                    // No `@world`: skip straight to the nearest enclosing
                    // World/Class, bypassing caller locals.
                    c.owner.clone().and_then(|o| Self::variable_get(&o, name))
                }
            }
            ContextKind::Class { ctor_tmp, .. } => {
                if let std::option::Option::Some(h) = c.vars.get(name) {
                    return std::option::Option::Some(h.clone());
                }
                if let std::option::Option::Some(map) = ctor_tmp.borrow().as_ref() {
                    if let std::option::Option::Some(v) = map.get(name) {
                        return std::option::Option::Some(Rc::new(RefCell::new(VariableHolder::new(Rc::from(name), v.copy(), crate::ast::Attrs::empty()))));
                    }
                }
                c.owner.clone().and_then(|o| Self::variable_get(&o, name))
            }
            ContextKind::Closure => {
                if let std::option::Option::Some(h) = c.vars.get(name) {
                    return std::option::Option::Some(h.clone());
                }
                c.owner.clone().and_then(|o| Self::variable_get(&o, name))
            }
        }
    }

    pub fn variable_add(this: &Rc<RefCell<Self>>, holder: VariableHolder) -> EarlResult<()> {
        let name = holder.name.clone();
        let mut c = this.borrow_mut();
        if c.vars.innermost_contains(&name) {
            return Err(EarlError::redeclared(SourceLoc::unknown(), &name));
        }
        c.vars.add(name.to_string(), Rc::new(RefCell::new(holder)));
        Ok(())
    }

    #[must_use]
    pub fn variable_remove(this: &Rc<RefCell<Self>>, name: &str) -> std::option::Option<Rc<RefCell<VariableHolder>>> {
        this.borrow_mut().vars.remove(name)
    }

    // ---- function/class lookup: always ascend ----

    #[must_use]
    pub fn function_exists(this: &Rc<RefCell<Self>>, name: &str) -> bool {
        Self::function_get(this, name).is_some()
    }

    #[must_use]
    pub fn function_get(this: &Rc<RefCell<Self>>, name: &str) -> std::option::Option<Rc<FunctionHolder>> {
        let c = this.borrow();
        if let std::option::Option::Some(f) = c.funcs.get(name) {
            return std::option::Option::Some(f.clone());
        }
        c.immediate_owner
            .clone()
            .and_then(|o| Self::function_get(&o, name))
            .or_else(|| c.owner.clone().and_then(|o| Self::function_get(&o, name)))
    }

    pub fn function_add(this: &Rc<RefCell<Self>>, name: Rc<str>, f: Rc<FunctionHolder>) -> EarlResult<()> {
        let mut c = this.borrow_mut();
        if c.funcs.innermost_contains(&name) {
            return Err(EarlError::redeclared(SourceLoc::unknown(), &name));
        }
        c.funcs.add(name.to_string(), f);
        Ok(())
    }

    #[must_use]
    pub fn class_get(this: &Rc<RefCell<Self>>, name: &str) -> std::option::Option<Rc<ClassDescriptor>> {
        let c = this.borrow();
        if let std::option::Option::Some(cd) = c.classes.borrow().get(name) {
            return std::option::Option::Some(cd.clone());
        }
        c.immediate_owner
            .clone()
            .and_then(|o| Self::class_get(&o, name))
            .or_else(|| c.owner.clone().and_then(|o| Self::class_get(&o, name)))
    }

    pub fn class_add(this: &Rc<RefCell<Self>>, descriptor: Rc<ClassDescriptor>) {
        this.borrow().classes.borrow_mut().insert(descriptor.name.to_string(), descriptor);
    }

    #[must_use]
    pub fn enum_get(this: &Rc<RefCell<Self>>, name: &str) -> std::option::Option<Rc<EnumDescriptor>> {
        let c = this.borrow();
        if let std::option::Option::Some(e) = c.enums.borrow().get(name) {
            return std::option::Option::Some(e.clone());
        }
        c.owner.clone().and_then(|o| Self::enum_get(&o, name))
    }

    pub fn enum_add(this: &Rc<RefCell<Self>>, descriptor: Rc<EnumDescriptor>) {
        this.borrow().enums.borrow_mut().insert(descriptor.name.to_string(), descriptor);
    }

    #[must_use]
    pub fn closure_exists(this: &Rc<RefCell<Self>>, name: &str) -> bool {
        Self::variable_exists(this, name)
    }

    // ---- module id / imports (World only) ----

    #[must_use]
    pub fn module_id(this: &Rc<RefCell<Self>>) -> String {
        match &this.borrow().kind {
            ContextKind::World { module_id, .. } => module_id.borrow().clone(),
            _ => String::new(),
        }
    }

    pub fn set_module_id(this: &Rc<RefCell<Self>>, id: String) {
        if let ContextKind::World { module_id, .. } = &this.borrow().kind {
            *module_id.borrow_mut() = id;
        }
    }

    #[must_use]
    pub fn file_path(this: &Rc<RefCell<Self>>) -> Rc<str> {
        match &this.borrow().kind {
            ContextKind::World { file, .. } => file.clone(),
            _ => Rc::from(""),
        }
    }

    pub fn add_import(this: &Rc<RefCell<Self>>, key: String, module: ImportedModule) {
        if let ContextKind::World { imports, .. } = &this.borrow().kind {
            imports.borrow_mut().insert(key, module);
        }
    }

    #[must_use]
    pub fn get_import(this: &Rc<RefCell<Self>>, key: &str) -> std::option::Option<Rc<RefCell<Self>>> {
        match &this.borrow().kind {
            ContextKind::World { imports, .. } => imports.borrow().get(key).map(|m| m.world.clone()),
            _ => std::option::Option::None,
        }
    }

    /// Looks up a `pub` binding exposed through an imported module — a
    /// binding is only visible through the module if its declaration
    /// carried `pub`. Falls through to the module's own import table so a
    /// `full` import of `module` is itself reachable as a member of
    /// `module` (transitive re-export); an `almost` import stays private to
    /// the module that declared it.
    #[must_use]
    pub fn module_member_get(module: &Rc<RefCell<Self>>, name: &str) -> std::option::Option<Value> {
        let holder = module.borrow().vars.get(name).cloned();
        if let std::option::Option::Some(h) = holder {
            if h.borrow().attrs.is_pub() {
                return std::option::Option::Some(h.borrow().value.clone());
            }
            return std::option::Option::None;
        }
        if let std::option::Option::Some(f) = module.borrow().funcs.get(name) {
            if f.is_pub() {
                return std::option::Option::Some(Value::FunctionRef(f.clone()));
            }
        }
        if let std::option::Option::Some(c) = module.borrow().classes.borrow().get(name) {
            if c.attrs.is_pub() {
                return std::option::Option::Some(Value::ClassRef(c.clone()));
            }
        }
        if let ContextKind::World { imports, .. } = &module.borrow().kind {
            if let std::option::Option::Some(imported) = imports.borrow().get(name) {
                if imported.depth == ImportDepth::Full {
                    return std::option::Option::Some(Value::Module(imported.world.clone()));
                }
            }
        }
        std::option::Option::None
    }
}
