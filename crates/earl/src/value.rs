//! The polymorphic runtime `Value`.
//!
//! A single tagged enum with small immediates stored inline and aggregates
//! stored behind a shared handle (`Rc<RefCell<_>>`) so that list/dict
//! mutation and `ref` parameter binding are visible to every holder.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::BinOp;
use crate::error::{EarlError, EarlResult, SourceLoc};
use crate::holder::{ClassDescriptor, ClosureDescriptor, EnumDescriptor, FunctionHolder};

pub type Shared<T> = Rc<RefCell<T>>;

#[must_use]
pub fn shared<T>(v: T) -> Shared<T> {
    Rc::new(RefCell::new(v))
}

/// Tag returned by `typeof` and used to key the intrinsic dispatch tables and
/// the type-compatibility table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Char,
    Str,
    Void,
    List,
    Tuple,
    Slice,
    Dict,
    Option,
    File,
    Time,
    Type,
    Function,
    Class,
    Closure,
    Instance,
    Module,
    Enum,
    Predicate,
}

/// Key kind accepted by `Dict`: fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictKeyKind {
    Int,
    Str,
    Char,
    Float,
}

/// A scalar dict key. `Float` keys compare by bit pattern so the map can use a
/// normal hash map despite `f64` not implementing `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Int(i64),
    Str(Rc<str>),
    Char(u8),
    Float(u64),
}

impl DictKey {
    #[must_use]
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Str(s) => Some(Self::Str(Rc::from(s.borrow().as_str()))),
            Value::Char(c) => Some(Self::Char(*c)),
            Value::Float(f) => Some(Self::Float(f.to_bits())),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Int(*i),
            Self::Str(s) => Value::Str(shared(EarlString::from_str(s))),
            Self::Char(c) => Value::Char(*c),
            Self::Float(bits) => Value::Float(f64::from_bits(*bits)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DictKeyKind {
        match self {
            Self::Int(_) => DictKeyKind::Int,
            Self::Str(_) => DictKeyKind::Str,
            Self::Char(_) => DictKeyKind::Char,
            Self::Float(_) => DictKeyKind::Float,
        }
    }
}

/// `Dict<K>` payload. Insertion order is preserved for deterministic `foreach`.
#[derive(Debug, Default)]
pub struct EarlDict {
    pub key_kind: Option<DictKeyKind>,
    pub entries: indexmap::IndexMap<DictKey, Value, ahash::RandomState>,
}

impl EarlDict {
    #[must_use]
    pub fn new(key_kind: DictKeyKind) -> Self {
        Self { key_kind: Some(key_kind), entries: indexmap::IndexMap::with_hasher(ahash::RandomState::new()) }
    }
}

/// Mutable byte-buffer string with "externalized" character slots: indexing
/// produces a `Char` that, once taken, round-trips mutation back into this
/// buffer.
#[derive(Debug, Default)]
pub struct EarlString {
    bytes: Vec<u8>,
    /// Positions whose byte has been handed out as an external `Char`; the
    /// live value lives in `externalized` until the holder is dropped or the
    /// string is re-read, at which point it is folded back into `bytes`.
    externalized: AHashMap<usize, Shared<u8>>,
}

impl EarlString {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        Self { bytes: s.as_bytes().to_vec(), externalized: AHashMap::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn byte_at(&self, i: usize) -> u8 {
        self.externalized.get(&i).map_or(self.bytes[i], |c| *c.borrow())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        (0..self.bytes.len()).map(|i| self.byte_at(i) as char).collect()
    }

    /// Returns an externalized `Char` handle for position `i`, bound by shared
    /// ownership to this string so mutating it through the `Char` is visible
    /// on subsequent reads.
    pub fn externalize(this: &Shared<Self>, i: usize) -> EarlResult<Shared<u8>> {
        let mut s = this.borrow_mut();
        let len = s.bytes.len();
        if i >= len {
            return Err(EarlError::fatal(SourceLoc::unknown(), format!("index {i} out of range for string of length {len}")));
        }
        if let Some(cell) = s.externalized.get(&i) {
            return Ok(cell.clone());
        }
        let cell = shared(s.byte_at(i));
        s.externalized.insert(i, cell.clone());
        Ok(cell)
    }

    pub fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }

    pub fn replace_all(&mut self, s: &str) {
        self.bytes = s.as_bytes().to_vec();
        self.externalized.clear();
    }
}

/// Bitmask for `File` open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode {
    pub read: bool,
    pub write: bool,
    pub binary: bool,
}

impl FileMode {
    pub fn parse(loc: &SourceLoc, s: &str) -> EarlResult<Self> {
        let mut m = Self { read: false, write: false, binary: false };
        for c in s.chars() {
            match c {
                'r' => m.read = true,
                'w' => m.write = true,
                'b' => m.binary = true,
                other => return Err(EarlError::ty(loc.clone(), format!("invalid file mode character `{other}`"))),
            }
        }
        Ok(m)
    }
}

#[derive(Debug)]
pub struct EarlFile {
    pub path: String,
    pub mode: FileMode,
    pub mode_str: String,
    pub handle: Option<std::fs::File>,
    pub open: bool,
}

/// Captured partial comparison used by `case`/`match` arms.
#[derive(Debug, Clone)]
pub struct PredicateValue {
    pub op: BinOp,
    pub rhs: Box<Value>,
}

impl PredicateValue {
    pub fn check(&self, lhs: &Value) -> EarlResult<bool> {
        let result = lhs.binop(self.op, &self.rhs, &SourceLoc::unknown())?;
        match result {
            Value::Bool(b) => Ok(b),
            _ => Ok(false),
        }
    }
}

/// The runtime value hierarchy.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(u8),
    Str(Shared<EarlString>),
    Void,

    List(Shared<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    /// Endpoints are `Int` or `Void` (open).
    Slice(Box<Value>, Box<Value>),
    Dict(Shared<EarlDict>),
    Option(std::option::Option<Box<Value>>),

    File(Shared<EarlFile>),
    /// Epoch seconds.
    Time(i64),
    TypeKW(ValueKind),

    FunctionRef(Rc<FunctionHolder>),
    ClassRef(Rc<ClassDescriptor>),
    Closure(Rc<ClosureDescriptor>),

    /// A class instance: shared handle to its `Class` context (see `context.rs`).
    Instance(Shared<crate::context::Context>),
    /// An imported module: shared handle to its `World` context.
    Module(Shared<crate::context::Context>),
    Enum(Rc<EnumDescriptor>),

    Predicate(Rc<PredicateValue>),

    /// Control-flow sentinels produced by statement evaluation, never visible
    /// to user expressions directly.
    Return(Box<Value>),
    Break,
    Continue,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({})", self.to_display_string())
    }
}

/// Kinds that may appear on either side of a binop/assignment compatibility
/// check: every kind is only compatible with itself except the
/// two named pairs.
pub(crate) fn compatible(a: ValueKind, b: ValueKind) -> bool {
    a == b || matches!((a, b), (ValueKind::Int, ValueKind::Float) | (ValueKind::Float, ValueKind::Int) | (ValueKind::Char, ValueKind::Str) | (ValueKind::Str, ValueKind::Char))
}

impl Value {
    #[must_use]
    pub fn str_from(s: impl AsRef<str>) -> Self {
        Self::Str(shared(EarlString::from_str(s.as_ref())))
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Bool(_) => ValueKind::Bool,
            Self::Char(_) => ValueKind::Char,
            Self::Str(_) => ValueKind::Str,
            Self::Void => ValueKind::Void,
            Self::List(_) => ValueKind::List,
            Self::Tuple(_) => ValueKind::Tuple,
            Self::Slice(..) => ValueKind::Slice,
            Self::Dict(_) => ValueKind::Dict,
            Self::Option(_) => ValueKind::Option,
            Self::File(_) => ValueKind::File,
            Self::Time(_) => ValueKind::Time,
            Self::TypeKW(_) => ValueKind::Type,
            Self::FunctionRef(_) => ValueKind::Function,
            Self::ClassRef(_) => ValueKind::Class,
            Self::Closure(_) => ValueKind::Closure,
            Self::Instance(_) => ValueKind::Instance,
            Self::Module(_) => ValueKind::Module,
            Self::Enum(_) => ValueKind::Enum,
            Self::Predicate(_) => ValueKind::Predicate,
            Self::Return(_) | Self::Break | Self::Continue => ValueKind::Void,
        }
    }

    /// Coerces any value to `Bool` the way `if`/`while` conditions do.
    #[must_use]
    pub fn boolean(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Void => false,
            Self::Option(o) => o.is_some(),
            Self::Str(s) => !s.borrow().is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            _ => true,
        }
    }

    /// Deep copy for aggregates, identity-preserving for scalars.
    #[must_use]
    pub fn copy(&self) -> Self {
        match self {
            Self::List(l) => Self::List(shared(l.borrow().iter().map(Self::copy).collect())),
            Self::Tuple(t) => Self::Tuple(Rc::new(t.iter().map(Self::copy).collect())),
            Self::Str(s) => Self::Str(shared(EarlString::from_str(&s.borrow().as_str()))),
            Self::Dict(d) => {
                let d = d.borrow();
                let mut copy = EarlDict { key_kind: d.key_kind, entries: indexmap::IndexMap::with_hasher(ahash::RandomState::new()) };
                for (k, v) in &d.entries {
                    copy.entries.insert(k.clone(), v.copy());
                }
                Self::Dict(shared(copy))
            }
            Self::Option(o) => Self::Option(o.as_ref().map(|v| Box::new(v.copy()))),
            Self::Slice(a, b) => Self::Slice(Box::new(a.copy()), Box::new(b.copy())),
            // Scalars clone by value; File/Closure/Instance/etc. clone the shared
            // handle itself — `copy()` the *intrinsic* rejects File explicitly,
            // this method is only reached for values it already let through.
            other => other.clone(),
        }
    }

    #[must_use]
    pub fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a.borrow().as_str() == b.borrow().as_str(),
            (Self::Char(a), Self::Str(b)) | (Self::Str(b), Self::Char(a)) => b.borrow().as_str() == (*a as char).to_string(),
            (Self::Void, Self::Void) => true,
            (Self::List(a), Self::List(b)) => Self::list_eq(&a.borrow(), &b.borrow()),
            (Self::List(a), Self::Tuple(b)) => Self::list_eq(&a.borrow(), b),
            (Self::Tuple(a), Self::List(b)) => Self::list_eq(a, &b.borrow()),
            (Self::Tuple(a), Self::Tuple(b)) => Self::list_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.entries.len() == b.entries.len() && a.entries.iter().all(|(k, v)| b.entries.get(k).is_some_and(|v2| v.eq(v2)))
            }
            (Self::Option(a), Self::Option(b)) => match (a, b) {
                (std::option::Option::None, std::option::Option::None) => true,
                (std::option::Option::Some(a), std::option::Option::Some(b)) => a.eq(b),
                _ => false,
            },
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::TypeKW(a), Self::TypeKW(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => Rc::ptr_eq(a, b),
            (Self::Instance(a), Self::Instance(b)) | (Self::Module(a), Self::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn list_eq(a: &[Self], b: &[Self]) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq(y))
    }

    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Self::Bool(b) => b.to_string(),
            Self::Char(c) => (*c as char).to_string(),
            Self::Str(s) => s.borrow().as_str(),
            Self::Void => "void".to_owned(),
            Self::List(l) => format!("[{}]", l.borrow().iter().map(Self::to_display_string).collect::<Vec<_>>().join(", ")),
            Self::Tuple(t) => format!("({})", t.iter().map(Self::to_display_string).collect::<Vec<_>>().join(", ")),
            Self::Slice(a, b) => format!("{}..{}", a.to_display_string(), b.to_display_string()),
            Self::Dict(d) => {
                let d = d.borrow();
                format!(
                    "{{{}}}",
                    d.entries.iter().map(|(k, v)| format!("{}: {}", k.to_value().to_display_string(), v.to_display_string())).collect::<Vec<_>>().join(", ")
                )
            }
            Self::Option(std::option::Option::Some(v)) => format!("some({})", v.to_display_string()),
            Self::Option(std::option::Option::None) => "none".to_owned(),
            Self::File(f) => format!("<file {}>", f.borrow().path),
            Self::Time(t) => format!("<time {t}>"),
            Self::TypeKW(k) => format!("<type {k}>"),
            Self::FunctionRef(f) => format!("<function {}>", f.name),
            Self::ClassRef(c) => format!("<class {}>", c.name),
            Self::Closure(_) => "<closure>".to_owned(),
            Self::Instance(_) => "<instance>".to_owned(),
            Self::Module(_) => "<module>".to_owned(),
            Self::Enum(e) => format!("<enum {}>", e.name),
            Self::Predicate(_) => "<predicate>".to_owned(),
            Self::Return(v) => v.to_display_string(),
            Self::Break => "<break>".to_owned(),
            Self::Continue => "<continue>".to_owned(),
        }
    }

    #[must_use]
    pub fn to_earl_string(&self) -> Self {
        Self::str_from(self.to_display_string())
    }

    fn type_err(loc: &SourceLoc, op: &str, a: &Self, b: &Self) -> EarlError {
        EarlError::ty(loc.clone(), format!("cannot apply `{op}` to {} and {}", a.kind(), b.kind()))
    }

    /// Binary operator dispatch. Short-circuit `&&`/`||` are
    /// handled by the evaluator before calling this.
    pub fn binop(&self, op: BinOp, other: &Self, loc: &SourceLoc) -> EarlResult<Self> {
        use BinOp::{Add, And, Eq as OpEq, Gt, GtEq, Lt, LtEq, NotEq, Or};

        if !matches!(op, OpEq | NotEq) && !compatible(self.kind(), other.kind()) && !matches!((self, other), (Self::List(_) | Self::Tuple(_), Self::List(_) | Self::Tuple(_))) {
            return Err(Self::type_err(loc, "binop", self, other));
        }

        match op {
            OpEq => return Ok(Self::Bool(self.eq(other))),
            NotEq => return Ok(Self::Bool(!self.eq(other))),
            _ => {}
        }

        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::int_binop(op, *a, *b, loc),
            (Self::Float(a), Self::Float(b)) => Self::float_binop(op, *a, *b, loc),
            (Self::Int(a), Self::Float(b)) => Self::float_binop(op, *a as f64, *b, loc),
            (Self::Float(a), Self::Int(b)) => Self::float_binop(op, *a, *b as f64, loc),
            (Self::Bool(a), Self::Bool(b)) => match op {
                Or => Ok(Self::Bool(*a || *b)),
                And => Ok(Self::Bool(*a && *b)),
                Lt => Ok(Self::Bool(!*a && *b)),
                LtEq => Ok(Self::Bool(!*a || *b)),
                Gt => Ok(Self::Bool(*a && !*b)),
                GtEq => Ok(Self::Bool(*a || !*b)),
                _ => Err(Self::type_err(loc, "binop", self, other)),
            },
            (Self::Str(_) | Self::Char(_), Self::Str(_) | Self::Char(_)) if op == Add => {
                let mut out = self.to_display_string();
                out.push_str(&other.to_display_string());
                Ok(Self::str_from(out))
            }
            (Self::Str(a), Self::Str(b)) => Self::str_cmp(op, &a.borrow().as_str(), &b.borrow().as_str(), loc),
            (Self::List(a), Self::List(b)) if op == Add => {
                let mut out: Vec<Self> = a.borrow().iter().map(Self::copy).collect();
                out.extend(b.borrow().iter().map(Self::copy));
                Ok(Self::List(shared(out)))
            }
            (Self::Tuple(a), Self::Tuple(b)) if op == Add => {
                let mut out = (**a).clone();
                out.extend((**b).clone());
                Ok(Self::Tuple(Rc::new(out)))
            }
            _ => Err(Self::type_err(loc, "binop", self, other)),
        }
    }

    fn int_binop(op: BinOp, a: i64, b: i64, loc: &SourceLoc) -> EarlResult<Self> {
        use BinOp::{Add, BitAnd, BitOr, BitXor, Div, Gt, GtEq, Lt, LtEq, Mod, Mul, Pow, Shl, Shr, Sub};
        Ok(match op {
            Add => Self::Int(a.wrapping_add(b)),
            Sub => Self::Int(a.wrapping_sub(b)),
            Mul => Self::Int(a.wrapping_mul(b)),
            Div => {
                if b == 0 {
                    return Err(EarlError::fatal(loc.clone(), "division by zero"));
                }
                Self::Int(a / b)
            }
            Mod => {
                if b == 0 {
                    return Err(EarlError::fatal(loc.clone(), "modulo by zero"));
                }
                Self::Int(a % b)
            }
            Pow => Self::Int(a.pow(u32::try_from(b.max(0)).unwrap_or(0))),
            BitAnd => Self::Int(a & b),
            BitOr => Self::Int(a | b),
            BitXor => Self::Int(a ^ b),
            Shl => Self::Int(a << b),
            Shr => Self::Int(a >> b),
            Lt => Self::Bool(a < b),
            LtEq => Self::Bool(a <= b),
            Gt => Self::Bool(a > b),
            GtEq => Self::Bool(a >= b),
            _ => return Err(EarlError::ty(loc.clone(), "unsupported int operator")),
        })
    }

    fn float_binop(op: BinOp, a: f64, b: f64, loc: &SourceLoc) -> EarlResult<Self> {
        use BinOp::{Add, Div, Gt, GtEq, Lt, LtEq, Mod, Mul, Pow, Sub};
        Ok(match op {
            Add => Self::Float(a + b),
            Sub => Self::Float(a - b),
            Mul => Self::Float(a * b),
            Div => Self::Float(a / b),
            Mod => return Err(EarlError::ty(loc.clone(), "modulo is not defined for Float")),
            Pow => Self::Float(a.powf(b)),
            Lt => Self::Bool(a < b),
            LtEq => Self::Bool(a <= b),
            Gt => Self::Bool(a > b),
            GtEq => Self::Bool(a >= b),
            _ => return Err(EarlError::ty(loc.clone(), "unsupported float operator")),
        })
    }

    fn str_cmp(op: BinOp, a: &str, b: &str, loc: &SourceLoc) -> EarlResult<Self> {
        use BinOp::{Gt, GtEq, Lt, LtEq};
        Ok(match op {
            Lt => Self::Bool(a < b),
            LtEq => Self::Bool(a <= b),
            Gt => Self::Bool(a > b),
            GtEq => Self::Bool(a >= b),
            _ => return Err(EarlError::ty(loc.clone(), "unsupported string operator")),
        })
    }

    /// Unary operator dispatch: `-`, `!`, `~`.
    pub fn unaryop(&self, op: crate::ast::UnOp, loc: &SourceLoc) -> EarlResult<Self> {
        use crate::ast::UnOp::{BitNot, Neg, Not};
        match (op, self) {
            (Neg, Self::Int(i)) => Ok(Self::Int(-i)),
            (Neg, Self::Float(f)) => Ok(Self::Float(-f)),
            (Not, Self::Bool(b)) => Ok(Self::Bool(!b)),
            (Not, Self::Option(o)) => Ok(Self::Bool(o.is_none())),
            (BitNot, Self::Int(i)) => Ok(Self::Int(!i)),
            _ => Err(EarlError::ty(loc.clone(), format!("cannot apply unary operator to {}", self.kind()))),
        }
    }
}
