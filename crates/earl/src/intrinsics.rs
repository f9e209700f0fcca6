//! Intrinsic dispatch tables: free functions and receiver-kind-keyed member
//! functions, collapsed into two `match` dispatchers (one function per
//! builtin, matched on name and argument kinds, returning a typed error on
//! mismatch) since the builtin surface here is small enough that a registry
//! of boxed closures would be pure overhead.

use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::error::{EarlError, EarlResult, SourceLoc};
use crate::io::PrintWriter;
use crate::value::{shared, DictKey, DictKeyKind, EarlDict, EarlFile, EarlString, FileMode, PredicateValue, Value, ValueKind};

fn arity_err(loc: &SourceLoc, name: &str, expected: &str, got: usize) -> EarlError {
    EarlError::ty(loc.clone(), format!("`{name}` expects {expected} argument(s), got {got}"))
}

fn kind_err(loc: &SourceLoc, name: &str, want: &str, got: &Value) -> EarlError {
    EarlError::ty(loc.clone(), format!("`{name}` expects {want}, got {}", got.kind()))
}

/// Free intrinsics that need no receiver. `observe` is handled
/// by the evaluator directly since it must see the *holder*, not a copied
/// `Value`; it never reaches here.
#[allow(clippy::too_many_lines)]
pub fn call_free(name: &str, args: Vec<Value>, loc: &SourceLoc, out: &mut dyn PrintWriter, cfg: &mut RuntimeConfig) -> Option<EarlResult<Value>> {
    Some(match name {
        "print" | "println" => {
            let sep = args.iter().map(Value::to_display_string).collect::<Vec<_>>().join("");
            let result = if name == "println" { out.write_line(&sep) } else { out.write_str(&sep) };
            result.map(|()| Value::Void)
        }
        "fprint" | "fprintln" => call_file_print(name, args, loc),
        "len" => len_intrinsic(&args, loc),
        "copy" => match args.first() {
            Some(Value::File(_)) => Err(EarlError::ty(loc.clone(), "cannot copy a File value")),
            Some(v) => Ok(v.copy()),
            None => Err(arity_err(loc, name, "1", 0)),
        },
        "type" => args.first().map(|v| Value::str_from(v.kind().to_string())).ok_or_else(|| arity_err(loc, name, "1", args.len())),
        "typeof" => args.first().map(|v| Value::TypeKW(v.kind())).ok_or_else(|| arity_err(loc, name, "1", args.len())),
        "assert" => assert_intrinsic(&args, loc),
        "some" => args.into_iter().next().map(|v| Value::Option(Some(Box::new(v)))).ok_or_else(|| arity_err(loc, name, "1", 0)),
        "argv" => Ok(Value::List(shared(std::env::args().map(Value::str_from).collect()))),
        "env" => env_intrinsic(&args, loc),
        "sleep" => sleep_intrinsic(&args, loc),
        "datetime" => Ok(Value::Time(chrono::Utc::now().timestamp())),
        "unimplemented" => Err(EarlError::new(crate::error::ErrorKind::Todo, loc.clone(), "unimplemented")),
        "exit" => {
            let code = args.first().map_or(0, |v| if let Value::Int(i) = v { *i as i32 } else { 0 });
            std::process::exit(code);
        }
        "warn" => {
            if !cfg.suppress_warnings {
                eprintln!("warning: {}", args.first().map_or_else(String::new, Value::to_display_string));
            }
            Ok(Value::Void)
        }
        "panic" => Err(EarlError::fatal(loc.clone(), args.first().map_or_else(String::new, Value::to_display_string))),
        "init_seed" | "random" => random_intrinsic(name, &args, loc),
        "sin" => float_unary(name, &args, loc, f64::sin),
        "cos" => float_unary(name, &args, loc, f64::cos),
        "help" => Ok(Value::str_from("see the language reference")),
        "str" => args.first().map(Value::to_earl_string).ok_or_else(|| arity_err(loc, name, "1", 0)),
        "int" => int_cast(&args, loc),
        "float" => float_cast(&args, loc),
        "bool" => bool_cast(&args, loc),
        "tuple" => Ok(Value::Tuple(Rc::new(args.iter().map(Value::copy).collect()))),
        "list" => Ok(Value::List(shared(args.iter().map(Value::copy).collect()))),
        "unit" => Ok(Value::Void),
        "Dict" => dict_ctor(&args, loc),
        "open" => open_intrinsic(&args, loc),
        "input" => input_intrinsic(),
        "__internal_isdir__" => Ok(Value::Bool(args.first().is_some_and(|v| matches!(v, Value::Str(s) if std::path::Path::new(&s.borrow().as_str()).is_dir())))),
        "__internal_mkdir__" => fs_op(&args, loc, |p| std::fs::create_dir_all(p)),
        "__internal_move__" => fs_move(&args, loc),
        "__internal_ls__" => ls_intrinsic(&args, loc),
        "cd" => fs_op(&args, loc, |p| std::env::set_current_dir(p)),
        "__internal_unix_system__" => shell_intrinsic(&args, loc, cfg, false),
        "__internal_unix_system_woutput__" => shell_intrinsic(&args, loc, cfg, true),
        "set_flag" => {
            if let Some(Value::Str(s)) = args.first() {
                cfg.set(&s.borrow().as_str(), true);
            }
            Ok(Value::Void)
        }
        "unset_flag" => {
            if let Some(Value::Str(s)) = args.first() {
                cfg.set(&s.borrow().as_str(), false);
            }
            Ok(Value::Void)
        }
        "flush" => Ok(Value::Void),
        _ => return None,
    })
}

fn call_file_print(name: &str, args: Vec<Value>, loc: &SourceLoc) -> EarlResult<Value> {
    let Some(Value::File(f)) = args.first() else {
        return Err(kind_err(loc, name, "a File receiver", args.first().unwrap_or(&Value::Void)));
    };
    let mut text = args[1..].iter().map(Value::to_display_string).collect::<String>();
    if name == "fprintln" {
        text.push('\n');
    }
    write_file(f, text.as_bytes(), loc)?;
    Ok(Value::Void)
}

fn write_file(f: &crate::value::Shared<EarlFile>, bytes: &[u8], loc: &SourceLoc) -> EarlResult<()> {
    use std::io::Write as _;
    let mut file = f.borrow_mut();
    if !file.open {
        return Err(EarlError::fatal(loc.clone(), "write on closed file"));
    }
    if !file.mode.write {
        return Err(EarlError::ty(loc.clone(), "file not opened for writing"));
    }
    let handle = file.handle.as_mut().ok_or_else(|| EarlError::internal("file handle missing"))?;
    handle.write_all(bytes).map_err(|e| EarlError::fatal(loc.clone(), e.to_string()))
}

fn len_intrinsic(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let v = args.first().ok_or_else(|| arity_err(loc, "len", "1", 0))?;
    Ok(Value::Int(match v {
        Value::Str(s) => s.borrow().len() as i64,
        Value::List(l) => l.borrow().len() as i64,
        Value::Tuple(t) => t.len() as i64,
        Value::Dict(d) => d.borrow().entries.len() as i64,
        other => return Err(kind_err(loc, "len", "Str, List, Tuple or Dict", other)),
    }))
}

fn assert_intrinsic(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let v = args.first().ok_or_else(|| arity_err(loc, "assert", "1", 0))?;
    if v.boolean() {
        Ok(Value::Void)
    } else {
        Err(EarlError::fatal(loc.clone(), "assertion failed"))
    }
}

fn env_intrinsic(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let Some(Value::Str(s)) = args.first() else {
        return Err(arity_err(loc, "env", "1 Str", args.len()));
    };
    Ok(match std::env::var(s.borrow().as_str()) {
        Ok(v) => Value::Option(Some(Box::new(Value::str_from(v)))),
        Err(_) => Value::Option(None),
    })
}

fn sleep_intrinsic(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let millis = match args.first() {
        Some(Value::Int(i)) => (*i).max(0) as u64,
        Some(Value::Float(f)) => f.max(0.0) as u64,
        other => return Err(kind_err(loc, "sleep", "Int or Float", other.unwrap_or(&Value::Void))),
    };
    std::thread::sleep(std::time::Duration::from_millis(millis));
    Ok(Value::Void)
}

fn random_intrinsic(name: &str, args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    use rand::Rng as _;
    if name == "init_seed" {
        // A real implementation would seed a request-scoped RNG; this runtime
        // uses the thread RNG, so `init_seed` is accepted but a no-op.
        let _ = args;
        return Ok(Value::Void);
    }
    match (args.first(), args.get(1)) {
        (Some(Value::Int(lo)), Some(Value::Int(hi))) => Ok(Value::Int(rand::thread_rng().gen_range(*lo..=*hi))),
        (None, None) => Ok(Value::Float(rand::thread_rng().r#gen::<f64>())),
        _ => Err(EarlError::ty(loc.clone(), "`random` expects () or (Int, Int)")),
    }
}

fn float_unary(name: &str, args: &[Value], loc: &SourceLoc, f: fn(f64) -> f64) -> EarlResult<Value> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Float(f(*i as f64))),
        Some(Value::Float(x)) => Ok(Value::Float(f(*x))),
        other => Err(kind_err(loc, name, "Int or Float", other.unwrap_or(&Value::Void))),
    }
}

fn int_cast(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Float(f)) => Ok(Value::Int(*f as i64)),
        Some(Value::Str(s)) => s.borrow().as_str().trim().parse::<i64>().map(Value::Int).map_err(|_| EarlError::ty(loc.clone(), "cannot parse Str as Int")),
        Some(Value::Char(c)) => Ok(Value::Int(i64::from(*c - b'0'))),
        Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        other => Err(kind_err(loc, "int", "Int, Float, Str, Char or Bool", other.unwrap_or(&Value::Void))),
    }
}

fn float_cast(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        Some(Value::Str(s)) => s.borrow().as_str().trim().parse::<f64>().map(Value::Float).map_err(|_| EarlError::ty(loc.clone(), "cannot parse Str as Float")),
        other => Err(kind_err(loc, "float", "Int, Float or Str", other.unwrap_or(&Value::Void))),
    }
}

fn bool_cast(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    match args.first() {
        Some(Value::Bool(b)) => Ok(Value::Bool(*b)),
        Some(Value::Int(i)) => Ok(Value::Bool(*i != 0)),
        Some(Value::Float(f)) => Ok(Value::Bool(*f != 0.0)),
        Some(Value::Str(s)) => match s.borrow().as_str().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(EarlError::ty(loc.clone(), "`bool` on Str requires exactly \"true\" or \"false\"")),
        },
        other => Err(kind_err(loc, "bool", "Int, Float, Str or Bool", other.unwrap_or(&Value::Void))),
    }
}

fn dict_ctor(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let Some(Value::TypeKW(kind)) = args.first() else {
        return Err(EarlError::ty(loc.clone(), "`Dict` expects a TypeKW naming the key kind"));
    };
    let key_kind = match kind {
        ValueKind::Int => DictKeyKind::Int,
        ValueKind::Str => DictKeyKind::Str,
        ValueKind::Char => DictKeyKind::Char,
        ValueKind::Float => DictKeyKind::Float,
        other => return Err(EarlError::ty(loc.clone(), format!("{other} cannot key a Dict"))),
    };
    Ok(Value::Dict(shared(EarlDict::new(key_kind))))
}

fn open_intrinsic(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let (Some(Value::Str(path)), Some(Value::Str(mode_str))) = (args.first(), args.get(1)) else {
        return Err(EarlError::ty(loc.clone(), "`open` expects (Str path, Str mode)"));
    };
    let path = path.borrow().as_str();
    let mode_str = mode_str.borrow().as_str();
    let mode = FileMode::parse(loc, &mode_str)?;
    let mut opts = std::fs::OpenOptions::new();
    opts.read(mode.read).write(mode.write).create(mode.write).truncate(false);
    let handle = opts.open(&path).map_err(|e| EarlError::fatal(loc.clone(), format!("cannot open `{path}`: {e}")))?;
    Ok(Value::File(shared(EarlFile { path, mode, mode_str, handle: Some(handle), open: true })))
}

fn input_intrinsic() -> EarlResult<Value> {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok();
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Value::str_from(line))
}

fn path_arg(args: &[Value], loc: &SourceLoc) -> EarlResult<std::path::PathBuf> {
    match args.first() {
        Some(Value::Str(s)) => Ok(std::path::PathBuf::from(s.borrow().as_str())),
        other => Err(kind_err(loc, "path", "Str", other.unwrap_or(&Value::Void))),
    }
}

fn fs_op(args: &[Value], loc: &SourceLoc, op: impl FnOnce(&std::path::Path) -> std::io::Result<()>) -> EarlResult<Value> {
    let path = path_arg(args, loc)?;
    op(&path).map(|()| Value::Void).map_err(|e| EarlError::fatal(loc.clone(), e.to_string()))
}

fn fs_move(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let (Some(Value::Str(from)), Some(Value::Str(to))) = (args.first(), args.get(1)) else {
        return Err(EarlError::ty(loc.clone(), "`__internal_move__` expects (Str, Str)"));
    };
    std::fs::rename(from.borrow().as_str(), to.borrow().as_str()).map(|()| Value::Void).map_err(|e| EarlError::fatal(loc.clone(), e.to_string()))
}

fn ls_intrinsic(args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let path = path_arg(args, loc)?;
    let entries = std::fs::read_dir(&path)
        .map_err(|e| EarlError::fatal(loc.clone(), e.to_string()))?
        .filter_map(std::result::Result::ok)
        .map(|e| Value::str_from(e.file_name().to_string_lossy()))
        .collect();
    Ok(Value::List(shared(entries)))
}

fn shell_intrinsic(args: &[Value], loc: &SourceLoc, cfg: &RuntimeConfig, capture: bool) -> EarlResult<Value> {
    let Some(Value::Str(cmd)) = args.first() else {
        return Err(EarlError::ty(loc.clone(), "shell intrinsic expects a Str command"));
    };
    let cmd = cmd.borrow().as_str();
    let output = std::process::Command::new("sh").arg("-c").arg(&cmd).output();
    match output {
        Ok(out) if out.status.success() || !cfg.error_on_bash_fail => {
            if capture {
                Ok(Value::str_from(String::from_utf8_lossy(&out.stdout)))
            } else {
                Ok(Value::Int(i64::from(out.status.code().unwrap_or(0))))
            }
        }
        Ok(out) => Err(EarlError::fatal(loc.clone(), format!("command `{cmd}` exited with status {:?}", out.status.code()))),
        Err(e) => Err(EarlError::fatal(loc.clone(), format!("failed to run `{cmd}`: {e}"))),
    }
}

/// Member intrinsics keyed by receiver kind. `invoke`
/// calls a `Value` the way the evaluator's `FuncCall` handler would, so
/// `filter`/`map`/`fold` can run a user callback without this module
/// depending on `eval.rs` or `Context`.
#[allow(clippy::too_many_lines)]
pub fn call_member(receiver: &Value, name: &str, args: Vec<Value>, loc: &SourceLoc, mut invoke: impl FnMut(&Value, Vec<Value>) -> EarlResult<Value>) -> Option<EarlResult<Value>> {
    Some(match receiver {
        Value::Bool(b) => bool_member(*b, name, args, loc)?,
        Value::Char(c) => char_member(*c, name, loc)?,
        Value::Str(s) => return str_member(s, name, args, loc),
        Value::List(l) => return list_member(l, name, args, loc, &mut invoke),
        Value::Tuple(t) => return tuple_member(t, name, args, loc, &mut invoke),
        Value::Dict(d) => return dict_member(d, name, args, loc),
        Value::Option(o) => return option_member(o, name, args, loc),
        Value::File(f) => return file_member(f, name, args, loc),
        Value::Time(t) => time_member(*t, name, loc)?,
        Value::Predicate(p) => predicate_member(p, name, args, loc)?,
        _ => return None,
    })
}

fn bool_member(b: bool, name: &str, args: Vec<Value>, loc: &SourceLoc) -> Option<EarlResult<Value>> {
    Some(match name {
        // `toggle` flips the receiver in place and returns `Void`; that needs
        // write access to the receiver's lvalue, so `eval.rs` intercepts it
        // before dispatch ever reaches here. Reaching this arm means the
        // receiver wasn't assignable.
        "toggle" => Err(EarlError::ty(loc.clone(), "`toggle` requires an assignable Bool receiver")),
        "ifelse" => {
            if args.len() != 2 {
                return Some(Err(arity_err(loc, name, "2", args.len())));
            }
            let mut args = args.into_iter();
            let if_true = args.next().unwrap();
            let if_false = args.next().unwrap();
            Ok(if b { if_true } else { if_false })
        }
        _ => return None,
    })
}

fn char_member(c: u8, name: &str, _loc: &SourceLoc) -> Option<EarlResult<Value>> {
    Some(match name {
        "ascii" => Ok(Value::Int(i64::from(c))),
        _ => return None,
    })
}

fn str_member(s: &crate::value::Shared<EarlString>, name: &str, args: Vec<Value>, loc: &SourceLoc) -> Option<EarlResult<Value>> {
    Some(match name {
        "split" => {
            let Some(Value::Str(delim)) = args.first() else {
                return Some(Err(EarlError::ty(loc.clone(), "`split` expects a Str delimiter")));
            };
            let text = s.borrow().as_str();
            let delim = delim.borrow().as_str();
            let parts = if delim.is_empty() { vec![text] } else { text.split(delim.as_str()).map(str::to_owned).collect() };
            Ok(Value::List(shared(parts.into_iter().map(Value::str_from).collect())))
        }
        "substr" => {
            let text = s.borrow().as_str();
            let (Some(Value::Int(start)), Some(Value::Int(end))) = (args.first(), args.get(1)) else {
                return Some(Err(EarlError::ty(loc.clone(), "`substr` expects (Int, Int)")));
            };
            let (start, end) = (*start as usize, *end as usize);
            if start > end || end > text.len() {
                return Some(Err(EarlError::fatal(loc.clone(), format!("substr({start}, {end}) out of range for length {}", text.len()))));
            }
            Ok(Value::str_from(&text[start..end]))
        }
        "trim" => Ok(Value::str_from(s.borrow().as_str().trim_matches(|c: char| c.is_ascii_whitespace()))),
        "remove_lines" => Ok(Value::str_from(s.borrow().as_str().chars().filter(|c| *c != '\n' && *c != '\r').collect::<String>())),
        "nth" => return Some(str_nth(s, &args, loc)),
        "contains" => {
            let Some(v) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            Ok(Value::Bool(s.borrow().as_str().contains(&v.to_display_string())))
        }
        _ => return None,
    })
}

fn str_nth(s: &crate::value::Shared<EarlString>, args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    let text = s.borrow().as_str();
    match args.first() {
        Some(Value::Int(i)) => {
            let i = *i;
            if i < 0 || i as usize >= text.len() {
                return Err(EarlError::fatal(loc.clone(), format!("index {i} out of range for string of length {}", text.len())));
            }
            Ok(Value::Char(EarlString::externalize(s, i as usize).map(|cell| *cell.borrow())?))
        }
        Some(Value::Slice(a, b)) => {
            let start = slice_endpoint(a, 0, loc)?;
            let end = slice_endpoint(b, text.len(), loc)?;
            if start > end || end > text.len() {
                return Err(EarlError::fatal(loc.clone(), "slice out of range"));
            }
            Ok(Value::str_from(&text[start..end]))
        }
        other => Err(kind_err(loc, "nth", "Int or Slice", other.unwrap_or(&Value::Void))),
    }
}

fn slice_endpoint(v: &Value, default_if_void: usize, loc: &SourceLoc) -> EarlResult<usize> {
    match v {
        Value::Void => Ok(default_if_void),
        Value::Int(i) if *i >= 0 => Ok(*i as usize),
        other => Err(kind_err(loc, "slice endpoint", "a non-negative Int or Void", other)),
    }
}

fn list_member(l: &crate::value::Shared<Vec<Value>>, name: &str, mut args: Vec<Value>, loc: &SourceLoc, invoke: &mut impl FnMut(&Value, Vec<Value>) -> EarlResult<Value>) -> Option<EarlResult<Value>> {
    Some(match name {
        "nth" => list_nth(&l.borrow(), &args, loc),
        "back" => l.borrow().last().map(Value::copy).ok_or_else(|| EarlError::fatal(loc.clone(), "`back` on empty List")),
        "rev" => {
            let mut v: Vec<Value> = l.borrow().iter().map(Value::copy).collect();
            v.reverse();
            Ok(Value::List(shared(v)))
        }
        "append" => {
            l.borrow_mut().extend(args.drain(..).map(|v| v.copy()));
            Ok(Value::Void)
        }
        "pop" => {
            let Some(Value::Int(i)) = args.first() else {
                return Some(Err(EarlError::ty(loc.clone(), "`pop` expects an Int index")));
            };
            let mut v = l.borrow_mut();
            let i = *i as usize;
            if i >= v.len() {
                return Some(Err(EarlError::fatal(loc.clone(), format!("index {i} out of range for List of length {}", v.len()))));
            }
            Ok(v.remove(i))
        }
        "contains" => {
            let Some(needle) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            Ok(Value::Bool(l.borrow().iter().any(|v| v.eq(needle))))
        }
        "filter" => {
            let Some(f) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            let mut out = Vec::new();
            for item in l.borrow().iter() {
                match invoke(f, vec![item.copy()]) {
                    Ok(keep) if keep.boolean() => out.push(item.copy()),
                    Ok(_) => {}
                    Err(e) => return Some(Err(e)),
                }
            }
            Ok(Value::List(shared(out)))
        }
        "map" => {
            let Some(f) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            let mut out = Vec::with_capacity(l.borrow().len());
            for item in l.borrow().iter() {
                match invoke(f, vec![item.copy()]) {
                    Ok(v) => out.push(v),
                    Err(e) => return Some(Err(e)),
                }
            }
            Ok(Value::List(shared(out)))
        }
        "foreach" => {
            let Some(f) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            for item in l.borrow().iter() {
                if let Err(e) = invoke(f, vec![item.copy()]) {
                    return Some(Err(e));
                }
            }
            Ok(Value::Void)
        }
        "fold" => {
            let (Some(f), Some(init)) = (args.first(), args.get(1)) else {
                return Some(Err(arity_err(loc, name, "2", args.len())));
            };
            let mut acc = init.copy();
            for item in l.borrow().iter() {
                acc = match invoke(f, vec![acc, item.copy()]) {
                    Ok(v) => v,
                    Err(e) => return Some(Err(e)),
                };
            }
            Ok(acc)
        }
        _ => return None,
    })
}

fn list_nth(items: &[Value], args: &[Value], loc: &SourceLoc) -> EarlResult<Value> {
    match args.first() {
        Some(Value::Int(i)) => {
            let i = *i;
            if i < 0 || i as usize >= items.len() {
                return Err(EarlError::fatal(loc.clone(), format!("index {i} out of range for List of length {}", items.len())));
            }
            Ok(items[i as usize].copy())
        }
        Some(Value::Slice(a, b)) => {
            let start = slice_endpoint(a, 0, loc)?;
            let end = slice_endpoint(b, items.len(), loc)?;
            if start > end || end > items.len() {
                return Err(EarlError::fatal(loc.clone(), "slice out of range"));
            }
            Ok(Value::List(shared(items[start..end].iter().map(Value::copy).collect())))
        }
        other => Err(kind_err(loc, "nth", "Int or Slice", other.unwrap_or(&Value::Void))),
    }
}

fn tuple_member(t: &Rc<Vec<Value>>, name: &str, args: Vec<Value>, loc: &SourceLoc, invoke: &mut impl FnMut(&Value, Vec<Value>) -> EarlResult<Value>) -> Option<EarlResult<Value>> {
    Some(match name {
        "nth" => list_nth(t, &args, loc),
        "back" => t.last().map(Value::copy).ok_or_else(|| EarlError::fatal(loc.clone(), "`back` on empty Tuple")),
        "rev" => {
            let mut v: Vec<Value> = t.iter().map(Value::copy).collect();
            v.reverse();
            Ok(Value::Tuple(Rc::new(v)))
        }
        "contains" => {
            let Some(needle) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            Ok(Value::Bool(t.iter().any(|v| v.eq(needle))))
        }
        "filter" => {
            let Some(f) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            let mut out = Vec::new();
            for item in t.iter() {
                match invoke(f, vec![item.copy()]) {
                    Ok(keep) if keep.boolean() => out.push(item.copy()),
                    Ok(_) => {}
                    Err(e) => return Some(Err(e)),
                }
            }
            Ok(Value::Tuple(Rc::new(out)))
        }
        "map" => {
            let Some(f) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            let mut out = Vec::with_capacity(t.len());
            for item in t.iter() {
                match invoke(f, vec![item.copy()]) {
                    Ok(v) => out.push(v),
                    Err(e) => return Some(Err(e)),
                }
            }
            Ok(Value::Tuple(Rc::new(out)))
        }
        "foreach" => {
            let Some(f) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            for item in t.iter() {
                if let Err(e) = invoke(f, vec![item.copy()]) {
                    return Some(Err(e));
                }
            }
            Ok(Value::Void)
        }
        "fold" => {
            let (Some(f), Some(init)) = (args.first(), args.get(1)) else {
                return Some(Err(arity_err(loc, name, "2", args.len())));
            };
            let mut acc = init.copy();
            for item in t.iter() {
                acc = match invoke(f, vec![acc, item.copy()]) {
                    Ok(v) => v,
                    Err(e) => return Some(Err(e)),
                };
            }
            Ok(acc)
        }
        _ => return None,
    })
}

fn dict_member(d: &crate::value::Shared<EarlDict>, name: &str, args: Vec<Value>, loc: &SourceLoc) -> Option<EarlResult<Value>> {
    Some(match name {
        "insert" => {
            let (Some(k), Some(v)) = (args.first(), args.get(1)) else {
                return Some(Err(arity_err(loc, name, "2", args.len())));
            };
            let mut dict = d.borrow_mut();
            let Some(key) = DictKey::from_value(k) else {
                return Some(Err(EarlError::ty(loc.clone(), "Dict key must be a scalar kind")));
            };
            if let Some(kk) = dict.key_kind {
                if kk != key.kind() {
                    return Some(Err(EarlError::ty(loc.clone(), "Dict key kind mismatch")));
                }
            } else {
                dict.key_kind = Some(key.kind());
            }
            dict.entries.insert(key, v.copy());
            Ok(Value::Void)
        }
        "get" => {
            let Some(k) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            let dict = d.borrow();
            let Some(key) = DictKey::from_value(k) else {
                return Some(Err(EarlError::ty(loc.clone(), "Dict key must be a scalar kind")));
            };
            Ok(match dict.entries.get(&key) {
                Some(v) => Value::Option(Some(Box::new(v.copy()))),
                std::option::Option::None => Value::Option(None),
            })
        }
        "has_key" => {
            let Some(k) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            let dict = d.borrow();
            Ok(Value::Bool(DictKey::from_value(k).is_some_and(|key| dict.entries.contains_key(&key))))
        }
        "has_value" => {
            let Some(needle) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            Ok(Value::Bool(d.borrow().entries.values().any(|v| v.eq(needle))))
        }
        "empty" => Ok(Value::Bool(d.borrow().entries.is_empty())),
        _ => return None,
    })
}

fn option_member(o: &std::option::Option<Box<Value>>, name: &str, args: Vec<Value>, loc: &SourceLoc) -> Option<EarlResult<Value>> {
    Some(match name {
        "unwrap" => o.as_ref().map(|v| (**v).copy()).ok_or_else(|| EarlError::fatal(loc.clone(), "unwrap on None")),
        "unwrap_or" => {
            let Some(default) = args.into_iter().next() else {
                return Some(Err(arity_err(loc, name, "1", 0)));
            };
            Ok(o.as_ref().map_or(default, |v| (**v).copy()))
        }
        "is_some" => Ok(Value::Bool(o.is_some())),
        "is_none" => Ok(Value::Bool(o.is_none())),
        _ => return None,
    })
}

fn file_member(f: &crate::value::Shared<EarlFile>, name: &str, args: Vec<Value>, loc: &SourceLoc) -> Option<EarlResult<Value>> {
    Some(match name {
        "read" => {
            use std::io::Read as _;
            let mut file = f.borrow_mut();
            if !file.open {
                return Some(Err(EarlError::fatal(loc.clone(), "read on closed file")));
            }
            if !file.mode.read {
                return Some(Err(EarlError::ty(loc.clone(), "file not opened for reading")));
            }
            let Some(handle) = file.handle.as_mut() else {
                return Some(Err(EarlError::internal("file handle missing")));
            };
            let mut buf = String::new();
            handle.read_to_string(&mut buf).map(|_| Value::str_from(buf)).map_err(|e| EarlError::fatal(loc.clone(), e.to_string()))
        }
        "write" => {
            let Some(v) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            write_file(f, v.to_display_string().as_bytes(), loc).map(|()| Value::Void)
        }
        "writelines" => {
            let Some(Value::List(items)) = args.first() else {
                return Some(Err(EarlError::ty(loc.clone(), "`writelines` expects a List")));
            };
            let text: String = items.borrow().iter().map(|v| format!("{}\n", v.to_display_string())).collect();
            write_file(f, text.as_bytes(), loc).map(|()| Value::Void)
        }
        "dump" => {
            use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
            let mut file = f.borrow_mut();
            let Some(handle) = file.handle.as_mut() else {
                return Some(Err(EarlError::fatal(loc.clone(), "dump on closed file")));
            };
            let mut buf = String::new();
            handle.seek(SeekFrom::Start(0)).ok();
            handle.read_to_string(&mut buf).ok();
            print!("{buf}");
            std::io::stdout().flush().ok();
            Ok(Value::Void)
        }
        "close" => {
            let mut file = f.borrow_mut();
            if !file.open {
                return Some(Err(EarlError::fatal(loc.clone(), "double close")));
            }
            file.open = false;
            file.handle = None;
            Ok(Value::Void)
        }
        _ => return None,
    })
}

fn time_member(t: i64, name: &str, _loc: &SourceLoc) -> Option<EarlResult<Value>> {
    use chrono::{DateTime, Datelike, Timelike, Utc};
    let dt: DateTime<Utc> = DateTime::from_timestamp(t, 0).unwrap_or_default();
    Some(Ok(match name {
        "raw" => Value::Int(t),
        "readable" => Value::Tuple(Rc::new(vec![
            Value::Int(i64::from(dt.year())),
            Value::Int(i64::from(dt.month())),
            Value::Int(i64::from(dt.day())),
            Value::Int(i64::from(dt.hour())),
            Value::Int(i64::from(dt.minute())),
            Value::Int(i64::from(dt.second())),
        ])),
        "years" => Value::Int(i64::from(dt.year())),
        "months" => Value::Int(i64::from(dt.month())),
        "days" => Value::Int(i64::from(dt.day())),
        "hours" => Value::Int(i64::from(dt.hour())),
        "minutes" => Value::Int(i64::from(dt.minute())),
        "seconds" => Value::Int(i64::from(dt.second())),
        _ => return None,
    }))
}

fn predicate_member(p: &PredicateValue, name: &str, args: Vec<Value>, loc: &SourceLoc) -> Option<EarlResult<Value>> {
    Some(match name {
        "check" => {
            let Some(v) = args.first() else { return Some(Err(arity_err(loc, name, "1", 0))) };
            p.check(v).map(Value::Bool)
        }
        _ => return None,
    })
}

/// Used by `eval.rs` to decide whether a bare `Ident` names a receiver-bound
/// member function before falling back to Undeclared.
#[must_use]
pub fn is_member_intrinsic_name(name: &str) -> bool {
    matches!(
        name,
        "toggle"
            | "ifelse"
            | "ascii"
            | "split"
            | "substr"
            | "trim"
            | "remove_lines"
            | "nth"
            | "back"
            | "rev"
            | "append"
            | "pop"
            | "contains"
            | "filter"
            | "map"
            | "foreach"
            | "fold"
            | "insert"
            | "get"
            | "has_key"
            | "has_value"
            | "empty"
            | "unwrap"
            | "unwrap_or"
            | "is_some"
            | "is_none"
            | "read"
            | "write"
            | "writelines"
            | "dump"
            | "close"
            | "raw"
            | "readable"
            | "years"
            | "months"
            | "days"
            | "hours"
            | "minutes"
            | "seconds"
            | "check"
    )
}

/// Used by `eval.rs`'s `Ident` classification.
#[must_use]
pub fn is_free_intrinsic_name(name: &str) -> bool {
    matches!(
        name,
        "print"
            | "println"
            | "fprint"
            | "fprintln"
            | "input"
            | "len"
            | "copy"
            | "open"
            | "type"
            | "typeof"
            | "assert"
            | "some"
            | "argv"
            | "env"
            | "sleep"
            | "datetime"
            | "unimplemented"
            | "exit"
            | "warn"
            | "panic"
            | "observe"
            | "init_seed"
            | "random"
            | "sin"
            | "cos"
            | "help"
            | "str"
            | "int"
            | "float"
            | "bool"
            | "tuple"
            | "list"
            | "unit"
            | "Dict"
            | "cd"
            | "set_flag"
            | "unset_flag"
            | "flush"
    ) || name.starts_with("__internal_")
}
