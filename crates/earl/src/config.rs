//! `RuntimeConfig`: the closed set of CLI/`~/.earl` flags as one struct
//! instead of a global mutable bitset. `serde` derives let a `RuntimeConfig`
//! round-trip through the same derive-based (de)serialization idiom as the
//! rest of the stack.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One field per CLI/`~/.earl` flag, `false`/empty by default. `-c`/`-w` are
/// parsed as aliases for `check`/`watch` by the CLI, not represented
/// separately here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub without_stdlib: bool,
    pub repl_nocolor: bool,
    pub watch: Vec<String>,
    pub show_funs: bool,
    pub check: bool,
    pub to_py: bool,
    pub verbose: bool,
    pub show_bash: bool,
    pub show_lets: bool,
    pub show_muts: bool,
    pub no_sanitize_pipes: bool,
    pub error_on_bash_fail: bool,
    pub suppress_warnings: bool,
    pub include: Vec<String>,
    pub import: Vec<String>,
    pub repl_theme: Option<String>,
    pub repl_welcome: Option<String>,
    pub disable_implicit_returns: bool,
}

impl RuntimeConfig {
    /// Sets a flag by its `~/.earl`/CLI name.
    /// Unknown names are a load-time error in `~/.earl`, but a
    /// `set_flag`/`unset_flag` call at runtime silently no-ops on a name that
    /// names a list-valued flag, since those only make sense at load time.
    pub fn set(&mut self, name: &str, on: bool) {
        match name {
            "without-stdlib" => self.without_stdlib = on,
            "repl-nocolor" => self.repl_nocolor = on,
            "show-funs" => self.show_funs = on,
            "check" => self.check = on,
            "to-py" => self.to_py = on,
            "verbose" => self.verbose = on,
            "show-bash" => self.show_bash = on,
            "show-lets" => self.show_lets = on,
            "show-muts" => self.show_muts = on,
            "no-sanitize-pipes" => self.no_sanitize_pipes = on,
            "error-on-bash-fail" => self.error_on_bash_fail = on,
            "suppress-warnings" => self.suppress_warnings = on,
            "disable-implicit-returns" => self.disable_implicit_returns = on,
            _ => {}
        }
    }

    fn set_list(&mut self, name: &str, items: Vec<String>) {
        match name {
            "watch" => self.watch = items,
            "include" => self.include = items,
            "import" => self.import = items,
            _ => {}
        }
    }

    /// Parses `~/.earl`'s `key=value` lines. Comma-separated values are
    /// accepted for the three list flags. An unknown key aborts the whole
    /// load rather than the program that reads it.
    pub fn from_earl_file(src: &str) -> Result<Self, String> {
        let mut cfg = Self::default();
        for (lineno, line) in src.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("~/.earl line {}: missing `=`", lineno + 1));
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "without-stdlib" | "repl-nocolor" | "show-funs" | "check" | "to-py" | "verbose" | "show-bash" | "show-lets" | "show-muts" | "no-sanitize-pipes"
                | "error-on-bash-fail" | "suppress-warnings" | "disable-implicit-returns" => cfg.set(key, value == "true" || value == "1"),
                "watch" | "include" | "import" => cfg.set_list(key, value.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect()),
                "repl-theme" => cfg.repl_theme = Some(value.to_owned()),
                "repl-welcome" => cfg.repl_welcome = Some(value.to_owned()),
                other => return Err(format!("~/.earl line {}: unknown key `{other}`", lineno + 1)),
            }
        }
        Ok(cfg)
    }
}

/// One scalar slot of `~/.earl_mem`.
#[derive(Debug, Clone, PartialEq)]
pub enum MemValue {
    Int(i64),
    Float(f64),
    Str(String),
    Char(u8),
    Bool(bool),
}

impl MemValue {
    fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ if raw.len() == 1 => Self::Char(raw.as_bytes()[0]),
            _ => Self::Str(raw.to_owned()),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Char(c) => (*c as char).to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Persistent key-value memory surviving across interpreter invocations
///, backed by `~/.earl_mem`.
#[derive(Debug, Clone, Default)]
pub struct PersistentMem {
    path: Option<PathBuf>,
    entries: HashMap<String, MemValue>,
}

impl PersistentMem {
    #[must_use]
    pub fn load(path: PathBuf) -> Self {
        let entries = std::fs::read_to_string(&path)
            .ok()
            .map(|src| {
                src.lines()
                    .filter_map(|line| line.split_once('='))
                    .map(|(k, v)| (k.trim().to_owned(), MemValue::parse(v.trim())))
                    .collect()
            })
            .unwrap_or_default();
        Self { path: Some(path), entries }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MemValue> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: MemValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let mut out = String::new();
        for (k, v) in &self.entries {
            out.push_str(k);
            out.push('=');
            out.push_str(&v.render());
            out.push('\n');
        }
        std::fs::write(path, out)
    }
}
