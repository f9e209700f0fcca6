//! Resolves and caches imported modules by canonical file path.
//!
//! Kept deliberately thin: this struct owns path resolution and the
//! canonical-path -> `World` cache only. Lexing, parsing, and evaluating an
//! imported file's body happens in `eval.rs`'s `Import` handler, so this
//! module never needs to depend on the evaluator and the two can't form a
//! dependency cycle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::context::Context;
use crate::error::{EarlError, EarlResult, SourceLoc};

#[derive(Debug, Default)]
pub struct ModuleLoader {
    include_dirs: Vec<PathBuf>,
    cache: HashMap<PathBuf, Rc<RefCell<Context>>>,
}

impl ModuleLoader {
    #[must_use]
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        Self { include_dirs, cache: HashMap::new() }
    }

    /// Resolves `raw_path` against the importing file's own directory first,
    /// then the configured include directories, then
    /// the process's current directory.
    pub fn resolve(&self, raw_path: &str, importer_file: &str, loc: &SourceLoc) -> EarlResult<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(parent) = Path::new(importer_file).parent() {
            candidates.push(parent.join(raw_path));
        }
        for dir in &self.include_dirs {
            candidates.push(dir.join(raw_path));
        }
        candidates.push(PathBuf::from(raw_path));
        for candidate in &candidates {
            if candidate.is_file() {
                return candidate.canonicalize().map_err(|e| EarlError::fatal(loc.clone(), format!("cannot resolve `{raw_path}`: {e}")));
            }
        }
        Err(EarlError::fatal(loc.clone(), format!("cannot find module `{raw_path}`")))
    }

    #[must_use]
    pub fn get(&self, canonical: &Path) -> Option<Rc<RefCell<Context>>> {
        self.cache.get(canonical).cloned()
    }

    pub fn insert(&mut self, canonical: PathBuf, world: Rc<RefCell<Context>>) {
        self.cache.insert(canonical, world);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::ModuleLoader;
    use crate::error::{ErrorKind, SourceLoc};

    #[test]
    fn missing_module_is_a_fatal_error() {
        let loader = ModuleLoader::new(vec![]);
        let err = loader.resolve("does_not_exist.earl", "/tmp/main.earl", &SourceLoc::unknown()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
    }

    #[test]
    fn cache_roundtrips_by_canonical_path() {
        let mut loader = ModuleLoader::new(vec![]);
        let path = std::path::PathBuf::from("/tmp/mod.earl");
        assert!(loader.get(&path).is_none());
        let world = crate::context::Context::new_world(Rc::from("/tmp/mod.earl"));
        loader.insert(path.clone(), world);
        assert!(loader.get(&path).is_some());
    }
}
