//! Ordered stack of name -> holder mappings.
//!
//! One indexable storage of push/pop frames, keyed by name rather than a
//! compiled slot index, since this evaluator walks the AST directly rather
//! than compiling to bytecode.

use indexmap::IndexMap;

/// A stack of frames, each a name -> `H` map. Lookup is innermost-first.
///
/// Invariant: for every push/pop pair bracketing a block, the
/// depth at block exit equals the depth at block entry, on every exit path.
#[derive(Debug)]
pub struct Scope<H> {
    frames: Vec<IndexMap<String, H, ahash::RandomState>>,
}

impl<H> Default for Scope<H> {
    fn default() -> Self {
        Self { frames: vec![IndexMap::with_hasher(ahash::RandomState::new())] }
    }
}

impl<H> Scope<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(IndexMap::with_hasher(ahash::RandomState::new()));
    }

    /// Pops the innermost frame. Never pops the base frame (depth 0) — at
    /// least one namespace is always live.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Inserts into the innermost frame. Returns `false` if `name` already
    /// exists in that same frame (caller raises `Redeclared`).
    pub fn add(&mut self, name: impl Into<String>, holder: H) -> bool {
        let name = name.into();
        let frame = self.frames.last_mut().expect("scope always has a base frame");
        if frame.contains_key(&name) {
            return false;
        }
        frame.insert(name, holder);
        true
    }

    /// Overwrites (or inserts) into the innermost frame unconditionally; used
    /// for parameter binding where redeclaration checks don't apply.
    pub fn add_force(&mut self, name: impl Into<String>, holder: H) {
        let frame = self.frames.last_mut().expect("scope always has a base frame");
        frame.insert(name.into(), holder);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|f| f.contains_key(name))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> std::option::Option<&H> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    #[must_use]
    pub fn innermost_contains(&self, name: &str) -> bool {
        self.frames.last().is_some_and(|f| f.contains_key(name))
    }

    pub fn remove(&mut self, name: &str) -> std::option::Option<H> {
        for f in self.frames.iter_mut().rev() {
            if let std::option::Option::Some(h) = f.shift_remove(name) {
                return std::option::Option::Some(h);
            }
        }
        std::option::Option::None
    }
}

#[cfg(test)]
mod tests {
    use super::Scope;

    #[test]
    fn push_pop_preserves_depth() {
        let mut s: Scope<i32> = Scope::new();
        let depth = s.depth();
        s.push();
        s.add("x", 1);
        assert!(s.contains("x"));
        s.pop();
        assert_eq!(s.depth(), depth);
        assert!(!s.contains("x"));
    }

    #[test]
    fn innermost_first_lookup() {
        let mut s: Scope<i32> = Scope::new();
        s.add("x", 1);
        s.push();
        s.add("x", 2);
        assert_eq!(s.get("x"), std::option::Option::Some(&2));
        s.pop();
        assert_eq!(s.get("x"), std::option::Option::Some(&1));
    }

    #[test]
    fn redeclare_in_same_frame_fails() {
        let mut s: Scope<i32> = Scope::new();
        assert!(s.add("x", 1));
        assert!(!s.add("x", 2));
    }

    #[test]
    fn pop_never_drops_base_frame() {
        let mut s: Scope<i32> = Scope::new();
        s.pop();
        s.pop();
        assert_eq!(s.depth(), 1);
    }
}
