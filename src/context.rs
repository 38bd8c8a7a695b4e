//! Per-request creation chain
//!
//! Every top-level lookup starts a fresh [`CreationContext`] and threads it
//! through nested creations. It records which names this chain is currently
//! building, so early references are only ever handed back to the chain that
//! exposed them.

use crate::error::{DiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Singleton,
    Prototype,
}

#[derive(Debug, Default)]
pub(crate) struct CreationContext {
    stack: Vec<(String, Entry)>,
}

impl CreationContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether this chain is creating the singleton `name`.
    pub(crate) fn is_creating_singleton(&self, name: &str) -> bool {
        self.stack
            .iter()
            .any(|(n, e)| *e == Entry::Singleton && n == name)
    }

    pub(crate) fn is_creating_prototype(&self, name: &str) -> bool {
        self.stack
            .iter()
            .any(|(n, e)| *e == Entry::Prototype && n == name)
    }

    pub(crate) fn enter_singleton(&mut self, name: &str) {
        self.stack.push((name.to_string(), Entry::Singleton));
    }

    pub(crate) fn exit_singleton(&mut self, name: &str) {
        self.exit(name, Entry::Singleton);
    }

    /// Fails when the prototype is already being created in this chain.
    pub(crate) fn enter_prototype(&mut self, name: &str) -> Result<()> {
        if self.is_creating_prototype(name) {
            return Err(DiError::CircularPrototypeReference {
                name: name.to_string(),
                chain: self.chain_with(name),
            });
        }
        self.stack.push((name.to_string(), Entry::Prototype));
        Ok(())
    }

    pub(crate) fn exit_prototype(&mut self, name: &str) {
        self.exit(name, Entry::Prototype);
    }

    fn exit(&mut self, name: &str, entry: Entry) {
        if let Some(pos) = self.stack.iter().rposition(|(n, e)| *e == entry && n == name) {
            self.stack.remove(pos);
        }
    }

    /// Names in creation order, ending with `name`.
    pub(crate) fn chain_with(&self, name: &str) -> Vec<String> {
        let mut chain: Vec<String> = self.stack.iter().map(|(n, _)| n.clone()).collect();
        chain.push(name.to_string());
        chain
    }

    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_tracking() {
        let mut ctx = CreationContext::new();
        ctx.enter_singleton("a");
        assert!(ctx.is_creating_singleton("a"));
        assert!(!ctx.is_creating_singleton("b"));
        ctx.exit_singleton("a");
        assert!(!ctx.is_creating_singleton("a"));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_prototype_cycle() {
        let mut ctx = CreationContext::new();
        ctx.enter_prototype("p").unwrap();
        ctx.enter_singleton("s");
        let err = ctx.enter_prototype("p").unwrap_err();
        match err {
            DiError::CircularPrototypeReference { name, chain } => {
                assert_eq!(name, "p");
                assert_eq!(chain, vec!["p", "s", "p"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
