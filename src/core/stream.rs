//! Instruction streams, labels, and nested scoping.
//!
//! A stream is an ordered sequence of items appended during construction.
//! Nested scopes (loop bodies, conditional regions) are modeled as a stack
//! of sub-streams: entering a scope pushes a fresh stream, leaving it
//! splices the sub-stream back into its parent. Labels are handles into an
//! arena; a handle may be referenced before it is bound (forward branches,
//! loop end labels) and every handle must be bound by finalization time.

use crate::core::error::{AsmError, AsmResult};

/// Handle into the label arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub(crate) u32);

impl LabelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct LabelEntry {
    name: String,
    /// Index of the item the label precedes, once bound.
    bound: Option<usize>,
}

/// Arena of labels for one function. Handles are created at first
/// reference and bound when the label position is defined.
#[derive(Debug, Default)]
pub struct LabelArena {
    entries: Vec<LabelEntry>,
}

impl LabelArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unbound label.
    pub fn create(&mut self, name: impl Into<String>) -> LabelId {
        let id = LabelId(self.entries.len() as u32);
        self.entries.push(LabelEntry {
            name: name.into(),
            bound: None,
        });
        id
    }

    /// Bind a label to an item index. Binding twice is an error.
    pub fn bind(&mut self, id: LabelId, position: usize) -> AsmResult<()> {
        let entry = &mut self.entries[id.index()];
        if entry.bound.is_some() {
            return Err(AsmError::DuplicateLabel {
                name: entry.name.clone(),
            });
        }
        entry.bound = Some(position);
        Ok(())
    }

    /// Move an already-validated binding, used when lowering passes insert
    /// or remove items.
    pub fn rebind(&mut self, id: LabelId, position: usize) {
        self.entries[id.index()].bound = Some(position);
    }

    pub fn name(&self, id: LabelId) -> &str {
        &self.entries[id.index()].name
    }

    pub fn position(&self, id: LabelId) -> Option<usize> {
        self.entries[id.index()].bound
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify every handle is bound; names the first undefined label.
    pub fn check_all_bound(&self) -> AsmResult<()> {
        for entry in &self.entries {
            if entry.bound.is_none() {
                return Err(AsmError::UndefinedLabel {
                    name: entry.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn iter_bound(&self) -> impl Iterator<Item = (LabelId, usize)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.bound.map(|p| (LabelId(i as u32), p)))
    }
}

/// Stack of nested streams. Exactly one stream is active at a time; items
/// append to the innermost open scope.
#[derive(Debug)]
pub struct StreamStack<I> {
    scopes: Vec<Vec<I>>,
}

impl<I> StreamStack<I> {
    pub fn new() -> Self {
        StreamStack {
            scopes: vec![Vec::new()],
        }
    }

    pub fn append(&mut self, item: I) {
        // invariant: the root scope always exists
        self.scopes.last_mut().unwrap().push(item)
    }

    /// Number of items in the currently active scope.
    pub fn active_len(&self) -> usize {
        self.scopes.last().unwrap().len()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost scope and splice its items into the parent.
    pub fn pop_scope(&mut self) -> AsmResult<()> {
        if self.scopes.len() < 2 {
            return Err(AsmError::UnbalancedScope {
                reason: "no open scope to close".to_string(),
            });
        }
        let inner = self.scopes.pop().unwrap();
        self.scopes.last_mut().unwrap().extend(inner);
        Ok(())
    }

    /// Consume the stack, returning the flattened stream. All scopes must
    /// have been closed.
    pub fn finish(mut self) -> AsmResult<Vec<I>> {
        if self.scopes.len() != 1 {
            return Err(AsmError::UnbalancedScope {
                reason: format!("{} scope(s) left open", self.scopes.len() - 1),
            });
        }
        Ok(self.scopes.pop().unwrap())
    }
}

impl<I> Default for StreamStack<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_bind_once() {
        let mut arena = LabelArena::new();
        let l = arena.create("loop");
        assert!(arena.position(l).is_none());
        arena.bind(l, 3).unwrap();
        assert_eq!(arena.position(l), Some(3));
        assert!(matches!(
            arena.bind(l, 5),
            Err(AsmError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn unbound_label_detected() {
        let mut arena = LabelArena::new();
        arena.create("a");
        let b = arena.create("b");
        arena.bind(b, 0).unwrap();
        let err = arena.check_all_bound().unwrap_err();
        assert!(matches!(err, AsmError::UndefinedLabel { name } if name == "a"));
    }

    #[test]
    fn scopes_splice_in_order() {
        let mut stack: StreamStack<u32> = StreamStack::new();
        stack.append(1);
        stack.push_scope();
        stack.append(2);
        stack.append(3);
        stack.pop_scope().unwrap();
        stack.append(4);
        assert_eq!(stack.finish().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unbalanced_scope_reported() {
        let mut stack: StreamStack<u32> = StreamStack::new();
        stack.push_scope();
        assert!(stack.finish().is_err());

        let mut stack: StreamStack<u32> = StreamStack::new();
        assert!(stack.pop_scope().is_err());
    }
}
