use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::construct::symbol::SharedSymbol;

/// An ordered set with O(1) membership checking. Insert-only: entries
/// are never physically removed, so indices handed out by `push`
/// stay stable for the lifetime of the set.
#[derive(Clone, PartialEq)]
pub struct VecSet<T: Eq + Hash + Clone> {
    order: Vec<T>,
    members: HashMap<T, usize>,
}

impl<T> Debug for VecSet<T>
where
    T: Eq + Hash + Clone + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.order)
    }
}

impl<T: Eq + Hash + Clone + Debug> VecSet<T> {
    pub fn new() -> Self {
        VecSet { order: vec![], members: HashMap::new() }
    }

    pub fn push(&mut self, item: T) -> usize {
        if let Some(index) = self.index_of(&item) {
            return index;
        }

        let index = self.order.len();
        self.members.insert(item.clone(), index);
        self.order.push(item);
        index
    }

    pub fn contains(&self, item: &T) -> bool {
        self.members.contains_key(item)
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.members.get(item).copied()
    }

    pub fn items(&self) -> &[T] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A single lexical scope: the ordered list of names bound directly
/// within it, plus a link to the scope that encloses it. Variable
/// references are resolved at compile time to a `(frame_dist,
/// offset)` pair by walking this chain — `frame_dist` is how many
/// `parent` links were followed, `offset` is the index `push`
/// returned for that name.
#[derive(Debug, Clone)]
pub struct Scope {
    pub locals: VecSet<SharedSymbol>,
    pub parent: Option<Box<Scope>>,
}

impl Scope {
    pub fn new(parent: Option<Scope>) -> Scope {
        Scope { locals: VecSet::new(), parent: parent.map(Box::new) }
    }

    pub fn bind(&mut self, symbol: SharedSymbol) -> usize {
        self.locals.push(symbol)
    }

    pub fn is_local(&self, symbol: SharedSymbol) -> bool {
        self.locals.contains(&symbol)
    }

    pub fn local_offset(&self, symbol: SharedSymbol) -> Option<usize> {
        self.locals.index_of(&symbol)
    }

    /// Walks up the parent chain looking for `symbol`, returning how
    /// many frames up it was found (0 = this scope) and its offset
    /// within that scope's local list.
    pub fn resolve(&self, symbol: SharedSymbol) -> Option<(u16, u16)> {
        let mut frame_dist: u16 = 0;
        let mut scope = self;

        loop {
            if let Some(offset) = scope.local_offset(symbol) {
                return Some((frame_dist, offset as u16));
            }

            match &scope.parent {
                Some(parent) => {
                    scope = parent;
                    frame_dist += 1;
                }
                None => return None,
            }
        }
    }
}
