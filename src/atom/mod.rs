//! In-memory atom store: the knowledge graph behind one space.
//!
//! An [`AtomSpace`] holds nodes (typed, named leaves) and links (typed,
//! ordered tuples of other atoms). Insertion is deduplicated: adding an atom
//! that already exists returns the existing [`Handle`]. Handles are allocated
//! monotonically, so iterating the table yields atoms in insertion order.

pub mod pattern;
pub mod queue;
pub mod sexpr;

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

/// Identifier of an atom within one [`AtomSpace`].
///
/// Uses `NonZeroU64` so that `Option<Handle>` costs nothing extra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Create a `Handle` from a raw `u64`. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Handle)
    }

    /// The underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "atom:{}", self.0)
    }
}

/// A node or a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Atom {
    Node { kind: String, name: String },
    Link { kind: String, outgoing: Vec<Handle> },
}

impl Atom {
    pub fn node(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Atom::Node {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn link(kind: impl Into<String>, outgoing: Vec<Handle>) -> Self {
        Atom::Link {
            kind: kind.into(),
            outgoing,
        }
    }

    /// The type name, e.g. `ConceptNode` or `InheritanceLink`.
    pub fn kind(&self) -> &str {
        match self {
            Atom::Node { kind, .. } | Atom::Link { kind, .. } => kind,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Atom::Node { .. })
    }

    /// Outgoing set of a link; empty for nodes.
    pub fn outgoing(&self) -> &[Handle] {
        match self {
            Atom::Node { .. } => &[],
            Atom::Link { outgoing, .. } => outgoing,
        }
    }
}

/// Whether a type name denotes a node type.
pub fn is_node_type(kind: &str) -> bool {
    kind.ends_with("Node")
}

/// Lock-protected contents of an [`AtomSpace`].
#[derive(Debug, Default)]
pub struct AtomTable {
    atoms: BTreeMap<Handle, Atom>,
    index: HashMap<Atom, Handle>,
    incoming: HashMap<Handle, Vec<Handle>>,
    nodes: usize,
    links: usize,
}

impl AtomTable {
    pub fn get(&self, handle: Handle) -> Option<&Atom> {
        self.atoms.get(&handle)
    }

    pub fn lookup(&self, atom: &Atom) -> Option<Handle> {
        self.index.get(atom).copied()
    }

    /// All atoms in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Atom)> {
        self.atoms.iter().map(|(h, a)| (*h, a))
    }

    /// `(nodes, links)`.
    pub fn counts(&self) -> (usize, usize) {
        (self.nodes, self.links)
    }

    pub fn incoming(&self, handle: Handle) -> &[Handle] {
        self.incoming.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Render an atom as a single-line s-expression.
    pub fn render(&self, handle: Handle) -> Option<String> {
        let mut out = String::new();
        self.render_into(handle, &mut out).then_some(out)
    }

    fn render_into(&self, handle: Handle, out: &mut String) -> bool {
        match self.atoms.get(&handle) {
            Some(Atom::Node { kind, name }) => {
                out.push('(');
                out.push_str(kind);
                out.push_str(" \"");
                for c in name.chars() {
                    match c {
                        '"' | '\\' => {
                            out.push('\\');
                            out.push(c);
                        }
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        '\r' => out.push_str("\\r"),
                        _ => out.push(c),
                    }
                }
                out.push_str("\")");
                true
            }
            Some(Atom::Link { kind, outgoing }) => {
                out.push('(');
                out.push_str(kind);
                for child in outgoing {
                    out.push(' ');
                    if !self.render_into(*child, out) {
                        return false;
                    }
                }
                out.push(')');
                true
            }
            None => false,
        }
    }

    fn remove_one(&mut self, handle: Handle) {
        let Some(atom) = self.atoms.remove(&handle) else {
            return;
        };
        self.index.remove(&atom);
        self.incoming.remove(&handle);
        match &atom {
            Atom::Node { .. } => self.nodes -= 1,
            Atom::Link { outgoing, .. } => {
                self.links -= 1;
                for child in outgoing {
                    if let Some(parents) = self.incoming.get_mut(child) {
                        parents.retain(|p| *p != handle);
                    }
                }
            }
        }
    }
}

/// Concurrent in-memory atom store.
#[derive(Debug)]
pub struct AtomSpace {
    table: RwLock<AtomTable>,
    next: AtomicU64,
}

impl AtomSpace {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(AtomTable::default()),
            next: AtomicU64::new(1),
        }
    }

    /// Shared read access to the table, for multi-step reads such as
    /// pattern matching.
    pub fn read(&self) -> RwLockReadGuard<'_, AtomTable> {
        self.table.read().expect("atom table lock poisoned")
    }

    /// Insert an atom, returning its handle and whether it was newly created.
    ///
    /// Every handle in a link's outgoing set must already be present.
    pub fn insert(&self, atom: Atom) -> (Handle, bool) {
        let mut table = self.table.write().expect("atom table lock poisoned");
        if let Some(existing) = table.lookup(&atom) {
            return (existing, false);
        }
        let handle = Handle::new(self.next.fetch_add(1, Ordering::Relaxed))
            .expect("handle space exhausted");
        match &atom {
            Atom::Node { .. } => table.nodes += 1,
            Atom::Link { outgoing, .. } => {
                table.links += 1;
                for child in outgoing {
                    debug_assert!(table.atoms.contains_key(child), "dangling outgoing {child}");
                    table.incoming.entry(*child).or_default().push(handle);
                }
            }
        }
        table.index.insert(atom.clone(), handle);
        table.atoms.insert(handle, atom);
        (handle, true)
    }

    pub fn add_node(&self, kind: &str, name: &str) -> Handle {
        self.insert(Atom::node(kind, name)).0
    }

    pub fn add_link(&self, kind: &str, outgoing: Vec<Handle>) -> Handle {
        self.insert(Atom::link(kind, outgoing)).0
    }

    /// Clone of the atom behind `handle`.
    pub fn get(&self, handle: Handle) -> Option<Atom> {
        self.read().get(handle).cloned()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.read().atoms.contains_key(&handle)
    }

    /// Remove an atom that no link refers to.
    ///
    /// An atom still present in some link's outgoing set is left in place
    /// and `false` is returned.
    pub fn remove(&self, handle: Handle) -> bool {
        let mut table = self.table.write().expect("atom table lock poisoned");
        if !table.atoms.contains_key(&handle) || !table.incoming(handle).is_empty() {
            return false;
        }
        table.remove_one(handle);
        true
    }

    pub fn num_nodes(&self) -> usize {
        self.read().nodes
    }

    pub fn num_links(&self) -> usize {
        self.read().links
    }

    /// Total atom count (nodes + links).
    pub fn size(&self) -> usize {
        let table = self.read();
        table.nodes + table.links
    }

    /// Render an atom as a single-line s-expression.
    pub fn render(&self, handle: Handle) -> Option<String> {
        self.read().render(handle)
    }
}

impl Default for AtomSpace {
    fn default() -> Self {
        Self::new()
    }
}
