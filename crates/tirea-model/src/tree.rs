//! Subscription node tree.
//!
//! Nodes mirror only the paths that have been observed or written. Each node
//! stores the read form of the operation that derives its value from its
//! parent's value, plus the channel its observers are connected to. The tree
//! lives in an arena so nodes can point at their parent without reference
//! cycles.

use crate::broadcast::Broadcast;
use crate::error::ModelResult;
use crate::{Op, Path, Seg, Value};
use indexmap::IndexMap;
use std::rc::Rc;

/// Arena handle of a subscription node.
///
/// A handle carries the generation of its slot, so a handle kept across a
/// prune never resolves to a node later allocated in the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    slot: usize,
    generation: u32,
}

impl NodeId {
    /// The whole-state node.
    pub const ROOT: NodeId = NodeId {
        slot: 0,
        generation: 0,
    };
}

struct Entry {
    generation: u32,
    node: Option<Node>,
}

struct Node {
    /// `None` only for the root.
    op: Option<Op>,
    parent: Option<NodeId>,
    children: IndexMap<Seg, NodeId>,
    channel: Rc<Broadcast<Value>>,
}

/// Arena of subscription nodes rooted at [`NodeId::ROOT`].
pub struct NodeTree {
    name: String,
    entries: Vec<Entry>,
    free: Vec<usize>,
}

impl NodeTree {
    /// Create a tree holding only the root node. `name` prefixes channel
    /// names in logs.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let root = Node {
            op: None,
            parent: None,
            children: IndexMap::new(),
            channel: Broadcast::new(format!("{name}$")),
        };
        Self {
            name,
            entries: vec![Entry {
                generation: 0,
                node: Some(root),
            }],
            free: Vec::new(),
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.entries
            .get(id.slot)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.entries
            .get_mut(id.slot)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_mut())
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.entries[slot];
                entry.generation = entry.generation.wrapping_add(1);
                entry.node = Some(node);
                NodeId {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    slot: self.entries.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Walk `ops` from the root, creating missing nodes on the way.
    pub fn get_or_create(&mut self, ops: &[Op]) -> NodeId {
        let mut current = NodeId::ROOT;
        for op in ops {
            let key = op.key();
            let existing = self
                .node(current)
                .and_then(|node| node.children.get(&key).copied());
            current = match existing {
                Some(child) => child,
                None => {
                    let path = self.path(current).child(key.clone());
                    let child = self.alloc(Node {
                        op: Some(op.as_read()),
                        parent: Some(current),
                        children: IndexMap::new(),
                        channel: Broadcast::new(format!("{}{}", self.name, path)),
                    });
                    if let Some(parent) = self.node_mut(current) {
                        parent.children.insert(key, child);
                    }
                    child
                }
            };
        }
        current
    }

    /// Walk `ops` from the root without creating nodes.
    pub fn find(&self, ops: &[Op]) -> Option<NodeId> {
        ops.iter().try_fold(NodeId::ROOT, |current, op| {
            self.node(current)?.children.get(&op.key()).copied()
        })
    }

    /// Whether `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn channel(&self, id: NodeId) -> Option<Rc<Broadcast<Value>>> {
        self.node(id).map(|node| node.channel.clone())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Children of `id` in creation order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| node.children.values().copied().collect())
            .unwrap_or_default()
    }

    /// Read operations of the children of `id`, in creation order.
    pub fn child_ops(&self, id: NodeId) -> Vec<Op> {
        self.children(id)
            .into_iter()
            .filter_map(|child| self.node(child)?.op.clone())
            .collect()
    }

    /// Operations leading from the root to `id`.
    pub fn ops_to(&self, id: NodeId) -> Option<Vec<Op>> {
        let mut ops = Vec::new();
        let mut current = self.node(id)?;
        while let Some(op) = &current.op {
            ops.push(op.clone());
            current = self.node(current.parent?)?;
        }
        ops.reverse();
        Some(ops)
    }

    /// Printable path of `id`.
    pub fn path(&self, id: NodeId) -> Path {
        self.ops_to(id)
            .map(|ops| ops.iter().map(Op::key).collect())
            .unwrap_or_default()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        // The root is never removed.
        false
    }

    /// Remove leaf nodes without live handlers, repeating until none are
    /// left. Returns the number of nodes removed.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let dead: Vec<usize> = self
                .entries
                .iter()
                .enumerate()
                .filter_map(|(slot, entry)| {
                    let node = entry.node.as_ref()?;
                    let idle = node.op.is_some()
                        && node.children.is_empty()
                        && node.channel.is_empty();
                    idle.then_some(slot)
                })
                .collect();
            if dead.is_empty() {
                return removed;
            }
            for slot in dead {
                let Some(node) = self.entries[slot].node.take() else {
                    continue;
                };
                if let (Some(parent), Some(op)) = (node.parent, node.op.as_ref()) {
                    if let Some(parent) = self.node_mut(parent) {
                        parent.children.shift_remove(&op.key());
                    }
                }
                self.free.push(slot);
                removed += 1;
            }
        }
    }
}

impl std::fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTree")
            .field("name", &self.name)
            .field("nodes", &self.len())
            .finish()
    }
}

/// Re-derive the value at the end of `ops`, starting from `root`.
///
/// Errors carry the full path up to the failing step.
pub fn value_for<'v>(ops: &[Op], root: &'v Value) -> ModelResult<&'v Value> {
    let mut walked = Path::root();
    let mut cursor = root;
    for op in ops {
        cursor = op.read(cursor).map_err(|e| e.with_prefix(&walked))?;
        walked.push(op.key());
    }
    Ok(cursor)
}
