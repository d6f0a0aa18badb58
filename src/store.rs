//! DefinitionStore: in-memory registry of crawled command trees, one per
//! root command name.
//!
//! Each root owns its own slot: a writer mutex serializing `put`s for that
//! root, and an `RwLock<Option<Arc<StoredTree>>>` swapped wholesale on
//! replace. Readers clone the inner `Arc`, so they hold either the complete
//! old tree or the complete new one. The outer map is only write-locked the
//! first time a root name appears, so writes to different roots never
//! contend.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::CartographerError;
use crate::tree::{CommandNode, CommandTree, ResourceDescriptor};

/// Resources affected by one `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    pub root: String,
    pub version: u64,
    /// Descriptors that are new or whose rendered subtree differs from the previous version.
    pub changed: Vec<ResourceDescriptor>,
    /// Descriptors present in the previous version but not in this one.
    pub removed: Vec<ResourceDescriptor>,
}

/// Receives store change events. Delivery is best-effort; implementations
/// must not block.
pub trait ResourceNotifier: Send + Sync {
    fn publish(&self, change: &ResourceChange);
}

/// Notifier that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ResourceNotifier for NoopNotifier {
    fn publish(&self, _change: &ResourceChange) {}
}

/// One committed tree and its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTree {
    pub tree: CommandTree,
    pub version: u64,
}

impl StoredTree {
    /// Walk `path` (root name first) through this tree.
    pub fn resolve(&self, path: &[String]) -> crate::Result<&CommandNode> {
        let Some((root, rest)) = path.split_first() else {
            return Err(CartographerError::NotFound("empty command path".to_string()));
        };
        if *root != self.tree.root.name {
            return Err(CartographerError::NotFound(format!("'{}' was never added", root)));
        }
        self.tree
            .root
            .descend(rest)
            .ok_or_else(|| CartographerError::NotFound(format!("'{}' is not a known command", path.join(" "))))
    }
}

#[derive(Default)]
struct RootSlot {
    writer: Mutex<()>,
    current: RwLock<Option<Arc<StoredTree>>>,
}

/// Holds one command tree per root name and publishes changes.
pub struct DefinitionStore {
    roots: RwLock<BTreeMap<String, Arc<RootSlot>>>,
    notifier: Arc<dyn ResourceNotifier>,
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new(Arc::new(NoopNotifier))
    }
}

impl DefinitionStore {
    pub fn new(notifier: Arc<dyn ResourceNotifier>) -> Self {
        Self {
            roots: RwLock::new(BTreeMap::new()),
            notifier,
        }
    }

    /// Atomically replace the tree for `root_name` and return its new version.
    ///
    /// The first put for a name yields version 1. Publishes the added, changed
    /// and removed descriptors to the notifier after the swap.
    pub async fn put(&self, root_name: &str, tree: CommandTree) -> crate::Result<u64> {
        if tree.root.name != root_name || tree.root.path != [root_name] {
            return Err(CartographerError::InvalidArgument(format!(
                "tree rooted at '{}' cannot be stored under '{}'",
                tree.root.name, root_name
            )));
        }

        let slot = self.slot_or_insert(root_name).await;
        let _writer = slot.writer.lock().await;

        let previous = slot.current.read().await.clone();
        let version = previous.as_ref().map_or(1, |p| p.version + 1);
        let next = Arc::new(StoredTree { tree, version });
        let change = diff(root_name, previous.as_deref(), &next);

        *slot.current.write().await = Some(next);

        tracing::info!(
            root = %root_name,
            version = %version,
            changed = %change.changed.len(),
            removed = %change.removed.len(),
            "definition stored"
        );
        self.notifier.publish(&change);

        Ok(version)
    }

    /// The committed tree for `root_name`, if any.
    pub async fn tree(&self, root_name: &str) -> Option<Arc<StoredTree>> {
        let slot = self.roots.read().await.get(root_name).cloned()?;
        let current = slot.current.read().await.clone();
        current
    }

    /// Walk `path[0]`'s tree following `path[1..]` and return a copy of the subtree.
    pub async fn resolve(&self, path: &[String]) -> crate::Result<CommandNode> {
        let root = path
            .first()
            .ok_or_else(|| CartographerError::NotFound("empty command path".to_string()))?;
        let stored = self
            .tree(root)
            .await
            .ok_or_else(|| CartographerError::NotFound(format!("'{}' was never added", root)))?;
        stored.resolve(path).cloned()
    }

    /// Like [`resolve`](Self::resolve), also returning the executable the tree was crawled from.
    pub async fn resolve_with_tree(&self, path: &[String]) -> crate::Result<(PathBuf, CommandNode)> {
        let root = path
            .first()
            .ok_or_else(|| CartographerError::NotFound("empty command path".to_string()))?;
        let stored = self
            .tree(root)
            .await
            .ok_or_else(|| CartographerError::NotFound(format!("'{}' was never added", root)))?;
        let node = stored.resolve(path)?.clone();
        Ok((stored.tree.executable.clone(), node))
    }

    /// One descriptor per node across all trees: roots in name order, each
    /// tree depth-first with children in name order.
    pub async fn list(&self) -> Vec<ResourceDescriptor> {
        let mut out = Vec::new();
        for stored in self.snapshot().await {
            out.extend(stored.tree.descriptors());
        }
        out
    }

    /// Names of all stored roots, in order.
    pub async fn roots(&self) -> Vec<String> {
        self.snapshot()
            .await
            .iter()
            .map(|stored| stored.tree.root_name().to_string())
            .collect()
    }

    /// Current version for `root_name`, if stored.
    pub async fn version(&self, root_name: &str) -> Option<u64> {
        self.tree(root_name).await.map(|stored| stored.version)
    }

    async fn slot_or_insert(&self, root_name: &str) -> Arc<RootSlot> {
        if let Some(slot) = self.roots.read().await.get(root_name).cloned() {
            return slot;
        }
        self.roots
            .write()
            .await
            .entry(root_name.to_string())
            .or_default()
            .clone()
    }

    /// Current trees of every root, in name order.
    async fn snapshot(&self) -> Vec<Arc<StoredTree>> {
        let slots: Vec<Arc<RootSlot>> = self.roots.read().await.values().cloned().collect();
        let mut trees = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(stored) = slot.current.read().await.clone() {
                trees.push(stored);
            }
        }
        trees
    }
}

/// Compare two versions of one root's tree node by node.
fn diff(root: &str, previous: Option<&StoredTree>, next: &StoredTree) -> ResourceChange {
    let old_root = previous.map(|prev| &prev.tree.root);
    let mut changed = Vec::new();
    collect_changed(old_root, &next.tree.root, &mut changed);

    let mut removed = Vec::new();
    if let Some(old) = old_root {
        old.walk(&mut |node| {
            if next.tree.root.descend(&node.path[1..]).is_none() {
                removed.push(node.descriptor());
            }
        });
    }
    removed.sort();

    ResourceChange {
        root: root.to_string(),
        version: next.version,
        changed,
        removed,
    }
}

/// Push, in pre-order, the descriptor of every node whose rendered subtree
/// differs from `old`. A node counts as changed when its own content differs
/// or any descendant changed. Returns whether `node` was pushed.
fn collect_changed(
    old: Option<&CommandNode>,
    node: &CommandNode,
    changed: &mut Vec<ResourceDescriptor>,
) -> bool {
    let slot = changed.len();
    let mut below = false;
    for (name, child) in &node.children {
        let old_child = old.and_then(|o| o.children.get(name));
        below |= collect_changed(old_child, child, changed);
    }

    let differs = below || !old.is_some_and(|o| o.same_content(node));
    if differs {
        changed.insert(slot, node.descriptor());
    }
    differs
}
