//! Remote index tree
//!
//! Maps remote object ids to local relative paths. Nodes live in an arena
//! keyed by remote id; each node stores its title, an explicit parent
//! pointer and its children in insertion order. The path of a node is the
//! sequence of titles from the root (exclusive) down to the node.
//!
//! The root node has the remote root folder id and an empty title. Every
//! other node has exactly one parent, and that parent lists it exactly once
//! among its children.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use drivesync_core::domain::{RemoteId, RemoteObject};

use crate::IndexError;

/// One entry of the arena
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexNode {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RemoteId>,
}

impl IndexNode {
    /// Stand-in for a parent whose metadata has not been seen yet
    fn placeholder() -> Self {
        Self {
            title: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Arena tree of remote objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexTree {
    root_id: RemoteId,
    nodes: BTreeMap<RemoteId, IndexNode>,
}

impl IndexTree {
    /// Create a tree holding only the root
    pub fn new(root_id: RemoteId) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id.clone(), IndexNode::placeholder());
        Self { root_id, nodes }
    }

    pub fn root_id(&self) -> &RemoteId {
        &self.root_id
    }

    /// Number of indexed objects, the root excluded
    pub fn len(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &RemoteId) -> bool {
        self.nodes.contains_key(self.canonical(id))
    }

    pub fn node(&self, id: &RemoteId) -> Option<&IndexNode> {
        self.nodes.get(self.canonical(id))
    }

    /// Maps the `"root"` alias onto the concrete root id
    fn canonical<'a>(&'a self, id: &'a RemoteId) -> &'a RemoteId {
        if id.is_root_alias() {
            &self.root_id
        } else {
            id
        }
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Walk title by title from the root.
    ///
    /// The empty path resolves to the root. When siblings share a title the
    /// first inserted one wins.
    pub fn find(&self, path: &Path) -> Option<&RemoteId> {
        let mut current = &self.root_id;
        for component in path.components() {
            let title = match component {
                Component::Normal(name) => name.to_str()?,
                Component::CurDir => continue,
                _ => return None,
            };
            let node = self.nodes.get(current)?;
            current = node
                .children
                .iter()
                .find(|child| self.nodes.get(*child).is_some_and(|n| n.title == title))?;
        }
        Some(current)
    }

    /// True if `path` names an indexed object (the root is not one)
    pub fn exists(&self, path: &Path) -> bool {
        let found = path.components().next().is_some() && self.find(path).is_some();
        if !found {
            debug!(path = %path.display(), "Not in index");
        }
        found
    }

    /// Look up many ids with a single depth-first traversal.
    ///
    /// Ids that are not in the tree are absent from the result.
    pub fn find_ids(&self, ids: &BTreeSet<RemoteId>) -> BTreeMap<RemoteId, PathBuf> {
        let mut found = BTreeMap::new();
        let mut remaining = ids.len();

        if let Some(alias) = ids.iter().find(|id| id.is_root_alias()) {
            found.insert(alias.clone(), PathBuf::new());
            remaining -= 1;
        }

        let mut stack = vec![(&self.root_id, PathBuf::new())];
        while let Some((id, path)) = stack.pop() {
            if remaining == 0 {
                break;
            }
            if ids.contains(id) {
                found.insert(id.clone(), path.clone());
                remaining -= 1;
            }
            if let Some(node) = self.nodes.get(id) {
                for child in node.children.iter().rev() {
                    if let Some(child_node) = self.nodes.get(child) {
                        stack.push((child, path.join(&child_node.title)));
                    }
                }
            }
        }
        found
    }

    /// Derive the path of one id by following parent pointers
    pub fn path_of(&self, id: &RemoteId) -> Option<PathBuf> {
        let mut titles = Vec::new();
        let mut current = self.canonical(id);
        while current != &self.root_id {
            if titles.len() > self.nodes.len() {
                return None;
            }
            let node = self.nodes.get(current)?;
            titles.push(node.title.as_str());
            current = node.parent.as_ref()?;
        }
        Some(titles.iter().rev().collect())
    }

    /// Map each of `paths` that is indexed to its id
    pub fn ids_of<'a, I>(&self, paths: I) -> BTreeMap<PathBuf, RemoteId>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        paths
            .into_iter()
            .filter_map(|p| {
                if p.as_os_str().is_empty() {
                    return None;
                }
                self.find(p).map(|id| (p.clone(), id.clone()))
            })
            .collect()
    }

    /// Every indexed path with its id, parents before children
    pub fn all_paths(&self) -> Vec<(PathBuf, RemoteId)> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack: Vec<(&RemoteId, PathBuf)> = Vec::new();
        if let Some(root) = self.nodes.get(&self.root_id) {
            for child in root.children.iter().rev() {
                if let Some(n) = self.nodes.get(child) {
                    stack.push((child, PathBuf::from(&n.title)));
                }
            }
        }
        while let Some((id, path)) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                for child in node.children.iter().rev() {
                    if let Some(n) = self.nodes.get(child) {
                        stack.push((child, path.join(&n.title)));
                    }
                }
            }
            out.push((path, id.clone()));
        }
        out
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Merge a batch of remote object states into the tree.
    ///
    /// Existing objects are renamed and re-parented in place; new objects are
    /// attached under their parent. A parent that is neither in the tree nor
    /// processed yet is represented by a placeholder that the real object
    /// takes over when it shows up later in the batch. The batch is applied to
    /// a staged copy: if any placeholder stays unresolved, or an object ends
    /// up cut off from the root, the tree is left exactly as it was.
    ///
    /// Returns the path of every reconciled object.
    pub fn reconcile<'a, I>(&mut self, batch: I) -> Result<BTreeMap<RemoteId, PathBuf>, IndexError>
    where
        I: IntoIterator<Item = &'a RemoteObject>,
    {
        let mut staged = self.clone();
        let mut placeholders: BTreeSet<RemoteId> = BTreeSet::new();
        let mut touched: Vec<RemoteId> = Vec::new();

        for object in batch {
            if object.id.is_root_alias() || object.id == staged.root_id {
                continue;
            }
            let parent_id = staged.canonical(&object.parent_id).clone();

            if !staged.nodes.contains_key(&parent_id) {
                debug!(parent = %parent_id, child = %object.id, "Parent not indexed yet, using placeholder");
                staged.nodes.insert(parent_id.clone(), IndexNode::placeholder());
                placeholders.insert(parent_id.clone());
            }
            placeholders.remove(&object.id);

            let previous_parent = staged.nodes.get_mut(&object.id).map(|node| {
                node.title.clone_from(&object.title);
                node.parent.replace(parent_id.clone())
            });

            match previous_parent {
                None => {
                    staged.nodes.insert(
                        object.id.clone(),
                        IndexNode {
                            title: object.title.clone(),
                            parent: Some(parent_id.clone()),
                            children: Vec::new(),
                        },
                    );
                    staged.attach(&parent_id, &object.id);
                }
                Some(old) if old.as_ref() != Some(&parent_id) => {
                    if let Some(old) = old {
                        debug!(id = %object.id, from = %old, to = %parent_id, "Re-parenting");
                        staged.detach(&old, &object.id);
                    }
                    staged.attach(&parent_id, &object.id);
                }
                Some(_) => {}
            }
            touched.push(object.id.clone());
        }

        if !placeholders.is_empty() {
            return Err(IndexError::UnresolvedHierarchy {
                ids: placeholders.into_iter().collect(),
            });
        }

        let mut paths = BTreeMap::new();
        let mut detached = BTreeSet::new();
        for id in touched {
            match staged.path_of(&id) {
                Some(path) => {
                    paths.insert(id, path);
                }
                None => {
                    detached.insert(id);
                }
            }
        }
        if !detached.is_empty() {
            return Err(IndexError::UnresolvedHierarchy {
                ids: detached.into_iter().collect(),
            });
        }

        *self = staged;
        Ok(paths)
    }

    /// Remove objects (with their subtrees) by id.
    ///
    /// Returns the paths the removed ids had, sorted. Ids that are not in
    /// the tree are ignored; the root is never removed.
    pub fn remove(&mut self, ids: &BTreeSet<RemoteId>) -> Vec<PathBuf> {
        let found = self.find_ids(ids);
        let mut paths = Vec::with_capacity(found.len());
        for (id, path) in found {
            if path.as_os_str().is_empty() {
                continue;
            }
            self.drop_subtree(&id);
            paths.push(path);
        }
        paths.sort();
        paths
    }

    /// Remove objects (with their subtrees) by path.
    ///
    /// Returns the ids that were removed.
    pub fn remove_paths<'a, I>(&mut self, paths: I) -> Vec<RemoteId>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        let mut removed = Vec::new();
        for path in paths {
            if path.as_os_str().is_empty() {
                continue;
            }
            if let Some(id) = self.find(path).cloned() {
                self.drop_subtree(&id);
                removed.push(id);
            }
        }
        removed
    }

    fn attach(&mut self, parent: &RemoteId, child: &RemoteId) {
        if let Some(node) = self.nodes.get_mut(parent) {
            if !node.children.contains(child) {
                node.children.push(child.clone());
            }
        }
    }

    fn detach(&mut self, parent: &RemoteId, child: &RemoteId) {
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|c| c != child);
        }
    }

    fn drop_subtree(&mut self, id: &RemoteId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(parent) = &node.parent {
            self.detach(parent, id);
        }
        let mut pending = node.children;
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                pending.extend(removed.children);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Consistency
    // ------------------------------------------------------------------------

    /// Check the structural invariants of a loaded snapshot
    pub fn validate(&self) -> Result<(), IndexError> {
        let root = self
            .nodes
            .get(&self.root_id)
            .ok_or_else(|| IndexError::Corrupt(format!("root {} missing", self.root_id)))?;
        if root.parent.is_some() {
            return Err(IndexError::Corrupt("root has a parent".into()));
        }

        for (id, node) in &self.nodes {
            if id != &self.root_id {
                let parent = node
                    .parent
                    .as_ref()
                    .ok_or_else(|| IndexError::Corrupt(format!("{id} has no parent")))?;
                let listed = self
                    .nodes
                    .get(parent)
                    .map(|p| p.children.iter().filter(|c| *c == id).count())
                    .unwrap_or(0);
                if listed != 1 {
                    return Err(IndexError::Corrupt(format!(
                        "{id} is listed {listed} times under its parent {parent}"
                    )));
                }
            }
            for child in &node.children {
                let back = self.nodes.get(child).and_then(|c| c.parent.as_ref());
                if back != Some(id) {
                    return Err(IndexError::Corrupt(format!(
                        "child {child} of {id} does not point back to it"
                    )));
                }
            }
            if self.path_of(id).is_none() {
                return Err(IndexError::Corrupt(format!("{id} is not reachable from the root")));
            }
        }
        Ok(())
    }
}
