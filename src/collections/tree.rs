// ============================================================================
// spark-bindings - Tree Projection
// A store relation projected as a parent/child tree
// ============================================================================
//
// Nodes live in an arena keyed by id. A node owns the ordered list of its
// children's ids and names its parent by id only, so there are no reference
// cycles to break. Subtrees whose parent has not arrived yet (orphans held
// under `OrphanPolicy::Defer`) stay in the arena but are not reachable from
// the root; they are invisible to lookups and change paths until attached.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::collections::array::order_of;
use crate::collections::ordered::{checked_order_key_between, insert_sorted, renumbered, OrderRails};
use crate::collections::partition::{partition, RelationChangeParts};
use crate::core::constants::{DEFAULT_ID_ATTR, DEFAULT_ORDER_ATTR, DEFAULT_PARENT_ATTR};
use crate::core::error::{ProjectionError, StoreError};
use crate::core::types::ChangeMetadata;
use crate::primitives::binding::PropertySource;
use crate::primitives::signal::{deliver_value, Notify, Signal};
use crate::reactivity::equality::order_values_equal;
use crate::store::value::{Row, Value};
use crate::store::{Differential, Store, StoreObserver, StoreSubscription};

// =============================================================================
// CONFIG
// =============================================================================

/// What to do with a row whose parent is not in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Reject the whole differential (or initial load).
    #[default]
    Reject,
    /// Hold the row until its parent arrives, then attach it silently.
    Defer,
}

/// Which attributes a [`TreeProperty`] reads from each row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub id_attr: String,
    pub parent_attr: String,
    pub order_attr: String,
    pub rails: OrderRails,
    pub orphans: OrphanPolicy,
}

impl TreeConfig {
    pub fn new(id_attr: &str, parent_attr: &str, order_attr: &str) -> Self {
        Self {
            id_attr: id_attr.to_owned(),
            parent_attr: parent_attr.to_owned(),
            order_attr: order_attr.to_owned(),
            rails: OrderRails::default(),
            orphans: OrphanPolicy::default(),
        }
    }

    pub fn with_orphans(mut self, orphans: OrphanPolicy) -> Self {
        self.orphans = orphans;
        self
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ID_ATTR, DEFAULT_PARENT_ATTR, DEFAULT_ORDER_ATTR)
    }
}

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// An owned copy of a node and its whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: Value,
    pub data: Row,
    pub parent: Option<Value>,
    pub order: f64,
    pub children: Vec<TreeNode>,
}

/// Position of a node: its parent (`None` for top level) and its index
/// among that parent's children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreePath {
    pub parent: Option<Value>,
    pub index: usize,
}

impl TreePath {
    pub fn new(parent: Option<Value>, index: usize) -> Self {
        Self { parent, index }
    }

    pub fn root(index: usize) -> Self {
        Self { parent: None, index }
    }
}

/// Destination of a planned move. `index: None` appends to the end of the
/// parent's children, for dropping a node onto another one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTarget {
    pub parent: Option<Value>,
    pub index: Option<usize>,
}

/// A change to a [`TreeProperty`].
///
/// Paths describe the tree as it stood when the change was applied, in the
/// order the changes are listed. Inserts and deletes are reported for the
/// top-most node only; its subtree comes and goes with it.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeChange {
    /// The top-level nodes after the initial load.
    Initial(Vec<TreeNode>),
    Insert(TreePath),
    Delete(TreePath),
    Update(TreePath),
    Move { src: TreePath, dst: TreePath },
}

// =============================================================================
// ARENA
// =============================================================================

#[derive(Debug, Clone)]
struct Child {
    id: Value,
    order: f64,
}

#[derive(Debug, Clone)]
struct Node {
    data: Row,
    parent: Option<Value>,
    order: f64,
    children: Vec<Child>,
}

enum ChainEnd {
    Root,
    Missing { top: Value, parent: Value },
    Cycle,
}

#[derive(Debug, Clone, Default)]
struct TreeState {
    nodes: HashMap<Value, Node>,
    roots: Vec<Child>,
    /// Tops of detached subtrees waiting for their parent.
    pending: Vec<Value>,
}

fn node_from_row(row: Row, config: &TreeConfig) -> Result<(Value, Node), ProjectionError> {
    let id = row
        .id(&config.id_attr)
        .cloned()
        .ok_or_else(|| ProjectionError::MissingAttribute(config.id_attr.clone()))?;
    let order = order_of(&row, &id, &config.order_attr)?;
    let parent = row.get(&config.parent_attr).filter(|v| !v.is_null()).cloned();
    if parent.as_ref() == Some(&id) {
        return Err(ProjectionError::CyclicParent(id));
    }
    let node = Node {
        data: row,
        parent,
        order,
        children: Vec::new(),
    };
    Ok((id, node))
}

impl TreeState {
    fn siblings(&self, parent: Option<&Value>) -> Option<&Vec<Child>> {
        match parent {
            None => Some(&self.roots),
            Some(id) => self.nodes.get(id).map(|n| &n.children),
        }
    }

    fn siblings_mut(&mut self, parent: Option<&Value>) -> Option<&mut Vec<Child>> {
        match parent {
            None => Some(&mut self.roots),
            Some(id) => self.nodes.get_mut(id).map(|n| &mut n.children),
        }
    }

    fn parent_of(&self, id: &Value) -> Option<&Value> {
        self.nodes.get(id).and_then(|n| n.parent.as_ref())
    }

    fn chain_end(&self, id: &Value) -> ChainEnd {
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            match self.parent_of(current) {
                None => return ChainEnd::Root,
                Some(parent) if !self.nodes.contains_key(parent) => {
                    return ChainEnd::Missing {
                        top: current.clone(),
                        parent: parent.clone(),
                    };
                }
                Some(parent) => current = parent,
            }
        }
        ChainEnd::Cycle
    }

    /// Whether the node is reachable from the root.
    fn is_attached(&self, id: &Value) -> bool {
        self.nodes.contains_key(id) && matches!(self.chain_end(id), ChainEnd::Root)
    }

    fn is_descendant(&self, id: &Value, ancestor: &Value) -> bool {
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            match self.parent_of(current) {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    fn path(&self, id: &Value) -> Option<TreePath> {
        if !self.is_attached(id) {
            return None;
        }
        let parent = self.parent_of(id).cloned();
        let index = self
            .siblings(parent.as_ref())?
            .iter()
            .position(|c| &c.id == id)?;
        Some(TreePath { parent, index })
    }

    /// Inserts the node into its parent's children. Returns its index.
    fn attach(&mut self, id: &Value) -> Option<usize> {
        let (parent, order) = self.nodes.get(id).map(|n| (n.parent.clone(), n.order))?;
        let siblings = self.siblings_mut(parent.as_ref())?;
        Some(insert_sorted(siblings, Child { id: id.clone(), order }, |c| c.order))
    }

    /// Removes the node from its parent's children, or from the pending
    /// list. The node itself stays in the arena.
    fn detach(&mut self, id: &Value) {
        if let Some(index) = self.pending.iter().position(|p| p == id) {
            self.pending.remove(index);
            return;
        }
        let parent = self.parent_of(id).cloned();
        if let Some(siblings) = self.siblings_mut(parent.as_ref()) {
            siblings.retain(|c| &c.id != id);
        }
    }

    /// Drops the node and its subtree from the arena.
    fn purge(&mut self, id: &Value) {
        let mut stack = vec![id.clone()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.children.into_iter().map(|c| c.id));
            }
            self.pending.retain(|p| p != &id);
        }
    }

    /// Attaches every pending subtree whose parent has arrived.
    fn attach_pending(&mut self) -> usize {
        let mut attached = 0;
        loop {
            let ready: Vec<Value> = self
                .pending
                .iter()
                .filter(|id| self.parent_of(id).is_some_and(|p| self.nodes.contains_key(p)))
                .cloned()
                .collect();
            if ready.is_empty() {
                return attached;
            }
            for id in ready {
                self.pending.retain(|p| p != &id);
                self.attach(&id);
                attached += 1;
            }
        }
    }

    fn materialize(&self, id: &Value) -> Option<TreeNode> {
        let node = self.nodes.get(id)?;
        Some(TreeNode {
            id: id.clone(),
            data: node.data.clone(),
            parent: node.parent.clone(),
            order: node.order,
            children: node
                .children
                .iter()
                .filter_map(|c| self.materialize(&c.id))
                .collect(),
        })
    }

    fn top_level(&self) -> Vec<TreeNode> {
        self.roots
            .iter()
            .filter_map(|c| self.materialize(&c.id))
            .collect()
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Builds the arena first and links parents second, so rows may arrive
    /// in any order.
    fn build(rows: Vec<Row>, config: &TreeConfig) -> Result<Self, ProjectionError> {
        let mut state = TreeState::default();
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, node) = node_from_row(row, config)?;
            if state.nodes.insert(id.clone(), node).is_some() {
                return Err(ProjectionError::DuplicateId(id));
            }
            ids.push(id);
        }

        for id in &ids {
            match state.chain_end(id) {
                ChainEnd::Root => {}
                ChainEnd::Missing { top, parent } => {
                    if config.orphans == OrphanPolicy::Reject {
                        return Err(ProjectionError::MissingParent { id: top, parent });
                    }
                }
                ChainEnd::Cycle => return Err(ProjectionError::CyclicParent(id.clone())),
            }
        }

        for id in &ids {
            let orphan = state
                .parent_of(id)
                .is_some_and(|p| !state.nodes.contains_key(p));
            if orphan {
                state.pending.push(id.clone());
            } else {
                state.attach(id);
            }
        }
        Ok(state)
    }

    // =========================================================================
    // DIFFERENTIALS
    // =========================================================================

    fn apply(
        &mut self,
        parts: RelationChangeParts,
        config: &TreeConfig,
    ) -> Result<Vec<TreeChange>, ProjectionError> {
        let mut changes = Vec::new();
        self.insert_rows(parts.added_rows, config, &mut changes)?;
        self.attach_pending();
        self.update_rows(parts.updated_rows, config, &mut changes)?;
        self.attach_pending();
        self.delete_ids(&parts.deleted_ids, &mut changes)?;
        Ok(changes)
    }

    fn insert_rows(
        &mut self,
        rows: Vec<Row>,
        config: &TreeConfig,
        changes: &mut Vec<TreeChange>,
    ) -> Result<(), ProjectionError> {
        // Stage every row first: rows in one batch may be each other's
        // parents, in any order.
        let mut staged = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, node) = node_from_row(row, config)?;
            if self.nodes.contains_key(&id) {
                return Err(ProjectionError::DuplicateId(id));
            }
            self.nodes.insert(id.clone(), node);
            staged.push(id);
        }
        for id in &staged {
            if let ChainEnd::Cycle = self.chain_end(id) {
                return Err(ProjectionError::CyclicParent(id.clone()));
            }
        }

        let staged_set: HashSet<&Value> = staged.iter().collect();
        let (nested, top): (Vec<&Value>, Vec<&Value>) = staged
            .iter()
            .partition(|id| self.parent_of(id).is_some_and(|p| staged_set.contains(p)));

        for id in nested {
            self.attach(id);
        }
        for id in top {
            if let Some(parent) = self.parent_of(id).filter(|p| !self.nodes.contains_key(*p)) {
                match config.orphans {
                    OrphanPolicy::Reject => {
                        return Err(ProjectionError::MissingParent {
                            id: id.clone(),
                            parent: parent.clone(),
                        });
                    }
                    OrphanPolicy::Defer => {
                        debug!(id = %id, parent = %parent, "tree projection deferring orphan");
                        self.pending.push(id.clone());
                        continue;
                    }
                }
            }
            self.attach(id);
            if let Some(path) = self.path(id) {
                changes.push(TreeChange::Insert(path));
            }
        }
        Ok(())
    }

    fn update_rows(
        &mut self,
        rows: Vec<Row>,
        config: &TreeConfig,
        changes: &mut Vec<TreeChange>,
    ) -> Result<(), ProjectionError> {
        for row in rows {
            let (id, new) = node_from_row(row, config)?;
            let Some(old) = self.nodes.get(&id) else {
                return Err(ProjectionError::UnknownId(id));
            };
            let order_attr = config.order_attr.as_str();
            let moved = old.parent != new.parent
                || !order_values_equal(old.data.get(order_attr), new.data.get(order_attr));

            if !moved {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.data = new.data;
                }
                if let Some(path) = self.path(&id) {
                    changes.push(TreeChange::Update(path));
                }
                continue;
            }

            if let Some(parent) = &new.parent {
                if self.is_descendant(parent, &id) {
                    return Err(ProjectionError::CyclicParent(id));
                }
            }
            let orphaned = new
                .parent
                .as_ref()
                .is_some_and(|p| !self.nodes.contains_key(p));
            if orphaned && config.orphans == OrphanPolicy::Reject {
                let parent = new.parent.clone().unwrap_or(Value::Null);
                return Err(ProjectionError::MissingParent { id, parent });
            }

            let src = self.path(&id);
            self.detach(&id);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.data = new.data;
                node.parent = new.parent;
                node.order = new.order;
            }
            let dst = if orphaned {
                self.pending.push(id.clone());
                None
            } else {
                self.attach(&id);
                self.path(&id)
            };
            match (src, dst) {
                (Some(src), Some(dst)) => changes.push(TreeChange::Move { src, dst }),
                (None, Some(dst)) => changes.push(TreeChange::Insert(dst)),
                (Some(src), None) => changes.push(TreeChange::Delete(src)),
                (None, None) => {}
            }
        }
        Ok(())
    }

    fn delete_ids(
        &mut self,
        ids: &[Value],
        changes: &mut Vec<TreeChange>,
    ) -> Result<(), ProjectionError> {
        if let Some(id) = ids.iter().find(|id| !self.nodes.contains_key(*id)) {
            return Err(ProjectionError::UnknownId(id.clone()));
        }
        let deleted: HashSet<&Value> = ids.iter().collect();
        let tops: Vec<Value> = ids
            .iter()
            .filter(|id| !deleted.iter().any(|other| self.is_descendant(id, other)))
            .cloned()
            .collect();

        for id in &tops {
            let path = self.path(id);
            self.detach(id);
            self.purge(id);
            if let Some(path) = path {
                changes.push(TreeChange::Delete(path));
            }
        }
        Ok(())
    }
}

// =============================================================================
// CORE
// =============================================================================

struct TreeCore {
    store: Rc<dyn Store>,
    config: TreeConfig,
    state: RefCell<TreeState>,
    started: Cell<bool>,
    loaded: Cell<bool>,
    subscription: RefCell<Option<StoreSubscription>>,
    last_error: RefCell<Option<ProjectionError>>,
    notify: Notify<Vec<TreeChange>>,
    signal: Signal<Vec<TreeChange>>,
}

impl TreeCore {
    fn start(self: &Rc<Self>) {
        if self.started.replace(true) {
            return;
        }
        debug!(id_attr = %self.config.id_attr, "tree projection starting");
        let adapter: Rc<dyn StoreObserver> = Rc::new(TreeStoreObserver {
            core: Rc::downgrade(self),
        });
        *self.subscription.borrow_mut() = Some(self.store.subscribe(adapter));

        self.notify.will_change();
        let weak = Rc::downgrade(self);
        self.store.query(Box::new(move |result| {
            if let Some(core) = weak.upgrade() {
                core.load(result);
            }
        }));
    }

    fn load(&self, result: Result<Vec<Row>, StoreError>) {
        let built = result
            .map_err(ProjectionError::from)
            .and_then(|rows| TreeState::build(rows, &self.config));
        match built {
            Ok(state) => {
                let roots = state.top_level();
                debug!(
                    nodes = state.nodes.len(),
                    pending = state.pending.len(),
                    "tree projection loaded"
                );
                *self.state.borrow_mut() = state;
                self.loaded.set(true);
                self.notify
                    .changing(vec![TreeChange::Initial(roots)], ChangeMetadata::committed());
            }
            Err(err) => {
                warn!(error = %err, "tree projection initial load failed");
                *self.last_error.borrow_mut() = Some(err);
            }
        }
        self.notify.did_change();
    }

    /// Applies one differential as a single transaction.
    ///
    /// The batch runs against a clone of the whole `TreeState`, so every
    /// differential costs O(n) in the size of the tree, single-row edits
    /// included. In exchange a rejected batch leaves the tree untouched, even
    /// when the failure is only discovered after earlier rows were placed.
    fn apply(&self, differential: &Differential) {
        if !self.loaded.get() {
            debug!("tree projection ignoring differential before initial load");
            return;
        }
        let result = partition(differential, &self.config.id_attr).and_then(|parts| {
            let mut next = self.state.borrow().clone();
            next.apply(parts, &self.config).map(|changes| (next, changes))
        });
        match result {
            Ok((next, changes)) => {
                *self.state.borrow_mut() = next;
                if changes.is_empty() {
                    return;
                }
                let count = |f: fn(&TreeChange) -> bool| changes.iter().filter(|c| f(c)).count();
                debug!(
                    inserted = count(|c| matches!(c, TreeChange::Insert(_))),
                    updated = count(|c| matches!(c, TreeChange::Update(_))),
                    moved = count(|c| matches!(c, TreeChange::Move { .. })),
                    deleted = count(|c| matches!(c, TreeChange::Delete(_))),
                    "tree projection applied differential"
                );
                self.notify.changing(changes, ChangeMetadata::committed());
            }
            Err(err) => {
                error!(error = %err, "tree projection rejected differential");
                *self.last_error.borrow_mut() = Some(err);
            }
        }
    }
}

struct TreeStoreObserver {
    core: Weak<TreeCore>,
}

impl StoreObserver for TreeStoreObserver {
    fn will_change(&self) {
        if let Some(core) = self.core.upgrade() {
            core.notify.will_change();
        }
    }

    fn changed(&self, differential: &Differential) {
        if let Some(core) = self.core.upgrade() {
            core.apply(differential);
        }
    }

    fn change_failed(&self, error: &StoreError) {
        warn!(error = %error, "tree projection store change failed");
    }

    fn did_change(&self) {
        if let Some(core) = self.core.upgrade() {
            core.notify.did_change();
        }
    }
}

// =============================================================================
// TREE PROPERTY
// =============================================================================

/// A store relation kept as a tree, each node's children sorted by an
/// order attribute.
///
/// Loads lazily like [`ArrayProperty`](crate::ArrayProperty): the first
/// delivery is a [`TreeChange::Initial`] with the top-level nodes.
///
/// # Example
///
/// ```
/// use spark_bindings::{MemoryStore, Row, TreeConfig, TreeProperty, Value};
///
/// let store = MemoryStore::with_rows("id", vec![
///     Row::new().with("id", 1).with("parent", Value::Null).with("order", 5.0),
///     Row::new().with("id", 2).with("parent", 1).with("order", 5.0),
/// ]);
/// let tree = TreeProperty::new(store.clone(), TreeConfig::default());
/// tree.start();
/// store.flush();
///
/// assert_eq!(tree.children(Some(&Value::from(1))), vec![Value::from(2)]);
/// ```
#[derive(Clone)]
pub struct TreeProperty {
    core: Rc<TreeCore>,
}

impl TreeProperty {
    pub fn new(store: Rc<dyn Store>, config: TreeConfig) -> Self {
        let (signal, notify) = Signal::pipe();
        let core = Rc::new(TreeCore {
            store,
            config,
            state: RefCell::new(TreeState::default()),
            started: Cell::new(false),
            loaded: Cell::new(false),
            subscription: RefCell::new(None),
            last_error: RefCell::new(None),
            notify: notify.clone(),
            signal,
        });
        let weak = Rc::downgrade(&core);
        notify.set_on_observe(move |observer| {
            let Some(core) = weak.upgrade() else {
                return;
            };
            if !core.started.get() {
                core.start();
                return;
            }
            if core.loaded.get() {
                let roots = core.state.borrow().top_level();
                deliver_value(
                    observer,
                    vec![TreeChange::Initial(roots)],
                    ChangeMetadata::committed(),
                );
            }
        });
        Self { core }
    }

    /// Subscribes to the store and issues the initial query. Idempotent.
    pub fn start(&self) {
        self.core.start();
    }

    pub fn is_started(&self) -> bool {
        self.core.started.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.core.loaded.get()
    }

    pub fn config(&self) -> &TreeConfig {
        &self.core.config
    }

    pub fn signal(&self) -> Signal<Vec<TreeChange>> {
        self.core.signal.clone()
    }

    pub fn last_error(&self) -> Option<ProjectionError> {
        self.core.last_error.borrow().clone()
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// The top-level nodes with their subtrees.
    pub fn roots(&self) -> Vec<TreeNode> {
        self.core.state.borrow().top_level()
    }

    pub fn len(&self) -> usize {
        let state = self.core.state.borrow();
        state.nodes.keys().filter(|id| state.is_attached(id)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.core.state.borrow().roots.is_empty()
    }

    /// The node with `id` and its subtree.
    pub fn node(&self, id: &Value) -> Option<TreeNode> {
        let state = self.core.state.borrow();
        if !state.is_attached(id) {
            return None;
        }
        state.materialize(id)
    }

    /// Ids of the children of `parent`, or of the top level for `None`.
    pub fn children(&self, parent: Option<&Value>) -> Vec<Value> {
        let state = self.core.state.borrow();
        if parent.is_some_and(|p| !state.is_attached(p)) {
            return Vec::new();
        }
        state
            .siblings(parent)
            .map(|children| children.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn path_for_id(&self, id: &Value) -> Option<TreePath> {
        self.core.state.borrow().path(id)
    }

    pub fn node_at_path(&self, path: &TreePath) -> Option<TreeNode> {
        let state = self.core.state.borrow();
        if path.parent.as_ref().is_some_and(|p| !state.is_attached(p)) {
            return None;
        }
        let child = state.siblings(path.parent.as_ref())?.get(path.index)?;
        state.materialize(&child.id)
    }

    /// Parent id of an attached node. `None` for top-level or unknown ids.
    pub fn parent_of(&self, id: &Value) -> Option<Value> {
        let state = self.core.state.borrow();
        if !state.is_attached(id) {
            return None;
        }
        state.parent_of(id).cloned()
    }

    pub fn is_descendant(&self, id: &Value, ancestor: &Value) -> bool {
        self.core.state.borrow().is_descendant(id, ancestor)
    }

    /// Ids of deferred subtrees still waiting for their parent.
    pub fn pending_orphans(&self) -> Vec<Value> {
        self.core.state.borrow().pending.clone()
    }

    // =========================================================================
    // PLANNING
    // =========================================================================

    fn ensure_loaded(&self) -> Result<(), ProjectionError> {
        if self.core.loaded.get() {
            Ok(())
        } else {
            Err(ProjectionError::NotStarted)
        }
    }

    fn siblings_of<'a>(
        state: &'a TreeState,
        parent: Option<&Value>,
    ) -> Result<&'a Vec<Child>, ProjectionError> {
        match parent {
            Some(p) if !state.is_attached(p) => Err(ProjectionError::UnknownId(p.clone())),
            _ => state
                .siblings(parent)
                .ok_or_else(|| ProjectionError::UnknownId(parent.cloned().unwrap_or(Value::Null))),
        }
    }

    /// Order key for a new last child of `parent` (top level for `None`).
    pub fn order_for_append(&self, parent: Option<&Value>) -> Result<f64, ProjectionError> {
        self.ensure_loaded()?;
        let state = self.core.state.borrow();
        let siblings = Self::siblings_of(&state, parent)?;
        checked_order_key_between(siblings.last().map(|c| c.order), None, &self.core.config.rails)
    }

    /// Parent and order key for a new node placed right after `sibling`.
    pub fn order_for_insert_after(
        &self,
        sibling: &Value,
    ) -> Result<(Option<Value>, f64), ProjectionError> {
        self.ensure_loaded()?;
        let state = self.core.state.borrow();
        let path = state
            .path(sibling)
            .ok_or_else(|| ProjectionError::UnknownId(sibling.clone()))?;
        let siblings = Self::siblings_of(&state, path.parent.as_ref())?;
        let low = siblings[path.index].order;
        let high = siblings.get(path.index + 1).map(|c| c.order);
        let order = checked_order_key_between(Some(low), high, &self.core.config.rails)?;
        Ok((path.parent, order))
    }

    /// The node at `src`, its new parent and the order key that places it
    /// at `dst`. `dst.index` counts the destination's children with the
    /// moved node already removed.
    pub fn order_for_move(
        &self,
        src: &TreePath,
        dst: &MoveTarget,
    ) -> Result<(Value, Option<Value>, f64), ProjectionError> {
        self.ensure_loaded()?;
        let state = self.core.state.borrow();
        let src_siblings = Self::siblings_of(&state, src.parent.as_ref())?;
        let moved = src_siblings
            .get(src.index)
            .map(|c| c.id.clone())
            .ok_or(ProjectionError::IndexOutOfRange {
                index: src.index,
                len: src_siblings.len(),
            })?;
        if let Some(parent) = &dst.parent {
            if parent == &moved || state.is_descendant(parent, &moved) {
                return Err(ProjectionError::CyclicParent(moved));
            }
        }

        let others: Vec<f64> = Self::siblings_of(&state, dst.parent.as_ref())?
            .iter()
            .filter(|c| c.id != moved)
            .map(|c| c.order)
            .collect();
        let index = dst.index.unwrap_or(others.len());
        if index > others.len() {
            return Err(ProjectionError::IndexOutOfRange {
                index,
                len: others.len(),
            });
        }
        let low = index.checked_sub(1).and_then(|i| others.get(i).copied());
        let high = others.get(index).copied();
        let order = checked_order_key_between(low, high, &self.core.config.rails)?;
        Ok((moved, dst.parent.clone(), order))
    }

    /// Evenly spaced keys for the children of `parent`, in current order.
    pub fn renumbering_plan(
        &self,
        parent: Option<&Value>,
    ) -> Result<Vec<(Value, f64)>, ProjectionError> {
        let state = self.core.state.borrow();
        let siblings = Self::siblings_of(&state, parent)?;
        Ok(renumbered(siblings.iter().map(|c| &c.id), &self.core.config.rails))
    }
}

impl PropertySource<Vec<TreeChange>> for TreeProperty {
    fn signal(&self) -> Signal<Vec<TreeChange>> {
        self.core.signal.clone()
    }

    fn owner(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for TreeProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.borrow();
        f.debug_struct("TreeProperty")
            .field("started", &self.core.started.get())
            .field("loaded", &self.core.loaded.get())
            .field("nodes", &state.nodes.len())
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
