// ============================================================================
// spark-bindings - Array Projection
// A store relation projected as an order-key sorted array
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::collections::ordered::{
    checked_order_key_between, insert_sorted, renumbered, OrderRails,
};
use crate::collections::partition::partition;
use crate::core::constants::{DEFAULT_ID_ATTR, DEFAULT_ORDER_ATTR};
use crate::core::error::{ProjectionError, StoreError};
use crate::core::types::ChangeMetadata;
use crate::primitives::async_property::AsyncReadableProperty;
use crate::primitives::binding::PropertySource;
use crate::primitives::signal::{deliver_value, Notify, Signal};
use crate::reactivity::equality::order_values_equal;
use crate::store::value::{Row, Value};
use crate::store::{Differential, Store, StoreObserver, StoreSubscription};

// =============================================================================
// CONFIG
// =============================================================================

/// Which attributes an [`ArrayProperty`] reads from each row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    pub id_attr: String,
    pub order_attr: String,
    pub rails: OrderRails,
}

impl ArrayConfig {
    pub fn new(id_attr: &str, order_attr: &str) -> Self {
        Self {
            id_attr: id_attr.to_owned(),
            order_attr: order_attr.to_owned(),
            rails: OrderRails::default(),
        }
    }
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ID_ATTR, DEFAULT_ORDER_ATTR)
    }
}

// =============================================================================
// ELEMENTS AND CHANGES
// =============================================================================

/// One row of the projection with its id and order key pulled out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayElement {
    pub id: Value,
    pub data: Row,
    pub order: f64,
}

impl ArrayElement {
    pub(crate) fn from_row(row: Row, config: &ArrayConfig) -> Result<Self, ProjectionError> {
        let id = row
            .id(&config.id_attr)
            .cloned()
            .ok_or_else(|| ProjectionError::MissingAttribute(config.id_attr.clone()))?;
        let order = order_of(&row, &id, &config.order_attr)?;
        Ok(Self { id, data: row, order })
    }
}

pub(crate) fn order_of(row: &Row, id: &Value, order_attr: &str) -> Result<f64, ProjectionError> {
    row.get(order_attr)
        .ok_or_else(|| ProjectionError::MissingAttribute(order_attr.to_owned()))?
        .as_order()
        .filter(|order| order.is_finite())
        .ok_or_else(|| ProjectionError::InvalidOrder {
            id: id.clone(),
            attribute: order_attr.to_owned(),
        })
}

/// A change to an [`ArrayProperty`]'s elements.
///
/// Indices describe the array as it stood when the change was applied, in
/// the order the changes are listed.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayChange {
    Initial(Vec<ArrayElement>),
    Insert(usize),
    Delete(usize),
    Update(usize),
    Move { src: usize, dst: usize },
}

// =============================================================================
// CORE
// =============================================================================

struct ArrayCore {
    store: Rc<dyn Store>,
    config: ArrayConfig,
    elements: RefCell<Vec<ArrayElement>>,
    started: Cell<bool>,
    loaded: Cell<bool>,
    subscription: RefCell<Option<StoreSubscription>>,
    last_error: RefCell<Option<ProjectionError>>,
    notify: Notify<Vec<ArrayChange>>,
    signal: Signal<Vec<ArrayChange>>,
}

impl ArrayCore {
    fn start(self: &Rc<Self>) {
        if self.started.replace(true) {
            return;
        }
        debug!(id_attr = %self.config.id_attr, "array projection starting");
        let adapter: Rc<dyn StoreObserver> = Rc::new(ArrayStoreObserver {
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
        match result.map_err(ProjectionError::from).and_then(|rows| self.build(rows)) {
            Ok(elements) => {
                debug!(elements = elements.len(), "array projection loaded");
                *self.elements.borrow_mut() = elements.clone();
                self.loaded.set(true);
                self.notify
                    .changing(vec![ArrayChange::Initial(elements)], ChangeMetadata::committed());
            }
            Err(err) => {
                warn!(error = %err, "array projection initial load failed");
                *self.last_error.borrow_mut() = Some(err);
            }
        }
        self.notify.did_change();
    }

    fn build(&self, rows: Vec<Row>) -> Result<Vec<ArrayElement>, ProjectionError> {
        let mut seen = HashSet::with_capacity(rows.len());
        let mut elements = rows
            .into_iter()
            .map(|row| {
                let element = ArrayElement::from_row(row, &self.config)?;
                if !seen.insert(element.id.clone()) {
                    return Err(ProjectionError::DuplicateId(element.id));
                }
                Ok(element)
            })
            .collect::<Result<Vec<_>, _>>()?;
        elements.sort_by(|a, b| a.order.total_cmp(&b.order));
        Ok(elements)
    }

    fn apply(&self, differential: &Differential) {
        if !self.loaded.get() {
            debug!("array projection ignoring differential before initial load");
            return;
        }
        match self.apply_checked(differential) {
            Ok(changes) if changes.is_empty() => {}
            Ok(changes) => self.notify.changing(changes, ChangeMetadata::committed()),
            Err(err) => {
                error!(error = %err, "array projection rejected differential");
                *self.last_error.borrow_mut() = Some(err);
            }
        }
    }

    /// Validates the whole differential, then applies inserts, updates and
    /// deletes in that order.
    fn apply_checked(
        &self,
        differential: &Differential,
    ) -> Result<Vec<ArrayChange>, ProjectionError> {
        let parts = partition(differential, &self.config.id_attr)?;
        let mut guard = self.elements.borrow_mut();
        let elements: &mut Vec<ArrayElement> = &mut guard;
        let index_of =
            |elements: &[ArrayElement], id: &Value| elements.iter().position(|e| &e.id == id);

        let inserted = parts
            .added_rows
            .into_iter()
            .map(|row| {
                let element = ArrayElement::from_row(row, &self.config)?;
                match index_of(elements, &element.id) {
                    Some(_) => Err(ProjectionError::DuplicateId(element.id)),
                    None => Ok(element),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let updated = parts
            .updated_rows
            .into_iter()
            .map(|row| {
                let element = ArrayElement::from_row(row, &self.config)?;
                match index_of(elements, &element.id) {
                    Some(_) => Ok(element),
                    None => Err(ProjectionError::UnknownId(element.id)),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(id) = parts.deleted_ids.iter().find(|id| index_of(elements, id).is_none()) {
            return Err(ProjectionError::UnknownId(id.clone()));
        }

        let mut changes = Vec::new();
        let (mut moved, mut replaced) = (0usize, 0usize);
        let inserted_count = inserted.len();
        for element in inserted {
            let index = insert_sorted(elements, element, |e| e.order);
            changes.push(ArrayChange::Insert(index));
        }
        for element in updated {
            let Some(src) = index_of(elements, &element.id) else {
                continue;
            };
            let order_attr = self.config.order_attr.as_str();
            let same_order =
                order_values_equal(elements[src].data.get(order_attr), element.data.get(order_attr));
            if same_order {
                elements[src].data = element.data;
                changes.push(ArrayChange::Update(src));
                replaced += 1;
            } else {
                elements.remove(src);
                let dst = insert_sorted(elements, element, |e| e.order);
                changes.push(ArrayChange::Move { src, dst });
                moved += 1;
            }
        }
        let deleted_count = parts.deleted_ids.len();
        for id in &parts.deleted_ids {
            if let Some(index) = index_of(elements, id) {
                elements.remove(index);
                changes.push(ArrayChange::Delete(index));
            }
        }

        debug!(
            inserted = inserted_count,
            updated = replaced,
            moved,
            deleted = deleted_count,
            "array projection applied differential"
        );
        Ok(changes)
    }
}

struct ArrayStoreObserver {
    core: Weak<ArrayCore>,
}

impl StoreObserver for ArrayStoreObserver {
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
        warn!(error = %error, "array projection store change failed");
    }

    fn did_change(&self) {
        if let Some(core) = self.core.upgrade() {
            core.notify.did_change();
        }
    }
}

// =============================================================================
// ARRAY PROPERTY
// =============================================================================

/// A store relation kept as an array sorted by an order attribute.
///
/// Nothing is loaded until [`start`](ArrayProperty::start) is called or the
/// first observer attaches to [`signal`](ArrayProperty::signal). The first
/// delivery is an [`ArrayChange::Initial`]; every later store change
/// delivers the list of changes it caused, inside the store's own
/// will/did window.
///
/// # Example
///
/// ```
/// use spark_bindings::{ArrayConfig, ArrayProperty, MemoryStore, Row};
///
/// let store = MemoryStore::with_rows("id", vec![
///     Row::new().with("id", 1).with("order", 2.0),
///     Row::new().with("id", 2).with("order", 1.0),
/// ]);
/// let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
/// array.start();
/// store.flush();
///
/// let ids: Vec<_> = array.elements().into_iter().map(|e| e.id).collect();
/// assert_eq!(ids, vec![2.into(), 1.into()]);
/// ```
#[derive(Clone)]
pub struct ArrayProperty {
    core: Rc<ArrayCore>,
}

impl ArrayProperty {
    pub fn new(store: Rc<dyn Store>, config: ArrayConfig) -> Self {
        let (signal, notify) = Signal::pipe();
        let core = Rc::new(ArrayCore {
            store,
            config,
            elements: RefCell::new(Vec::new()),
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
                let elements = core.elements.borrow().clone();
                deliver_value(
                    observer,
                    vec![ArrayChange::Initial(elements)],
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

    /// Whether the initial query has landed.
    pub fn is_loaded(&self) -> bool {
        self.core.loaded.get()
    }

    pub fn config(&self) -> &ArrayConfig {
        &self.core.config
    }

    pub fn signal(&self) -> Signal<Vec<ArrayChange>> {
        self.core.signal.clone()
    }

    pub fn elements(&self) -> Vec<ArrayElement> {
        self.core.elements.borrow().clone()
    }

    pub fn with_elements<R>(&self, f: impl FnOnce(&[ArrayElement]) -> R) -> R {
        f(&self.core.elements.borrow())
    }

    pub fn len(&self) -> usize {
        self.core.elements.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.elements.borrow().is_empty()
    }

    /// The most recent failure: a failed initial query or a rejected
    /// differential.
    pub fn last_error(&self) -> Option<ProjectionError> {
        self.core.last_error.borrow().clone()
    }

    pub fn index_for_id(&self, id: &Value) -> Option<usize> {
        self.core.elements.borrow().iter().position(|e| &e.id == id)
    }

    pub fn element_for_id(&self, id: &Value) -> Option<ArrayElement> {
        self.core
            .elements
            .borrow()
            .iter()
            .find(|e| &e.id == id)
            .cloned()
    }

    /// An async property delivering the whole array after every change.
    pub fn full_array(&self) -> AsyncReadableProperty<Vec<ArrayElement>> {
        let weak = Rc::downgrade(&self.core);
        let signal = self.signal().map(move |_| {
            weak.upgrade()
                .map(|core| core.elements.borrow().clone())
                .unwrap_or_default()
        });
        AsyncReadableProperty::build(&signal, Some(Box::new(self.clone())))
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

    fn order_for(&self, id: &Value) -> Result<f64, ProjectionError> {
        self.element_for_id(id)
            .map(|e| e.order)
            .ok_or_else(|| ProjectionError::UnknownId(id.clone()))
    }

    /// Order key for a new element placed after `previous` and before `next`.
    /// With neither given, the element goes after the last one.
    ///
    /// Does not touch the array; write the key back to the store.
    pub fn order_for_insert_between(
        &self,
        previous: Option<&Value>,
        next: Option<&Value>,
    ) -> Result<f64, ProjectionError> {
        self.ensure_loaded()?;
        let low = match (previous, next) {
            (Some(id), _) => Some(self.order_for(id)?),
            (None, None) => self.core.elements.borrow().last().map(|e| e.order),
            (None, Some(_)) => None,
        };
        let high = next.map(|id| self.order_for(id)).transpose()?;
        checked_order_key_between(low, high, &self.core.config.rails)
    }

    /// Order key that moves the element at `src` to `dst`, where `dst` is an
    /// index into the array with that element already removed.
    pub fn order_for_move(&self, src: usize, dst: usize) -> Result<f64, ProjectionError> {
        self.ensure_loaded()?;
        let elements = self.core.elements.borrow();
        let len = elements.len();
        if src >= len {
            return Err(ProjectionError::IndexOutOfRange { index: src, len });
        }
        if dst >= len {
            return Err(ProjectionError::IndexOutOfRange { index: dst, len: len - 1 });
        }
        let others: Vec<f64> = elements
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != src)
            .map(|(_, e)| e.order)
            .collect();
        if others.is_empty() {
            return Ok(elements[src].order);
        }
        let low = dst.checked_sub(1).and_then(|i| others.get(i).copied());
        let high = others.get(dst).copied();
        checked_order_key_between(low, high, &self.core.config.rails)
    }

    /// Evenly spaced keys for every element in current order, for when a
    /// planning helper reports [`ProjectionError::OrderExhausted`].
    pub fn renumbering_plan(&self) -> Vec<(Value, f64)> {
        let elements = self.core.elements.borrow();
        renumbered(elements.iter().map(|e| &e.id), &self.core.config.rails)
    }
}

impl PropertySource<Vec<ArrayChange>> for ArrayProperty {
    fn signal(&self) -> Signal<Vec<ArrayChange>> {
        self.core.signal.clone()
    }

    fn owner(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for ArrayProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayProperty")
            .field("started", &self.core.started.get())
            .field("loaded", &self.core.loaded.get())
            .field("elements", &self.core.elements.borrow().len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
