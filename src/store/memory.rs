// ============================================================================
// spark-bindings - Memory Store
// Deterministic in-process store with an explicit run loop
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::core::error::StoreError;
use crate::store::value::{Row, Value};
use crate::store::{
    Differential, QueryCompletion, Snapshot, Store, StoreObserver, StoreSubscription,
};

type Task = Box<dyn FnOnce()>;

// =============================================================================
// MEMORY STORE
// =============================================================================

/// An in-memory [`Store`].
///
/// Mutations take effect on the table immediately and open a change window
/// on every current observer right away; the differential and the closing
/// `did_change` are queued. Queries capture the table when issued and are
/// queued as well. [`MemoryStore::flush`] runs the queue in FIFO order, so
/// tests decide exactly when "asynchronous" work lands.
///
/// # Example
///
/// ```
/// use spark_bindings::{MemoryStore, Row};
///
/// let store = MemoryStore::new("id");
/// store.insert(Row::new().with("id", 1)).unwrap();
/// assert_eq!(store.pending(), 1);
/// store.flush();
/// assert_eq!(store.rows().len(), 1);
/// ```
pub struct MemoryStore {
    weak_self: Weak<MemoryStore>,
    id_attr: String,
    rows: RefCell<Vec<Row>>,
    observers: RefCell<Vec<(u64, Rc<dyn StoreObserver>)>>,
    next_observer: Cell<u64>,
    queue: RefCell<VecDeque<Task>>,
    version: Cell<u64>,
    query_failures: RefCell<VecDeque<StoreError>>,
    change_failures: RefCell<VecDeque<StoreError>>,
    queries: Cell<usize>,
}

impl MemoryStore {
    pub fn new(id_attr: &str) -> Rc<Self> {
        Self::with_rows(id_attr, Vec::new())
    }

    /// A store preloaded with `rows`. No notifications are sent for them.
    pub fn with_rows(id_attr: &str, rows: Vec<Row>) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            id_attr: id_attr.to_owned(),
            rows: RefCell::new(rows),
            observers: RefCell::new(Vec::new()),
            next_observer: Cell::new(0),
            queue: RefCell::new(VecDeque::new()),
            version: Cell::new(0),
            query_failures: RefCell::new(VecDeque::new()),
            change_failures: RefCell::new(VecDeque::new()),
            queries: Cell::new(0),
        })
    }

    pub fn id_attr(&self) -> &str {
        &self.id_attr
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Adds a row. Fails if its id is missing or already present.
    pub fn insert(&self, row: Row) -> Result<(), StoreError> {
        self.transaction(|tx| tx.insert(row))
    }

    /// Replaces the row with the same id.
    pub fn update(&self, row: Row) -> Result<(), StoreError> {
        self.transaction(|tx| tx.update(row))
    }

    /// Sets one attribute of the row with `id`.
    pub fn set(
        &self,
        id: &Value,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        let value = value.into();
        self.transaction(|tx| {
            let mut row = tx.get(id).cloned().ok_or_else(|| unknown(id))?;
            row.set(attribute, value);
            tx.update(row)
        })
    }

    pub fn delete(&self, id: &Value) -> Result<(), StoreError> {
        self.transaction(|tx| tx.delete(id))
    }

    /// Applies several mutations as one differential.
    ///
    /// Nothing is applied if `f` fails. A transaction that leaves the table
    /// unchanged sends no notification.
    pub fn transaction(
        &self,
        f: impl FnOnce(&mut Transaction) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let before = self.rows.borrow().clone();
        let mut tx = Transaction {
            id_attr: &self.id_attr,
            rows: before.clone(),
        };
        f(&mut tx)?;
        let after = tx.rows;

        let added: Vec<Row> = after.iter().filter(|r| !before.contains(r)).cloned().collect();
        let removed: Vec<Row> = before.iter().filter(|r| !after.contains(r)).cloned().collect();
        let diff = Differential::new(added, removed);
        if !diff.is_empty() {
            self.apply(diff);
        }
        Ok(())
    }

    /// Applies a raw differential to the table and notifies observers,
    /// without any validation.
    pub fn apply(&self, diff: Differential) {
        {
            let mut rows = self.rows.borrow_mut();
            rows.retain(|row| !diff.removed.contains(row));
            rows.extend(diff.added.iter().cloned());
        }
        self.version.set(self.version.get() + 1);
        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            version = self.version.get(),
            "memory store change queued"
        );

        let observers = self.observer_snapshot();
        for observer in &observers {
            observer.will_change();
        }
        let failure = self.change_failures.borrow_mut().pop_front();
        self.enqueue(Box::new(move || {
            for observer in &observers {
                match &failure {
                    Some(err) => observer.change_failed(err),
                    None => observer.changed(&diff),
                }
                observer.did_change();
            }
        }));
    }

    // =========================================================================
    // FAILURE INJECTION
    // =========================================================================

    /// The next query issued completes with `error`.
    pub fn fail_next_query(&self, error: StoreError) {
        self.query_failures.borrow_mut().push_back(error);
    }

    /// The next change is reported to observers as `error` instead of its
    /// differential. The table still changes.
    pub fn fail_next_change(&self, error: StoreError) {
        self.change_failures.borrow_mut().push_back(error);
    }

    // =========================================================================
    // RUN LOOP
    // =========================================================================

    /// Runs queued work, including work queued while flushing, until the
    /// queue is empty. Returns how many tasks ran.
    pub fn flush(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        trace!(tasks = ran, "memory store flushed");
        ran
    }

    /// Runs a single queued task. Returns false if the queue was empty.
    pub fn step(&self) -> bool {
        let next = self.queue.borrow_mut().pop_front();
        match next {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    fn enqueue(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    pub fn rows(&self) -> Vec<Row> {
        self.rows.borrow().clone()
    }

    pub fn row(&self, id: &Value) -> Option<Row> {
        self.rows
            .borrow()
            .iter()
            .find(|row| row.id(&self.id_attr) == Some(id))
            .cloned()
    }

    /// Token for the current table state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.version.get())
    }

    pub fn version(&self) -> u64 {
        self.version.get()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Number of queries issued so far.
    pub fn query_count(&self) -> usize {
        self.queries.get()
    }

    fn observer_snapshot(&self) -> Vec<Rc<dyn StoreObserver>> {
        self.observers
            .borrow()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }
}

impl Store for MemoryStore {
    fn query(&self, completion: QueryCompletion) {
        self.queries.set(self.queries.get() + 1);
        let result = match self.query_failures.borrow_mut().pop_front() {
            Some(err) => Err(err),
            None => Ok(self.rows.borrow().clone()),
        };
        trace!(ok = result.is_ok(), "memory store query queued");
        self.enqueue(Box::new(move || completion(result)));
    }

    fn subscribe(&self, observer: Rc<dyn StoreObserver>) -> StoreSubscription {
        let id = self.next_observer.get();
        self.next_observer.set(id + 1);
        self.observers.borrow_mut().push((id, observer));

        let weak = self.weak_self.clone();
        StoreSubscription::new(move || {
            if let Some(store) = weak.upgrade() {
                let removed = {
                    let mut observers = store.observers.borrow_mut();
                    observers
                        .iter()
                        .position(|(oid, _)| *oid == id)
                        .map(|index| observers.remove(index))
                };
                drop(removed);
            }
        })
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("rows", &self.rows.borrow().len())
            .field("pending", &self.queue.borrow().len())
            .field("version", &self.version.get())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

fn unknown(id: &Value) -> StoreError {
    StoreError::Commit(format!("no row with id {id}"))
}

/// Working copy of the table inside [`MemoryStore::transaction`].
pub struct Transaction<'a> {
    id_attr: &'a str,
    rows: Vec<Row>,
}

impl Transaction<'_> {
    fn position(&self, id: &Value) -> Option<usize> {
        self.rows.iter().position(|row| row.id(self.id_attr) == Some(id))
    }

    fn id_of(&self, row: &Row) -> Result<Value, StoreError> {
        row.id(self.id_attr)
            .cloned()
            .ok_or_else(|| StoreError::Commit(format!("row has no `{}` attribute", self.id_attr)))
    }

    pub fn get(&self, id: &Value) -> Option<&Row> {
        self.position(id).map(|index| &self.rows[index])
    }

    pub fn insert(&mut self, row: Row) -> Result<(), StoreError> {
        let id = self.id_of(&row)?;
        if self.position(&id).is_some() {
            return Err(StoreError::Commit(format!("duplicate id {id}")));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn update(&mut self, row: Row) -> Result<(), StoreError> {
        let id = self.id_of(&row)?;
        let index = self.position(&id).ok_or_else(|| unknown(&id))?;
        self.rows[index] = row;
        Ok(())
    }

    pub fn delete(&mut self, id: &Value) -> Result<(), StoreError> {
        let index = self.position(id).ok_or_else(|| unknown(id))?;
        self.rows.remove(index);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
