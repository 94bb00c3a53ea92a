use spark_bindings::{
    query_signal, row, ArrayConfig, ArrayProperty, BindableProperty, MemoryStore,
    QuerySignalOptions, ReadWriteProperty, Signal, TreeConfig, TreeProperty,
};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_array_drop_unsubscribes_from_store() {
    let store = MemoryStore::with_rows("id", vec![row! { "id" => 1, "order" => 1.0 }]);

    {
        let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
        array.start();
        store.flush();
        assert_eq!(store.observer_count(), 1);
        // array drops here
    }

    assert_eq!(store.observer_count(), 0, "Dropped projection should unsubscribe");

    // Changes after the drop have nobody to reach
    store.insert(row! { "id" => 2, "order" => 2.0 }).unwrap();
    assert_eq!(store.flush(), 1);
}

#[test]
fn test_clone_keeps_projection_alive() {
    let store = MemoryStore::new("id");
    let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
    array.start();
    store.flush();

    let kept = array.clone();
    drop(array);
    assert_eq!(store.observer_count(), 1);

    store.insert(row! { "id" => 1, "order" => 1.0 }).unwrap();
    store.flush();
    assert_eq!(kept.len(), 1);

    drop(kept);
    assert_eq!(store.observer_count(), 0);
}

#[test]
fn test_tree_drop_unsubscribes_from_store() {
    let store = MemoryStore::new("id");

    {
        let tree = TreeProperty::new(store.clone(), TreeConfig::default());
        let _removal = tree.signal().observe(|_| {});
        store.flush();
        assert!(tree.is_loaded());
        assert_eq!(store.observer_count(), 1);
        // _removal drops first, then tree
    }

    assert_eq!(store.observer_count(), 0);
}

#[test]
fn test_query_signal_drop_unsubscribes() {
    let store = MemoryStore::with_rows("id", vec![row! { "id" => 1 }]);
    let deliveries = Rc::new(Cell::new(0));
    let d = deliveries.clone();

    {
        let signal: Signal<usize> =
            query_signal(store.clone(), |rows| rows.len(), QuerySignalOptions::default());
        let _removal = signal.observe_changing(move |_, _| d.set(d.get() + 1));
        store.flush();
        assert_eq!(deliveries.get(), 1);
        assert_eq!(store.observer_count(), 1);
        // _removal and signal drop here
    }

    assert_eq!(store.observer_count(), 0);
    store.insert(row! { "id" => 2 }).unwrap();
    store.flush();
    assert_eq!(deliveries.get(), 1, "No deliveries after drop");
}

#[test]
fn test_observer_removal_drop_stops_delivery() {
    let (signal, notify) = Signal::pipe();
    let seen = Rc::new(Cell::new(0));
    let s = seen.clone();

    {
        let _removal = signal.observe_changing(move |v: &i32, _| s.set(*v));
        notify.changed(1);
        assert_eq!(signal.observer_count(), 1);
    }

    notify.changed(2);
    assert_eq!(seen.get(), 1);
    assert_eq!(signal.observer_count(), 0);
}

#[test]
fn test_target_drop_releases_binding() {
    let source = ReadWriteProperty::new(1);
    let baseline = source.signal().observer_count();

    {
        let target = ReadWriteProperty::new(0);
        let _binding = target.bind(&source);
        assert_eq!(target.value(), 1);
        assert_eq!(source.signal().observer_count(), baseline + 1);
        // target drops here; its bindings unbind with it
    }

    assert_eq!(source.signal().observer_count(), baseline);
}

#[test]
fn test_binding_keeps_source_alive() {
    let store = MemoryStore::new("id");
    let count = ReadWriteProperty::new(usize::MAX);

    let binding = {
        let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
        count.bind(&array.full_array().map(|elements| elements.len()))
        // the only array handle drops here
    };

    store.flush();
    assert_eq!(store.observer_count(), 1, "Binding should hold the projection");
    store.insert(row! { "id" => 1, "order" => 1.0 }).unwrap();
    store.flush();
    assert_eq!(count.value(), 1);

    binding.unbind();
    assert_eq!(store.observer_count(), 0);
}
