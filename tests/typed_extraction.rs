//! Typed extractors used as query transforms over a live store.

use spark_bindings::store::extract::{common_value, one_string};
use spark_bindings::{query_signal, row, CommonValue, MemoryStore, QuerySignalOptions, Value};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_common_value_follows_the_selection() {
    let store = MemoryStore::with_rows("id", vec![row! { "id" => 1, "color" => "red" }]);
    let color = query_signal(
        store.clone(),
        |rows| common_value(rows, "color", |v| v.as_text().map(str::to_owned)),
        QuerySignalOptions::default(),
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    let _removal = color.observe_changing(move |v: &CommonValue<String>, _| {
        s.borrow_mut().push(v.clone());
    });
    store.flush();

    store.insert(row! { "id" => 2, "color" => "red" }).unwrap();
    store.flush();
    store.set(&Value::from(2), "color", "blue").unwrap();
    store.flush();
    store
        .transaction(|tx| {
            tx.delete(&Value::from(1))?;
            tx.delete(&Value::from(2))
        })
        .unwrap();
    store.flush();

    // The second red row changes nothing, so it is not delivered again.
    assert_eq!(
        *seen.borrow(),
        vec![
            CommonValue::One("red".to_owned()),
            CommonValue::Multi,
            CommonValue::None,
        ]
    );
}

#[test]
fn test_one_string_is_empty_unless_exactly_one_row() {
    let store = MemoryStore::new("id");
    let title = query_signal(
        store.clone(),
        |rows| one_string(rows, "title"),
        QuerySignalOptions::default(),
    );
    let last = Rc::new(RefCell::new(None));
    let l = last.clone();
    let _removal = title.observe_changing(move |v: &String, _| *l.borrow_mut() = Some(v.clone()));
    store.flush();
    assert_eq!(last.borrow().as_deref(), Some(""));

    store.insert(row! { "id" => 1, "title" => "Page1" }).unwrap();
    store.flush();
    assert_eq!(last.borrow().as_deref(), Some("Page1"));

    store.insert(row! { "id" => 2, "title" => "Page2" }).unwrap();
    store.flush();
    assert_eq!(last.borrow().as_deref(), Some(""));
}
