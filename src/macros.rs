// ============================================================================
// spark-bindings - Ergonomic Macros
// ============================================================================

/// Clones variables into a move closure.
///
/// Saves the `let x = x.clone();` lines before handing a property or
/// store to an observer.
///
/// # Usage
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use spark_bindings::{cloned, ReadWriteProperty};
///
/// let count = ReadWriteProperty::new(0);
/// let hits = Rc::new(Cell::new(0));
///
/// let _removal = count
///     .signal()
///     .observe_changing(cloned!(hits => move |_: &i32, _| hits.set(hits.get() + 1)));
/// count.change(1, false);
/// assert_eq!(hits.get(), 2);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Builds a [`Row`](crate::Row) from `attribute => value` pairs.
///
/// # Usage
///
/// ```rust
/// use spark_bindings::{row, Value};
///
/// let r = row! { "id" => 1, "name" => "Page1", "parent" => Value::Null, "order" => 5.0 };
/// assert_eq!(r.get("name"), Some(&Value::from("Page1")));
/// assert_eq!(r.len(), 4);
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($attr:expr => $value:expr),+ $(,)?) => {
        $crate::Row::new()$(.with($attr, $value))+
    };
}
