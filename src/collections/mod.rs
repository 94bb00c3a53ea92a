// ============================================================================
// spark-bindings - Projections
// Store relations projected as sorted arrays and trees
// ============================================================================
//
// Both projections follow the same lifecycle:
//
// 1. Created idle, holding nothing
// 2. `start()` (or the first observer) subscribes and issues one query
// 3. The query result is delivered as an `Initial` change
// 4. Each store differential is classified by id and delivered as a batch
//    of inserts, updates, moves and deletes
// ============================================================================

pub mod array;
pub mod ordered;
pub mod partition;
pub mod tree;

pub use array::{ArrayChange, ArrayConfig, ArrayElement, ArrayProperty};
pub use ordered::{
    checked_order_key_between, insert_sorted, order_key_between, renumbered, OrderRails,
};
pub use partition::{partition, RelationChangeParts};
pub use tree::{MoveTarget, OrphanPolicy, TreeChange, TreeConfig, TreeNode, TreePath, TreeProperty};
