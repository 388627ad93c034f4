//! Wire value types (`Value`, `Map`).

mod value;

pub use value::{Map, Value, MAX_NESTING_DEPTH};
