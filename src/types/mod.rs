//! Value and schema types shared by the aggregation processor

mod datum;
mod schema;

pub use datum::*;
pub use schema::*;
