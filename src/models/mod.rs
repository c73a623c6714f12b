//! Data models shared by the client and the driver boundary.

pub mod query;

pub use query::{Fetch, QueryParam, Record, Selection};
