pub mod schema;
pub mod store;

pub use store::{RunRow, RunStatus, Store};
