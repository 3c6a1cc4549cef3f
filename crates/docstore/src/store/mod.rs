/// Guard, input and error helpers shared by the store operations.
pub mod operations;
/// Document Store implementation.
pub mod stor;
#[cfg(test)]
/// Document Store tests.
mod tests;

pub use stor::{DocumentStore, ReadOutcome};
