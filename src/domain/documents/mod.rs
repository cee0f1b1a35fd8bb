pub mod document;
pub mod error;
pub mod query;
pub mod reference;
pub mod snapshot;
