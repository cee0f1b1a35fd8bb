// Module layout (Clean Architecture style)
// - bootstrap: configuration and the shared app context
// - infrastructure: document store adapters (memory/Postgres/Firestore)
// - presentation: route table, HTTP views and the data API
// - application: the store port and the client surface built on it
// - domain: documents, queries, snapshots

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::client;
