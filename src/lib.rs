//! memovault: background indexing for a personal knowledge base
//!
//! Documents live in SQLite, their embeddings in Qdrant. Every document
//! create or update schedules an asynchronous indexing task; the task table
//! records what each worker did, and a token on the row decides which
//! worker's result counts when submissions race.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod docs;
pub mod embed;
pub mod error;
pub mod store;
pub mod sync;
pub mod tasks;
