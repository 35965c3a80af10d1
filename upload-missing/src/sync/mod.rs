pub mod access;
pub mod delete;
pub mod diff;
pub mod engine;
pub mod lister;
pub mod local;
pub mod mime;
pub mod paths;
pub mod retry;
pub mod transfer;

#[cfg(test)]
mod memory_store;
