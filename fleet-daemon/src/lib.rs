//! Library surface of the daemon, split out so integration tests can mount
//! the router against an in-memory store.

pub mod api;
pub mod reporter;
