//! Integration tests for `Session` over the in-memory backend.

mod common;
mod end_to_end;
mod failures;
mod migration;
