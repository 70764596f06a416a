//! End-to-end tests: a real server on a loopback port and agents talking HTTP to it.

mod common;
mod mutation_tests;
mod sync_tests;
