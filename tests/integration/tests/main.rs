//! Ticket registry integration tests.
//!
//! Exercises the registry contract across every local backend, the
//! replicated registry over an in-process bus, and the background
//! reaper. The Redis backend needs a live server and is covered by its
//! own deployment checks.

mod common;
mod reaper;
mod registry_scenarios;
mod replication;
