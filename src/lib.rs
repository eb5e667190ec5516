//! Purpose: Library crate behind the `airlookup` binary and its tests.
//! Exports: `core` (email validation, formulas, record shape, errors), `api`.
//! Role: Keeps the lookup pipeline testable without a server or network.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
//! Invariants: Configuration is passed in; nothing reads the environment here.
pub mod api;
pub mod core;
