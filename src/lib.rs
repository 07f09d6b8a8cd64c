//! AnyWork worker bridge
//!
//! Exposes one streaming chat protocol over two Claude backends:
//!
//! 1. **Process engine**: a `claude --print` subprocess per turn, resumed with
//!    the continuation token captured from the previous turn.
//!
//! 2. **Client engine**: one persistent stream-json connection per session,
//!    reused for every turn until it is released.
//!
//! Both translate their native output into [`ChatEvent`]s
//! (`text`, `tool_call`, `error`, `done`). The [`executor::SessionExecutor`]
//! relays them as they arrive, guarantees each turn ends with one `done`, and
//! appends the exchange to the session's JSONL conversation log.

pub mod agent;
pub mod config;
pub mod domain;
pub mod executor;
pub mod lines;
pub mod workspace;

pub use domain::*;
