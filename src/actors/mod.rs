//! Actor-based simulation engine
//!
//! Each simulated host is driven by its own actor, which owns that host's
//! mutable state. Timers live inside the actors; callers talk to them through
//! Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                      HostCommand (mpsc)
//! SchedulerHandle ─┬──────────────────────▶ HostActor "db01"  ◀── send/refresh timers
//!                  └──────────────────────▶ HostActor "web01" ◀── send/refresh timers
//!                    (oneshot replies)          │  owns Host, ActiveAgent
//!                                               ▼
//!                                WireCodec + SessionClient ──TCP──▶ server:10051
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Ticks**: each actor polls its own timers; ticks missed while busy are skipped
//! 2. **Request/Response**: oneshot channels for on-demand cycles, overrides and snapshots,
//!    broadcast to every host concurrently
//! 3. **Shutdown**: the handle stops every actor, and its timers with it
//!
//! See [`scheduler::run_once`] for a single refresh-and-report pass.

pub mod messages;
pub mod scheduler;
