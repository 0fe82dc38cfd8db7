//! Creator Operations Agent Core
//!
//! Backend core for a creator-operations platform:
//! - Agents plan with an LLM, gate on human approval, and dispatch
//!   deterministic tool steps (LLM excluded from dispatch)
//! - A transfer gateway moves money idempotently through an external
//!   payment provider, with daily spend caps
//! - A reconciliation sweep converges pending transactions with the
//!   provider's view
//! - Every phase of an invocation lands in an append-only ledger under
//!   one correlation id
//!
//! INVOCATION LOOP:
//! INPUT → PLAN → (APPROVAL?) → DISPATCH → SYNTHESIZE → COMPLETE

pub mod agent;
pub mod api;
pub mod balance;
pub mod dispatch;
pub mod error;
pub mod idempotency;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod planner;
pub mod provider;
pub mod reconcile;
pub mod spend;
pub mod state;
pub mod tools;
pub mod transfer;

pub use error::Result;

// Re-export common types
pub use models::*;
