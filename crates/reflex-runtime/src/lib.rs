//! # reflex-runtime
//!
//! Where the agent loop meets the learning layer.
//!
//! ```text
//!   task, url ──▶ SmartRouter ──▶ NORMAL ──▶ full agent ──▶ Accelerator::learn
//!                     │                                        │
//!                     ▼                                        ▼
//!                   FAST ──▶ SkillExecutor ──▶ update_skill_confidence
//! ```

pub mod accelerator;
pub mod router;

pub use accelerator::{Accelerator, FastPathOutcome, LearnOutcome};
pub use router::{RouteDecision, RoutePath, RouteReason, SkillLookup, SmartRouter};
