//! # gantry-gate
//!
//! The admission gate and trust-engine facade for the Gantry toll network.
//!
//! Every inbound toll event passes through [`TrustEngine::admit`], which
//! runs the ordered, short-circuiting checks (rate limit, reader state,
//! signature, key version, replay, cross-reader outlier), penalizing the
//! reporting reader on each failure and feeding the quarantine controller.
//! The engine also exposes the probation, consensus and restoration
//! operations, and the periodic [`Reconciler`] that applies decay recovery
//! and purges expired tag suspicions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod event;
pub mod outlier;
pub mod rate_limit;
pub mod reconcile;
pub mod scorer;

pub use engine::{EngineStats, ReconcileSummary, TrustEngine};
pub use error::{GateError, Result};
pub use event::{AdmissionDecision, RejectReason, TollEvent};
pub use outlier::TrafficMonitor;
pub use rate_limit::RateLimiter;
pub use reconcile::Reconciler;
pub use scorer::{FraudScorer, FraudSignal, NoopScorer};
