//! edgescale-autoscale — request-rate driven replica scaling.
//!
//! Reads the latest finalized rates from the `RateAggregator`, compares each
//! target service against the `max_qps` / `safe_qps` thresholds, and scales
//! through an [`Orchestrator`]. A cooldown after every action keeps a rate
//! oscillating around a threshold from flapping the replica count.
//!
//! # Scaling Algorithm
//!
//! ```text
//! if now < cooldown_until:
//!     Cooldown                      // suppressed, even past a threshold
//! elif rate > max_qps:
//!     ScaleTo(min(current + step, max_replicas))
//! elif rate < safe_qps and current > min_replicas:
//!     ScaleTo(max(current - step, min_replicas))
//! else:
//!     NoChange
//!
//! after a successful ScaleTo:
//!     last_action = now; cooldown_until = now + cooldown
//! ```
//!
//! Orchestrator failures are logged and left for the next tick; there is no
//! local retry.

pub mod orchestrator;
pub mod scaler;

pub use orchestrator::{DryRunOrchestrator, Orchestrator, OrchestratorError};
pub use scaler::{Autoscaler, ScaleDecision, ScalePolicy, ScaleState};
