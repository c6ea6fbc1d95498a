//! Autoscaler — rate-threshold scaling with per-service cooldown.
//!
//! Reads the latest finalized rate for each target service from the
//! aggregator, compares it against the policy thresholds, and asks the
//! orchestrator for a new replica count. Per-service state is owned here and
//! only mutated by the evaluation path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use edgescale_core::config::AutoscaleSettings;
use edgescale_core::{Clock, ScaleDirection, TargetServices};
use edgescale_metrics::RateAggregator;

use crate::orchestrator::Orchestrator;

/// Outcome of evaluating one service on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleDecision {
    /// Replicas raised.
    ScaleUp { from: u32, to: u32 },
    /// Replicas lowered.
    ScaleDown { from: u32, to: u32 },
    /// A recent action is still cooling down; nothing evaluated.
    Cooldown { remaining: Duration },
    /// No change needed (or already at the replica bound).
    NoChange,
    /// No finalized window for this service that has not been evaluated.
    NoData,
    /// The orchestrator call failed; retried on a later tick.
    Failed,
}

impl ScaleDecision {
    pub fn is_action(&self) -> bool {
        matches!(self, ScaleDecision::ScaleUp { .. } | ScaleDecision::ScaleDown { .. })
    }
}

/// Thresholds and bounds shared by every target service.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalePolicy {
    pub max_qps: f64,
    pub safe_qps: f64,
    pub min_replicas: u32,
    pub max_replicas: Option<u32>,
    pub scale_step: u32,
    pub cooldown: Duration,
}

impl ScalePolicy {
    /// Which way the rate asks to move, if at all.
    pub fn direction(&self, rate: f64) -> ScaleDirection {
        if rate > self.max_qps {
            ScaleDirection::Up
        } else if rate < self.safe_qps {
            ScaleDirection::Down
        } else {
            ScaleDirection::None
        }
    }

    /// Replica target for moving `direction` from `current`.
    ///
    /// `None` when already at the bound in that direction.
    pub fn target_replicas(&self, direction: ScaleDirection, current: u32) -> Option<u32> {
        match direction {
            ScaleDirection::Up => {
                let mut target = current.saturating_add(self.scale_step);
                if let Some(max) = self.max_replicas {
                    target = target.min(max);
                }
                (target > current).then_some(target)
            }
            ScaleDirection::Down => {
                if current <= self.min_replicas {
                    return None;
                }
                let target = current.saturating_sub(self.scale_step).max(self.min_replicas);
                (target < current).then_some(target)
            }
            ScaleDirection::None => None,
        }
    }
}

impl From<&AutoscaleSettings> for ScalePolicy {
    fn from(s: &AutoscaleSettings) -> Self {
        Self {
            max_qps: s.max_qps,
            safe_qps: s.safe_qps,
            min_replicas: s.min_replicas,
            max_replicas: s.max_replicas,
            scale_step: s.scale_step,
            cooldown: s.cooldown,
        }
    }
}

/// Per-service scaling state (cooldown tracking).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaleState {
    /// Replica count last read from or set on the orchestrator.
    pub current_replicas: Option<u32>,
    pub last_action: Option<Instant>,
    pub last_direction: ScaleDirection,
    /// Always at or after `last_action`.
    pub cooldown_until: Option<Instant>,
    /// Sequence of the last finalized window evaluated outside cooldown.
    pub last_window: Option<u64>,
}

impl ScaleState {
    /// Time left in cooldown at `now`, if any.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }
}

/// The autoscaler evaluates request rates and scales target services
/// up or down.
pub struct Autoscaler {
    targets: TargetServices,
    aggregator: Arc<RateAggregator>,
    orchestrator: Arc<dyn Orchestrator>,
    policy: ScalePolicy,
    clock: Arc<dyn Clock>,
    /// Per-service scaling state: service → state. Fixed at construction.
    /// Each lock is held for a whole evaluation of that service.
    states: HashMap<String, Mutex<ScaleState>>,
}

impl Autoscaler {
    pub fn new(
        targets: TargetServices,
        aggregator: Arc<RateAggregator>,
        orchestrator: Arc<dyn Orchestrator>,
        policy: ScalePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let states = targets
            .iter()
            .map(|s| (s.to_string(), Mutex::new(ScaleState::default())))
            .collect();

        Self {
            targets,
            aggregator,
            orchestrator,
            policy,
            clock,
            states,
        }
    }

    /// Copy of a service's scaling state; `None` for a non-target service.
    pub async fn scale_state(&self, service: &str) -> Option<ScaleState> {
        Some(*self.states.get(service)?.lock().await)
    }

    /// Evaluate a single service at the given rate, scaling if needed.
    ///
    /// Evaluations of the same service are serialized, so concurrent callers
    /// still produce at most one action per cooldown.
    pub async fn evaluate(&self, service: &str, rate: f64) -> ScaleDecision {
        self.evaluate_window(service, rate, None).await
    }

    /// Evaluate every target service against the latest finalized window.
    ///
    /// A window drives at most one evaluation per service: a service whose
    /// latest window was already evaluated reports `NoData`.
    pub async fn evaluate_all(&self) -> Vec<(String, ScaleDecision)> {
        let window = self.aggregator.latest().await;
        let mut decisions = Vec::with_capacity(self.targets.len());

        for service in self.targets.iter() {
            let decision = match window.as_deref() {
                Some(w) => match w.rate(service) {
                    Some(rate) => self.evaluate_window(service, rate, Some(w.sequence)).await,
                    None => ScaleDecision::NoData,
                },
                None => ScaleDecision::NoData,
            };
            decisions.push((service.to_string(), decision));
        }

        decisions
    }

    /// Run the autoscaler loop.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = interval.as_millis() as u64,
            services = self.targets.len(),
            cooldown_ms = self.policy.cooldown.as_millis() as u64,
            "autoscaler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.evaluate_all().await;
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }

    async fn evaluate_window(&self, service: &str, rate: f64, window: Option<u64>) -> ScaleDecision {
        let Some(slot) = self.states.get(service) else {
            return ScaleDecision::NoData;
        };
        let mut state = slot.lock().await;

        if window.is_some() && state.last_window == window {
            return ScaleDecision::NoData;
        }

        let now = self.clock.now();
        if let Some(remaining) = state.cooldown_remaining(now) {
            debug!(
                %service,
                qps = rate,
                remaining_ms = remaining.as_millis() as u64,
                "in cooldown, skipping"
            );
            return ScaleDecision::Cooldown { remaining };
        }
        if window.is_some() {
            state.last_window = window;
        }

        let direction = self.policy.direction(rate);
        if direction == ScaleDirection::None {
            return ScaleDecision::NoChange;
        }

        let current = match self.orchestrator.get_replicas(service).await {
            Ok(n) => n,
            Err(e) => {
                warn!(%service, error = %e, "failed to read replica count");
                return ScaleDecision::Failed;
            }
        };
        state.current_replicas = Some(current);

        let Some(target) = self.policy.target_replicas(direction, current) else {
            debug!(%service, %direction, replicas = current, qps = rate, "at replica bound");
            return ScaleDecision::NoChange;
        };

        if let Err(e) = self.orchestrator.set_replicas(service, target).await {
            warn!(
                %service,
                from = current,
                to = target,
                error = %e,
                "scaling action failed"
            );
            return ScaleDecision::Failed;
        }

        state.current_replicas = Some(target);
        state.last_action = Some(now);
        state.last_direction = direction;
        state.cooldown_until = Some(now + self.policy.cooldown);

        info!(
            %service,
            %direction,
            from = current,
            to = target,
            qps = rate,
            max_qps = self.policy.max_qps,
            safe_qps = self.policy.safe_qps,
            "scaled service"
        );

        if target > current {
            ScaleDecision::ScaleUp { from: current, to: target }
        } else {
            ScaleDecision::ScaleDown { from: current, to: target }
        }
    }
}
