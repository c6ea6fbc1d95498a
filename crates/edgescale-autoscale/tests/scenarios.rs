//! Aggregator + autoscaler driven window by window with a manual clock.

use std::sync::Arc;
use std::time::Duration;

use edgescale_autoscale::{Autoscaler, DryRunOrchestrator, ScaleDecision, ScalePolicy};
use edgescale_core::{AccessEvent, ManualClock, TargetServices};
use edgescale_metrics::RateAggregator;

struct Rig {
    aggregator: Arc<RateAggregator>,
    scaler: Autoscaler,
    orch: Arc<DryRunOrchestrator>,
    clock: ManualClock,
}

fn rig(policy: ScalePolicy) -> Rig {
    let clock = ManualClock::new();
    let targets = TargetServices::new(["checkout"]).unwrap();
    let aggregator = Arc::new(RateAggregator::new(
        &targets,
        Duration::from_secs(1),
        Arc::new(clock.clone()),
    ));
    let orch = Arc::new(DryRunOrchestrator::new(2));
    let scaler = Autoscaler::new(
        targets,
        Arc::clone(&aggregator),
        orch.clone(),
        policy,
        Arc::new(clock.clone()),
    );
    Rig {
        aggregator,
        scaler,
        orch,
        clock,
    }
}

fn policy(cooldown: Duration) -> ScalePolicy {
    ScalePolicy {
        max_qps: 100.0,
        safe_qps: 10.0,
        min_replicas: 1,
        max_replicas: None,
        scale_step: 1,
        cooldown,
    }
}

impl Rig {
    /// Fill one window with `requests` events, close it, and evaluate.
    async fn window(&self, requests: u32) -> ScaleDecision {
        for _ in 0..requests {
            self.aggregator.record(&AccessEvent::new("checkout", 0));
        }
        self.clock.advance(Duration::from_secs(1));
        self.aggregator.rotate().await;

        let mut decisions = self.scaler.evaluate_all().await;
        assert_eq!(decisions.len(), 1);
        decisions.remove(0).1
    }
}

#[tokio::test]
async fn sustained_overload_scales_once_per_cooldown() {
    let r = rig(policy(Duration::from_secs(60)));

    let first = r.window(150).await;
    assert_eq!(first, ScaleDecision::ScaleUp { from: 2, to: 3 });

    for _ in 0..4 {
        assert!(matches!(
            r.window(150).await,
            ScaleDecision::Cooldown { .. }
        ));
    }
    assert_eq!(r.orch.set_calls(), 1);
    assert_eq!(r.orch.replicas("checkout").await, 3);

    // 5s elapsed; jump past the rest of the cooldown.
    r.clock.advance(Duration::from_secs(55));
    assert_eq!(
        r.window(150).await,
        ScaleDecision::ScaleUp { from: 3, to: 4 }
    );
    assert_eq!(r.orch.set_calls(), 2);
}

#[tokio::test]
async fn oscillating_rate_acts_at_most_once_per_cooldown() {
    let cooldown = Duration::from_secs(10);
    let r = rig(policy(cooldown));

    let mut action_times = Vec::new();
    for tick in 0..60u32 {
        let requests = if tick % 2 == 0 { 500 } else { 0 };
        if r.window(requests).await.is_action() {
            action_times.push(r.clock.elapsed());
        }
    }

    assert!(action_times.len() >= 2);
    for pair in action_times.windows(2) {
        assert!(pair[1] - pair[0] >= cooldown);
    }
    assert_eq!(r.orch.set_calls() as usize, action_times.len());
}

#[tokio::test]
async fn steady_rate_between_thresholds_never_scales() {
    let r = rig(policy(Duration::from_secs(60)));

    for _ in 0..10 {
        assert_eq!(r.window(50).await, ScaleDecision::NoChange);
    }
    assert_eq!(r.orch.set_calls(), 0);
}

#[tokio::test]
async fn idle_service_scales_down_to_min_and_stops() {
    let r = rig(policy(Duration::ZERO));

    assert_eq!(r.window(0).await, ScaleDecision::ScaleDown { from: 2, to: 1 });
    assert_eq!(r.window(0).await, ScaleDecision::NoChange);
    assert_eq!(r.orch.replicas("checkout").await, 1);
}
