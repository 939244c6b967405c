//! Dashboard notifier integration tests
//!
//! Polls scripted snapshots through the in-memory backend and checks what
//! reaches the event bus.

mod common;

use c87_api_client::{
    ApiError, DashboardSnapshot, RiskBand, SignalBand, SignalDirection, SmartMoneySignal,
    TradingDecision, WhaleAlert, WhaleAlertType,
};
use c87_sync::{
    Notification, PollOutcome, Severity, SnapshotNotifier, SyncEvent, SyncRuntime, Topic,
    WatchedField, EventBus,
};
use common::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn decision(band: RiskBand) -> TradingDecision {
    TradingDecision {
        id: 1,
        overall_risk: 0.42,
        risk_band: band,
        confidence: 0.8,
        action: "HOLD".into(),
        risk_components: None,
        active_alerts: Vec::new(),
        bot_action: "WAIT".into(),
        max_position_pct: 10.0,
        created_at: None,
    }
}

fn smart_money(coin: &str, band: SignalBand) -> SmartMoneySignal {
    SmartMoneySignal {
        id: 1,
        coin: coin.into(),
        score: 0.6,
        band,
        direction: SignalDirection::Bullish,
        confidence: 0.7,
        timeframe: "4h".into(),
        modules_active: 5,
        description: None,
        created_at: None,
    }
}

fn whale(id: u64) -> WhaleAlert {
    WhaleAlert {
        id,
        alert_type: WhaleAlertType::Distribution,
        net_flow: -3400.0,
        volume: 12000.0,
        tx_count: 9,
        created_at: None,
    }
}

fn snapshot(band: RiskBand, alerts: &[u64]) -> DashboardSnapshot {
    DashboardSnapshot {
        trading_decision: Some(decision(band)),
        whale_alerts: alerts.iter().copied().map(whale).collect(),
        ..Default::default()
    }
}

fn notifier(backend: &Arc<MockBackend>) -> (SnapshotNotifier, Arc<Mutex<Vec<Notification>>>) {
    let bus = EventBus::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    bus.subscribe(Topic::Notification, move |event| {
        if let SyncEvent::Notification(n) = event {
            sink.lock().unwrap().push(n.clone());
        }
        Ok(())
    });
    (SnapshotNotifier::new(backend.clone(), bus), received)
}

#[tokio::test]
async fn test_first_poll_only_seeds_baseline() {
    let backend = MockBackend::new();
    backend.push_snapshot(snapshot(RiskBand::Extreme, &[1, 2, 3]));
    let (notifier, received) = notifier(&backend);

    assert_eq!(notifier.poll_once().await.unwrap(), PollOutcome::Seeded);
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(notifier.baseline().unwrap().whale_alerts.len(), 3);
}

#[tokio::test]
async fn test_new_alert_notifies_once() {
    let backend = MockBackend::new();
    backend.push_snapshot(snapshot(RiskBand::Low, &[1]));
    backend.push_snapshot(snapshot(RiskBand::Low, &[2, 1]));
    backend.push_snapshot(snapshot(RiskBand::Low, &[2, 1]));
    let (notifier, received) = notifier(&backend);

    notifier.poll_once().await.unwrap();
    let outcome = notifier.poll_once().await.unwrap();
    assert_eq!(
        outcome.notifications(),
        &[Notification::NewAlerts { ids: vec![2] }]
    );

    // Same alert list again: nothing new
    assert_eq!(notifier.poll_once().await.unwrap(), PollOutcome::Diffed(Vec::new()));
    assert_eq!(
        *received.lock().unwrap(),
        vec![Notification::NewAlerts { ids: vec![2] }]
    );
}

#[tokio::test]
async fn test_risk_transitions_and_oscillation() {
    let backend = MockBackend::new();
    backend.push_snapshot(snapshot(RiskBand::Low, &[]));
    backend.push_snapshot(snapshot(RiskBand::High, &[]));
    backend.push_snapshot(snapshot(RiskBand::High, &[]));
    backend.push_snapshot(snapshot(RiskBand::Low, &[]));
    let (notifier, received) = notifier(&backend);

    for _ in 0..4 {
        notifier.poll_once().await.unwrap();
    }

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].message(), "Risk level: LOW→HIGH");
    assert_eq!(received[0].severity(), Severity::Warning);
    assert_eq!(received[1].message(), "Risk level: HIGH→LOW");
    assert_eq!(received[1].severity(), Severity::Info);
}

#[tokio::test]
async fn test_smart_money_band_transition() {
    let backend = MockBackend::new();
    let mut first = snapshot(RiskBand::Moderate, &[]);
    first.smart_money_btc = Some(smart_money("BTC", SignalBand::Accumulate));
    first.smart_money_eth = Some(smart_money("ETH", SignalBand::Neutral));
    let mut second = first.clone();
    second.smart_money_btc = Some(smart_money("BTC", SignalBand::StrongBuy));
    backend.push_snapshot(first);
    backend.push_snapshot(second);
    let (notifier, _) = notifier(&backend);

    notifier.poll_once().await.unwrap();
    let outcome = notifier.poll_once().await.unwrap();

    assert_eq!(
        outcome.notifications(),
        &[Notification::Transition {
            field: WatchedField::SmartMoneyBtc,
            from: "ACCUMULATE".into(),
            to: "STRONG_BUY".into(),
        }]
    );
}

#[tokio::test]
async fn test_failed_poll_keeps_baseline() {
    let backend = MockBackend::new();
    backend.push_snapshot(snapshot(RiskBand::Safe, &[1]));
    let (notifier, received) = notifier(&backend);
    notifier.poll_once().await.unwrap();

    backend.fail_next(
        DASHBOARD,
        ApiError::Rejected {
            status: 502,
            reason: None,
        },
    );
    assert!(notifier.poll_once().await.is_err());
    assert_eq!(notifier.baseline(), Some(snapshot(RiskBand::Safe, &[1])));

    backend.push_snapshot(snapshot(RiskBand::Safe, &[1, 4]));
    notifier.poll_once().await.unwrap();
    assert_eq!(
        *received.lock().unwrap(),
        vec![Notification::NewAlerts { ids: vec![4] }]
    );
}

#[tokio::test]
async fn test_overlapping_poll_is_skipped() {
    let backend = MockBackend::new();
    backend.push_snapshot(snapshot(RiskBand::Safe, &[]));
    let gate = backend.hold(DASHBOARD);
    let (notifier, _) = notifier(&backend);

    let first = notifier.clone();
    let in_flight = tokio::spawn(async move { first.poll_once().await });
    wait_for_calls(&backend, DASHBOARD, 1).await;

    assert_eq!(notifier.poll_once().await.unwrap(), PollOutcome::Skipped);
    assert_eq!(backend.calls(DASHBOARD), 1);

    gate.notify_one();
    assert_eq!(in_flight.await.unwrap().unwrap(), PollOutcome::Seeded);
}

#[tokio::test]
async fn test_run_survives_failures_until_shutdown() {
    let backend = MockBackend::new();
    backend.push_snapshot(snapshot(RiskBand::Low, &[]));
    backend.push_snapshot(snapshot(RiskBand::Low, &[7]));
    let (notifier, received) = notifier(&backend);

    let runner = notifier.clone();
    let signal = notifier.shutdown_signal();
    let handle = tokio::spawn(async move { runner.run(Duration::from_millis(5), signal).await });

    // Two scripted snapshots, then the backend keeps failing
    for _ in 0..400 {
        if backend.calls(DASHBOARD) >= 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(backend.calls(DASHBOARD) >= 4);

    notifier.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("notifier loop did not stop")
        .unwrap();

    assert_eq!(
        *received.lock().unwrap(),
        vec![Notification::NewAlerts { ids: vec![7] }]
    );
    assert_eq!(notifier.baseline(), Some(snapshot(RiskBand::Low, &[7])));
}

#[tokio::test]
async fn test_shutdown_right_after_spawn_stops_every_loop() {
    let backend = MockBackend::with_feed(items_desc(5, 1));
    let rt = SyncRuntime::with_backend(config(10), backend.clone());

    let handles = rt.spawn_background();
    rt.shutdown();

    for handle in handles {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("background loop missed the shutdown signal")
            .unwrap();
    }
}
