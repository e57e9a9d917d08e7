//! View-model and controller behaviour against the mock backend and
//! transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use verdant_core::channel::METRICS_EVENT;
use verdant_core::{
    CommandController, CommandState, LoadState, MetricQuery, MetricsViewModel, MockBackend,
    MockTransport, RealtimeChannel, SeriesMode, TransportEvent,
};
use verdant_types::{Actuator, Metric, Mode, Scope, Switch};

fn channel() -> RealtimeChannel {
    RealtimeChannel::new(Arc::new(MockTransport::new()), Duration::from_millis(100))
}

fn buckets(n: u32) -> Vec<Metric> {
    (1..=n)
        .map(|day| Metric {
            month: Some(4),
            day: Some(day),
            temperature: Some(20.0 + day as f64),
            ..Default::default()
        })
        .collect()
}

fn live_event(temperature: f64) -> TransportEvent {
    TransportEvent::event(
        METRICS_EVENT,
        json!({"cellId": "c1", "temperature": temperature, "light": 1, "airPump": 0}),
    )
}

#[tokio::test]
async fn test_one_fetch_per_distinct_selection() {
    let backend = Arc::new(MockBackend::new().with_series(buckets(3)));
    let query = MetricQuery::new("c1", Scope::Month, 2024).month(4);
    let vm = MetricsViewModel::new(backend.clone(), channel(), query, 300);

    assert!(vm.refresh().await);
    assert!(!vm.set_month(4).await);
    assert!(vm.set_month(5).await);
    assert!(!vm.set_month(5).await);
    assert!(vm.set_scope(Scope::Year).await);
    assert!(vm.set_year(2023).await);
    assert!(!vm.set_year(2023).await);

    assert_eq!(backend.fetch_count(), 4);
    let queries = backend.queries().await;
    assert_eq!(queries[1].month, Some(5));
    assert_eq!(queries[3].year, 2023);
    assert_eq!(vm.load_state(), LoadState::Ready);
    assert_eq!(vm.series().len(), 3);
}

#[tokio::test]
async fn test_failed_fetch_empties_series() {
    let backend = Arc::new(MockBackend::new().with_series(buckets(3)));
    let query = MetricQuery::new("c1", Scope::Month, 2024).month(4);
    let vm = MetricsViewModel::new(backend.clone(), channel(), query, 300);
    vm.refresh().await;
    assert_eq!(vm.series().len(), 3);

    backend.set_should_fail(true);
    assert!(vm.set_month(6).await);
    assert!(vm.series().is_empty());
    assert!(matches!(vm.load_state(), LoadState::Failed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_slow_stale_fetch_does_not_overwrite() {
    let backend = Arc::new(MockBackend::new());
    let april = MetricQuery::new("c1", Scope::Month, 2024).month(4);
    let may = april.clone().month(5);
    backend.set_series_for(april.clone(), buckets(9)).await;
    backend.set_series_for(may.clone(), buckets(1)).await;

    let vm = Arc::new(MetricsViewModel::new(
        backend.clone(),
        channel(),
        MetricQuery::new("c1", Scope::Month, 2024).month(1),
        300,
    ));

    backend.set_fetch_latency(Duration::from_secs(5));
    let slow = tokio::spawn({
        let vm = vm.clone();
        async move { vm.set_query(april).await }
    });
    tokio::task::yield_now().await;

    backend.set_fetch_latency(Duration::ZERO);
    assert!(vm.set_query(may.clone()).await);
    assert!(!slow.await.unwrap());

    assert_eq!(vm.query(), may);
    assert_eq!(vm.series().len(), 1);
    assert_eq!(backend.fetch_count(), 2);
}

#[tokio::test]
async fn test_live_mode_buffers_latest_events() {
    let backend = Arc::new(MockBackend::new().with_series(buckets(3)));
    let channel = channel();
    let query = MetricQuery::new("c1", Scope::Month, 2024).month(4);
    let vm = MetricsViewModel::new(backend.clone(), channel.clone(), query, 3);
    vm.refresh().await;

    assert!(vm.set_live(true).await);
    assert_eq!(vm.mode(), SeriesMode::Live);
    assert!(vm.series().is_empty());

    for i in 0..5 {
        channel.dispatch(live_event(i as f64));
    }
    channel.dispatch(TransportEvent::event(
        METRICS_EVENT,
        json!({"cellId": "c2", "temperature": 99.0}),
    ));

    let series = vm.series();
    let temps: Vec<_> = series.iter().filter_map(|m| m.temperature).collect();
    assert_eq!(temps, vec![2.0, 3.0, 4.0]);
    assert_eq!(series[0].light, Some(true));
    assert_eq!(series[0].air, Some(false));

    // leaving live mode clears and refetches
    assert!(vm.set_live(false).await);
    assert_eq!(channel.listener_count(), 0);
    assert_eq!(vm.series().len(), 3);
    assert_eq!(backend.fetch_count(), 2);
}

#[tokio::test]
async fn test_live_series_follows_selected_cell() {
    let backend = Arc::new(MockBackend::new());
    let channel = channel();
    let vm = MetricsViewModel::new(
        backend.clone(),
        channel.clone(),
        MetricQuery::new("c1", Scope::Day, 2024),
        10,
    );
    assert!(vm.set_live(true).await);
    channel.dispatch(live_event(21.0));
    assert_eq!(vm.series().len(), 1);

    assert!(!vm.set_query(MetricQuery::new("c2", Scope::Day, 2024)).await);
    assert!(vm.series().is_empty());
    assert_eq!(channel.listener_count(), 1);

    channel.dispatch(live_event(22.0));
    channel.dispatch(TransportEvent::event(
        METRICS_EVENT,
        json!({"cellId": "c2", "temperature": 18.5}),
    ));
    let series = vm.series();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].temperature, Some(18.5));
    assert_eq!(backend.fetch_count(), 0);
}

#[tokio::test]
async fn test_live_toggling_keeps_one_listener() {
    let channel = channel();
    let vm = MetricsViewModel::new(
        Arc::new(MockBackend::new()),
        channel.clone(),
        MetricQuery::new("c1", Scope::Day, 2024),
        300,
    );
    for _ in 0..5 {
        vm.set_live(true).await;
        vm.set_live(true).await;
        assert_eq!(channel.listener_count(), 1);
        vm.set_live(false).await;
        assert_eq!(channel.listener_count(), 0);
    }
    vm.set_live(true).await;
    drop(vm);
    assert_eq!(channel.listener_count(), 0);
}

#[tokio::test]
async fn test_mode_toggles_leave_no_duplicate_listeners() {
    let backend = Arc::new(MockBackend::new().with_mode(Mode::Automatic));
    let channel = channel();
    let controller = CommandController::new(backend.clone(), channel.clone(), "c1");
    controller.load().await.unwrap();

    for n in 1..=6 {
        controller.toggle_mode().await.unwrap();
        let expected = if n % 2 == 1 { 0 } else { 1 };
        assert_eq!(channel.listener_count(), expected);
    }
    assert_eq!(controller.mode(), Some(Mode::Automatic));
    assert_eq!(backend.mode_updates().await.len(), 6);
    assert_eq!(backend.current_mode().await, Mode::Automatic);
}

#[tokio::test]
async fn test_manual_mode_ignores_live_flags() {
    let backend = Arc::new(MockBackend::new().with_mode(Mode::Manual));
    let channel = channel();
    let controller = CommandController::new(backend, channel.clone(), "c1");
    controller.load().await.unwrap();

    channel.dispatch(live_event(21.0));
    assert_eq!(controller.actuators().light, Switch::Off);
}

#[tokio::test]
async fn test_failed_command_keeps_displayed_state() {
    let backend = Arc::new(MockBackend::new().with_mode(Mode::Manual));
    let controller = CommandController::new(backend.clone(), channel(), "c1");
    controller.load().await.unwrap();

    controller.toggle(Actuator::Heater).await.unwrap();
    let before = controller.actuators();

    backend.set_fail_commands(true);
    assert!(controller.toggle(Actuator::Heater).await.is_err());
    assert!(controller.toggle(Actuator::Light).await.is_err());
    assert_eq!(controller.actuators(), before);
    assert!(matches!(
        controller.command_state(Actuator::Light),
        CommandState::RolledBack { attempted: Switch::On, .. }
    ));

    backend.set_fail_commands(false);
    controller.toggle(Actuator::Light).await.unwrap();
    let commands = backend.commands().await;
    let last = commands.last().unwrap().1;
    assert!(last.light && last.heater && !last.air_pump);
}
