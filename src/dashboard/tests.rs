use super::*;
use crate::config::LiveConfig;
use crate::live::{ConnectionManager, InboundMessage, MessageKind, WsConnector};
use serde_json::json;
use std::sync::Arc;

fn make_manager() -> ConnectionManager {
    ConnectionManager::new(LiveConfig::default(), Arc::new(WsConnector::new()))
}

#[test]
fn test_stats_view_receives_live_stats() {
    let manager = make_manager();
    let view = StatsView::attach(&manager.handle());

    manager.registry().dispatch(&InboundMessage::Stats(json!({
        "activeApis": 14,
        "totalRequests": 120,
        "successCount": 110,
        "errorCount": 4,
        "slowCount": 6,
        "avgResponseTime": 87.5
    })));

    let stats = view.stats().unwrap();
    assert_eq!(stats.active_apis, 14);
    assert_eq!(stats.total_requests, 120);
    assert_eq!(stats.error_count, 4);
    assert_eq!(stats.avg_response_time, 87.5);
    assert!(view.last_updated().is_some());
}

#[test]
fn test_stats_view_ignores_chart_updates() {
    let manager = make_manager();
    let view = StatsView::attach(&manager.handle());

    manager
        .registry()
        .dispatch(&InboundMessage::ChartUpdate(json!({"responseTimeData": []})));

    assert!(view.stats().is_none());
    assert!(view.activities().is_empty());
}

#[test]
fn test_activity_feed_is_newest_first_and_capped() {
    let view = StatsView::new();
    for n in 0..(StatsView::MAX_ACTIVITIES + 20) {
        view.add_activity(json!({"seq": n}));
    }

    let activities = view.activities();
    assert_eq!(activities.len(), StatsView::MAX_ACTIVITIES);
    assert_eq!(activities[0], json!({"seq": StatsView::MAX_ACTIVITIES + 19}));
    assert_eq!(view.recent_activities(5).len(), 5);
}

#[test]
fn test_empty_polled_batch_keeps_live_activities() {
    let view = StatsView::new();
    view.add_activity(json!({"seq": 1}));
    view.add_activity(json!({"seq": 2}));

    view.merge_activities(Vec::new());

    assert_eq!(view.activities(), vec![json!({"seq": 2}), json!({"seq": 1})]);
}

#[test]
fn test_polled_batch_is_prepended_and_capped() {
    let view = StatsView::new();
    for n in 0..StatsView::MAX_ACTIVITIES {
        view.add_activity(json!({"seq": n}));
    }

    view.merge_activities(vec![json!({"polled": 1}), json!({"polled": 0})]);

    let activities = view.activities();
    assert_eq!(activities.len(), StatsView::MAX_ACTIVITIES);
    assert_eq!(activities[0], json!({"polled": 1}));
    assert_eq!(activities[1], json!({"polled": 0}));
    assert_eq!(activities[2], json!({"seq": StatsView::MAX_ACTIVITIES - 1}));
    // Oldest live entries fall off the end
    assert!(!activities.contains(&json!({"seq": 0})));
}

#[test]
fn test_alerts_are_capped() {
    let view = StatsView::new();
    for n in 0..(StatsView::MAX_ALERTS + 5) {
        view.add_alert(json!({"title": format!("alert {}", n)}));
    }
    assert_eq!(view.alerts().len(), StatsView::MAX_ALERTS);
}

#[test]
fn test_pause_drops_activities_but_keeps_alerts() {
    let view = StatsView::new();
    view.add_activity(json!({"seq": 1}));

    assert!(view.toggle_pause());
    view.add_activity(json!({"seq": 2}));
    view.merge_activities(vec![json!({"seq": 3})]);
    view.add_alert(json!({"title": "slow"}));

    assert_eq!(view.activities(), vec![json!({"seq": 1})]);
    assert_eq!(view.alerts().len(), 1);

    view.set_paused(false);
    view.add_activity(json!({"seq": 4}));
    assert_eq!(view.activities().len(), 2);
}

#[test]
fn test_clear_activities() {
    let view = StatsView::new();
    view.add_activity(json!({"seq": 1}));
    view.clear_activities();
    assert!(view.activities().is_empty());
}

#[test]
fn test_detach_stops_updates() {
    let manager = make_manager();
    let view = StatsView::attach(&manager.handle());
    assert_eq!(manager.registry().listener_count(MessageKind::Stats), 1);

    view.detach();
    assert_eq!(manager.registry().listener_count(MessageKind::Stats), 0);

    manager
        .registry()
        .dispatch(&InboundMessage::Stats(json!({"totalRequests": 1})));
    assert!(view.stats().is_none());
}

#[test]
fn test_dropped_view_is_not_called() {
    let manager = make_manager();
    let view = StatsView::attach(&manager.handle());
    drop(view);

    // Listener is still registered but the view is gone; dispatch must not panic
    let delivered = manager
        .registry()
        .dispatch(&InboundMessage::Stats(json!({"totalRequests": 1})));
    assert_eq!(delivered, 1);
}

#[test]
fn test_chart_view_keeps_latest_and_top_apis() {
    let manager = make_manager();
    let view = ChartView::attach(&manager.handle());

    let apis: Vec<_> = (0..8)
        .map(|n| json!({"endpoint": format!("/api/trains/{}", n), "avgTime": 10.0 * n as f64}))
        .collect();

    manager.registry().dispatch(&InboundMessage::ChartUpdate(json!({
        "responseTimeData": [{"time": "10:00", "avgTime": 42.0, "maxTime": 90.0}],
        "requestVolumeData": [{"endpoint": "/api/bookings", "count": 17}],
        "apiPerformanceData": apis
    })));

    let data = view.chart_data().unwrap();
    assert_eq!(data.response_time_data.len(), 1);
    assert_eq!(data.response_time_data[0].avg_time, 42.0);
    assert_eq!(data.request_volume_data[0].count, 17);

    let top = view.top_apis();
    assert_eq!(top.len(), ChartView::TOP_API_COUNT);
    assert_eq!(top[0].endpoint, "/api/trains/0");
}

#[test]
fn test_chart_view_rejects_bad_shape() {
    let view = ChartView::new();
    view.apply_chart_data(&json!({"responseTimeData": "not a list"}));
    assert!(view.chart_data().is_none());
    assert!(view.top_apis().is_empty());
}
