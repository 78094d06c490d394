use crate::live::{ListenerId, ManagerHandle, MessageKind};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tracing::debug;

/// Aggregate request counters pushed on the `stats` channel
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(default)]
    pub active_apis: u64,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub slow_count: u64,
    #[serde(default)]
    pub avg_response_time: f64,
}

#[derive(Default)]
struct StatsData {
    stats: Option<DashboardStats>,
    activities: Vec<Value>,
    alerts: Vec<Value>,
    paused: bool,
    last_updated: Option<DateTime<Utc>>,
}

/// Listener-side registrations owned by a view
struct Attachment {
    handle: ManagerHandle,
    ids: Vec<ListenerId>,
}

/// Latest stats, activity feed and alerts.
///
/// Fed by the `stats`, `activity` and `alert` live messages and by the
/// polling fallback.
pub struct StatsView {
    data: RwLock<StatsData>,
    attachment: Mutex<Option<Attachment>>,
}

impl StatsView {
    pub const MAX_ACTIVITIES: usize = 100;
    pub const MAX_ALERTS: usize = 50;

    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(StatsData::default()),
            attachment: Mutex::new(None),
        })
    }

    /// Build a view already listening on `handle`
    pub fn attach(handle: &ManagerHandle) -> Arc<Self> {
        let view = Self::new();
        view.listen(handle);
        view
    }

    /// Register this view's listeners. Replaces any earlier registration.
    pub fn listen(self: &Arc<Self>, handle: &ManagerHandle) {
        self.detach();

        let weak = Arc::downgrade(self);
        let ids = vec![
            register(handle, MessageKind::Stats, &weak, |view, data| view.apply_stats(data)),
            register(handle, MessageKind::Activity, &weak, |view, data| {
                view.add_activity(data.clone())
            }),
            register(handle, MessageKind::Alert, &weak, |view, data| {
                view.add_alert(data.clone())
            }),
        ];

        *self.attachment.lock().unwrap_or_else(PoisonError::into_inner) = Some(Attachment {
            handle: handle.clone(),
            ids,
        });
    }

    /// Unregister from the manager, if attached
    pub fn detach(&self) {
        let attachment = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(attachment) = attachment {
            for id in attachment.ids {
                attachment.handle.unregister(id);
            }
        }
    }

    pub fn apply_stats(&self, data: &Value) {
        match serde_json::from_value::<DashboardStats>(data.clone()) {
            Ok(stats) => {
                let mut d = self.write();
                d.stats = Some(stats);
                d.last_updated = Some(Utc::now());
            }
            Err(e) => debug!(error = %e, "Ignoring stats payload with unexpected shape"),
        }
    }

    /// Prepend one activity; dropped while paused
    pub fn add_activity(&self, activity: Value) {
        let mut d = self.write();
        if d.paused {
            return;
        }
        d.activities.insert(0, activity);
        d.activities.truncate(Self::MAX_ACTIVITIES);
        d.last_updated = Some(Utc::now());
    }

    pub fn add_alert(&self, alert: Value) {
        let mut d = self.write();
        d.alerts.insert(0, alert);
        d.alerts.truncate(Self::MAX_ALERTS);
        d.last_updated = Some(Utc::now());
    }

    /// Prepend a polled batch (newest first) ahead of the existing feed.
    /// Empty batches and batches arriving while paused are dropped.
    pub fn merge_activities(&self, mut activities: Vec<Value>) {
        let mut d = self.write();
        if d.paused || activities.is_empty() {
            return;
        }
        activities.append(&mut d.activities);
        activities.truncate(Self::MAX_ACTIVITIES);
        d.activities = activities;
        d.last_updated = Some(Utc::now());
    }

    pub fn replace_alerts(&self, mut alerts: Vec<Value>) {
        let mut d = self.write();
        alerts.truncate(Self::MAX_ALERTS);
        d.alerts = alerts;
        d.last_updated = Some(Utc::now());
    }

    pub fn clear_activities(&self) {
        self.write().activities.clear();
    }

    pub fn set_paused(&self, paused: bool) {
        self.write().paused = paused;
    }

    /// Flip the pause flag and return the new value
    pub fn toggle_pause(&self) -> bool {
        let mut d = self.write();
        d.paused = !d.paused;
        d.paused
    }

    pub fn is_paused(&self) -> bool {
        self.read().paused
    }

    pub fn stats(&self) -> Option<DashboardStats> {
        self.read().stats.clone()
    }

    pub fn activities(&self) -> Vec<Value> {
        self.read().activities.clone()
    }

    /// Newest `n` activities
    pub fn recent_activities(&self, n: usize) -> Vec<Value> {
        self.read().activities.iter().take(n).cloned().collect()
    }

    pub fn alerts(&self) -> Vec<Value> {
        self.read().alerts.clone()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.read().last_updated
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StatsData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StatsData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One point of the response-time series
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimePoint {
    #[serde(default)]
    pub time: Value,
    #[serde(default)]
    pub avg_time: f64,
    #[serde(default)]
    pub max_time: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestVolume {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPerformance {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub avg_time: f64,
}

/// Chart series as served by `chart-data` and pushed as `chart_update`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    #[serde(default)]
    pub response_time_data: Vec<ResponseTimePoint>,
    #[serde(default)]
    pub request_volume_data: Vec<RequestVolume>,
    #[serde(default)]
    pub api_performance_data: Vec<ApiPerformance>,
}

/// Latest chart series
pub struct ChartView {
    data: RwLock<Option<ChartData>>,
    attachment: Mutex<Option<Attachment>>,
}

impl ChartView {
    pub const TOP_API_COUNT: usize = 5;

    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(None),
            attachment: Mutex::new(None),
        })
    }

    pub fn attach(handle: &ManagerHandle) -> Arc<Self> {
        let view = Self::new();
        view.listen(handle);
        view
    }

    pub fn listen(self: &Arc<Self>, handle: &ManagerHandle) {
        self.detach();

        let weak = Arc::downgrade(self);
        let id = register(handle, MessageKind::ChartUpdate, &weak, |view, data| {
            view.apply_chart_data(data)
        });

        *self.attachment.lock().unwrap_or_else(PoisonError::into_inner) = Some(Attachment {
            handle: handle.clone(),
            ids: vec![id],
        });
    }

    pub fn detach(&self) {
        let attachment = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(attachment) = attachment {
            for id in attachment.ids {
                attachment.handle.unregister(id);
            }
        }
    }

    pub fn apply_chart_data(&self, data: &Value) {
        match serde_json::from_value::<ChartData>(data.clone()) {
            Ok(chart) => {
                *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(chart);
            }
            Err(e) => debug!(error = %e, "Ignoring chart payload with unexpected shape"),
        }
    }

    pub fn chart_data(&self) -> Option<ChartData> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First entries of the API performance ranking
    pub fn top_apis(&self) -> Vec<ApiPerformance> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|d| {
                d.api_performance_data
                    .iter()
                    .take(Self::TOP_API_COUNT)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Register a listener that forwards to `view` while it is alive
fn register<V, F>(handle: &ManagerHandle, kind: MessageKind, view: &Weak<V>, apply: F) -> ListenerId
where
    V: Send + Sync + 'static,
    F: Fn(&V, &Value) + Send + Sync + 'static,
{
    let view = Weak::clone(view);
    handle.register_listener(kind, move |data| {
        if let Some(view) = view.upgrade() {
            apply(&*view, data);
        }
    })
}
