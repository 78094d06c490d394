// Dashboard consumers of the live connection, plus the polling fallback

pub mod poller;
mod views;

pub use poller::{poll_stats_once, run_chart_poller, run_stats_poller, DashboardClient};
pub use views::{ApiPerformance, ChartData, ChartView, DashboardStats, RequestVolume, ResponseTimePoint, StatsView};

#[cfg(test)]
mod tests;
