// Configuration (TOML + env overrides)
pub mod config;

// Live connection manager
pub mod live;

// Stats/chart consumers and polling fallback
pub mod dashboard;

// Task supervision for the binary
pub mod app;
