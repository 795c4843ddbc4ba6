mod gate;
pub mod metrics;
mod orchestrator;

pub use gate::{
    AlwaysOnline, ConnectivityProbe, HttpConnectivityProbe, QuotaTrialGate, TrialGate,
    UnlimitedTrial,
};
pub use metrics::{Metrics, MetricsSummary, TimingStats};
pub use orchestrator::{Orchestrator, OrchestratorDeps};
