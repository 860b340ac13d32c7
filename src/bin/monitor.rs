//! Headless monitoring session: polls a tracking API, reconciles the
//! snapshot locally and prints per-schedule progress. Remembers the selected
//! schedule across runs via the configured selection file.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kolekta_api::client::{
    HttpPollSource, JsonFileSelectionStore, LocalChannelClient, ReconciliationClient,
};
use kolekta_api::config::Config;
use kolekta_api::fanout::{FanoutHub, Scope};
use kolekta_api::progress::select_active_station;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::load("config.yaml").unwrap_or_else(|e| {
        tracing::warn!("Using default config: {e}");
        serde_yaml::from_str("cors_permissive: true").expect("default config")
    });

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    tracing::info!(base_url, "Monitoring session starting");

    // Out-of-process session: push events are not available here, the
    // periodic poll carries the full state
    let channel = LocalChannelClient::new(Arc::new(FanoutHub::new()));
    let poll = HttpPollSource::new(&base_url);
    let selection = JsonFileSelectionStore::new(&config.tracking.selection_file);

    let mut client = ReconciliationClient::new(Scope::Monitoring, channel, poll, selection)
        .with_poll_interval(config.tracking.poll_interval());
    if let Err(e) = client.mount().await {
        tracing::error!("Failed to start session: {e}");
        return;
    }

    let mut interval = tokio::time::interval(config.tracking.poll_interval());
    loop {
        interval.tick().await;
        client.process_pending_events();
        if let Err(e) = client.refresh().await {
            tracing::warn!("Poll failed: {e}");
            continue;
        }

        for schedule in client.schedules() {
            let active = select_active_station(&schedule.stations)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "-".to_string());
            let selected = client.selected_id() == Some(schedule.id);
            tracing::info!(
                schedule_id = schedule.id,
                driver_id = schedule.driver_id,
                status = schedule.status.as_str(),
                progress = schedule.progress_percentage,
                active_station = %active,
                selected,
                "schedule"
            );
        }
    }
}
