use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_core::Stream;
use serde::Serialize;
use tinyclaw_bus::ALL_TOPICS;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Metrics {
    pub agents_total: usize,
    pub agents_in_teams: usize,
    pub teams_total: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stream", get(event_stream))
        .route("/metrics", get(get_metrics))
}

async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut receivers = Vec::with_capacity(ALL_TOPICS.len());
    for topic in ALL_TOPICS {
        receivers.push(state.bus.subscribe(*topic).await);
    }

    let stream = async_stream::stream! {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            for rx in receivers.iter_mut() {
                while let Ok(msg) = rx.try_recv() {
                    if let Ok(json) = serde_json::to_string(&msg) {
                        yield Ok(Event::default().data(json));
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn get_metrics(State(state): State<AppState>) -> Json<Metrics> {
    let settings = match state.config_store.load().await {
        Ok(s) => s,
        Err(err) => {
            tracing::warn!(%err, "failed to load settings for metrics snapshot");
            return Json(Metrics {
                agents_total: 0,
                agents_in_teams: 0,
                teams_total: 0,
            });
        }
    };

    let agents_in_teams = settings
        .teams
        .values()
        .map(|team| team.members.len())
        .sum();

    Json(Metrics {
        agents_total: settings.agents.len(),
        agents_in_teams,
        teams_total: settings.teams.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use tempfile::TempDir;
    use tinyclaw_bus::EventBus;
    use tinyclaw_config::ConfigStore;

    async fn state_with_yaml(yaml: &str) -> (TempDir, AppState) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("main.yaml");
        tokio::fs::write(&path, yaml).await.unwrap();
        let state = AppState {
            config_store: ConfigStore::new(&path),
            bus: EventBus::new(),
        };
        (tmp, state)
    }

    #[tokio::test]
    async fn metrics_counts_agents_and_teams_from_settings() {
        let (_tmp, state) = state_with_yaml(
            "workspacePath: /var/lib/tinyclaw\n\
             defaultAgent: researcher\n\
             agents:\n\
             \x20 researcher:\n\
             \x20   id: researcher\n\
             \x20   displayName: Researcher\n\
             \x20   command: researcher-cli\n\
             \x20 writer:\n\
             \x20   id: writer\n\
             \x20   displayName: Writer\n\
             \x20   command: writer-cli\n\
             teams:\n\
             \x20 alpha:\n\
             \x20   id: alpha\n\
             \x20   displayName: Alpha\n\
             \x20   leader: researcher\n\
             \x20   members: [researcher, writer]\n",
        )
        .await;

        let Json(metrics) = get_metrics(State(state)).await;
        assert_eq!(metrics.agents_total, 2);
        assert_eq!(metrics.teams_total, 1);
        assert_eq!(metrics.agents_in_teams, 2);
    }

    #[tokio::test]
    async fn metrics_defaults_to_zero_when_settings_cannot_be_loaded() {
        let tmp = TempDir::new().unwrap();
        let state = AppState {
            config_store: ConfigStore::new(tmp.path().join("missing.yaml")),
            bus: EventBus::new(),
        };

        let Json(metrics) = get_metrics(State(state)).await;
        assert_eq!(metrics.agents_total, 0);
        assert_eq!(metrics.teams_total, 0);
    }
}
