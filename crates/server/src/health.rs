use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use switchboard_agent::runtime::{AgentRuntime, RuntimeError};
use switchboard_agent::AgentHealth;

#[derive(Clone)]
pub struct HealthState {
    runtime: AgentRuntime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub agents: Vec<AgentHealth>,
    pub checked_at: String,
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, payload) = assemble(state.runtime.health().await);
    (status_code, Json(payload))
}

fn assemble(report: Result<Vec<AgentHealth>, RuntimeError>) -> (StatusCode, HealthResponse) {
    let (service, agents) = match report {
        Ok(agents) => {
            let down: Vec<&str> =
                agents.iter().filter(|agent| !agent.alive).map(|agent| agent.agent.as_str()).collect();
            let service = if down.is_empty() {
                HealthCheck { status: "ready", detail: format!("{} agents alive", agents.len()) }
            } else {
                HealthCheck { status: "degraded", detail: format!("not answering: {}", down.join(", ")) }
            };
            (service, agents)
        }
        Err(error) => (HealthCheck { status: "degraded", detail: error.to_string() }, Vec::new()),
    };

    let ready = service.status == "ready";
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service,
        agents,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, payload)
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use switchboard_agent::runtime::RuntimeError;
    use switchboard_agent::AgentHealth;

    use crate::health::{assemble, health, HealthState};
    use crate::test_support::runtime;

    fn agent(name: &str, alive: bool) -> AgentHealth {
        AgentHealth { agent: name.to_string(), alive, handled: alive.then_some(0) }
    }

    #[tokio::test]
    async fn health_returns_ready_when_every_agent_answers() {
        let (status, Json(payload)) = health(State(HealthState { runtime: runtime() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.agents.len(), 6);
        assert_eq!(payload.agents[0].agent, "dispatcher");
        assert_eq!(payload.service.detail, "6 agents alive");
    }

    #[test]
    fn silent_worker_degrades_health() {
        let (status, payload) =
            assemble(Ok(vec![agent("dispatcher", true), agent("mail", false), agent("music", true)]));

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.service.detail, "not answering: mail");
        assert_eq!(payload.agents.len(), 3);
    }

    #[test]
    fn stopped_runtime_degrades_health() {
        let (status, payload) = assemble(Err(RuntimeError::Stopped));

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.service.detail, "agent runtime has stopped");
        assert!(payload.agents.is_empty());
    }
}
