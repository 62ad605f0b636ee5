use std::time::Duration;

use serde::Serialize;
use switchboard_agent::directory::{DirectoryProvider, JsonFileDirectory};
use switchboard_agent::llm::client_from_config;
use switchboard_agent::runtime::AgentRuntime;
use switchboard_core::config::{AppConfig, LlmProvider, LoadOptions};

use crate::commands::{async_runtime, CommandResult};

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => report_for(&config),
        Err(error) => {
            let skipped = |name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            };
            summarize(vec![
                DoctorCheck {
                    name: "config_validation",
                    status: CheckStatus::Fail,
                    details: error.to_string(),
                },
                skipped("llm_readiness"),
                skipped("directory"),
                skipped("agent_liveness"),
            ])
        }
    }
}

/// Runs every check against an already validated configuration.
pub fn report_for(config: &AppConfig) -> DoctorReport {
    let mut checks = vec![DoctorCheck {
        name: "config_validation",
        status: CheckStatus::Pass,
        details: "configuration loaded and validated".to_string(),
    }];
    checks.push(check_llm(config));

    match async_runtime("doctor") {
        Ok(runtime) => {
            checks.push(runtime.block_on(check_directory(config)));
            checks.push(runtime.block_on(check_liveness(config)));
        }
        Err(failure) => {
            for name in ["directory", "agent_liveness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Fail,
                    details: failure.output.clone(),
                });
            }
        }
    }

    summarize(checks)
}

fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    if config.llm.provider == LlmProvider::Disabled {
        return DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: "no classifier configured; routing uses keyword fallback only".to_string(),
        };
    }

    match client_from_config(&config.llm) {
        Ok(_) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: format!(
                "{} client configured for model `{}`",
                config.llm.provider.as_str(),
                config.llm.model
            ),
        },
        Err(error) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Fail,
            details: format!("failed to build llm client: {error}"),
        },
    }
}

async fn check_directory(config: &AppConfig) -> DoctorCheck {
    let Some(path) = &config.directory.path else {
        return DoctorCheck {
            name: "directory",
            status: CheckStatus::Skipped,
            details: "no directory file configured; name lookups will find nobody".to_string(),
        };
    };

    match JsonFileDirectory::new(path).list_entities().await {
        Ok(entities) => DoctorCheck {
            name: "directory",
            status: CheckStatus::Pass,
            details: format!("loaded {} entries from `{}`", entities.len(), path.display()),
        },
        Err(error) => DoctorCheck {
            name: "directory",
            status: CheckStatus::Fail,
            details: format!("failed to load `{}`: {error:#}", path.display()),
        },
    }
}

async fn check_liveness(config: &AppConfig) -> DoctorCheck {
    let agents = match AgentRuntime::from_config(config) {
        Ok(agents) => agents,
        Err(error) => {
            return DoctorCheck {
                name: "agent_liveness",
                status: CheckStatus::Fail,
                details: format!("agent runtime failed to start: {error}"),
            }
        }
    };

    match tokio::time::timeout(LIVENESS_TIMEOUT, agents.health()).await {
        Ok(Ok(report)) => {
            let down: Vec<&str> = report
                .iter()
                .filter(|agent| !agent.alive)
                .map(|agent| agent.agent.as_str())
                .collect();
            if down.is_empty() {
                DoctorCheck {
                    name: "agent_liveness",
                    status: CheckStatus::Pass,
                    details: format!("{} agents answered", report.len()),
                }
            } else {
                DoctorCheck {
                    name: "agent_liveness",
                    status: CheckStatus::Fail,
                    details: format!("not answering: {}", down.join(", ")),
                }
            }
        }
        Ok(Err(error)) => DoctorCheck {
            name: "agent_liveness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
        Err(_) => DoctorCheck {
            name: "agent_liveness",
            status: CheckStatus::Fail,
            details: "dispatcher did not answer the health check".to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
