//! Scenario replay
//!
//! A scenario is a TOML script of agents and the operations applied to them,
//! with optional expectations after each step. The `acs-sim` binary replays
//! scenarios against a fresh service; tests use the same runner.
//!
//! ```toml
//! [[agents]]
//! name = "music"
//! category = "content"
//! group = "player"      # agents with the same label share a background group
//! visible = true
//!
//! [[steps]]
//! agent = "music"
//! action = "start"      # start | stop | show | hide | unregister
//! expect = "normal"
//!
//! [[steps]]
//! agent = "music"
//! action = "start"
//! expect_error = "already_playing"
//! ```

use crate::service::AudioChannelService;
use acs_common::{AgentId, ChannelCategory, Error, GroupId, PlayState, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub agents: Vec<ScenarioAgent>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioAgent {
    pub name: String,
    pub category: ChannelCategory,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Stop,
    Show,
    Hide,
    Unregister,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Show => "show",
            Action::Hide => "hide",
            Action::Unregister => "unregister",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedError {
    AlreadyPlaying,
    UnknownAgent,
}

impl ExpectedError {
    fn matches(&self, error: &Error) -> bool {
        matches!(
            (self, error),
            (ExpectedError::AlreadyPlaying, Error::AlreadyPlaying(_))
                | (ExpectedError::UnknownAgent, Error::UnknownAgent(_))
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub agent: String,
    pub action: Action,
    /// State of `agent` after the step
    #[serde(default)]
    pub expect: Option<PlayState>,
    #[serde(default)]
    pub expect_error: Option<ExpectedError>,
    /// States of other agents after the step
    #[serde(default)]
    pub expect_states: BTreeMap<String, PlayState>,
}

/// What happened in one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub agent: String,
    pub action: Action,
    /// Agent's state after the step; `None` once unregistered
    pub state: Option<PlayState>,
    pub error: Option<String>,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:<3} {:<12} {:<10}", self.index + 1, self.agent, self.action.to_string())?;
        match (&self.state, &self.error) {
            (_, Some(error)) => write!(f, " error: {}", error),
            (Some(state), None) => write!(f, " -> {}", state),
            (None, None) => write!(f, " -> (gone)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub steps: Vec<StepOutcome>,
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)
            .map_err(|e| Error::Scenario(format!("Failed to parse scenario: {}", e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashMap::new();
        for agent in &self.agents {
            if seen.insert(agent.name.as_str(), ()).is_some() {
                return Err(Error::Scenario(format!("duplicate agent name '{}'", agent.name)));
            }
        }
        for (index, step) in self.steps.iter().enumerate() {
            let names = std::iter::once(&step.agent).chain(step.expect_states.keys());
            for name in names {
                if !seen.contains_key(name.as_str()) {
                    return Err(Error::Scenario(format!(
                        "step {} refers to unknown agent '{}'",
                        index + 1,
                        name
                    )));
                }
            }
            if step.expect.is_some() && step.expect_error.is_some() {
                return Err(Error::Scenario(format!(
                    "step {} sets both expect and expect_error",
                    index + 1
                )));
            }
        }
        Ok(())
    }
}

/// Replay `scenario` against `service`
///
/// Stops at the first failed expectation or unexpected error.
pub async fn run(scenario: &Scenario, service: &Arc<AudioChannelService>) -> Result<ScenarioReport> {
    if let Some(name) = &scenario.name {
        info!("Running scenario '{}'", name);
    }

    let mut groups: HashMap<&str, GroupId> = HashMap::new();
    let mut agents: HashMap<&str, AgentId> = HashMap::new();
    for declared in &scenario.agents {
        let group = declared
            .group
            .as_deref()
            .map(|label| *groups.entry(label).or_default());
        let id = service.register(declared.category, group, None).await;
        if declared.visible {
            service.set_visibility(id, true).await?;
        }
        debug!("Scenario agent '{}' is {}", declared.name, id);
        agents.insert(declared.name.as_str(), id);
    }

    let mut report = ScenarioReport::default();
    for (index, step) in scenario.steps.iter().enumerate() {
        let id = lookup(&agents, &step.agent)?;
        let result = match step.action {
            Action::Start => service.start_playing(id).await.map(|_| ()),
            Action::Stop => service.stop_playing(id).await,
            Action::Show => service.set_visibility(id, true).await,
            Action::Hide => service.set_visibility(id, false).await,
            Action::Unregister => service.unregister(id).await,
        };

        let error = match (result, step.expect_error) {
            (Ok(()), None) => None,
            (Err(e), Some(expected)) if expected.matches(&e) => Some(e.to_string()),
            (Ok(()), Some(expected)) => {
                return Err(Error::Scenario(format!(
                    "step {}: {} {} succeeded, expected {:?}",
                    index + 1,
                    step.agent,
                    step.action,
                    expected
                )));
            }
            (Err(e), _) => {
                return Err(Error::Scenario(format!(
                    "step {}: {} {} failed: {}",
                    index + 1,
                    step.agent,
                    step.action,
                    e
                )));
            }
        };

        let state = service.play_state(id).await.ok();
        if let Some(expected) = step.expect {
            check(index, &step.agent, expected, state)?;
        }
        for (name, expected) in &step.expect_states {
            let other = service.play_state(lookup(&agents, name)?).await.ok();
            check(index, name, *expected, other)?;
        }

        let outcome = StepOutcome {
            index,
            agent: step.agent.clone(),
            action: step.action,
            state,
            error,
        };
        debug!("{}", outcome);
        report.steps.push(outcome);
    }

    Ok(report)
}

fn lookup(agents: &HashMap<&str, AgentId>, name: &str) -> Result<AgentId> {
    agents
        .get(name)
        .copied()
        .ok_or_else(|| Error::Scenario(format!("unknown agent '{}'", name)))
}

fn check(index: usize, agent: &str, expected: PlayState, actual: Option<PlayState>) -> Result<()> {
    match actual {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(Error::Scenario(format!(
            "step {}: expected {} to be {}, got {}",
            index + 1,
            agent,
            expected,
            actual
        ))),
        None => Err(Error::Scenario(format!(
            "step {}: expected {} to be {}, but it is unregistered",
            index + 1,
            agent,
            expected
        ))),
    }
}
