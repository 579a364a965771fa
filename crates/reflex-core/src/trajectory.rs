use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{SessionId, TrajectoryId};

/// Kind of physical UI action captured during live execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Navigate,
    Click,
    /// Typing a value into a field.
    Input,
    /// Selecting an option from a dropdown.
    Select,
    Scroll,
    KeyPress,
    Evaluate,
    WaitFor,
    Screenshot,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionType::Navigate => "navigate",
            ActionType::Click => "click",
            ActionType::Input => "input",
            ActionType::Select => "select",
            ActionType::Scroll => "scroll",
            ActionType::KeyPress => "key_press",
            ActionType::Evaluate => "evaluate",
            ActionType::WaitFor => "wait_for",
            ActionType::Screenshot => "screenshot",
        };
        write!(f, "{}", s)
    }
}

/// One physical UI action. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAction {
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    /// Page URL at the time of the action (the target URL for navigations).
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Typed text, selected option, evaluated expression, or pressed key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(i32, i32)>,
}

impl RecordedAction {
    pub fn new(action_type: ActionType, url: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action_type,
            url: url.into(),
            selector: None,
            value: None,
            coordinates: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_coordinates(mut self, x: i32, y: i32) -> Self {
        self.coordinates = Some((x, y));
        self
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(ActionType::Navigate, url)
    }

    pub fn click(url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::new(ActionType::Click, url).with_selector(selector)
    }

    pub fn input(url: impl Into<String>, selector: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ActionType::Input, url)
            .with_selector(selector)
            .with_value(value)
    }
}

/// A trajectory captured during live execution, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedTrajectory {
    pub task: String,
    pub start_url: String,
    pub end_url: String,
    pub actions: Vec<RecordedAction>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
}

impl RecordedTrajectory {
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds().max(0)
    }
}

/// Incrementally builds a [`RecordedTrajectory`] while a task executes.
///
/// `finish` consumes the recorder, so a trajectory can only be finalized once.
#[derive(Debug)]
pub struct TrajectoryRecorder {
    task: String,
    start_url: String,
    current_url: String,
    actions: Vec<RecordedAction>,
    start_time: DateTime<Utc>,
}

impl TrajectoryRecorder {
    pub fn new(task: impl Into<String>, start_url: impl Into<String>) -> Self {
        let start_url = start_url.into();
        Self {
            task: task.into(),
            current_url: start_url.clone(),
            start_url,
            actions: Vec::new(),
            start_time: Utc::now(),
        }
    }

    /// Append an action. Navigations update the recorder's notion of the current page.
    pub fn record(&mut self, action: RecordedAction) {
        if action.action_type == ActionType::Navigate {
            self.current_url = action.url.clone();
        }
        self.actions.push(action);
    }

    pub fn navigate(&mut self, url: &str) {
        self.record(RecordedAction::navigate(url));
    }

    pub fn click(&mut self, selector: &str) {
        let action = RecordedAction::click(self.current_url.clone(), selector);
        self.record(action);
    }

    pub fn input(&mut self, selector: &str, value: &str) {
        let action = RecordedAction::input(self.current_url.clone(), selector, value);
        self.record(action);
    }

    pub fn evaluate(&mut self, expr: &str) {
        let action = RecordedAction::new(ActionType::Evaluate, self.current_url.clone()).with_value(expr);
        self.record(action);
    }

    pub fn wait_for(&mut self, selector: &str) {
        let action = RecordedAction::new(ActionType::WaitFor, self.current_url.clone()).with_selector(selector);
        self.record(action);
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    /// Finalize the trajectory. `end_url` defaults to the last page visited.
    pub fn finish(self, success: bool, end_url: Option<&str>) -> RecordedTrajectory {
        RecordedTrajectory {
            end_url: end_url.map(str::to_string).unwrap_or(self.current_url),
            task: self.task,
            start_url: self.start_url,
            actions: self.actions,
            start_time: self.start_time,
            end_time: Utc::now(),
            success,
        }
    }
}

/// A persisted trajectory. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: TrajectoryId,
    pub session_id: SessionId,
    pub task: String,
    pub url: String,
    pub domain: Option<String>,
    pub actions: Vec<RecordedAction>,
    pub success: bool,
    #[serde(default)]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}
