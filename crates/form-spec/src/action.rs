//! Action gating: which workflow actions are offered to a user for an event.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dsl::{and, has_action, has_scope, not};
use crate::error::EvalError;
use crate::eval::{EvalContext, RecordAccessor, evaluate};
use crate::expr::Expr;
use crate::scope::{ScopeKind, ScopeRequest, ScopeSet};

/// Workflow action recorded against an event. Unknown names are custom
/// actions defined by the event configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionType {
    Create,
    Declare,
    Validate,
    Register,
    Print,
    Correct,
    Archive,
    Assign,
    Unassign,
    Custom(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Create => "CREATE",
            ActionType::Declare => "DECLARE",
            ActionType::Validate => "VALIDATE",
            ActionType::Register => "REGISTER",
            ActionType::Print => "PRINT_CERTIFICATE",
            ActionType::Correct => "REQUEST_CORRECTION",
            ActionType::Archive => "ARCHIVE",
            ActionType::Assign => "ASSIGN",
            ActionType::Unassign => "UNASSIGN",
            ActionType::Custom(name) => name,
        }
    }

    /// Scope a user needs before this action is ever offered.
    pub fn required_scope(&self) -> Option<ScopeKind> {
        match self {
            ActionType::Declare => Some(ScopeKind::RecordDeclare),
            ActionType::Validate => Some(ScopeKind::RecordValidate),
            ActionType::Register => Some(ScopeKind::RecordRegister),
            ActionType::Print => Some(ScopeKind::RecordPrint),
            ActionType::Correct => Some(ScopeKind::RecordCorrect),
            ActionType::Archive => Some(ScopeKind::RecordArchive),
            ActionType::Custom(_) => Some(ScopeKind::RecordCustomAction),
            ActionType::Create | ActionType::Assign | ActionType::Unassign => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("action type cannot be empty".into());
        }
        Ok(match trimmed {
            "CREATE" => ActionType::Create,
            "DECLARE" => ActionType::Declare,
            "VALIDATE" => ActionType::Validate,
            "REGISTER" => ActionType::Register,
            "PRINT_CERTIFICATE" => ActionType::Print,
            "REQUEST_CORRECTION" => ActionType::Correct,
            "ARCHIVE" => ActionType::Archive,
            "ASSIGN" => ActionType::Assign,
            "UNASSIGN" => ActionType::Unassign,
            other => ActionType::Custom(other.to_string()),
        })
    }
}

impl TryFrom<String> for ActionType {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ActionType> for String {
    fn from(action: ActionType) -> Self {
        action.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Requested,
    #[default]
    Accepted,
    Rejected,
}

/// One entry of an event's action history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl ActionRecord {
    pub fn accepted(action_type: ActionType) -> Self {
        Self {
            action_type,
            status: ActionStatus::Accepted,
            created_by: None,
        }
    }
}

/// The event an action would apply to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventState {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
    /// Latest declaration values, readable by gate expressions.
    #[serde(default)]
    pub declaration: Map<String, Value>,
}

impl EventState {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Self::default()
        }
    }

    /// Rejected and still-requested actions do not count as having happened.
    pub fn has_action(&self, action: &ActionType) -> bool {
        self.actions
            .iter()
            .any(|record| &record.action_type == action && record.status == ActionStatus::Accepted)
    }
}

/// The acting user and the scopes the permission store granted them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub scopes: ScopeSet,
}

/// A gated action offered by an event configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionConfig {
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub conditional: Expr,
}

impl ActionConfig {
    /// Offered once, to users holding the action's scope.
    pub fn with_default_gate(action_type: ActionType) -> Self {
        let conditional = default_gate(&action_type);
        Self {
            action_type,
            label: None,
            conditional,
        }
    }
}

/// `and(not(has_action(A)), has_scope(scope(A)))`, or just the history check
/// for actions without a scope.
pub fn default_gate(action_type: &ActionType) -> Expr {
    let not_done = not(has_action(action_type.clone()));
    match action_type.required_scope() {
        Some(scope) => and([not_done, has_scope(scope)]),
        None => not_done,
    }
}

/// Actions available for one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionCatalog {
    #[serde(rename = "event")]
    pub event_type: String,
    pub actions: Vec<ActionConfig>,
}

/// Context a gate expression is evaluated in.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub user: &'a User,
    pub event: &'a EventState,
    /// The action being gated; custom action scopes match against it.
    pub action: Option<&'a ActionType>,
    pub today: NaiveDate,
}

impl EvalContext for ActionContext<'_> {
    fn field_value(&self, id: &str) -> Result<Option<&Value>, EvalError> {
        Ok(self.event.declaration.value(id))
    }

    fn today(&self) -> NaiveDate {
        self.today
    }

    fn has_scope(&self, scope: ScopeKind) -> bool {
        let mut request = ScopeRequest::new(scope).event(&self.event.event_type);
        if let Some(ActionType::Custom(name)) = self.action {
            request = request.custom_action(name);
        }
        self.user.scopes.grants(&request)
    }

    fn has_action(&self, action: &ActionType) -> bool {
        self.event.has_action(action)
    }
}

/// Action types whose gate holds for this user and event, in catalog order.
/// A catalog for a different event type offers nothing.
pub fn offered_actions(
    catalog: &ActionCatalog,
    user: &User,
    event: &EventState,
    today: NaiveDate,
) -> Result<Vec<ActionType>, EvalError> {
    if catalog.event_type != event.event_type {
        tracing::debug!(
            catalog = %catalog.event_type,
            event = %event.event_type,
            "action catalog does not apply to event type"
        );
        return Ok(Vec::new());
    }
    let mut offered = Vec::new();
    for config in &catalog.actions {
        let ctx = ActionContext {
            user,
            event,
            action: Some(&config.action_type),
            today,
        };
        if evaluate(&config.conditional, &ctx)? {
            offered.push(config.action_type.clone());
        }
    }
    tracing::debug!(
        user = %user.id,
        event = %event.event_type,
        offered = offered.len(),
        "resolved offered actions"
    );
    Ok(offered)
}
