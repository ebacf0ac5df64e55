//! Permission scopes granted to users and the single matching function used by
//! action gates.
//!
//! Scopes travel as strings such as `record.declare[event=birth|death]` or
//! `workqueue[id=assigned-to-you|recent]`. They are parsed once at the boundary
//! into [`Scope`] and matched against a [`ScopeRequest`] with [`Scope::permits`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scope names without their options.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ScopeKind {
    #[serde(rename = "record.declare")]
    RecordDeclare,
    #[serde(rename = "record.validate")]
    RecordValidate,
    #[serde(rename = "record.register")]
    RecordRegister,
    #[serde(rename = "record.read")]
    RecordRead,
    #[serde(rename = "record.print")]
    RecordPrint,
    #[serde(rename = "record.correct")]
    RecordCorrect,
    #[serde(rename = "record.archive")]
    RecordArchive,
    #[serde(rename = "record.custom-action")]
    RecordCustomAction,
    #[serde(rename = "workqueue")]
    Workqueue,
    #[serde(rename = "search")]
    Search,
    #[serde(rename = "user.create")]
    UserCreate,
    #[serde(rename = "user.update")]
    UserUpdate,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 12] = [
        ScopeKind::RecordDeclare,
        ScopeKind::RecordValidate,
        ScopeKind::RecordRegister,
        ScopeKind::RecordRead,
        ScopeKind::RecordPrint,
        ScopeKind::RecordCorrect,
        ScopeKind::RecordArchive,
        ScopeKind::RecordCustomAction,
        ScopeKind::Workqueue,
        ScopeKind::Search,
        ScopeKind::UserCreate,
        ScopeKind::UserUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::RecordDeclare => "record.declare",
            ScopeKind::RecordValidate => "record.validate",
            ScopeKind::RecordRegister => "record.register",
            ScopeKind::RecordRead => "record.read",
            ScopeKind::RecordPrint => "record.print",
            ScopeKind::RecordCorrect => "record.correct",
            ScopeKind::RecordArchive => "record.archive",
            ScopeKind::RecordCustomAction => "record.custom-action",
            ScopeKind::Workqueue => "workqueue",
            ScopeKind::Search => "search",
            ScopeKind::UserCreate => "user.create",
            ScopeKind::UserUpdate => "user.update",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = ScopeParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ScopeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| ScopeParseError::UnknownScope(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeParseError {
    #[error("unknown scope '{0}'")]
    UnknownScope(String),
    #[error("scope '{scope}' has malformed options '{options}'")]
    MalformedOptions { scope: String, options: String },
    #[error("scope '{scope}' does not accept option '{option}'")]
    UnsupportedOption { scope: String, option: String },
    #[error("scope '{scope}' requires option '{option}'")]
    MissingOption { scope: String, option: String },
}

/// Allow-list option; `Any` when the scope string carries no constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Allow {
    #[default]
    Any,
    Only(BTreeSet<String>),
}

impl Allow {
    pub fn only<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Allow::Only(values.into_iter().map(Into::into).collect())
    }

    /// A restricted list requires the requested value to be present and listed.
    fn admits(&self, requested: Option<&str>) -> bool {
        match self {
            Allow::Any => true,
            Allow::Only(values) => requested.is_some_and(|value| values.contains(value)),
        }
    }
}

/// A granted permission with its typed options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    RecordDeclare { events: Allow },
    RecordValidate { events: Allow },
    RecordRegister { events: Allow },
    RecordRead { events: Allow },
    RecordPrint { events: Allow },
    RecordCorrect { events: Allow },
    RecordArchive { events: Allow },
    RecordCustomAction { events: Allow, actions: Allow },
    Workqueue { ids: BTreeSet<String> },
    Search { events: Allow },
    UserCreate,
    UserUpdate,
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::RecordDeclare { .. } => ScopeKind::RecordDeclare,
            Scope::RecordValidate { .. } => ScopeKind::RecordValidate,
            Scope::RecordRegister { .. } => ScopeKind::RecordRegister,
            Scope::RecordRead { .. } => ScopeKind::RecordRead,
            Scope::RecordPrint { .. } => ScopeKind::RecordPrint,
            Scope::RecordCorrect { .. } => ScopeKind::RecordCorrect,
            Scope::RecordArchive { .. } => ScopeKind::RecordArchive,
            Scope::RecordCustomAction { .. } => ScopeKind::RecordCustomAction,
            Scope::Workqueue { .. } => ScopeKind::Workqueue,
            Scope::Search { .. } => ScopeKind::Search,
            Scope::UserCreate => ScopeKind::UserCreate,
            Scope::UserUpdate => ScopeKind::UserUpdate,
        }
    }

    /// Unconstrained scope of the given kind. Workqueue scopes have no
    /// unconstrained form and come back with an empty id list.
    pub fn unrestricted(kind: ScopeKind) -> Self {
        match kind {
            ScopeKind::RecordDeclare => Scope::RecordDeclare { events: Allow::Any },
            ScopeKind::RecordValidate => Scope::RecordValidate { events: Allow::Any },
            ScopeKind::RecordRegister => Scope::RecordRegister { events: Allow::Any },
            ScopeKind::RecordRead => Scope::RecordRead { events: Allow::Any },
            ScopeKind::RecordPrint => Scope::RecordPrint { events: Allow::Any },
            ScopeKind::RecordCorrect => Scope::RecordCorrect { events: Allow::Any },
            ScopeKind::RecordArchive => Scope::RecordArchive { events: Allow::Any },
            ScopeKind::RecordCustomAction => Scope::RecordCustomAction {
                events: Allow::Any,
                actions: Allow::Any,
            },
            ScopeKind::Workqueue => Scope::Workqueue {
                ids: BTreeSet::new(),
            },
            ScopeKind::Search => Scope::Search { events: Allow::Any },
            ScopeKind::UserCreate => Scope::UserCreate,
            ScopeKind::UserUpdate => Scope::UserUpdate,
        }
    }

    fn events(&self) -> Option<&Allow> {
        match self {
            Scope::RecordDeclare { events }
            | Scope::RecordValidate { events }
            | Scope::RecordRegister { events }
            | Scope::RecordRead { events }
            | Scope::RecordPrint { events }
            | Scope::RecordCorrect { events }
            | Scope::RecordArchive { events }
            | Scope::RecordCustomAction { events, .. }
            | Scope::Search { events } => Some(events),
            Scope::Workqueue { .. } | Scope::UserCreate | Scope::UserUpdate => None,
        }
    }

    /// Whether this grant covers the requested operation: same kind, and every
    /// option constraint admits the requested value.
    pub fn permits(&self, request: &ScopeRequest<'_>) -> bool {
        if self.kind() != request.kind {
            return false;
        }
        if let Some(events) = self.events()
            && !events.admits(request.event)
        {
            return false;
        }
        match self {
            Scope::RecordCustomAction { actions, .. } => actions.admits(request.custom_action),
            Scope::Workqueue { ids } => request.workqueue.is_some_and(|id| ids.contains(id)),
            _ => true,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut options = Vec::new();
        if let Some(Allow::Only(events)) = self.events() {
            options.push(format_option("event", events));
        }
        match self {
            Scope::RecordCustomAction {
                actions: Allow::Only(actions),
                ..
            } => options.push(format_option("customActionType", actions)),
            Scope::Workqueue { ids } => options.push(format_option("id", ids)),
            _ => {}
        }
        if options.is_empty() {
            write!(f, "{}", self.kind())
        } else {
            write!(f, "{}[{}]", self.kind(), options.join(","))
        }
    }
}

fn format_option(key: &str, values: &BTreeSet<String>) -> String {
    let joined = values.iter().map(String::as_str).collect::<Vec<_>>();
    format!("{}={}", key, joined.join("|"))
}

impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (name, options) = match raw.split_once('[') {
            Some((name, rest)) => {
                let body = rest
                    .strip_suffix(']')
                    .ok_or_else(|| ScopeParseError::MalformedOptions {
                        scope: name.to_string(),
                        options: rest.to_string(),
                    })?;
                (name, parse_options(name, body)?)
            }
            None => (raw, Vec::new()),
        };
        let kind: ScopeKind = name.parse()?;
        let mut scope = Scope::unrestricted(kind);

        for (key, values) in options {
            let accepted = match (&mut scope, key.as_str()) {
                (Scope::Workqueue { ids }, "id") => {
                    *ids = values;
                    true
                }
                (Scope::RecordCustomAction { actions, .. }, "customActionType") => {
                    *actions = Allow::Only(values);
                    true
                }
                (Scope::UserCreate | Scope::UserUpdate | Scope::Workqueue { .. }, _) => false,
                (other, "event") => {
                    set_events(other, values);
                    true
                }
                _ => false,
            };
            if !accepted {
                return Err(ScopeParseError::UnsupportedOption {
                    scope: name.to_string(),
                    option: key,
                });
            }
        }

        if let Scope::Workqueue { ids } = &scope
            && ids.is_empty()
        {
            return Err(ScopeParseError::MissingOption {
                scope: name.to_string(),
                option: "id".into(),
            });
        }
        Ok(scope)
    }
}

fn set_events(scope: &mut Scope, values: BTreeSet<String>) {
    match scope {
        Scope::RecordDeclare { events }
        | Scope::RecordValidate { events }
        | Scope::RecordRegister { events }
        | Scope::RecordRead { events }
        | Scope::RecordPrint { events }
        | Scope::RecordCorrect { events }
        | Scope::RecordArchive { events }
        | Scope::RecordCustomAction { events, .. }
        | Scope::Search { events } => *events = Allow::Only(values),
        Scope::Workqueue { .. } | Scope::UserCreate | Scope::UserUpdate => {}
    }
}

fn parse_options(
    scope: &str,
    body: &str,
) -> Result<Vec<(String, BTreeSet<String>)>, ScopeParseError> {
    let malformed = || ScopeParseError::MalformedOptions {
        scope: scope.to_string(),
        options: body.to_string(),
    };
    body.split(',')
        .map(|pair| {
            let (key, values) = pair.split_once('=').ok_or_else(malformed)?;
            let values = values
                .split('|')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>();
            if key.trim().is_empty() || values.is_empty() {
                return Err(malformed());
            }
            Ok((key.trim().to_string(), values))
        })
        .collect()
}

impl Serialize for Scope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The operation a user is attempting, matched against granted scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRequest<'a> {
    pub kind: ScopeKind,
    pub event: Option<&'a str>,
    pub workqueue: Option<&'a str>,
    pub custom_action: Option<&'a str>,
}

impl<'a> ScopeRequest<'a> {
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            event: None,
            workqueue: None,
            custom_action: None,
        }
    }

    pub fn event(mut self, event: &'a str) -> Self {
        self.event = Some(event);
        self
    }

    pub fn workqueue(mut self, id: &'a str) -> Self {
        self.workqueue = Some(id);
        self
    }

    pub fn custom_action(mut self, action: &'a str) -> Self {
        self.custom_action = Some(action);
        self
    }
}

/// All scopes granted to one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<Scope>);

impl ScopeSet {
    pub fn new(scopes: Vec<Scope>) -> Self {
        Self(scopes)
    }

    /// Parses every scope string, failing on the first malformed entry.
    pub fn parse<I, S>(raw: I) -> Result<Self, ScopeParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .map(|scope| scope.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn grants(&self, request: &ScopeRequest<'_>) -> bool {
        self.0.iter().any(|scope| scope.permits(request))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_allow_list() {
        let scope: Scope = "record.declare[event=birth|death]".parse().expect("scope");
        assert_eq!(scope.kind(), ScopeKind::RecordDeclare);
        let birth = ScopeRequest::new(ScopeKind::RecordDeclare).event("birth");
        let tennis = ScopeRequest::new(ScopeKind::RecordDeclare).event("tennis-club");
        assert!(scope.permits(&birth));
        assert!(!scope.permits(&tennis));
        assert!(!scope.permits(&ScopeRequest::new(ScopeKind::RecordDeclare)));
    }

    #[test]
    fn unrestricted_scope_admits_any_event() {
        let scope: Scope = "record.register".parse().expect("scope");
        assert!(scope.permits(&ScopeRequest::new(ScopeKind::RecordRegister).event("birth")));
        assert!(scope.permits(&ScopeRequest::new(ScopeKind::RecordRegister)));
        assert!(!scope.permits(&ScopeRequest::new(ScopeKind::RecordDeclare)));
    }

    #[test]
    fn workqueue_requires_listed_id() {
        let scope: Scope = "workqueue[id=assigned-to-you|recent]".parse().expect("scope");
        assert!(scope.permits(&ScopeRequest::new(ScopeKind::Workqueue).workqueue("recent")));
        assert!(!scope.permits(&ScopeRequest::new(ScopeKind::Workqueue).workqueue("sent")));
        assert!(matches!(
            "workqueue".parse::<Scope>(),
            Err(ScopeParseError::MissingOption { .. })
        ));
    }

    #[test]
    fn custom_action_matches_both_constraints() {
        let scope: Scope = "record.custom-action[event=birth,customActionType=ESCALATE]"
            .parse()
            .expect("scope");
        let request = ScopeRequest::new(ScopeKind::RecordCustomAction)
            .event("birth")
            .custom_action("ESCALATE");
        assert!(scope.permits(&request));
        assert!(!scope.permits(&request.custom_action("APPROVE")));
        assert!(!scope.permits(&request.event("death")));
    }

    #[test]
    fn display_round_trips() {
        for raw in [
            "record.declare[event=birth|death]",
            "record.custom-action[event=birth,customActionType=ESCALATE]",
            "workqueue[id=assigned-to-you|recent]",
            "user.create",
        ] {
            let scope: Scope = raw.parse().expect("scope");
            assert_eq!(scope.to_string(), raw);
        }
    }

    #[test]
    fn rejects_unknown_and_malformed_scopes() {
        assert!(matches!(
            "record.teleport".parse::<Scope>(),
            Err(ScopeParseError::UnknownScope(_))
        ));
        assert!(matches!(
            "record.declare[event]".parse::<Scope>(),
            Err(ScopeParseError::MalformedOptions { .. })
        ));
        assert!(matches!(
            "user.create[event=birth]".parse::<Scope>(),
            Err(ScopeParseError::UnsupportedOption { .. })
        ));
    }

    #[test]
    fn scope_set_deserializes_from_strings() {
        let scopes: ScopeSet =
            serde_json::from_str(r#"["record.declare[event=birth]", "search"]"#).expect("scopes");
        assert!(scopes.grants(&ScopeRequest::new(ScopeKind::Search).event("death")));
        assert!(!scopes.grants(&ScopeRequest::new(ScopeKind::RecordDeclare).event("death")));
    }
}
