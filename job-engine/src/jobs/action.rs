// Actions
// Declared commands and their runtime dispatch form

use crate::db::{Connections, Role};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::path::PathBuf;

/// Command type tag selecting the host shell instead of a connection.
pub const SHELL_TYPE: &str = "shell";

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("command {owner}.{name}: reference a specific type, or define exactly one connection")]
    AmbiguousConnection { owner: String, name: String },
    #[error("command {owner}.{name} references unknown connection type {kind}")]
    UnknownConnection {
        owner: String,
        name: String,
        kind: String,
    },
    #[error("command {owner}.{name} needs one of inline or file")]
    MissingBody { owner: String, name: String },
    #[error("command {owner}.{name} defines both inline and file")]
    ConflictingBody { owner: String, name: String },
}

/// One declared command inside a step or check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub inline: String,
    /// Home (~) is not resolved.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub batch_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Command {
    /// Short label for logs: the name if set, otherwise the body.
    pub fn label(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.inline.is_empty() {
            &self.inline
        } else {
            &self.file
        }
    }

    fn source(&self, owner: &str) -> Result<Source, ActionError> {
        match (self.inline.is_empty(), self.file.is_empty()) {
            (false, true) => Ok(Source::Inline(self.inline.clone())),
            (true, false) => Ok(Source::File(PathBuf::from(&self.file))),
            (true, true) => Err(ActionError::MissingBody {
                owner: owner.to_string(),
                name: self.name.clone(),
            }),
            (false, false) => Err(ActionError::ConflictingBody {
                owner: owner.to_string(),
                name: self.name.clone(),
            }),
        }
    }

    /// Resolve into the runtime action, dispatched explicitly by type tag.
    ///
    /// An empty tag is only legal when exactly one connection is configured;
    /// that connection is then the target.
    pub fn to_action(
        &self,
        owner: &str,
        connections: &Connections,
    ) -> Result<Action, ActionError> {
        let source = self.source(owner)?;
        if self.kind == SHELL_TYPE {
            return Ok(Action::Shell(ShellAction {
                name: self.label().to_string(),
                source,
            }));
        }
        let connection = if self.kind.is_empty() {
            connections
                .sole()
                .ok_or_else(|| ActionError::AmbiguousConnection {
                    owner: owner.to_string(),
                    name: self.name.clone(),
                })?
                .to_string()
        } else {
            if connections.get(&self.kind).is_err() {
                return Err(ActionError::UnknownConnection {
                    owner: owner.to_string(),
                    name: self.name.clone(),
                    kind: self.kind.clone(),
                });
            }
            self.kind.clone()
        };
        Ok(Action::Statement(StatementAction {
            name: self.label().to_string(),
            source,
            connection,
            batch_mode: self.batch_mode,
            role: self.role,
        }))
    }
}

/// Where an action body comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Inline(String),
    File(PathBuf),
}

/// A shell command run on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellAction {
    pub name: String,
    pub source: Source,
}

/// A statement run against a named connection.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementAction {
    pub name: String,
    pub source: Source,
    pub connection: String,
    pub batch_mode: bool,
    /// Required role of the target at execution time, when declared.
    pub role: Option<Role>,
}

/// Runtime action, dispatched by tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Shell(ShellAction),
    Statement(StatementAction),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Shell(shell) => &shell.name,
            Action::Statement(statement) => &statement.name,
        }
    }
}
