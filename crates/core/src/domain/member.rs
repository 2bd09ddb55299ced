use serde::{Deserialize, Serialize};

/// A human chat member eligible for bug assignment, or the user acting on
/// an update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl Member {
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self { id, first_name: first_name.into(), last_name: None, username: None }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// Name persisted alongside records: username, else first name.
    pub fn stored_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }

    /// Label for selection buttons: `@username`, else full name.
    pub fn display_name(&self) -> String {
        match (&self.username, &self.last_name) {
            (Some(username), _) => format!("@{username}"),
            (None, Some(last_name)) => format!("{} {last_name}", self.first_name),
            (None, None) => self.first_name.clone(),
        }
    }
}
