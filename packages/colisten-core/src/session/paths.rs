//! Store paths of a session document and its children.

use crate::protocol_constants::{
    FIELD_IS_BUFFERING, FIELD_LAST_ACTIVITY, FIELD_USERS, PATH_SEPARATOR,
};

/// Builds absolute store paths for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPath {
    document: String,
}

impl SessionPath {
    pub fn new(root: &str, code: &str) -> Self {
        Self {
            document: format!("{}{}{}", root, PATH_SEPARATOR, code),
        }
    }

    /// Path of the whole session document (`<root>/<code>`).
    #[must_use]
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Absolute path of a top-level field.
    #[must_use]
    pub fn field(&self, field: &str) -> String {
        format!("{}{}{}", self.document, PATH_SEPARATOR, field)
    }

    /// Absolute path of `users/<id>/isBuffering`.
    #[must_use]
    pub fn user_buffering(&self, user_id: &str) -> String {
        format!(
            "{}{}{}",
            self.document,
            PATH_SEPARATOR,
            user_buffering_key(user_id)
        )
    }

    /// Absolute path of `lastActivity`.
    #[must_use]
    pub fn last_activity(&self) -> String {
        self.field(FIELD_LAST_ACTIVITY)
    }
}

/// Relative merge key of a membership record (`users/<id>`).
#[must_use]
pub fn user_key(user_id: &str) -> String {
    format!("{}{}{}", FIELD_USERS, PATH_SEPARATOR, user_id)
}

/// Relative merge key of a member's buffering flag.
#[must_use]
pub fn user_buffering_key(user_id: &str) -> String {
    format!("{}{}{}", user_key(user_id), PATH_SEPARATOR, FIELD_IS_BUFFERING)
}
