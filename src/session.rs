//! Session handle
//!
//! The identity provider itself lives outside this crate. All the sync engine
//! needs from it is the current user and a notification whenever that user
//! changes; `SessionHandle` is the seam the provider pushes those through.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque identifier, used as the document key in every collection
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    current: watch::Sender<Option<User>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    /// Called by the identity provider after a successful sign-in
    pub fn sign_in(&self, user: User) {
        log::info!("Session signed in: {}", user.id);
        self.current.send_replace(Some(user));
    }

    /// Called by the identity provider after sign-out
    pub fn sign_out(&self) {
        if self.current.send_replace(None).is_some() {
            log::info!("Session signed out");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let session = SessionHandle::new();
        assert!(session.current_user().is_none());

        session.sign_in(User::new("u1"));
        assert_eq!(session.current_user().map(|u| u.id), Some("u1".to_string()));

        session.sign_out();
        assert!(session.current_user().is_none());
    }

    #[test]
    fn test_user_serializes_camel_case() {
        let user = User {
            id: "u1".to_string(),
            email: Some("a@b.c".to_string()),
            display_name: Some("Ada".to_string()),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["displayName"], "Ada");

        let minimal: User = serde_json::from_str(r#"{"id":"u2"}"#).unwrap();
        assert_eq!(minimal, User::new("u2"));
    }
}
