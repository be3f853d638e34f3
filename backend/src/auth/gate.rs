use chrono::{DateTime, Utc};

use super::models::Identity;

/// What the gate currently knows about the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unknown,
    Authenticated(Identity),
    Unauthenticated,
}

/// Notification pushed by the identity provider.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    SignedIn(Identity),
    SignedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    ProtectedView,
    ProtectedApi,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allow(Option<Identity>),
    /// The provider has not reported yet.
    Pending,
    RedirectToSignIn(String),
    Reject,
}

const PROTECTED_VIEWS: &[&str] = &["/dashboard", "/analyze", "/insights", "/settings"];
const PUBLIC_PATHS: &[&str] = &["/", "/health", "/auth/login", "/auth/callback"];
const ASSET_EXTENSIONS: &[&str] = &[
    ".html", ".css", ".js", ".wasm", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp",
];

pub fn classify_path(path: &str) -> Access {
    if PUBLIC_PATHS.contains(&path)
        || path.starts_with("/static/")
        || ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    {
        return Access::Public;
    }

    let trimmed = path.trim_end_matches('/');
    if PROTECTED_VIEWS
        .iter()
        .any(|view| trimmed == *view || trimmed.starts_with(&format!("{view}/")))
    {
        Access::ProtectedView
    } else {
        Access::ProtectedApi
    }
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    state: AuthState,
    sign_in_path: String,
}

impl AuthGate {
    pub fn new(sign_in_path: impl Into<String>) -> Self {
        Self {
            state: AuthState::Unknown,
            sign_in_path: sign_in_path.into(),
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn notify(&mut self, event: ProviderEvent, now: DateTime<Utc>) {
        self.state = match event {
            ProviderEvent::SignedIn(identity) if identity.is_active_at(now) => {
                AuthState::Authenticated(identity)
            }
            ProviderEvent::SignedIn(identity) => {
                log::debug!("Ignoring expired identity for user {}", identity.user_id);
                AuthState::Unauthenticated
            }
            ProviderEvent::SignedOut => AuthState::Unauthenticated,
        };
    }

    pub fn decide(&self, access: Access) -> GateDecision {
        match (&self.state, access) {
            (AuthState::Authenticated(identity), _) => GateDecision::Allow(Some(identity.clone())),
            (_, Access::Public) => GateDecision::Allow(None),
            (AuthState::Unknown, _) => GateDecision::Pending,
            (AuthState::Unauthenticated, Access::ProtectedView) => {
                GateDecision::RedirectToSignIn(self.sign_in_path.clone())
            }
            (AuthState::Unauthenticated, Access::ProtectedApi) => GateDecision::Reject,
        }
    }
}
