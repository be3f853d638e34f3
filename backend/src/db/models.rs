use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ProfileUpdate, ThemePreference, UserProfile};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    // Cognito fields
    pub cognito_sub: String,
    pub cognito_username: Option<String>,
    pub cognito_access_token: Option<String>,
    pub cognito_refresh_token: Option<String>,
    // User fields
    pub email: String,
    pub name: String,
    pub picture_url: Option<String>,
    pub theme: ThemePreference,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl User {
    pub fn new(cognito_sub: String, email: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cognito_sub,
            cognito_username: None,
            cognito_access_token: None,
            cognito_refresh_token: None,
            email,
            name,
            picture_url: None,
            theme: ThemePreference::default(),
            created_at: now,
            updated_at: now,
            last_login: Some(now),
            is_active: true,
        }
    }

    pub fn update_last_login(&mut self) {
        self.last_login = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn clear_tokens(&mut self) {
        self.cognito_access_token = None;
        self.cognito_refresh_token = None;
        self.updated_at = Utc::now();
    }

    /// Applies a settings change; blank display names are ignored.
    pub fn apply_profile_update(&mut self, update: &ProfileUpdate) {
        if let Some(name) = update.display_name.as_deref().map(str::trim) {
            if !name.is_empty() {
                self.name = name.to_string();
            }
        }
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
        self.updated_at = Utc::now();
    }

    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            display_name: self.name.clone(),
            picture_url: self.picture_url.clone(),
            theme: self.theme,
        }
    }
}
