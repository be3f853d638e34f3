use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

use crate::config::CognitoConfig;

#[derive(Error, Debug)]
pub enum CognitoError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("URL parsing failed: {0}")]
    UrlError(#[from] url::ParseError),
    #[error("AWS Cognito error: {0}")]
    AwsError(String),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Rejected by Cognito: {0}")]
    Rejected(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CognitoTokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: u64,
}

// Cognito sends some booleans as strings
fn deserialize_string_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(serde::de::Error::custom(format!(
                "Invalid boolean string: {}",
                s
            ))),
        },
        _ => Err(serde::de::Error::custom("Expected boolean or string")),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CognitoUserInfo {
    pub sub: String,
    pub email: String,
    #[serde(deserialize_with = "deserialize_string_bool", default)]
    pub email_verified: bool,
    pub username: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

impl CognitoUserInfo {
    /// Full name if the provider sent one, else given + family, else the
    /// email's local part.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let joined = format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or_default(),
            self.family_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string();
        if !joined.is_empty() {
            return joined;
        }
        self.email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Clone)]
pub struct CognitoService {
    admin_client: CognitoClient,
    http_client: HttpClient,
    user_pool_id: String,
    client_id: String,
    client_secret: String,
    domain: String,
    redirect_uri: String,
    region: String,
}

impl CognitoService {
    pub fn new(admin_client: CognitoClient, config: &CognitoConfig) -> Self {
        Self {
            admin_client,
            http_client: HttpClient::new(),
            user_pool_id: config.user_pool_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            domain: config.domain.clone(),
            redirect_uri: config.redirect_uri.clone(),
            region: config.region.clone(),
        }
    }

    fn oauth_url(&self, endpoint: &str) -> String {
        format!(
            "https://{}.auth.{}.amazoncognito.com/oauth2/{}",
            self.domain, self.region, endpoint
        )
    }

    pub fn get_authorization_url(&self, state: &str) -> Result<String, CognitoError> {
        let mut url = Url::parse(&self.oauth_url("authorize"))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", "email openid profile")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    async fn post_token_form(
        &self,
        params: &HashMap<&str, &str>,
        action: &str,
    ) -> Result<CognitoTokenResponse, CognitoError> {
        let response = self
            .http_client
            .post(self.oauth_url("token"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(CognitoError::AwsError(format!(
                "{} failed: {}",
                action, error_text
            )));
        }

        Ok(response.json().await?)
    }

    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
    ) -> Result<CognitoTokenResponse, CognitoError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("code", code);
        params.insert("redirect_uri", self.redirect_uri.as_str());

        self.post_token_form(&params, "Token exchange").await
    }

    pub async fn get_user_info(&self, access_token: &str) -> Result<CognitoUserInfo, CognitoError> {
        let response = self
            .http_client
            .get(self.oauth_url("userInfo"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(CognitoError::AwsError(format!(
                "User info request failed: {}",
                error_text
            )));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<CognitoTokenResponse, CognitoError> {
        if refresh_token.is_empty() {
            return Err(CognitoError::InvalidToken("Empty refresh token".to_string()));
        }

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());
        params.insert("refresh_token", refresh_token);

        self.post_token_form(&params, "Token refresh").await
    }

    /// Revokes a refresh token and every access token issued from it.
    pub async fn revoke_token(&self, refresh_token: &str) -> Result<(), CognitoError> {
        let mut params = HashMap::new();
        params.insert("token", refresh_token);
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.as_str());

        let response = self
            .http_client
            .post(self.oauth_url("revoke"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(CognitoError::AwsError(format!(
                "Token revocation failed: {}",
                error_text
            )));
        }

        Ok(())
    }

    /// Changes the password of the user the access token belongs to. Wrong
    /// current passwords, expired tokens and policy violations are `Rejected`.
    pub async fn change_password(
        &self,
        access_token: &str,
        previous_password: &str,
        proposed_password: &str,
    ) -> Result<(), CognitoError> {
        self.admin_client
            .change_password()
            .access_token(access_token)
            .previous_password(previous_password)
            .proposed_password(proposed_password)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_not_authorized_exception()
                    || service_error.is_invalid_password_exception()
                    || service_error.is_invalid_parameter_exception()
                {
                    CognitoError::Rejected(service_error.to_string())
                } else {
                    CognitoError::AwsError(format!("ChangePassword failed: {}", service_error))
                }
            })?;

        Ok(())
    }

    pub async fn delete_account(&self, username: &str) -> Result<(), CognitoError> {
        self.admin_client
            .admin_delete_user()
            .user_pool_id(&self.user_pool_id)
            .username(username)
            .send()
            .await
            .map_err(|e| CognitoError::AwsError(format!("AdminDeleteUser failed: {}", e)))?;

        log::info!("Deleted Cognito user {} from pool {}", username, self.user_pool_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_info_accepts_string_booleans() {
        let info: CognitoUserInfo = serde_json::from_str(
            r#"{"sub":"abc","email":"ada@example.com","email_verified":"true","username":"google_1","given_name":"Ada","family_name":"Lovelace"}"#,
        )
        .unwrap();
        assert!(info.email_verified);
        assert_eq!(info.username.as_deref(), Some("google_1"));
        assert_eq!(info.display_name(), "Ada Lovelace");
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let info: CognitoUserInfo =
            serde_json::from_str(r#"{"sub":"abc","email":"grower@example.com"}"#).unwrap();
        assert!(!info.email_verified);
        assert_eq!(info.display_name(), "grower");
    }
}
