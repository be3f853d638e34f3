use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Classifier model selected by the user at submission time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    #[serde(alias = "mobilenet")]
    #[strum(to_string = "fast", serialize = "mobilenet")]
    Fast,
    #[default]
    #[serde(alias = "efficientnet")]
    #[strum(to_string = "accurate", serialize = "efficientnet")]
    Accurate,
}

impl ModelChoice {
    /// Identifier the classifier service expects in `model_name`.
    pub fn classifier_id(&self) -> &'static str {
        match self {
            ModelChoice::Fast => "mobilenet",
            ModelChoice::Accurate => "efficientnet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_index: i64,
    pub label: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn confidence_percent(&self) -> f64 {
        self.confidence * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            Severity::High
        } else if confidence > 0.6 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Where the analysed image lives: inline as a data URI or in an object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageReference {
    Inline(String),
    Stored(String),
}

impl ImageReference {
    pub fn as_str(&self) -> &str {
        match self {
            ImageReference::Inline(uri) => uri,
            ImageReference::Stored(url) => url,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ImageReference::Inline(_))
    }
}

impl From<String> for ImageReference {
    fn from(value: String) -> Self {
        if value.starts_with("data:") {
            ImageReference::Inline(value)
        } else {
            ImageReference::Stored(value)
        }
    }
}

impl From<ImageReference> for String {
    fn from(value: ImageReference) -> Self {
        match value {
            ImageReference::Inline(uri) => uri,
            ImageReference::Stored(url) => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub image_reference: ImageReference,
    pub model_used: ModelChoice,
    pub prediction: Prediction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_report: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn severity(&self) -> Severity {
        Severity::from_confidence(self.prediction.confidence)
    }
}

/// A report as returned over HTTP, with its derived severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    #[serde(flatten)]
    pub report: ScanReport,
    pub severity: Severity,
}

impl From<ScanReport> for ReportResponse {
    fn from(report: ScanReport) -> Self {
        let severity = report.severity();
        Self { report, severity }
    }
}

/// Lightweight listing entry without the image payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCard {
    pub id: Uuid,
    pub label: String,
    pub confidence: f64,
    pub severity: Severity,
    pub model_used: ModelChoice,
    pub created_at: DateTime<Utc>,
}

impl From<&ScanReport> for ReportCard {
    fn from(report: &ScanReport) -> Self {
        Self {
            id: report.id,
            label: report.prediction.label.clone(),
            confidence: report.prediction.confidence,
            severity: report.severity(),
            model_used: report.model_used,
            created_at: report.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthCount {
    /// `YYYY-MM`
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsSummary {
    pub total_scans: usize,
    pub unique_labels: usize,
    pub most_common_label: Option<String>,
    pub average_confidence: f64,
    pub label_frequency: Vec<LabelCount>,
    pub monthly_counts: Vec<MonthCount>,
    /// `YYYY-MM` with the most scans; the earliest such month on ties.
    pub most_active_month: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_scans: usize,
    pub average_confidence: f64,
    pub most_common_label: Option<String>,
    pub scans_this_month: usize,
    pub recent: Vec<ReportCard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThemePreference {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub picture_url: Option<String>,
    pub theme: ThemePreference,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub theme: Option<ThemePreference>,
}

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl PasswordChange {
    /// Rejects requests the identity provider would refuse anyway.
    pub fn validate(&self) -> Result<(), String> {
        if self.current_password.is_empty() {
            return Err("Current password is required".to_string());
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            ));
        }
        if self.new_password == self.current_password {
            return Err("New password must differ from the current one".to_string());
        }
        Ok(())
    }
}
