use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use shared::{ModelChoice, Prediction};
use std::time::Duration;
use url::Url;

use super::{Classifier, ClassifierError};
use crate::analysis::upload::ImageUpload;
use crate::config::ClassifierConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model_used: String,
    pub result: PredictResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResult {
    pub predicted_class: i64,
    pub label: String,
    pub confidence: f64,
}

impl PredictResponse {
    pub fn into_prediction(self) -> Result<Prediction, ClassifierError> {
        let PredictResult {
            predicted_class,
            label,
            confidence,
        } = self.result;

        if label.trim().is_empty() {
            return Err(ClassifierError::InvalidResponse("empty label".to_string()));
        }
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ClassifierError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }

        Ok(Prediction {
            class_index: predicted_class,
            label,
            confidence,
        })
    }
}

/// Client for `POST /predict/?model_name=...` with a multipart `file` field.
#[derive(Clone)]
pub struct HttpClassifier {
    http_client: HttpClient,
    predict_url: Url,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let predict_url = Url::parse(&base)?.join("predict/")?;

        Ok(Self {
            http_client,
            predict_url,
        })
    }

    pub fn request_url(&self, model: ModelChoice) -> Url {
        let mut url = self.predict_url.clone();
        url.query_pairs_mut()
            .append_pair("model_name", model.classifier_id());
        url
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        image: &ImageUpload,
        model: ModelChoice,
    ) -> Result<Prediction, ClassifierError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.kind().mime_type())?;
        let form = Form::new().part("file", part);

        let url = self.request_url(model);
        log::info!("Calling classifier at {} for model {}", url, model);

        let response = self.http_client.post(url).multipart(form).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            log::error!("Classifier request failed: {} - {}", status, body);
            return Err(ClassifierError::Status { status, body });
        }

        let body = response.text().await?;
        let parsed: PredictResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        log::debug!("Classifier reported model {}", parsed.model_used);

        parsed.into_prediction()
    }
}
