use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;

use crate::errors::{CropscanError, Result};
use crate::ingest::UploadedImage;
use crate::predictions::Prediction;
use crate::source::PredictionSource;

/// Adapter for a Roboflow-style hosted inference endpoint.
///
/// The detect API takes the image as a base64 string in a form-encoded POST
/// body, with the API key as a query parameter and the model identifier as a
/// path segment.
pub struct RemoteClassifier {
    api_url: String,
    api_key: String,
    model_id: String,
}

/// Wire schema of the endpoint response. Extra vendor fields (inference time,
/// image dimensions, detection boxes) are ignored.
#[derive(Deserialize)]
struct InferResponse {
    #[serde(default)]
    predictions: Vec<WirePrediction>,
}

#[derive(Deserialize)]
struct WirePrediction {
    class: String,
    confidence: f32,
}

impl RemoteClassifier {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            model_id: model_id.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), self.model_id)
    }

    fn parse_response(body: &str) -> Result<Vec<Prediction>> {
        let response: InferResponse = serde_json::from_str(body)?;
        Ok(response
            .predictions
            .into_iter()
            .map(|p| Prediction::new(p.class, p.confidence))
            .collect())
    }
}

impl PredictionSource for RemoteClassifier {
    fn name(&self) -> &str {
        "hosted"
    }

    fn predict(&self, upload: &UploadedImage) -> Result<Vec<Prediction>> {
        // The blocking client is built per call; predictions run on a blocking
        // worker thread and the construction cost is dwarfed by the round trip.
        let client = reqwest::blocking::Client::new();
        let encoded = BASE64.encode(&upload.jpeg);

        let response = client
            .post(self.endpoint())
            .query(&[("api_key", self.api_key.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encoded)
            .send()
            .map_err(|e| CropscanError::RemoteApi {
                operation: format!("inference call to {}", self.endpoint()),
                source: Box::new(e),
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| CropscanError::RemoteApi {
            operation: "response body read".to_string(),
            source: Box::new(e),
        })?;

        if !status.is_success() {
            return Err(CropscanError::ApiRejected {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        tracing::debug!(endpoint = %self.endpoint(), bytes = body.len(), "hosted inference response");
        Self::parse_response(&body)
    }
}
