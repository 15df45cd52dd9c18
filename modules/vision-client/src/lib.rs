pub mod error;
pub mod types;

pub use error::{Result, VisionError};
pub use types::{AnnotateImageResponse, EntityAnnotation, FaceAnnotation, Status};

use std::time::Duration;

use types::{AnnotateImageRequest, BatchAnnotateRequest, BatchAnnotateResponse};

const BASE_URL: &str = "https://vision.googleapis.com/v1";

pub struct VisionClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl VisionClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: http_client(Duration::from_secs(60)),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Run face + label detection on a batch of images in one request.
    ///
    /// The response has one entry per input image, in input order.
    pub async fn annotate_faces_and_labels(
        &self,
        images: &[Vec<u8>],
    ) -> Result<Vec<AnnotateImageResponse>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let body = BatchAnnotateRequest {
            requests: images
                .iter()
                .map(|bytes| AnnotateImageRequest::faces_and_labels(bytes))
                .collect(),
        };

        let url = format!("{}/images:annotate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        let parsed: BatchAnnotateResponse = serde_json::from_str(&text)?;
        if parsed.responses.len() != images.len() {
            return Err(VisionError::Parse(format!(
                "expected {} responses, got {}",
                images.len(),
                parsed.responses.len()
            )));
        }
        tracing::debug!(images = images.len(), "Vision batch annotated");
        Ok(parsed.responses)
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
