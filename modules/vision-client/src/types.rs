use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BatchAnnotateRequest {
    pub requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnnotateImageRequest {
    pub image: ImageContent,
    pub features: Vec<Feature>,
}

impl AnnotateImageRequest {
    /// Face + label detection for one image, sent inline as base64.
    pub fn faces_and_labels(bytes: &[u8]) -> Self {
        Self {
            image: ImageContent {
                content: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
            features: vec![
                Feature {
                    feature_type: "FACE_DETECTION".to_string(),
                },
                Feature {
                    feature_type: "LABEL_DETECTION".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageContent {
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BatchAnnotateResponse {
    #[serde(default)]
    pub responses: Vec<AnnotateImageResponse>,
}

/// Per-image result. Vision reports per-image failures in `error` instead of failing the batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateImageResponse {
    #[serde(default)]
    pub face_annotations: Vec<FaceAnnotation>,
    #[serde(default)]
    pub label_annotations: Vec<EntityAnnotation>,
    pub error: Option<Status>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAnnotation {
    pub detection_confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityAnnotation {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_both_features() {
        let req = BatchAnnotateRequest {
            requests: vec![AnnotateImageRequest::faces_and_labels(b"abc")],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["requests"][0]["image"]["content"], "YWJj");
        assert_eq!(json["requests"][0]["features"][0]["type"], "FACE_DETECTION");
        assert_eq!(json["requests"][0]["features"][1]["type"], "LABEL_DETECTION");
    }

    #[test]
    fn per_image_errors_are_embedded() {
        let resp: BatchAnnotateResponse = serde_json::from_str(
            r#"{"responses": [
                {"labelAnnotations": [{"description": "Crowd", "score": 0.91}]},
                {"error": {"code": 3, "message": "Bad image data."}},
                {}
            ]}"#,
        )
        .unwrap();
        assert_eq!(resp.responses.len(), 3);
        assert_eq!(resp.responses[0].label_annotations[0].description, "Crowd");
        assert_eq!(resp.responses[1].error.as_ref().unwrap().code, 3);
        assert!(resp.responses[2].face_annotations.is_empty());
    }
}
