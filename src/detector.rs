use crate::types::{BoundingBox, Detection, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat};
use log::debug;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

#[async_trait]
pub trait Detector: Send + Sync {
    /// Detections in `image` coordinates, in the model's output order.
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// A detection model served over HTTP. The image is posted as a JPEG body and
/// the service answers with
/// `{"detections": [{"box": [x1, y1, x2, y2], "label": "car", "confidence": 0.9}]}`.
pub struct HttpDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpDetector {
    pub fn new(client: reqwest::Client, url: &str) -> HttpDetector {
        HttpDetector {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let mut body = Vec::new();
        DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut body, ImageOutputFormat::Jpeg(90))?;
        let json = self
            .client
            .post(self.url.as_str())
            .header(CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        let detections = parse_detections(&json)?;
        debug!("{} returned {} detections", self.url, detections.len());
        Ok(detections)
    }
}

pub fn parse_detections(json: &Value) -> Result<Vec<Detection>> {
    let results = json["detections"]
        .as_array()
        .ok_or_else(|| format_err!("Missing detections in JSON"))?;
    let mut detections = Vec::with_capacity(results.len());
    for result in results {
        let coords = result["box"]
            .as_array()
            .filter(|b| b.len() == 4)
            .ok_or_else(|| format_err!("Missing or malformed box field"))?;
        let mut xyxy = [0f32; 4];
        for (slot, v) in xyxy.iter_mut().zip(coords) {
            *slot = v
                .as_f64()
                .ok_or_else(|| format_err!("Non-numeric box coordinate {}", v))?
                as f32;
        }
        detections.push(Detection {
            bbox: BoundingBox {
                x1: xyxy[0],
                y1: xyxy[1],
                x2: xyxy[2],
                y2: xyxy[3],
            },
            label: result["label"]
                .as_str()
                .ok_or_else(|| format_err!("Missing label field"))?
                .to_string(),
            confidence: result["confidence"]
                .as_f64()
                .ok_or_else(|| format_err!("Missing confidence field"))?
                as f32,
        });
    }
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_detections_in_order() {
        let json = json!({
            "detections": [
                {"box": [10, 20, 110.5, 90], "label": "car", "confidence": 0.91},
                {"box": [0, 0, 5, 5], "label": "person", "confidence": 0.4}
            ]
        });
        let detections = parse_detections(&json).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "car");
        assert_eq!(
            detections[0].bbox,
            BoundingBox {
                x1: 10.0,
                y1: 20.0,
                x2: 110.5,
                y2: 90.0
            }
        );
        assert!((detections[0].confidence - 0.91).abs() < 1e-6);
        assert_eq!(detections[1].label, "person");
    }

    #[test]
    fn empty_list_is_fine() {
        assert!(parse_detections(&json!({"detections": []}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_detections(&json!({})).is_err());
        assert!(parse_detections(&json!({"detections": [{"box": [1, 2, 3], "label": "car", "confidence": 0.5}]})).is_err());
        assert!(parse_detections(&json!({"detections": [{"box": [1, 2, 3, 4], "confidence": 0.5}]})).is_err());
        assert!(parse_detections(&json!({"detections": [{"box": [1, 2, 3, "x"], "label": "car", "confidence": 0.5}]})).is_err());
    }
}
