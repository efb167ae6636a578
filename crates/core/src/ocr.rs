//! Optical character recognition over rendered pages.
//!
//! Engines are not shared: [`recognize_pages`] asks the factory for a fresh
//! engine inside every page task and drops it when the task ends.

use crate::error::IngestError;
use crate::extractor::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine};
use rayon::prelude::*;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OcrDetection {
    #[serde(default)]
    pub bbox: Vec<[f32; 2]>,
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
}

pub trait OcrEngine {
    fn recognize(&mut self, image: &PageImage) -> Result<Vec<OcrDetection>, IngestError>;
}

pub trait OcrEngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn OcrEngine>, IngestError>;
}

/// OCR every image on a pool of `workers` threads. The returned texts are
/// indexed like `images`; the first failing page fails the batch.
pub fn recognize_pages(
    factory: &dyn OcrEngineFactory,
    images: &[PageImage],
    workers: usize,
) -> Result<Vec<String>, IngestError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|index| format!("ocr-worker-{index}"))
        .build()
        .map_err(|error| IngestError::OcrFailed(format!("failed to start ocr pool: {error}")))?;

    pool.install(|| {
        images
            .par_iter()
            .map(|image| -> Result<String, IngestError> {
                let mut engine = factory.create()?;
                let detections = engine.recognize(image)?;
                Ok(detections_to_text(&detections))
            })
            .collect::<Result<Vec<_>, IngestError>>()
    })
}

fn detections_to_text(detections: &[OcrDetection]) -> String {
    detections
        .iter()
        .map(|detection| detection.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    image_base64: String,
    page: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    detections: Vec<OcrDetection>,
}

/// Posts one page image to an HTTP OCR service and reads back detections.
pub struct HttpOcrEngine {
    config: OcrEndpointConfig,
    client: Client,
}

impl HttpOcrEngine {
    pub fn new(config: OcrEndpointConfig) -> Result<Self, IngestError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

impl OcrEngine for HttpOcrEngine {
    fn recognize(&mut self, image: &PageImage) -> Result<Vec<OcrDetection>, IngestError> {
        let payload = OcrRequest {
            image_base64: STANDARD.encode(&image.png),
            page: image.number,
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;

        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "ocr request to {} returned {} for page {}",
                self.config.endpoint,
                response.status(),
                image.number
            )));
        }

        let body = response.text()?;
        parse_ocr_response(&body)
    }
}

fn parse_ocr_response(body: &str) -> Result<Vec<OcrDetection>, IngestError> {
    let parsed: OcrResponse = serde_json::from_str(body)
        .map_err(|error| IngestError::OcrFailed(format!("malformed ocr response: {error}")))?;
    Ok(parsed.detections)
}

pub struct HttpOcrEngineFactory {
    config: OcrEndpointConfig,
}

impl HttpOcrEngineFactory {
    pub fn new(config: OcrEndpointConfig) -> Self {
        Self { config }
    }
}

impl OcrEngineFactory for HttpOcrEngineFactory {
    fn create(&self) -> Result<Box<dyn OcrEngine>, IngestError> {
        Ok(Box::new(HttpOcrEngine::new(self.config.clone())?))
    }
}

/// Stand-in used when no OCR endpoint is configured.
pub struct UnconfiguredOcr;

impl OcrEngineFactory for UnconfiguredOcr {
    fn create(&self) -> Result<Box<dyn OcrEngine>, IngestError> {
        Err(IngestError::OcrFailed(
            "document needs OCR but no ocr endpoint is configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        created: AtomicUsize,
    }

    struct PageNumberEngine;

    impl OcrEngine for PageNumberEngine {
        fn recognize(&mut self, image: &PageImage) -> Result<Vec<OcrDetection>, IngestError> {
            if image.png == b"bad" {
                return Err(IngestError::OcrFailed(format!("page {}", image.number)));
            }
            Ok(vec![
                OcrDetection {
                    bbox: Vec::new(),
                    text: format!("line one of {}", image.number),
                    confidence: 0.9,
                },
                OcrDetection {
                    bbox: Vec::new(),
                    text: "   ".to_string(),
                    confidence: 0.1,
                },
                OcrDetection {
                    bbox: Vec::new(),
                    text: "line two".to_string(),
                    confidence: 0.8,
                },
            ])
        }
    }

    impl OcrEngineFactory for CountingFactory {
        fn create(&self) -> Result<Box<dyn OcrEngine>, IngestError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(PageNumberEngine))
        }
    }

    fn images(count: u32) -> Vec<PageImage> {
        (1..=count)
            .map(|number| PageImage {
                number,
                png: vec![number as u8],
            })
            .collect()
    }

    #[test]
    fn each_page_gets_its_own_engine_and_order_is_kept() -> Result<(), IngestError> {
        let factory = CountingFactory {
            created: AtomicUsize::new(0),
        };

        let texts = recognize_pages(&factory, &images(9), 3)?;

        assert_eq!(factory.created.load(Ordering::SeqCst), 9);
        assert_eq!(texts.len(), 9);
        for (index, text) in texts.iter().enumerate() {
            assert_eq!(text, &format!("line one of {}\nline two", index + 1));
        }
        Ok(())
    }

    #[test]
    fn one_failing_page_fails_the_document() {
        let factory = CountingFactory {
            created: AtomicUsize::new(0),
        };
        let mut pages = images(4);
        pages[2].png = b"bad".to_vec();

        let result = recognize_pages(&factory, &pages, 2);
        assert!(matches!(result, Err(IngestError::OcrFailed(_))));
    }

    #[test]
    fn response_detections_are_parsed() -> Result<(), IngestError> {
        let body = r#"{"detections":[{"bbox":[[0,0],[10,0],[10,5],[0,5]],"text":"Total","confidence":0.97}]}"#;
        let detections = parse_ocr_response(body)?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "Total");
        assert_eq!(detections[0].bbox.len(), 4);
        Ok(())
    }

    #[test]
    fn response_without_detections_is_empty() -> Result<(), IngestError> {
        assert!(parse_ocr_response("{}")?.is_empty());
        assert!(parse_ocr_response("not json").is_err());
        Ok(())
    }

    #[test]
    fn unconfigured_ocr_refuses_to_create_engines() {
        assert!(UnconfiguredOcr.create().is_err());
    }

    fn endpoint(server: &MockServer, api_key: Option<&str>) -> OcrEndpointConfig {
        OcrEndpointConfig {
            endpoint: server.url("/ocr"),
            api_key: api_key.map(str::to_string),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn http_engine_posts_base64_page_with_bearer_key() -> Result<(), IngestError> {
        let server = MockServer::start();
        let ocr = server.mock(|when, then| {
            when.method(POST)
                .path("/ocr")
                .header("authorization", "Bearer secret")
                .body_contains(format!("\"image_base64\":\"{}\"", STANDARD.encode(b"png")))
                .body_contains("\"page\":3");
            then.status(200).json_body(json!({
                "detections": [
                    { "bbox": [[0, 0], [4, 0], [4, 2], [0, 2]], "text": "Delivery note #7", "confidence": 0.93 }
                ]
            }));
        });

        let mut engine = HttpOcrEngine::new(endpoint(&server, Some("secret")))?;
        let detections = engine.recognize(&PageImage {
            number: 3,
            png: b"png".to_vec(),
        })?;

        ocr.assert();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "Delivery note #7");
        Ok(())
    }

    #[test]
    fn http_factory_serves_every_page_from_the_pool() -> Result<(), IngestError> {
        let server = MockServer::start();
        let ocr = server.mock(|when, then| {
            when.method(POST).path("/ocr");
            then.status(200)
                .json_body(json!({ "detections": [{ "text": "scanned line" }] }));
        });

        let factory = HttpOcrEngineFactory::new(endpoint(&server, None));
        let texts = recognize_pages(&factory, &images(4), 2)?;

        ocr.assert_hits(4);
        assert_eq!(texts, vec!["scanned line".to_string(); 4]);
        Ok(())
    }

    #[test]
    fn http_error_status_fails_the_page() -> Result<(), IngestError> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/ocr");
            then.status(502);
        });

        let mut engine = HttpOcrEngine::new(endpoint(&server, None))?;
        let result = engine.recognize(&PageImage {
            number: 1,
            png: b"png".to_vec(),
        });
        assert!(matches!(result, Err(IngestError::OcrFailed(_))));
        Ok(())
    }
}
