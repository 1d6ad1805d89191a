use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;

use crate::error::{Result, VtopError};

/// The expected challenge-solution shape: exactly this many uppercase
/// ASCII alphanumerics.
pub const SOLUTION_LEN: usize = 6;

const RECOGNITION_PROMPT: &str = "You are an OCR engine. Extract the uppercase letters (A-Z) \
    and numbers (0-9) from the following CAPTCHA image. Provide ONLY the characters with no \
    explanation.";

/// Remote (or local) text-recognition backend for challenge images.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

/// Recognizer backed by the Gemini generative-language API. One outbound
/// call per image, wrapped in an explicit deadline so a hung service cannot
/// block the run.
pub struct GeminiRecognizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    deadline: Duration,
}

impl GeminiRecognizer {
    pub fn new(api_key: String, deadline: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: "gemini-2.5-flash".to_string(),
            deadline,
        }
    }

    async fn request_text(&self, image: &[u8]) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": RECOGNITION_PROMPT },
                    { "inline_data": {
                        "mime_type": "image/jpeg",
                        "data": BASE64.encode(image),
                    }},
                ],
            }],
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(VtopError::Recognition(format!(
                "service responded with status {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .flatten()
            .next()
            .and_then(|c| c.content.parts)
            .into_iter()
            .flatten()
            .find_map(|p| p.text)
            .ok_or_else(|| VtopError::Recognition("response contained no text".to_string()))
    }
}

#[async_trait]
impl Recognizer for GeminiRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        match tokio::time::timeout(self.deadline, self.request_text(image)).await {
            Ok(result) => result,
            Err(_) => Err(VtopError::Recognition(format!(
                "no response within {:?}",
                self.deadline
            ))),
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Decodes one embedded challenge image, persists it, and runs it through
/// the recognizer chain. Retrying a failed solve is the login controller's
/// job, not this one's.
pub struct CaptchaResolver {
    primary: Box<dyn Recognizer>,
    fallback: Option<Box<dyn Recognizer>>,
    image_path: PathBuf,
}

impl CaptchaResolver {
    pub fn new(
        primary: Box<dyn Recognizer>,
        fallback: Option<Box<dyn Recognizer>>,
        image_path: PathBuf,
    ) -> Self {
        Self {
            primary,
            fallback,
            image_path,
        }
    }

    /// Solves the challenge embedded in `data_uri`.
    ///
    /// If the primary recognizer yields invalid-shape text (or fails), the
    /// fallback's validated result is returned instead; when both attempts
    /// are invalid the solve fails explicitly.
    pub async fn solve(&self, data_uri: &str) -> Result<String> {
        let image = decode_data_uri(data_uri)?;
        tokio::fs::write(&self.image_path, &image).await?;
        tracing::debug!(path = %self.image_path.display(), "challenge image persisted");

        match self.primary.recognize(&image).await {
            Ok(raw) => {
                if let Some(solution) = normalize_solution(&raw) {
                    return Ok(solution);
                }
                tracing::warn!(raw = %raw, "primary recognizer returned invalid-shape text");
            }
            Err(e) => tracing::warn!(error = %e, "primary recognizer failed"),
        }

        let Some(fallback) = &self.fallback else {
            return Err(VtopError::ChallengeSolve(
                "primary recognizer produced no valid solution and no fallback is configured"
                    .to_string(),
            ));
        };

        tracing::info!("retrying challenge with fallback recognizer");
        let raw = fallback.recognize(&image).await?;
        normalize_solution(&raw).ok_or_else(|| {
            VtopError::ChallengeSolve(format!(
                "fallback recognizer returned invalid-shape text: {raw:?}"
            ))
        })
    }
}

/// Extracts the binary payload of a `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let (_, payload) = uri.split_once(',').ok_or_else(|| {
        VtopError::ChallengeSolve("challenge image src is not a data URI".to_string())
    })?;
    BASE64
        .decode(payload.trim())
        .map_err(|e| VtopError::ChallengeSolve(format!("undecodable challenge payload: {e}")))
}

/// Case-normalizes raw recognizer output and checks it against the expected
/// shape. `None` means the text is unusable as a solution.
pub fn normalize_solution(raw: &str) -> Option<String> {
    let candidate = raw.trim().to_ascii_uppercase();
    let valid = candidate.len() == SOLUTION_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    valid.then_some(candidate)
}
