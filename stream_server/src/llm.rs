//! Text-generation service boundary.
//!
//! The analysis and explanation features only need "prompt in, plain text out".
//! `GeminiClient` talks to the Generative Language REST API with a blocking
//! `reqwest` client; it is only ever called from worker threads, never from the
//! session loop. `OfflineGenerator` stands in when no API key is configured.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use stream_common::{Result, StreamError};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that turns a prompt into text.
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate; empty when there is none.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Blocking client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create a client for `model` authenticated with `api_key`.
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StreamError::Generation(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
        })
    }

    /// Read the key from `GEMINI_API_KEY`, falling back to `API_KEY`.
    ///
    /// Returns `Ok(None)` when neither is set.
    pub fn from_env(model: impl Into<String>) -> Result<Option<Self>> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        match key {
            Some(key) => Ok(Some(Self::new(key, model)?)),
            None => Ok(None),
        }
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", API_BASE, self.model);
        let request = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };
        debug!("Requesting completion from {}", self.model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(|e| StreamError::Generation(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StreamError::Generation(format!(
                "API error: {}",
                response.status()
            )));
        }
        let body: GenerateResponse = response
            .json()
            .map_err(|e| StreamError::Generation(e.to_string()))?;
        Ok(body.text())
    }
}

/// Generator used without credentials; every request fails.
pub struct OfflineGenerator;

impl TextGenerator for OfflineGenerator {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(StreamError::Generation(String::from(
            "no API key configured (set GEMINI_API_KEY)",
        )))
    }
}
