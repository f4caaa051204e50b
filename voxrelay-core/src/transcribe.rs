//! Speech-to-text upload client.
//!
//! One multipart POST per voice note, no retries, no timeout beyond the HTTP
//! client's defaults. Every failure path degrades to `None` with a warning;
//! a voice note that cannot be transcribed is dropped, never fatal.

use reqwest::multipart;
use tracing::{debug, warn};

/// Model name sent with every transcription request.
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Response format requested from the endpoint.
const RESPONSE_FORMAT: &str = "text";

/// File name of the uploaded audio part. The bytes are sent verbatim; the
/// part's content type is left to the multipart default.
const UPLOAD_FILE_NAME: &str = "ptt.oga";

/// HTTP client for a Whisper-style `/audio/transcriptions` endpoint.
pub struct Transcriber {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl Transcriber {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Upload `audio` and return the response body as transcript text.
    ///
    /// Returns `None` on any construction or transport failure. The body of a
    /// non-success response is still returned after a warning; the caller
    /// decides whether it counts as a transcript.
    pub async fn transcribe(&self, audio: &[u8]) -> Option<String> {
        let file_part = multipart::Part::bytes(audio.to_vec()).file_name(UPLOAD_FILE_NAME);
        let form = multipart::Form::new()
            .text("model", TRANSCRIPTION_MODEL)
            .text("response_format", RESPONSE_FORMAT)
            .part("file", file_part);

        let response = match self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "transcription request failed");
                return None;
            }
        };

        let status = response.status();
        debug!(%status, "transcription response received");

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "unable to read transcription response body");
                return None;
            }
        };

        if !status.is_success() {
            warn!(%status, body = %body, "transcription endpoint returned non-success status");
        }

        Some(body)
    }
}
