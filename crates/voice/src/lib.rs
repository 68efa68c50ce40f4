//! Stateless speech proxy endpoints.
//!
//! `/v1/voice/stt` and `/v1/voice/tts` forward verbatim to the configured
//! speech provider and hand its answer straight back. No audio is stored and
//! no state is kept between requests.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use webpilot_core::config::VoiceConfig;

const MAX_TTS_TEXT_CHARS: usize = 5000;

#[derive(Clone)]
struct VoiceState {
    client: reqwest::Client,
    stt_url: Option<String>,
    tts_url: Option<String>,
}

/// Build the voice proxy router. Mounted by the gateway under `/v1/voice`.
pub fn router(config: &VoiceConfig) -> Router {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    let state = Arc::new(VoiceState {
        client,
        stt_url: config.stt_url.clone(),
        tts_url: config.tts_url.clone(),
    });
    Router::new()
        .route("/stt", post(stt_handler))
        .route("/tts", post(tts_handler))
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": message}))).into_response()
}

/// Speech-to-text: the uploaded audio body is forwarded untouched, with its
/// original content type, and the provider's JSON comes straight back.
async fn stt_handler(
    State(state): State<Arc<VoiceState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(url) = &state.stt_url else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "No STT provider configured");
    };
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Audio body is required");
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    debug!(bytes = body.len(), content_type = %content_type, "Proxying STT request");

    let upstream = state
        .client
        .post(url)
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .send()
        .await;

    match upstream {
        Ok(resp) => {
            let status = resp.status();
            let payload: serde_json::Value = resp.json().await.unwrap_or(json!({}));
            if !status.is_success() {
                warn!(status = %status, "STT provider error");
                return error_response(StatusCode::BAD_GATEWAY, "STT provider request failed");
            }
            Json(payload).into_response()
        }
        Err(e) => {
            warn!(error = %e, "STT proxy error");
            error_response(StatusCode::BAD_GATEWAY, "STT provider unreachable")
        }
    }
}

#[derive(Debug, Deserialize)]
struct TtsRequest {
    text: String,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    speed: Option<u32>,
}

/// Text-to-speech: the JSON request is forwarded and the provider's audio
/// bytes are streamed back with its content type.
async fn tts_handler(
    State(state): State<Arc<VoiceState>>,
    Json(request): Json<TtsRequest>,
) -> Response {
    let Some(url) = &state.tts_url else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "No TTS provider configured");
    };
    let text = request.text.trim();
    if text.is_empty() || text.chars().count() > MAX_TTS_TEXT_CHARS {
        return error_response(
            StatusCode::BAD_REQUEST,
            "tts requires 'text' between 1 and 5000 characters",
        );
    }

    let mut body = json!({"text": text});
    if let Some(voice) = &request.voice {
        body["voice"] = json!(voice);
    }
    if let Some(speed) = request.speed {
        body["speed"] = json!(speed);
    }

    let upstream = state.client.post(url).json(&body).send().await;
    match upstream {
        Ok(resp) if resp.status().is_success() => {
            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("audio/wav")
                .to_string();
            match resp.bytes().await {
                Ok(audio) => ([(header::CONTENT_TYPE, content_type)], audio).into_response(),
                Err(e) => {
                    warn!(error = %e, "TTS proxy body error");
                    error_response(StatusCode::BAD_GATEWAY, "TTS provider response unreadable")
                }
            }
        }
        Ok(resp) => {
            warn!(status = %resp.status(), "TTS provider error");
            error_response(StatusCode::BAD_GATEWAY, "TTS provider request failed")
        }
        Err(e) => {
            warn!(error = %e, "TTS proxy error");
            error_response(StatusCode::BAD_GATEWAY, "TTS provider unreachable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tts_request_parsing() {
        let parsed: TtsRequest =
            serde_json::from_str(r#"{"text": "hello", "voice": "en-us", "speed": 170}"#).unwrap();
        assert_eq!(parsed.text, "hello");
        assert_eq!(parsed.voice.as_deref(), Some("en-us"));
        assert_eq!(parsed.speed, Some(170));

        let minimal: TtsRequest = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert!(minimal.voice.is_none());
        assert!(minimal.speed.is_none());
    }

    #[test]
    fn test_router_builds_without_providers() {
        let config = VoiceConfig::default();
        let _router = router(&config);
    }
}
