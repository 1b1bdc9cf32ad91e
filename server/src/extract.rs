//! Inbound payload extraction.
//!
//! The devices push notifications either as `multipart/form-data` (one
//! JSON-bearing field plus optional binary image parts) or as a raw
//! `application/json` body. This module turns request headers and body into
//! a raw JSON payload plus zero or more named attachments, before any
//! validation happens.
//!
//! The multipart event field is located by scanning, not by name: firmware
//! revisions disagree on the field name, so the first non-file field whose
//! text contains the event-type marker wins. That first-match tie-break is
//! part of the contract.

use axum::body::Bytes;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use thiserror::Error;

/// Marker substring identifying the event-bearing form field. Compared
/// case-insensitively because the vendor also emits all-lowercase keys.
const EVENT_MARKER: &str = "eventtype";

/// Form field names recognized as binary attachments.
const ATTACHMENT_LABELS: &[&str] = &["Picture"];

/// A binary attachment delivered alongside an event in the same request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Logical label (the form field name, e.g. `Picture`).
    pub label: String,

    /// Full attachment content.
    pub content: Bytes,
}

/// The result of a successful extraction: the raw event payload and any
/// attachments from the same request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPayload {
    /// Raw decoded event JSON, not yet validated.
    pub event: serde_json::Value,

    /// Attachments in declaration order. Always empty for JSON bodies.
    pub attachments: Vec<Attachment>,
}

/// Extraction failure. Always client-caused; never retried.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The request content type is neither multipart form data nor JSON.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A multipart form contained no field with recognizable event data.
    #[error("no form field contains event data")]
    MissingEventData,

    /// The event data failed to decode as JSON.
    #[error("malformed event JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The multipart body itself failed to parse.
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),
}

/// Extracts the raw event payload and attachments from an inbound request.
///
/// # Errors
///
/// See [`ExtractError`]; every variant maps to a 4xx response.
pub async fn extract_payload(
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ExtractedPayload, ExtractError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if let Ok(boundary) = multer::parse_boundary(content_type) {
        extract_multipart(body, boundary).await
    } else if is_json(content_type) {
        let event = serde_json::from_slice(&body)?;
        Ok(ExtractedPayload {
            event,
            attachments: Vec::new(),
        })
    } else {
        Err(ExtractError::UnsupportedMediaType(content_type.to_string()))
    }
}

/// Media-type check tolerant of parameters (`application/json; charset=utf-8`).
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("application/json"))
}

async fn extract_multipart(
    body: Bytes,
    boundary: String,
) -> Result<ExtractedPayload, ExtractError> {
    let stream =
        futures_util::stream::once(async move { Ok::<Bytes, std::convert::Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut event: Option<serde_json::Value> = None;
    let mut attachments = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            if ATTACHMENT_LABELS
                .iter()
                .any(|label| label.eq_ignore_ascii_case(&name))
            {
                let content = field.bytes().await?;
                attachments.push(Attachment {
                    label: name,
                    content,
                });
            }
            continue;
        }

        // First marker-bearing field wins; later candidates are ignored.
        if event.is_some() {
            continue;
        }

        let text = field.text().await?;
        if text.to_ascii_lowercase().contains(EVENT_MARKER) {
            event = Some(serde_json::from_str(&text)?);
        }
    }

    match event {
        Some(event) => Ok(ExtractedPayload { event, attachments }),
        None => Err(ExtractError::MissingEventData),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    const BOUNDARY: &str = "gatehub-test-boundary";

    fn headers_with(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    fn multipart_headers() -> HeaderMap {
        headers_with(&format!("multipart/form-data; boundary={BOUNDARY}"))
    }

    /// Builds a raw multipart body from (name, filename, content) parts.
    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Bytes {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(filename) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: image/jpeg\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                }
                None => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Bytes::from(body)
    }

    fn event_json() -> String {
        json!({
            "eventType": "AccessControllerEvent",
            "dateTime": "2025-01-01T10:00:00Z",
            "deviceID": "dev1"
        })
        .to_string()
    }

    #[tokio::test]
    async fn json_body_is_the_raw_payload() {
        let body = Bytes::from(event_json());
        let extracted = extract_payload(&headers_with("application/json"), body)
            .await
            .unwrap();

        assert_eq!(extracted.event["deviceID"], "dev1");
        assert!(extracted.attachments.is_empty());
    }

    #[tokio::test]
    async fn json_content_type_with_charset_is_accepted() {
        let body = Bytes::from(event_json());
        let extracted = extract_payload(&headers_with("application/json; charset=utf-8"), body)
            .await
            .unwrap();
        assert_eq!(extracted.event["deviceID"], "dev1");
    }

    #[tokio::test]
    async fn malformed_json_body_is_rejected() {
        let err = extract_payload(&headers_with("application/json"), Bytes::from("{not json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected_with_original() {
        let err = extract_payload(&headers_with("text/plain"), Bytes::from("hello"))
            .await
            .unwrap_err();
        match err {
            ExtractError::UnsupportedMediaType(ct) => assert_eq!(ct, "text/plain"),
            other => panic!("expected UnsupportedMediaType, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_type_is_unsupported() {
        let err = extract_payload(&HeaderMap::new(), Bytes::from("{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn multipart_event_field_and_attachment_are_extracted() {
        let event = event_json();
        let body = multipart_body(&[
            ("event_log", None, event.as_bytes()),
            ("Picture", Some("capture.jpg"), b"\xff\xd8fakejpeg"),
        ]);

        let extracted = extract_payload(&multipart_headers(), body).await.unwrap();
        assert_eq!(extracted.event["deviceID"], "dev1");
        assert_eq!(extracted.attachments.len(), 1);
        assert_eq!(extracted.attachments[0].label, "Picture");
        assert_eq!(&extracted.attachments[0].content[..], b"\xff\xd8fakejpeg");
    }

    #[tokio::test]
    async fn first_marker_field_wins_in_declaration_order() {
        let first = json!({"eventType": "AccessControllerEvent", "deviceID": "first"}).to_string();
        let second = json!({"eventType": "AccessControllerEvent", "deviceID": "second"}).to_string();
        let body = multipart_body(&[
            ("log_a", None, first.as_bytes()),
            ("log_b", None, second.as_bytes()),
        ]);

        let extracted = extract_payload(&multipart_headers(), body).await.unwrap();
        assert_eq!(extracted.event["deviceID"], "first");
    }

    #[tokio::test]
    async fn non_marker_fields_are_skipped() {
        let event = event_json();
        let body = multipart_body(&[
            ("comment", None, b"just a note"),
            ("event_log", None, event.as_bytes()),
        ]);

        let extracted = extract_payload(&multipart_headers(), body).await.unwrap();
        assert_eq!(extracted.event["deviceID"], "dev1");
    }

    #[tokio::test]
    async fn multipart_without_event_field_is_missing_event_data() {
        let body = multipart_body(&[
            ("comment", None, b"just a note"),
            ("Picture", Some("capture.jpg"), b"bytes"),
        ]);

        let err = extract_payload(&multipart_headers(), body)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingEventData));
    }

    #[tokio::test]
    async fn marker_field_with_malformed_json_is_rejected() {
        let body = multipart_body(&[("event_log", None, b"{\"eventType\": oops")]);
        let err = extract_payload(&multipart_headers(), body)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn unrecognized_file_fields_are_ignored() {
        let event = event_json();
        let body = multipart_body(&[
            ("event_log", None, event.as_bytes()),
            ("Thumbnail", Some("thumb.jpg"), b"bytes"),
        ]);

        let extracted = extract_payload(&multipart_headers(), body).await.unwrap();
        assert!(extracted.attachments.is_empty());
    }

    #[tokio::test]
    async fn attachment_label_match_is_case_insensitive() {
        let event = event_json();
        let body = multipart_body(&[
            ("event_log", None, event.as_bytes()),
            ("picture", Some("capture.jpg"), b"bytes"),
        ]);

        let extracted = extract_payload(&multipart_headers(), body).await.unwrap();
        assert_eq!(extracted.attachments.len(), 1);
        assert_eq!(extracted.attachments[0].label, "picture");
    }
}
