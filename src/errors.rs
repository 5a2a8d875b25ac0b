use thiserror::Error;

/// Failure talking to the pattern backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// 400/422 responses; the message is meant for the user as-is.
    #[error("{0}")]
    Validation(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Build an error from a non-success response, preferring the server's own message.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| format!("request failed ({status})"));
        if status == 400 || status == 422 {
            ApiError::Validation(message)
        } else {
            ApiError::Http { status, message }
        }
    }

    /// Message suitable for showing to a user: no transport prefixes.
    pub fn user_message(&self) -> &str {
        match self {
            ApiError::Network(message)
            | ApiError::Http { message, .. }
            | ApiError::Validation(message)
            | ApiError::Parse(message) => message,
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["detail", "error", "message", "error_message"] {
            if let Some(text) = json.get(key).and_then(|v| v.as_str()) {
                let text = text.trim();
                if !text.is_empty() {
                    return Some(text.to_string());
                }
            }
        }
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_detail_field() {
        let err = ApiError::from_response(409, r#"{"detail": "pattern is archived"}"#);
        assert_eq!(
            err,
            ApiError::Http {
                status: 409,
                message: "pattern is archived".into()
            }
        );
        assert_eq!(err.user_message(), "pattern is archived");
    }

    #[test]
    fn validation_statuses_keep_plain_body() {
        let err = ApiError::from_response(422, "sheet_id is required");
        assert_eq!(err, ApiError::Validation("sheet_id is required".into()));
        assert_eq!(err.to_string(), "sheet_id is required");
    }

    #[test]
    fn empty_body_falls_back_to_status() {
        let err = ApiError::from_response(502, "  ");
        assert_eq!(err.user_message(), "request failed (502)");
    }
}
