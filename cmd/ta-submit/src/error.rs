use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{message} (HTTP {status}). Log in with --login/--password as an account that may submit reports.")]
    Auth { status: u16, message: String },
    #[error("server rejected the request (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl SubmitError {
    /// Classifies a failed response; the server's `message` is kept when
    /// the body has one.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.message)
            .unwrap_or_else(|_| {
                let text = body.trim();
                if text.is_empty() {
                    format!("HTTP {status}")
                } else {
                    text.chars().take(200).collect()
                }
            });
        match status {
            401 | 403 => SubmitError::Auth { status, message },
            _ => SubmitError::Server { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_carry_a_login_hint() {
        let err = SubmitError::from_response(401, r#"{"code":"unauthorized","message":"You must be logged in"}"#);
        assert!(matches!(err, SubmitError::Auth { status: 401, .. }));
        let text = err.to_string();
        assert!(text.starts_with("You must be logged in"));
        assert!(text.contains("--login"));
    }

    #[test]
    fn other_failures_show_the_server_message() {
        let err = SubmitError::from_response(400, r#"{"code":"invalid_param","message":"Invalid trail_id"}"#);
        assert_eq!(err.to_string(), "server rejected the request (HTTP 400): Invalid trail_id");

        let err = SubmitError::from_response(502, "");
        assert_eq!(err.to_string(), "server rejected the request (HTTP 502): HTTP 502");
    }
}
