use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("generative model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generative model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generative model returned no text: {reason}")]
    EmptyResponse { reason: String },
    #[error("could not decode model output: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GenAiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: truncate_body(body),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
