use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    Decode(String),
    /// 2xx reply carrying `ok: false`.
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    /// Text for the error banner: whatever the service said, else `fallback`.
    pub fn banner_text(&self, fallback: &str) -> String {
        let text = match self {
            ApiError::Status { body, .. } => body.trim(),
            ApiError::Network(message) | ApiError::Rejected(message) => message.trim(),
            ApiError::Decode(_) => "",
        };
        if text.is_empty() {
            fallback.to_string()
        } else {
            text.to_string()
        }
    }
}

/// Local validation failures; none of these reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("no image is loaded")]
    NoImage,
    #[error("no template project is selected")]
    NoProject,
    #[error("no dataset image is selected")]
    NoDatasetImage,
    #[error("a manual box is being drawn")]
    ManualBoxActive,
    #[error("choose a class for the manual box first")]
    MissingClass,
    #[error("no manual box is waiting for a class")]
    NoPendingBox,
    #[error("no candidate is selected")]
    NoCandidate,
    #[error("no annotation is selected")]
    NoAnnotation,
    #[error("the selected annotation has no polygon")]
    NoPolygon,
    #[error("nothing to undo")]
    NothingToUndo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_prefers_server_text() {
        let err = ApiError::Status {
            status: 500,
            body: "template project missing".into(),
        };
        assert_eq!(err.banner_text("Detect failed"), "template project missing");
    }

    #[test]
    fn banner_falls_back_on_empty_or_undecodable() {
        let empty = ApiError::Status {
            status: 502,
            body: "  ".into(),
        };
        assert_eq!(empty.banner_text("Detect failed"), "Detect failed");
        let decode = ApiError::Decode("expected value at line 1".into());
        assert_eq!(decode.banner_text("Segmentation failed"), "Segmentation failed");
    }
}
