use thiserror::Error;

/// Failures inside a [`JsSandbox`](super::JsSandbox).
#[derive(Debug, Error)]
pub enum JsError {
    #[error("failed to set up JS sandbox: {0}")]
    Setup(String),

    /// A script threw, or the engine aborted it (e.g. the memory ceiling was hit).
    #[error("JS exception: {message}{}", stack.as_deref().map(|s| format!("\n{s}")).unwrap_or_default())]
    Exception {
        message: String,
        stack: Option<String>,
    },

    #[error("program completed with {found}, expected a function")]
    NotAFunction { found: String },
}

impl JsError {
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception {
            message: message.into(),
            stack: None,
        }
    }
}

#[cfg(feature = "quickjs")]
impl From<rquickjs::Error> for JsError {
    fn from(err: rquickjs::Error) -> Self {
        Self::exception(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_appends_stack() {
        let err = JsError::Exception {
            message: "boom".into(),
            stack: Some("    at <eval>:1".into()),
        };
        assert_eq!(err.to_string(), "JS exception: boom\n    at <eval>:1");
        assert_eq!(JsError::exception("boom").to_string(), "JS exception: boom");
    }
}
