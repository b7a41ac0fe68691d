use reqwest::StatusCode;
use thiserror::Error;

use crate::js_engine::JsError;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("failed to fetch player bundle: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("player bundle request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("marker `{marker}` not found while locating the {target}")]
    MarkerNotFound {
        marker: String,
        target: &'static str,
    },

    #[error("evaluator `{backend}` is not available: {hint}")]
    EvaluatorUnavailable {
        backend: &'static str,
        hint: String,
    },

    #[error("decoder program evaluation failed: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Js(#[from] JsError),

    #[error("decoder has been disposed")]
    Disposed,
}

impl CipherError {
    pub fn marker_not_found(marker: impl Into<String>, target: &'static str) -> Self {
        Self::MarkerNotFound {
            marker: marker.into(),
            target,
        }
    }

    pub fn evaluation(reason: impl Into<String>) -> Self {
        Self::Evaluation(reason.into())
    }
}
