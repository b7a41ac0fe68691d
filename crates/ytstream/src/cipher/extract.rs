use crate::utils::content_between;

use super::error::CipherError;

/// Start of the signature-transform function body.
pub const TRANSFORM_START: &str = r#"a=a.split("")"#;
/// End of the signature-transform function body.
pub const TRANSFORM_END: &str = "};";
/// End of the helper object definition.
pub const HELPER_END: &str = "}};";

/// The signature-transform program cut out of a player bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderProgram {
    /// Identifier of the helper object the transform calls into.
    pub helper_name: String,
    /// Full `var <helper>={...}};` definition.
    pub helper_source: String,
    /// Transform body, from the split marker through the closing `};`.
    pub transform_body: String,
}

impl DecoderProgram {
    /// Locate the transform and its helper object in `bundle`.
    pub fn extract(bundle: &str) -> Result<Self, CipherError> {
        let body = content_between(bundle, TRANSFORM_START, TRANSFORM_END)
            .ok_or_else(|| CipherError::marker_not_found(TRANSFORM_START, "signature transform"))?;

        let helper_name = content_between(body, ";", ".")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CipherError::marker_not_found(";", "helper object name"))?;

        let helper_start = format!("var {helper_name}=");
        let helper_body = content_between(bundle, &helper_start, HELPER_END)
            .ok_or_else(|| CipherError::marker_not_found(helper_start.clone(), "helper object"))?;

        Ok(Self {
            helper_name: helper_name.to_owned(),
            helper_source: format!("{helper_start}{helper_body}{HELPER_END}"),
            transform_body: format!("{TRANSFORM_START}{body}{TRANSFORM_END}"),
        })
    }

    /// Transform statements without the surrounding braces.
    pub fn transform_statements(&self) -> &str {
        self.transform_body
            .strip_suffix(TRANSFORM_END)
            .unwrap_or(&self.transform_body)
    }

    /// Program text whose completion value is the single-argument decode function.
    pub fn source(&self) -> String {
        format!(
            "{}\n((a) => {{{}}})",
            self.helper_source,
            self.transform_statements()
        )
    }
}
