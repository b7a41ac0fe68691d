//! Lightweight interpreter for the transform's helper primitives.
//!
//! The helper object only ever defines three kinds of array operations
//! (reverse, splice from the front, swap with the first element), and the
//! transform is a flat sequence of calls into them. Both are recognised with
//! patterns and replayed natively without a JavaScript engine.

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{CipherDecoder, error::CipherError, extract::DecoderProgram};

static HELPER_METHOD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"([A-Za-z0-9_$]+|"[^"]+")\s*:\s*function\s*\(\s*a\s*(?:,\s*b\s*)?\)\s*\{([^{}]*)\}"#,
    )
    .unwrap()
});

static HELPER_CALL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^([A-Za-z0-9_$]+)(?:\.([A-Za-z0-9_$]+)|\[\s*"([^"]+)"\s*\])\(\s*a\s*,\s*(\d+)\s*\)$"#,
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Reverse,
    Splice,
    Swap,
}

impl Primitive {
    /// Match a helper method body against the exact shapes player bundles use.
    /// Anything else, including other `splice` forms, is unrecognised.
    fn classify(body: &str) -> Option<Self> {
        let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        match body.trim_end_matches(';') {
            "a.reverse()" => Some(Self::Reverse),
            "a.splice(0,b)" => Some(Self::Splice),
            "varc=a[0];a[0]=a[b%a.length];a[b%a.length]=c"
            | "a.splice(0,1,a.splice(b%a.length,1,a[0])[0])" => Some(Self::Swap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    primitive: Primitive,
    arg: usize,
}

impl Step {
    fn apply(&self, chars: &mut Vec<char>) {
        match self.primitive {
            Primitive::Reverse => chars.reverse(),
            Primitive::Splice => {
                let n = self.arg.min(chars.len());
                chars.drain(..n);
            }
            Primitive::Swap => {
                if !chars.is_empty() {
                    let idx = self.arg % chars.len();
                    chars.swap(0, idx);
                }
            }
        }
    }
}

/// Decoder that replays a compiled list of helper calls.
#[derive(Debug, Clone)]
pub struct NativeDecoder {
    steps: Vec<Step>,
}

impl NativeDecoder {
    /// Compile `program` into a step list, failing on any unrecognised shape.
    pub fn compile(program: &DecoderProgram) -> Result<Self, CipherError> {
        let methods = parse_helper_methods(&program.helper_source);
        if methods.is_empty() {
            return Err(CipherError::evaluation(format!(
                "no recognised methods in helper object `{}`",
                program.helper_name
            )));
        }

        let mut steps = Vec::new();
        for statement in program
            .transform_statements()
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            if statement.replace(' ', "") == r#"a=a.split("")"#
                || statement.replace(' ', "") == r#"returna.join("")"#
            {
                continue;
            }

            let caps = HELPER_CALL_REGEX.captures(statement).ok_or_else(|| {
                CipherError::evaluation(format!("unsupported transform statement `{statement}`"))
            })?;

            if &caps[1] != program.helper_name {
                return Err(CipherError::evaluation(format!(
                    "statement `{statement}` does not call helper `{}`",
                    program.helper_name
                )));
            }

            let method = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let primitive = match methods.get(method) {
                Some(Some(primitive)) => *primitive,
                Some(None) => {
                    return Err(CipherError::evaluation(format!(
                        "helper method `{method}` has an unrecognised body"
                    )));
                }
                None => {
                    return Err(CipherError::evaluation(format!(
                        "unknown helper method `{method}`"
                    )));
                }
            };
            let arg = caps[4]
                .parse()
                .map_err(|_| CipherError::evaluation(format!("bad argument in `{statement}`")))?;

            steps.push(Step { primitive, arg });
        }

        debug!(steps = steps.len(), "Compiled native signature decoder");
        Ok(Self { steps })
    }
}

impl CipherDecoder for NativeDecoder {
    fn decode(&self, signature: &str) -> Result<String, CipherError> {
        let mut chars: Vec<char> = signature.chars().collect();
        for step in &self.steps {
            step.apply(&mut chars);
        }
        Ok(chars.into_iter().collect())
    }

    fn is_disposed(&self) -> bool {
        true
    }

    fn dispose(&mut self) {}
}

/// Helper methods by name; `None` for a body with no known primitive shape.
fn parse_helper_methods(helper_source: &str) -> FxHashMap<String, Option<Primitive>> {
    HELPER_METHOD_REGEX
        .captures_iter(helper_source)
        .map(|caps| {
            let name = caps[1].trim_matches('"').to_owned();
            (name, Primitive::classify(&caps[2]))
        })
        .collect()
}
