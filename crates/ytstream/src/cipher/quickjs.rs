//! QuickJS-backed decoders.

use tracing::debug;

use crate::js_engine::JsSandbox;

use super::{CipherDecoder, error::CipherError};

/// Global the decode function is bound to inside a sandbox.
const DECODE_FN: &str = "__decodeSignature";

/// Decoder holding a dedicated sandbox for its whole lifetime.
pub struct IsolateDecoder {
    sandbox: Option<JsSandbox>,
}

impl IsolateDecoder {
    pub fn new(program: &str, memory_limit: Option<usize>) -> Result<Self, CipherError> {
        let sandbox = JsSandbox::new(memory_limit)?;
        // An evaluation error drops the sandbox on return.
        sandbox.define_function(DECODE_FN, program)?;
        debug!(?memory_limit, "Created isolate signature decoder");
        Ok(Self {
            sandbox: Some(sandbox),
        })
    }
}

impl CipherDecoder for IsolateDecoder {
    fn decode(&self, signature: &str) -> Result<String, CipherError> {
        let sandbox = self.sandbox.as_ref().ok_or(CipherError::Disposed)?;
        Ok(sandbox.call_string(DECODE_FN, signature)?)
    }

    fn is_disposed(&self) -> bool {
        self.sandbox.is_none()
    }

    fn dispose(&mut self) {
        if self.sandbox.take().is_some() {
            debug!("Disposed isolate signature decoder");
        }
    }
}

/// Decoder that evaluates the program in a fresh sandbox on every call.
pub struct ContextDecoder {
    program: String,
    memory_limit: Option<usize>,
}

impl ContextDecoder {
    /// The program is evaluated once up front so a broken program fails here.
    pub fn new(program: String, memory_limit: Option<usize>) -> Result<Self, CipherError> {
        let sandbox = JsSandbox::new(memory_limit)?;
        sandbox.define_function(DECODE_FN, &program)?;
        Ok(Self {
            program,
            memory_limit,
        })
    }
}

impl CipherDecoder for ContextDecoder {
    fn decode(&self, signature: &str) -> Result<String, CipherError> {
        let sandbox = JsSandbox::new(self.memory_limit)?;
        sandbox.define_function(DECODE_FN, &self.program)?;
        Ok(sandbox.call_string(DECODE_FN, signature)?)
    }

    fn is_disposed(&self) -> bool {
        true
    }

    fn dispose(&mut self) {}
}
