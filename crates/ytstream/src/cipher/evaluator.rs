use std::{fmt, str::FromStr, sync::Arc, sync::LazyLock};

use tracing::debug;

use super::{
    CipherDecoder, CustomEvaluator, error::CipherError, extract::DecoderProgram,
    native::NativeDecoder,
};

/// Whether an embedded QuickJS runtime can be created in this build.
#[cfg(feature = "quickjs")]
static QUICKJS_AVAILABLE: LazyLock<bool> = LazyLock::new(|| rquickjs::Runtime::new().is_ok());

#[cfg(not(feature = "quickjs"))]
static QUICKJS_AVAILABLE: LazyLock<bool> = LazyLock::new(|| false);

const QUICKJS_HINT: &str = "build with the `quickjs` cargo feature enabled";

/// Built-in evaluator backends, safest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluatorBackend {
    /// Dedicated QuickJS runtime kept for the decoder's lifetime.
    Isolate,
    /// Fresh QuickJS runtime per decode call.
    Context,
    /// Pattern-based interpreter, no JavaScript engine.
    Native,
}

impl EvaluatorBackend {
    /// Probe order used by [`Evaluator::Auto`].
    pub const PRIORITY: [EvaluatorBackend; 3] = [Self::Isolate, Self::Context, Self::Native];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Isolate => "isolate",
            Self::Context => "context",
            Self::Native => "native",
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Self::Isolate | Self::Context => *QUICKJS_AVAILABLE,
            Self::Native => true,
        }
    }

    /// First available backend in priority order.
    pub fn detect() -> Self {
        Self::PRIORITY
            .into_iter()
            .find(Self::is_available)
            .unwrap_or(Self::Native)
    }

    pub(crate) fn create(
        &self,
        program: &DecoderProgram,
        memory_limit: Option<usize>,
    ) -> Result<Box<dyn CipherDecoder>, CipherError> {
        if !self.is_available() {
            return Err(CipherError::EvaluatorUnavailable {
                backend: self.name(),
                hint: QUICKJS_HINT.to_owned(),
            });
        }

        match self {
            Self::Native => Ok(Box::new(NativeDecoder::compile(program)?)),
            #[cfg(feature = "quickjs")]
            Self::Isolate => Ok(Box::new(super::quickjs::IsolateDecoder::new(
                &program.source(),
                memory_limit,
            )?)),
            #[cfg(feature = "quickjs")]
            Self::Context => Ok(Box::new(super::quickjs::ContextDecoder::new(
                program.source(),
                memory_limit,
            )?)),
            #[cfg(not(feature = "quickjs"))]
            Self::Isolate | Self::Context => {
                let _ = memory_limit;
                Err(CipherError::EvaluatorUnavailable {
                    backend: self.name(),
                    hint: QUICKJS_HINT.to_owned(),
                })
            }
        }
    }
}

impl fmt::Display for EvaluatorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which evaluator runs the decoder program.
#[derive(Clone, Default)]
pub enum Evaluator {
    /// Probe the built-in backends in priority order.
    #[default]
    Auto,
    /// A specific built-in backend.
    Backend(EvaluatorBackend),
    /// A caller-supplied evaluator.
    Custom(Arc<dyn CustomEvaluator>),
}

impl Evaluator {
    pub fn custom(evaluator: impl CustomEvaluator + 'static) -> Self {
        Self::Custom(Arc::new(evaluator))
    }

    pub(crate) async fn evaluate(
        &self,
        program: &DecoderProgram,
        memory_limit: Option<usize>,
    ) -> Result<Box<dyn CipherDecoder>, CipherError> {
        match self {
            Self::Custom(custom) => {
                debug!("Evaluating decoder program with custom evaluator");
                custom.evaluate(&program.source()).await
            }
            Self::Backend(backend) => {
                debug!(backend = backend.name(), "Evaluating decoder program");
                backend.create(program, memory_limit)
            }
            Self::Auto => {
                let backend = EvaluatorBackend::detect();
                debug!(backend = backend.name(), "Auto-selected evaluator backend");
                backend.create(program, memory_limit)
            }
        }
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Backend(backend) => f.debug_tuple("Backend").field(backend).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<EvaluatorBackend> for Evaluator {
    fn from(backend: EvaluatorBackend) -> Self {
        Self::Backend(backend)
    }
}

impl FromStr for Evaluator {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "isolate" => Ok(Self::Backend(EvaluatorBackend::Isolate)),
            "context" => Ok(Self::Backend(EvaluatorBackend::Context)),
            "native" => Ok(Self::Backend(EvaluatorBackend::Native)),
            other => Err(CipherError::evaluation(format!(
                "unknown evaluator `{other}`, expected one of auto, isolate, context, native"
            ))),
        }
    }
}
