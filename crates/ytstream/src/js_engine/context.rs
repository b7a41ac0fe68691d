//! Sandbox wrapper around a dedicated rquickjs runtime and context.

use rquickjs::{CatchResultExt, CaughtError, Context, Function, Runtime, Value};

use super::error::JsError;

/// An isolated JavaScript environment with its own runtime and heap.
///
/// Nothing from the host is exposed to scripts: the context only has the
/// standard ECMAScript intrinsics.
pub struct JsSandbox {
    // Dropped before the runtime that owns it.
    ctx: Context,
    _runtime: Runtime,
}

impl JsSandbox {
    /// Create a sandbox, optionally capping the runtime heap at `memory_limit` bytes.
    pub fn new(memory_limit: Option<usize>) -> Result<Self, JsError> {
        let runtime = Runtime::new().map_err(|e| JsError::Setup(e.to_string()))?;
        if let Some(limit) = memory_limit {
            runtime.set_memory_limit(limit);
        }
        let ctx = Context::full(&runtime).map_err(|e| JsError::Setup(e.to_string()))?;
        Ok(Self {
            ctx,
            _runtime: runtime,
        })
    }

    /// Evaluate `program` and bind its completion value, which must be a
    /// function, to the global `name`.
    pub fn define_function(&self, name: &str, program: &str) -> Result<(), JsError> {
        self.ctx.with(|ctx| {
            let value: Value = ctx
                .eval(program)
                .catch(&ctx)
                .map_err(Self::convert_caught_error)?;
            if !value.is_function() {
                return Err(JsError::NotAFunction {
                    found: value.type_name().to_owned(),
                });
            }
            ctx.globals()
                .set(name, value)
                .catch(&ctx)
                .map_err(Self::convert_caught_error)
        })
    }

    /// Call the global function `name` with a single string argument.
    pub fn call_string(&self, name: &str, arg: &str) -> Result<String, JsError> {
        self.ctx.with(|ctx| {
            let function: Function = ctx
                .globals()
                .get(name)
                .catch(&ctx)
                .map_err(Self::convert_caught_error)?;
            let result: Result<String, _> = function.call((arg,));
            result.catch(&ctx).map_err(Self::convert_caught_error)
        })
    }

    fn convert_caught_error(caught: CaughtError<'_>) -> JsError {
        match caught {
            CaughtError::Exception(exc) => JsError::Exception {
                message: exc.message().unwrap_or_default(),
                stack: exc.stack().filter(|stack| !stack.is_empty()),
            },
            CaughtError::Value(val) => JsError::exception(format!(
                "threw non-error value: {}",
                val.as_string()
                    .and_then(|s| s.to_string().ok())
                    .unwrap_or_else(|| val.type_name().to_owned())
            )),
            CaughtError::Error(err) => err.into(),
        }
    }
}
