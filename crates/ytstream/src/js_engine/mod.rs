//! Embedded JavaScript sandbox.
//!
//! A thin wrapper over a dedicated QuickJS runtime used to run the player's
//! signature transform. Each [`JsSandbox`] owns its runtime, so memory limits
//! and lifetimes are per sandbox rather than shared.
//!
//! # Example
//!
//! ```ignore
//! use ytstream::js_engine::JsSandbox;
//!
//! let sandbox = JsSandbox::new(Some(8 * 1024 * 1024))?;
//! sandbox.define_function("greet", "(name) => 'Hello, ' + name")?;
//! assert_eq!(sandbox.call_string("greet", "World")?, "Hello, World");
//! ```

#[cfg(feature = "quickjs")]
mod context;
mod error;

#[cfg(feature = "quickjs")]
pub use context::JsSandbox;
pub use error::JsError;

/// Default sandbox memory ceiling (8 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 8 * 1024 * 1024;
