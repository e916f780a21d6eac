//! XRayFE: multi-pass GPU filter chains for X-ray imagery.
//!
//! Submit an ordered list of [`filters::FilterInvocation`]s and an image to
//! [`gpu::FilterChainEngine::apply`] and get back a rendered
//! [`gpu::OutputSurface`].  [`ops::reference`] renders the same chains on the
//! CPU.

#[macro_use]
pub mod logger;
pub mod cli;
pub mod error;
pub mod filters;
pub mod gpu;
pub mod ops;

pub use error::{FilterError, FilterResult};
pub use filters::{FilterArg, FilterInvocation, FilterKind, HueBand};
pub use gpu::{EngineConfig, FilterChainEngine, OutputSurface};
