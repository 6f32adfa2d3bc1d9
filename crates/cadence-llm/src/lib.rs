//! Cadence LLM - Command generation
//!
//! Turns a natural-language goal plus a JSON snapshot of the machine into a
//! single shell command, using DeepSeek's OpenAI-compatible chat API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod deepseek;
pub mod error;
pub mod util;

pub use deepseek::{DeepSeekConfig, DeepSeekProvider};
pub use error::{Error, Result};
