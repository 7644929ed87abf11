//! Analysis pipeline.
//!
//! - [`StageRunner`]: precondition, gateway call, tolerant parse, upsert
//! - [`StagePayload`]: closed set of per-stage schemas plus a raw fallback
//! - [`parse_payload`]: first balanced JSON block, strict read, fallback

mod parser;
mod payload;
mod runner;

pub use parser::{extract_structured_block, parse_payload};
pub use payload::*;
pub use runner::{max_tokens, StageRunner};
