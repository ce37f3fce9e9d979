//! Intent module for contextual (rule-matched) replies
//!
//! Provides:
//! - An ordered category matcher with canned and templated replies
//! - Two-operand arithmetic extraction and evaluation

pub mod arithmetic;
mod matcher;

pub use arithmetic::{MathOperands, MathOperator};
pub use matcher::{classify, pick, ContextualResponder, Intent, CLARIFICATIONS, GREETINGS};
