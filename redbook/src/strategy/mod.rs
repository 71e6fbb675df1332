//! Chains of acquisition and delivery strategies.
//!
//! Both engines face markup that changes without notice, so every lookup is
//! an ordered list of alternatives: the first strategy that yields a value
//! wins, failures are logged and skipped, and only running out of
//! alternatives is reported to the caller.

mod chain;
mod locators;

pub use chain::{ChainExhausted, FnStrategy, Resolution, Strategy, StrategyChain};
pub use locators::{
    any_present_script, script_tag, FieldKind, FillField, NthClick, SelectorClick, TextClick,
};
