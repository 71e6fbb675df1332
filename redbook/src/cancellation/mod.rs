//! Operator cancellation.
//!
//! Bounded waits give up on their own; the manual-login waits only end when
//! the page changes or this token fires.

mod token;

pub use token::CancellationToken;
