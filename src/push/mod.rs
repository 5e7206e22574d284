//! Outbound write path.
//!
//! [`OutboundWriter`] resolves a live connection and appends the frame to
//! that connection's [`OutboundQueue`], which a tracked task drains into the
//! transport in call order. The caller receives a [`PushCompletion`] that
//! resolves once the transport has accepted or failed the write. Failures
//! surface as values; no push ever panics.

mod completion;
mod errors;
mod queue;
mod writer;

pub use completion::PushCompletion;
pub use errors::PushError;
pub use queue::OutboundQueue;
pub use writer::{OutboundFrame, OutboundWriter};
