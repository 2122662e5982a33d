//! Stream relay — adapts a provider's chunk stream into a byte stream
//!
//! Lifecycle: `Idle → Streaming → {Closed | Errored}`.
//! - `Closed` only after the source is exhausted AND the completion signal
//!   resolved successfully
//! - `Errored` on a source error, a provider error chunk, a rejected
//!   completion, or consumer cancellation
//! - Finalization happens once; later close/cancel calls are no-ops
//!
//! The relay is a plain pull loop: it only asks the provider for the next
//! chunk when the consumer asks for the next item.

pub mod state;
pub mod stream;

pub use state::{RelayFailure, RelayHandle, RelayState};
pub use stream::{RelayError, RelayStream};
