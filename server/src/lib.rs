//! The inference server: loads one checkpointed matcher and scores pairs of
//! crops sent over a byte stream.

mod error;
mod scorer;
mod server;

pub use error::{Result, ServerErr};
pub use scorer::{NetworkScorer, PROBS, Scorer};
pub use server::serve;
