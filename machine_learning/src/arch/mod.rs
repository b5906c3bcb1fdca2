pub mod activations;
mod builder;
pub mod layers;
pub mod loss;
mod network;
mod siamese;

pub use builder::build;
pub use network::{Network, Outputs};
pub use siamese::Siamese;
