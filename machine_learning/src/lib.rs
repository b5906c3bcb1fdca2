//! Numerical building blocks of the matcher: tensors and parameter maps,
//! the network trait with its reference siamese network, the optimizer,
//! augmentations, the pair dataset and the checkpoint codec.

pub mod arch;
pub mod augment;
pub mod checkpoint;
mod context;
pub mod dataset;
mod error;
pub mod optimization;
pub mod spec;
mod tensor;

pub use checkpoint::Checkpoint;
pub use context::{Device, ExecutionContext};
pub use error::{MlErr, Result};
pub use tensor::{Batch, LossMap, ParamMap, images_to_tensor, labels_to_tensor};
