use rand::{SeedableRng, rngs::StdRng};

use super::{Network, Siamese};
use crate::{
    Batch, MlErr, Result,
    spec::{ArchSpec, ComponentSpec, ComponentSpecs},
};

/// Builds the network described by an architecture and its components.
///
/// The input size is read from `example`, a batch drawn from the data the
/// network will be trained on or served with.
///
/// # Errors
/// `InvalidSpec` if the architecture does not name exactly one known
/// component, or if the component does not fit the architecture's input
/// count.
pub fn build(arch: &ArchSpec, comps: &ComponentSpecs, example: &Batch) -> Result<Box<dyn Network>> {
    let [component] = arch.components.as_slice() else {
        return Err(MlErr::InvalidSpec(format!(
            "expected a single component, got {}",
            arch.components.len()
        )));
    };

    let spec = comps
        .get(&component.id)
        .ok_or_else(|| MlErr::InvalidSpec(format!("component {} is not specified", component.id)))?;

    let (inputs, _) = example.split(arch.num_inputs)?;

    match spec {
        ComponentSpec::Siamese {
            hidden,
            embedding,
            amp,
            seed,
        } => {
            if arch.num_inputs != 2 {
                return Err(MlErr::InvalidSpec(format!(
                    "a siamese component takes 2 inputs, the architecture has {}",
                    arch.num_inputs
                )));
            }

            let features = inputs[0].shape().iter().skip(1).product();
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(*seed),
                None => StdRng::from_os_rng(),
            };

            let net = Siamese::new(features, hidden, *embedding, *amp, &mut rng)?;
            Ok(Box::new(net))
        }
    }
}
