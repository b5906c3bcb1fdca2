use crate::{Batch, arch::Network};

/// Where batches are placed before they reach the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
}

impl Device {
    /// Moves a batch onto the device.
    ///
    /// On the cpu this makes every tensor contiguous in row-major order,
    /// which the dense layers and the checkpoint codec expect.
    pub fn place(&self, batch: Batch) -> Batch {
        match self {
            Device::Cpu => Batch::new(
                batch
                    .tensors
                    .into_iter()
                    .map(|t| {
                        if t.is_standard_layout() {
                            t
                        } else {
                            t.as_standard_layout().into_owned()
                        }
                    })
                    .collect(),
            ),
        }
    }
}

/// The network together with the device it runs on.
///
/// Owned by whoever drives the network, the training loop or the inference
/// server, and handed to it explicitly.
pub struct ExecutionContext<N> {
    pub device: Device,
    pub net: N,
}

impl<N: Network> ExecutionContext<N> {
    pub fn new(device: Device, net: N) -> Self {
        Self { device, net }
    }

    pub fn place(&self, batch: Batch) -> Batch {
        self.device.place(batch)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    #[test]
    fn cpu_placement_makes_tensors_contiguous() {
        let t = ArrayD::from_shape_vec(IxDyn(&[2, 3]), (0..6).map(|v| v as f32).collect()).unwrap();
        let transposed = t.reversed_axes();
        assert!(!transposed.is_standard_layout());

        let placed = Device::Cpu.place(Batch::new(vec![transposed.clone()]));
        assert!(placed.tensors[0].is_standard_layout());
        assert_eq!(placed.tensors[0], transposed);
    }
}
