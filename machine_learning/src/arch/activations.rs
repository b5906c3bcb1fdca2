//! Activation functions.

/// A logistic curve scaled to `0..amp`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sigmoid {
    amp: f32,
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp * logistic(z)
    }

    pub fn df(&self, z: f32) -> f32 {
        let s = logistic(z);
        self.amp * s * (1. - s)
    }
}

/// The standard logistic function, `1 / (1 + e^-z)`.
pub fn logistic(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}
