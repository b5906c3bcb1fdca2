mod dense;

pub use dense::{Dense, Trace};
