pub mod frame;
pub mod signal;

pub use frame::{format_number, Column, FeatureFrame, FeatureVector};
pub use signal::*;
