//! Fakes shared by the unit tests of every module.
mod fakes;

pub use fakes::*;
