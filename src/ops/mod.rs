// CPU-side image operations.

pub mod reference;
