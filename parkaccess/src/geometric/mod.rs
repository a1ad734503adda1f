pub mod corridor;
pub mod layer;
pub mod water;
