//! CLI command implementations

pub mod integrate;
pub mod normalize;
pub mod pipeline;
pub mod polish;
pub mod scaffold;
