//! Systems - logic that operates on components

mod breach;
mod fire;
mod flow;
mod topology;
mod water;

pub use breach::*;
pub use fire::*;
pub use flow::*;
pub use topology::*;
pub use water::*;
