//! Application frame format, stream reassembly and lifecycle markers.

pub mod frame;
pub mod marker;
pub mod reassembly;

pub use frame::{AppFrame, FrameLayout, Phase};
pub use marker::LifecycleMarker;
pub use reassembly::StreamReassembler;
