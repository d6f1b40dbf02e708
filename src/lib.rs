//! quadmap - real-time projection mapping
//!
//! Maps still images, looping frame sequences and live V4L2 cameras onto
//! user-positioned quadrilateral surfaces. Each tick the compositor warps
//! every surface's current frame into its quad (perspective-correct, or a
//! cheaper scale-to-fit), clips it to the quad polygon and stacks the layers
//! in registry order into one RGB frame.

pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod media;
pub mod output;
pub mod preset;
pub mod projection;
pub mod transform;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use geometry::{CanvasSize, Point, Quad};
