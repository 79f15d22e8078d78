//! Composite video: one canvas with the remote party full-bleed and the
//! local party as a mirrored picture-in-picture inset

pub mod compositor;
pub mod surface;

pub use compositor::{CompositorConfig, FrameCompositor, IntervalScheduler, RedrawScheduler};
pub use surface::{CompositeLayout, CompositeSurface, Rect, INSET_BORDER_RGBA, PLACEHOLDER_RGBA};
