//! Positioning algorithms

pub mod geometry;
pub mod multilateration;

pub use geometry::{AnchorLayout, GeometryError, GeometrySolver, LayoutMode, LiteralAnchor};
pub use multilateration::{MultilaterationEngine, MultilaterationError, Solution};
