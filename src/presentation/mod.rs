//! Presentation layer with display surfaces.

/// Reusable widgets.
pub mod widgets;
