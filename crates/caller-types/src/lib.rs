//! Core types and traits for caller identification and spam scoring.
//!
//! The graph model and the store traits live here so every other crate shares one vocabulary.

mod dto;
mod graph;
mod metadata;
mod traits;

pub use dto::*;
pub use graph::*;
pub use metadata::*;
pub use traits::*;
