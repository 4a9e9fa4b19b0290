//! Utility modules.

pub mod hash;
pub mod html;
