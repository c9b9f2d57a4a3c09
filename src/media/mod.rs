//! Media handling for the relay
//!
//! This module provides:
//! - Still-image decoding and JPEG encoding
//! - A small bitmap font
//! - Frame annotation and placeholder rendering

pub mod font;
pub mod frame;
pub mod overlay;

pub use frame::{encode_jpeg, Frame, DEFAULT_JPEG_QUALITY, MIN_FRAME_BYTES};
pub use overlay::{annotate, placeholder, short_id};
