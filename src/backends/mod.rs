//! Inference engine implementations
//!
//! - ONNX Runtime backend (high performance, GPU acceleration)
//! - Tract backend (pure Rust, no external dependencies)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for engine-level testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
