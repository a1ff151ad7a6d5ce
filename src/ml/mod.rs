//! Model runtimes (CPU-only inference).
//!
//! Dense MLPs ship as JSON inside the artifact; ONNX graphs are optional and
//! pulled in by the `onnx` feature so the default image stays pure Rust and small.

pub mod dense;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use dense::{Activation, DenseLayer, DenseNetwork};
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;
