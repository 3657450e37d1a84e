//! Error types for segmentation operations

use thiserror::Error;

/// Result type alias for segmentation operations
pub type Result<T> = std::result::Result<T, SegmentError>;

/// Error types surfaced by the prompt-to-mask engine
///
/// Only configuration problems and inference engine failures cross the
/// session boundary. Removing a prompt that does not exist, decoding a label
/// without prompts, and degenerate masks are handled locally and never show
/// up here.
#[derive(Error, Debug)]
pub enum SegmentError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Manifest parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inference engine errors (fatal, never retried)
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A tensor required by the model contract is absent from the model metadata
    #[error("Missing tensor '{name}' in {model} model (available: {available})")]
    MissingTensor {
        model: String,
        name: String,
        available: String,
    },

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Tensor shape or post-processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// A prompt operation was issued before any image was set on the session
    #[error("No image set on session; call set_image first")]
    ImageNotSet,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SegmentError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a missing tensor error listing the names the model does expose
    pub fn missing_tensor(model: &str, name: &str, available: &[String]) -> Self {
        Self::MissingTensor {
            model: model.to_string(),
            name: name.to_string(),
            available: if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            },
        }
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create inference error with engine context
    pub fn inference_error_with_engine(engine: &str, model: &str, error: &str) -> Self {
        Self::Inference(format!(
            "{} model inference failed using '{}' engine: {}",
            model, engine, error
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = SegmentError::invalid_config("test config error");
        assert!(matches!(err, SegmentError::InvalidConfig(_)));

        let err = SegmentError::inference("engine crashed");
        assert!(matches!(err, SegmentError::Inference(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SegmentError::invalid_config("points_per_batch must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: points_per_batch must be positive"
        );

        assert_eq!(
            SegmentError::ImageNotSet.to_string(),
            "No image set on session; call set_image first"
        );
    }

    #[test]
    fn test_missing_tensor_lists_available_names() {
        let err = SegmentError::missing_tensor(
            "decoder",
            "point_coords",
            &["image_embed".to_string(), "mask_input".to_string()],
        );
        let message = err.to_string();
        assert!(message.contains("point_coords"));
        assert!(message.contains("decoder"));
        assert!(message.contains("image_embed, mask_input"));

        let err = SegmentError::missing_tensor("encoder", "image", &[]);
        assert!(err.to_string().contains("available: none"));
    }

    #[test]
    fn test_enhanced_error_context() {
        let err = SegmentError::config_value_error("overlap threshold", 1.5, "0.0-1.0", Some(0.7));
        let error_string = err.to_string();
        assert!(error_string.contains("overlap threshold"));
        assert!(error_string.contains("1.5"));
        assert!(error_string.contains("0.0-1.0"));
        assert!(error_string.contains("Recommended: 0.7"));

        let err = SegmentError::model_error_with_context(
            "load",
            Path::new("/models/sam2/decoder.onnx"),
            "file not found",
            &["check model.json", "verify permissions"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("/models/sam2/decoder.onnx"));
        assert!(error_string.contains("Suggestions: check model.json, verify permissions"));

        let err = SegmentError::inference_error_with_engine("onnx", "decoder", "shape mismatch");
        assert!(err.to_string().contains("decoder model inference failed using 'onnx' engine"));
    }
}
