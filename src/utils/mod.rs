//! Utility modules for shared functionality

pub mod preprocessing;

pub use preprocessing::{
    ImagePreprocessor, LetterboxTransform, PreprocessedImage, PreprocessingOptions,
};
