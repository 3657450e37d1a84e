//! Session orchestrators
//!
//! Both sessions own one encoder and one decoder built from a [`ModelPair`].
//! [`InteractiveSession`] keeps per-label prompts and recomputes a label's
//! mask on every mutation; [`AutomaticSession`] runs batched point prompts
//! and returns deduplicated candidates.

mod automatic;
mod interactive;

pub use automatic::AutomaticSession;
pub use interactive::InteractiveSession;

use crate::{
    config::SessionConfig,
    decoder::MaskDecoder,
    encoder::ImageEncoder,
    error::Result,
    models::ModelPair,
    types::ImageSize,
};
use log::info;

/// Validate the config and build both stages from a loaded model pair
///
/// The decoder signature is resolved against the encoder signature so that
/// high-res feature inputs line up with what the encoder produces.
fn build_stages(pair: ModelPair, config: &SessionConfig) -> Result<(ImageEncoder, MaskDecoder)> {
    config.validate()?;

    let ModelPair {
        manifest,
        encoder,
        decoder,
    } = pair;
    let input_size = manifest
        .input_size
        .map(|[width, height]| ImageSize::new(width, height));

    let encoder = ImageEncoder::new(
        encoder,
        &manifest.tensor_names,
        input_size,
        manifest.normalization,
    )?
    .with_layout(config.resize_mode, config.padding_color, config.swap_rb);

    let decoder = MaskDecoder::new(
        decoder,
        encoder.signature(),
        &manifest.tensor_names,
        encoder.network_size(),
    )?;

    info!(
        "Model '{}' ready: network input {}, {} high-res feature map(s)",
        manifest.name,
        encoder.network_size(),
        decoder.signature().high_res_feats.len()
    );
    Ok((encoder, decoder))
}
