//! sam2-prompt CLI tool
//!
//! Automatic mask generation for one image with a SAM2-style encoder/decoder
//! pair, using the ONNX Runtime or Tract backend.

#[cfg(feature = "cli")]
use sam2_prompt::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
