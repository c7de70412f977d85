use std::env;
use std::error::Error;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    let descriptor_path = PathBuf::from(env::var("OUT_DIR")?).join("ring_descriptor.bin");

    tonic_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .compile(&["proto/ring.proto"], &["proto"])?;

    Ok(())
}
