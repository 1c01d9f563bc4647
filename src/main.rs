//! rasterload - print what a GIF or ZPL file decodes to

use anyhow::{bail, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    env_logger::init();

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        bail!("usage: rasterload <file>...");
    }

    let mut failures = 0;
    for path in &paths {
        match rasterload::load(path) {
            Ok(image) => {
                println!(
                    "{}: {}x{}, {} frame(s)",
                    path.display(),
                    image.width,
                    image.height,
                    image.frame_count()
                );
                for (i, delay) in image.frame_delays.iter().enumerate() {
                    println!("  frame {:>3}: {:?}", i, delay);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: [{:?}] {}", path.display(), e.kind(), e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} file(s) failed to decode", failures, paths.len());
    }

    Ok(())
}
