//! Build script for coco-yield-ffi.
//!
//! Generates the C header file using cbindgen.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let out_dir = PathBuf::from(&crate_dir).join("include");

    // Create output directory if it doesn't exist
    std::fs::create_dir_all(&out_dir).ok();

    let config = match cbindgen::Config::from_file(PathBuf::from(&crate_dir).join("cbindgen.toml")) {
        Ok(config) => config,
        Err(e) => {
            println!("cargo:warning=cbindgen.toml not usable: {}", e);
            return;
        }
    };

    // Header generation is best-effort.
    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(out_dir.join("coco_yield_ffi.h"));
        }
        Err(e) => println!("cargo:warning=header generation skipped: {}", e),
    }
}
