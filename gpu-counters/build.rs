/// Build script for the CUPTI backend
///
/// With the `cuda` feature, points the linker at the CUPTI libraries of the
/// toolkit found through `CUDA_HOME`/`CUDA_PATH` (default `/usr/local/cuda`).

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=CUDA_HOME");
    println!("cargo:rerun-if-env-changed=CUDA_PATH");

    if env::var_os("CARGO_FEATURE_CUDA").is_none() {
        return;
    }

    let root = env::var_os("CUDA_HOME")
        .or_else(|| env::var_os("CUDA_PATH"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/usr/local/cuda"));

    for dir in ["extras/CUPTI/lib64", "lib64"] {
        let path = root.join(dir);
        if path.exists() {
            println!("cargo:rustc-link-search=native={}", path.display());
        }
    }
}
