//! Build script for axdd132x-sys.
//!
//! The bindings are hand-written (the vendor header depends on `windows.h`
//! and C++ constructors, which bindgen cannot consume portably), so this
//! script only decides how to link:
//!
//! 1. With `axdd132x-sdk`: link the `AxDD132x` import library
//! 2. Without the feature: nothing to link, the crate provides stubs

fn main() {
    println!("cargo:rerun-if-env-changed=AXDD132X_LIB_DIR");

    #[cfg(feature = "axdd132x-sdk")]
    link_driver();
}

#[cfg(feature = "axdd132x-sdk")]
fn link_driver() {
    use std::env;
    use std::path::PathBuf;

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" {
        println!(
            "cargo:warning=AxDD132x is a Windows driver; linking for target_os={} will likely fail",
            target_os
        );
    }

    if let Ok(lib_dir) = env::var("AXDD132X_LIB_DIR") {
        let lib_path = PathBuf::from(&lib_dir);
        if !lib_path.exists() {
            // The import library might live on the default search path,
            // so warn rather than panic.
            println!(
                "cargo:warning=AXDD132X_LIB_DIR does not exist: {}",
                lib_path.display()
            );
        }
        println!("cargo:rustc-link-search=native={}", lib_path.display());
    }

    println!("cargo:rustc-link-lib=dylib=AxDD132x");
}
