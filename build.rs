use std::env;

fn main() {
    println!("cargo:rerun-if-changed=include/storekit_bridge.h");
    println!("cargo:rerun-if-env-changed=STOREKIT_LIB_DIR");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let native = env::var("CARGO_FEATURE_NATIVE").is_ok();

    if target_os == "macos" && native {
        // The Objective-C side is built by the host app; we only link it
        match env::var("STOREKIT_LIB_DIR") {
            Ok(dir) => println!("cargo:rustc-link-search=native={}", dir),
            Err(_) => println!(
                "cargo:warning=feature `native` is enabled but STOREKIT_LIB_DIR is not set; \
                 linking libstorekit.a relies on the default library search path"
            ),
        }
        println!("cargo:rustc-link-lib=framework=Foundation");
        println!("cargo:rustc-link-lib=framework=StoreKit");
    }
}
