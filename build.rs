use std::env;

fn main() {
    // Host builds (unit and integration tests) link normally.
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    if arch != "arm" {
        return;
    }

    // memory.x is provided by embassy-stm32's memory-x feature.
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
