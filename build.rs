//! Build script: points the linker at the Npcap SDK that `pnet` needs on Windows

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=NPCAP_SDK_DIR");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let sdk = env::var("NPCAP_SDK_DIR").unwrap_or_else(|_| "C:\\npcap\\npcap-sdk-1.15".to_string());
    let lib_dir = match env::var("CARGO_CFG_TARGET_ARCH").as_deref() {
        Ok("aarch64") => format!("{sdk}\\Lib\\ARM64"),
        Ok("x86_64") => format!("{sdk}\\Lib\\x64"),
        _ => format!("{sdk}\\Lib"),
    };

    println!("cargo:rustc-link-search=native={lib_dir}");
    println!("cargo:rustc-link-lib=Packet");
    println!("cargo:rustc-link-lib=wpcap");
}
