// Build script for wattlensctl - embeds version at compile time

fn main() {
    // Release pipelines may override the version, otherwise use Cargo.toml
    let version =
        std::env::var("WATTLENS_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=WATTLENS_VERSION={}", version);

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-env-changed=WATTLENS_VERSION");
}
