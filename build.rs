// nmea-mux - Build Script
//
// Exports the version string reported by the configuration dialogue's
// diagnostics command.

fn main() {
    let version = std::env::var("CARGO_PKG_VERSION").unwrap();
    println!("cargo:rustc-env=VERSION_STRING=nmea-mux {}", version);
    println!("cargo:rerun-if-changed=build.rs");
}
