//! Build script for the journal core.
//!
//! Compiles the Protocol Buffer definition of the journal service with
//! tonic-build. Falls back to a vendored `protoc` when none is configured.

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_file = "proto/journal.proto";

    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        // Server for journal-server, client for the CLI and integration tests
        .build_server(true)
        .build_client(true)
        .build_transport(true)
        .out_dir(&out_dir)
        .compile(&[proto_file], &["proto/"])?;

    println!("cargo:rerun-if-changed={}", proto_file);
    println!("cargo:rerun-if-changed=build.rs");

    Ok(())
}
