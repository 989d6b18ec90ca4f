//! Build script for secu-proto.
//!
//! Generates the tonic client and server for `proto/secu.proto`. A vendored
//! `protoc` is used unless `PROTOC` already points at one.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    println!("cargo:rerun-if-changed=proto/secu.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/secu.proto"], &["proto"])?;

    Ok(())
}
