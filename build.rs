fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/thermwatch.proto");

    // Only generate protobuf bindings when the gRPC transport feature is enabled.
    // Core monitoring builds stay lean and never require `protoc`.
    if std::env::var_os("CARGO_FEATURE_TRANSPORT_GRPC").is_none() {
        return Ok(());
    }

    // Use the vendored protoc so transport and demo builds need no system
    // protobuf installation.
    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| format!("failed to locate vendored protoc: {e}"))?;
    std::env::set_var("PROTOC", protoc_path);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/thermwatch.proto"], &["proto/"])?;
    Ok(())
}
