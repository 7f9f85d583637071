fn main() {
    // macOS: CoreBluetooth leaves the central manager "unauthorised" (scans
    // return nothing) unless the binary carries an Info.plist with
    // NSBluetoothAlwaysUsageDescription.  CLI tools have no bundle, so the
    // plist is linked into the __TEXT,__info_plist section instead.
    //
    // CARGO_CFG_TARGET_OS is the target, so cross builds to macOS work too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir = std::env::var("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR must be set by Cargo");
        let plist = format!("{dir}/Info.plist");

        for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
            println!("cargo:rustc-link-arg={arg}");
        }
        println!("cargo:rerun-if-changed=Info.plist");
    }
}
