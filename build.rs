use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=memory.x");

    // The linker script only matters for the bare-metal build; host builds
    // (unit tests, tooling) skip the plumbing entirely.
    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("thumbv7em") {
        return;
    }

    // The kernel heap sits past .bss in RAM and the vector table goes to
    // FLASH, so both regions must be present before the linker runs.
    let memory_x = fs::read_to_string("memory.x").expect("memory.x is missing");
    for region in ["FLASH", "RAM"] {
        assert!(
            memory_x.contains(region),
            "memory.x must define a {region} region"
        );
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("memory.x"), memory_x).unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
}
