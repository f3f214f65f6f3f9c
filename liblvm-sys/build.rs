use std::path::{Path, PathBuf};

const SEARCH_DIRS: &[&str] = &[
    "/usr/lib64",
    "/usr/lib",
    "/lib64",
    "/lib",
    "/usr/lib/x86_64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
    "/usr/local/lib",
];

fn has_lvm2app(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .flatten()
        .any(|entry| entry.file_name().to_string_lossy().starts_with("liblvm2app.so"))
}

fn main() {
    println!("cargo:rerun-if-env-changed=LVM2APP_LIB_DIR");

    if let Some(dir) = std::env::var_os("LVM2APP_LIB_DIR") {
        let dir = PathBuf::from(dir);
        println!("cargo:rustc-link-search=native={}", dir.display());
        println!("cargo:rustc-link-lib=dylib=lvm2app");
        return;
    }

    if SEARCH_DIRS.iter().map(Path::new).any(has_lvm2app) {
        println!("cargo:rustc-link-lib=dylib=lvm2app");
    } else {
        // Declarations stay usable for type checking; any binary that calls
        // into them fails at link time instead.
        println!("cargo:warning=liblvm2app not found; set LVM2APP_LIB_DIR to link against it");
    }
}
