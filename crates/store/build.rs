//! Build script for the store crate
//!
//! redb and sled expose no version at runtime, so the versions Cargo resolved
//! for them are read from the lockfile and passed in as
//! `STORE_REDB_VERSION` and `STORE_SLED_VERSION`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const ENGINES: &[(&str, &str)] = &[("redb", "STORE_REDB_VERSION"), ("sled", "STORE_SLED_VERSION")];

fn main() {
    let lockfile = env::var("CARGO_MANIFEST_DIR")
        .ok()
        .and_then(|dir| find_lockfile(Path::new(&dir)));

    let contents = match &lockfile {
        Some(path) => {
            println!("cargo:rerun-if-changed={}", path.display());
            fs::read_to_string(path).unwrap_or_default()
        }
        None => String::new(),
    };

    for (package, var) in ENGINES {
        let version = locked_version(&contents, package).unwrap_or("unknown");
        println!("cargo:rustc-env={}={}", var, version);
    }
}

/// Walk up from the manifest directory to the workspace lockfile
fn find_lockfile(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join("Cargo.lock"))
        .find(|path| path.is_file())
}

/// Version of `package` in a Cargo.lock, from its `[[package]]` entry
fn locked_version<'a>(lockfile: &'a str, package: &str) -> Option<&'a str> {
    let name_line = format!("name = \"{}\"", package);
    let mut lines = lockfile.lines();
    while let Some(line) = lines.next() {
        if line.trim() == name_line {
            return lines
                .next()?
                .trim()
                .strip_prefix("version = \"")?
                .strip_suffix('"');
        }
    }
    None
}
