//! Plugin directory scan backing `queryMethods` (spec.md §6).
//!
//! The original `AuthCoreLoader` scans a configured directory for shared
//! objects named `lib<method>plugin.{so,dylib,dll}` and derives the
//! method name from the part between `lib` and `plugin`. This reproduces
//! that derivation without linking the plugin as a shared object — each
//! plugin here is a spawned child binary, but installations still drop
//! one discoverable file per method into the plugin directory.

use std::path::Path;

use signon_core::ids::MethodName;
use tracing::debug;

const PREFIX: &str = "lib";
const INFIX: &str = "plugin";

/// Derive a method name from a single directory entry's file name, if it
/// matches the `lib<method>plugin.*` naming convention.
fn method_from_file_name(file_name: &str) -> Option<MethodName> {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let without_prefix = stem.strip_prefix(PREFIX)?;
    let method = without_prefix.strip_suffix(INFIX)?;
    if method.is_empty() {
        return None;
    }
    Some(MethodName::from(method))
}

/// Scan `dir` for plugin files and return the distinct method names
/// found, sorted for deterministic output.
pub fn discover_methods(dir: &Path) -> std::io::Result<Vec<MethodName>> {
    let mut methods = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "plugin directory does not exist; reporting no methods");
            return Ok(methods);
        }
        Err(err) => return Err(err),
    };

    for entry in entries {
        let entry = entry?;
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if let Some(method) = method_from_file_name(&file_name) {
            methods.push(method);
        }
    }

    methods.sort_by(|a, b| a.0.cmp(&b.0));
    methods.dedup();
    Ok(methods)
}

/// Path to the binary that implements `method`, given the plugin
/// directory's own naming convention and a platform shared-object
/// extension reused here as the spawned-executable's extension too.
#[must_use]
pub fn plugin_binary_path(dir: &Path, method: &MethodName) -> std::path::PathBuf {
    dir.join(format!("{PREFIX}{}{INFIX}", method.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_method_name_from_conventional_file_name() {
        assert_eq!(method_from_file_name("libpasswordplugin.so").unwrap().0, "password");
        assert_eq!(method_from_file_name("libsaslplugin.dylib").unwrap().0, "sasl");
    }

    #[test]
    fn rejects_files_not_matching_the_convention() {
        assert!(method_from_file_name("readme.txt").is_none());
        assert!(method_from_file_name("libplugin.so").is_none());
        assert!(method_from_file_name("passwordplugin.so").is_none());
    }

    #[test]
    fn scan_deduplicates_and_sorts() {
        let dir = tempfile_dir_with(&["libsaslplugin.so", "libpasswordplugin.so", "libpasswordplugin.dylib", "notes.txt"]);
        let methods = discover_methods(dir.path()).unwrap();
        let names: Vec<_> = methods.iter().map(|m| m.0.clone()).collect();
        assert_eq!(names, vec!["password".to_string(), "sasl".to_string()]);
    }

    #[test]
    fn missing_directory_yields_no_methods() {
        let methods = discover_methods(Path::new("/no/such/plugin/dir")).unwrap();
        assert!(methods.is_empty());
    }

    fn tempfile_dir_with(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }
}
