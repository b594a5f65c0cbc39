//! Shared driver for the `gen_kotlin` and `gen_swift` bins

use camino::{Utf8Path, Utf8PathBuf};
use uniffi_bindgen::BindingGenerator;

/// Inputs and output location for one target language
pub struct BindingPaths {
    pub udl_file: Utf8PathBuf,
    /// `uniffi.toml`, when present; without it bindgen fails on the missing
    /// package name
    pub config_file: Option<Utf8PathBuf>,
    pub out_dir: Utf8PathBuf,
}

impl BindingPaths {
    /// Resolve against the core crate's manifest dir, so the bins work from
    /// any working directory.
    pub fn resolve(language: &str) -> Self {
        let manifest_dir =
            std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
        Self::under(Utf8Path::new(&manifest_dir), language)
    }

    fn under(manifest_dir: &Utf8Path, language: &str) -> Self {
        let config_file = manifest_dir.join("uniffi.toml");
        Self {
            udl_file: manifest_dir.join("src/api.udl"),
            config_file: config_file.exists().then_some(config_file),
            out_dir: manifest_dir
                .join("target/generated-sources/uniffi")
                .join(language.to_lowercase()),
        }
    }
}

/// Generate `language` bindings for the beacon engine from `api.udl`.
pub fn generate<G: BindingGenerator>(generator: G, language: &str) {
    let paths = BindingPaths::resolve(language);

    uniffi_bindgen::generate_bindings(
        paths.udl_file.as_path(),
        paths.config_file.as_deref(),
        generator,
        Some(paths.out_dir.as_path()),
        None,
        None,
        false,
    )
    .unwrap_or_else(|e| {
        panic!(
            "Failed to generate {} bindings for the beacon engine ({}). Check {} and {}",
            language,
            e,
            paths.udl_file,
            paths
                .config_file
                .as_ref()
                .map_or("core/uniffi.toml", |p| p.as_str()),
        )
    });

    println!("{} bindings written to {}", language, paths.out_dir);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_manifest_dir() {
        let paths = BindingPaths::under(Utf8Path::new("/work/core"), "Swift");
        assert_eq!(paths.udl_file, "/work/core/src/api.udl");
        assert_eq!(
            paths.out_dir,
            "/work/core/target/generated-sources/uniffi/swift"
        );
        assert!(paths.config_file.is_none());
    }

    #[test]
    fn test_resolve_picks_up_uniffi_toml() {
        let paths = BindingPaths::resolve("Kotlin");
        assert!(paths.udl_file.ends_with("src/api.udl"));
        assert!(paths.config_file.is_some());
        assert!(paths.out_dir.ends_with("uniffi/kotlin"));
    }
}
