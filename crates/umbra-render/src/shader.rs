//! Resolved WGSL sources for shader-module resources.

use std::path::PathBuf;

use log::{debug, info};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Error types for shader source resolution.
#[derive(Debug, Error)]
pub enum ShaderError {
    /// No source is registered or on disk for this logical path.
    #[error("shader source not found: {path}")]
    NotFound { path: String },

    /// Reading an override file failed.
    #[error("failed to read shader file: {0}")]
    Io(#[from] std::io::Error),

    /// The source still carries a preprocessor directive.
    #[error("shader '{path}' has an unresolved #include on line {line}")]
    UnresolvedInclude { path: String, line: usize },
}

/// Supplier of fully resolved shader text by logical path.
///
/// Implementations expand includes themselves; the renderer treats the
/// returned text as opaque WGSL.
pub trait ShaderSource {
    fn resolve(&self, path: &str) -> Result<String, ShaderError>;
}

const BUILTIN: [(&str, &str); 4] = [
    ("prepass.wgsl", include_str!("shaders/prepass.wgsl")),
    ("gbuffer.wgsl", include_str!("shaders/gbuffer.wgsl")),
    ("shadow.wgsl", include_str!("shaders/shadow.wgsl")),
    ("lighting.wgsl", include_str!("shaders/lighting.wgsl")),
];

/// Built-in pass shaders, with optional overrides from a directory on disk.
pub struct ShaderLibrary {
    sources: FxHashMap<String, String>,
    shader_dir: Option<PathBuf>,
}

impl ShaderLibrary {
    /// A library serving the embedded pass shaders.
    pub fn new() -> Self {
        let sources = BUILTIN
            .iter()
            .map(|(path, source)| (path.to_string(), source.to_string()))
            .collect();
        Self {
            sources,
            shader_dir: None,
        }
    }

    /// Prefer `.wgsl` files found in `dir` over the embedded copies.
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!("Shader overrides enabled from {}", dir.display());
        self.shader_dir = Some(dir);
        self
    }

    /// Register or replace the source served for `path`.
    pub fn register(&mut self, path: impl Into<String>, source: impl Into<String>) {
        let path = path.into();
        if self.sources.insert(path.clone(), source.into()).is_some() {
            debug!("Replaced shader source '{path}'");
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderSource for ShaderLibrary {
    fn resolve(&self, path: &str) -> Result<String, ShaderError> {
        let source = match &self.shader_dir {
            Some(dir) if dir.join(path).is_file() => {
                let file = dir.join(path);
                debug!("Loading shader '{path}' from {}", file.display());
                std::fs::read_to_string(file)?
            }
            _ => self
                .sources
                .get(path)
                .cloned()
                .ok_or_else(|| ShaderError::NotFound {
                    path: path.to_string(),
                })?,
        };

        if let Some(line) = source
            .lines()
            .position(|l| l.trim_start().starts_with("#include"))
        {
            return Err(ShaderError::UnresolvedInclude {
                path: path.to_string(),
                line: line + 1,
            });
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_shaders_resolve() {
        let library = ShaderLibrary::new();
        assert_eq!(library.len(), 4);
        for (path, _) in BUILTIN {
            let source = library.resolve(path).unwrap();
            assert!(source.contains("@vertex"), "{path} has no vertex stage");
        }
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let library = ShaderLibrary::new();
        assert!(matches!(
            library.resolve("bloom.wgsl"),
            Err(ShaderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unresolved_include_is_rejected() {
        let mut library = ShaderLibrary::new();
        library.register("broken.wgsl", "// header\n#include \"common.wgsl\"\n");
        assert!(matches!(
            library.resolve("broken.wgsl"),
            Err(ShaderError::UnresolvedInclude { line: 2, .. })
        ));
    }

    #[test]
    fn test_directory_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("prepass.wgsl"), "// override\n@vertex fn vs_main() {}").unwrap();
        let library = ShaderLibrary::new().with_shader_dir(dir.path());
        assert!(library.resolve("prepass.wgsl").unwrap().starts_with("// override"));
        // Files absent from the directory still come from the embedded set.
        assert!(library.resolve("lighting.wgsl").unwrap().contains("fs_main"));
    }
}
