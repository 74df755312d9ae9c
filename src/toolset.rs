use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::encoder;
use crate::error::Error;
use crate::filter::FilterTool;
use crate::options::{Architecture, EncodeOptions, EncoderVariant};

/// Locates the bundled tool binaries below an install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolset {
    root: PathBuf,
}

impl Toolset {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::InvalidInstallRoot {
                path: root,
                reason: "not a directory".into(),
            });
        }
        Ok(Toolset { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expands `{arch}` and `{variant}` in a template relative to the root.
    pub fn expand(
        &self,
        template: &str,
        arch: Architecture,
        variant: Option<EncoderVariant>,
    ) -> PathBuf {
        let mut relative = template.replace("{arch}", arch.as_str());
        if let Some(variant) = variant {
            relative = relative.replace("{variant}", variant.as_str());
        }
        self.root.join(relative)
    }

    fn executable(&self, template: &str, arch: Architecture, variant: Option<EncoderVariant>) -> PathBuf {
        let mut path = self.expand(template, arch, variant).into_os_string();
        path.push(env::consts::EXE_SUFFIX);
        PathBuf::from(path)
    }

    pub fn encoder_binary(&self, options: &EncodeOptions) -> PathBuf {
        let desc = encoder::descriptor(options.encoder);
        self.executable(desc.binary, options.arch, Some(options.variant))
    }

    pub fn encoder_dependencies(&self, options: &EncodeOptions) -> Vec<PathBuf> {
        encoder::descriptor(options.encoder)
            .dependencies
            .iter()
            .map(|dep| self.expand(dep, options.arch, Some(options.variant)))
            .collect()
    }

    /// The encoder binary, provided it and all of its runtime dependencies
    /// exist.
    pub fn locate_encoder(&self, options: &EncodeOptions) -> Result<PathBuf, Error> {
        let binary = self.encoder_binary(options);
        if !binary.is_file() {
            return Err(not_found(&binary));
        }
        if let Some(missing) = self
            .encoder_dependencies(options)
            .into_iter()
            .find(|dep| !dep.is_file())
        {
            return Err(not_found(&missing));
        }
        Ok(binary)
    }

    /// The bundled filter binary, falling back to a `PATH` search.
    pub fn locate_filter(&self, tool: FilterTool, arch: Architecture) -> Result<PathBuf, Error> {
        let bundled = self.executable(tool.binary(), arch, None);
        if bundled.is_file() {
            return Ok(bundled);
        }
        let path_var = env::var_os("PATH").unwrap_or_default();
        find_executable_in_path(tool.label(), &path_var).map_err(|e| match e {
            Error::ExecutableNotFound {
                name,
                mut searched_paths,
            } => {
                searched_paths.insert(0, bundled);
                Error::ExecutableNotFound {
                    name,
                    searched_paths,
                }
            }
            other => other,
        })
    }
}

fn not_found(path: &Path) -> Error {
    Error::ExecutableNotFound {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        searched_paths: vec![path.to_path_buf()],
    }
}

/// Searches the given PATH string for `name` plus the platform suffix.
pub fn find_executable_in_path(name: &str, path_env: &OsStr) -> Result<PathBuf, Error> {
    let file_name = format!("{name}{}", env::consts::EXE_SUFFIX);
    let paths = env::split_paths(path_env).collect::<Vec<_>>();
    for path in &paths {
        let executable_path = path.join(&file_name);
        if executable_path.is_file() {
            return Ok(executable_path);
        }
    }

    Err(Error::ExecutableNotFound {
        name: file_name,
        searched_paths: paths,
    })
}
