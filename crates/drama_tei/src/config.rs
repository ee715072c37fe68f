//! Edition file: a small TOML document naming the inputs of one edition.
//!
//! ```toml
//! main = "comedia.docx"
//! notes = "notas.docx"
//! apparatus = "aparato.docx"
//! metadata = "metadatos.docx"
//! header_mode = "prolope"
//! output = "comedia.xml"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::header::HeaderMode;

pub const DEFAULT_CONFIG_FILE: &str = "edition.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid edition file {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditionConfig {
    pub main: Option<PathBuf>,
    pub notes: Option<PathBuf>,
    pub apparatus: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
    pub header_mode: Option<HeaderMode>,
    pub output: Option<PathBuf>,
}

impl EditionConfig {
    /// Reads an edition file; relative paths are taken from its directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.relative_to(base))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Looks for `edition.toml` in `dir`.
    pub fn discover(dir: &Path) -> Result<Option<Self>, ConfigError> {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(candidate).map(Some)
        } else {
            Ok(None)
        }
    }

    fn relative_to(self, base: &Path) -> Self {
        let resolve = |p: Option<PathBuf>| p.map(|p| if p.is_absolute() { p } else { base.join(p) });
        EditionConfig {
            main: resolve(self.main),
            notes: resolve(self.notes),
            apparatus: resolve(self.apparatus),
            metadata: resolve(self.metadata),
            header_mode: self.header_mode,
            output: resolve(self.output),
        }
    }
}
