//! Archive building for jobs that yield multiple standalone artifacts.
//!
//! Bundles artifact files under their base names into a single compressed
//! container, ZIP or tar.gz.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tar::Builder as TarBuilder;
use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::{Error, Result};

/// Default compression level (6 is a good balance between speed and size).
fn default_compression_level() -> u8 {
    6
}

/// Archive container format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// ZIP archive format.
    #[default]
    Zip,
    /// Gzipped tar archive format.
    TarGz,
}

impl ArchiveFormat {
    /// Get the default file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

/// Configuration for archive creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub format: ArchiveFormat,

    /// Compression level (0-9). 0 = store, 9 = best compression.
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::Zip,
            compression_level: default_compression_level(),
        }
    }
}

/// Builds one compressed container from an ordered list of artifact paths.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    config: ArchiveConfig,
}

impl ArchiveBuilder {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    /// Default extension for the configured format.
    pub fn extension(&self) -> &'static str {
        self.config.format.extension()
    }

    /// Bundle `inputs` into `output` under their base names.
    ///
    /// Fails if any input is missing; entry order follows input order.
    pub fn create(&self, output: &Path, inputs: &[impl AsRef<Path>]) -> Result<()> {
        for input in inputs {
            if !input.as_ref().is_file() {
                return Err(Error::Archive(format!(
                    "Input file does not exist: {}",
                    input.as_ref().display()
                )));
            }
        }

        match self.config.format {
            ArchiveFormat::Zip => self.create_zip(output, inputs),
            ArchiveFormat::TarGz => self.create_tar_gz(output, inputs),
        }
    }

    fn entry_name(path: &Path) -> String {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string()
    }

    fn create_zip(&self, output: &Path, inputs: &[impl AsRef<Path>]) -> Result<()> {
        let file = File::create(output)
            .map_err(|e| Error::Archive(format!("Failed to create ZIP archive: {}", e)))?;

        let mut zip = ZipWriter::new(file);

        let options = if self.config.compression_level == 0 {
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .compression_level(Some(self.config.compression_level as i64))
        };

        for input in inputs {
            let input = input.as_ref();
            let name = Self::entry_name(input);
            debug!("Adding to ZIP: {} as {}", input.display(), name);

            let mut source = File::open(input).map_err(|e| {
                Error::Archive(format!("Failed to open {}: {}", input.display(), e))
            })?;

            zip.start_file(&name, options)
                .map_err(|e| Error::Archive(format!("Failed to add entry {}: {}", name, e)))?;

            let mut buffer = Vec::new();
            source.read_to_end(&mut buffer).map_err(|e| {
                Error::Archive(format!("Failed to read {}: {}", input.display(), e))
            })?;
            zip.write_all(&buffer)
                .map_err(|e| Error::Archive(format!("Failed to write entry {}: {}", name, e)))?;
        }

        zip.finish()
            .map_err(|e| Error::Archive(format!("Failed to finalize ZIP archive: {}", e)))?;

        Ok(())
    }

    fn create_tar_gz(&self, output: &Path, inputs: &[impl AsRef<Path>]) -> Result<()> {
        let file = File::create(output)
            .map_err(|e| Error::Archive(format!("Failed to create tar.gz archive: {}", e)))?;

        let encoder = GzEncoder::new(file, Compression::new(self.config.compression_level as u32));
        let mut tar = TarBuilder::new(encoder);

        for input in inputs {
            let input = input.as_ref();
            let name = Self::entry_name(input);
            debug!("Adding to tar.gz: {} as {}", input.display(), name);

            tar.append_path_with_name(input, &name).map_err(|e| {
                Error::Archive(format!("Failed to add entry {}: {}", name, e))
            })?;
        }

        tar.into_inner()
            .and_then(|encoder| encoder.finish())
            .map_err(|e| Error::Archive(format!("Failed to finalize tar.gz archive: {}", e)))?;

        Ok(())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new(ArchiveConfig::default())
    }
}
