//! Configuration types for frame file handles

use serde::{Deserialize, Serialize};

use crate::storage::DataFormat;
use crate::{FrameFileError, Result};

/// On-disk width used for real-valued data written with `write_real`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealFormat {
    /// 4-byte floats
    F32,
    /// 8-byte floats
    #[default]
    F64,
}

impl RealFormat {
    /// Matrix format tag for this width
    #[must_use]
    pub fn data_format(self) -> DataFormat {
        match self {
            Self::F32 => DataFormat::Float32,
            Self::F64 => DataFormat::Float64,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Width of real-valued data
    #[serde(default)]
    pub real_format: RealFormat,
    /// Buffered I/O settings
    #[serde(default)]
    pub io: IoConfig,
    /// Limits applied when reading
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Buffered I/O settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoConfig {
    /// Capacity of the read and write buffers in bytes
    pub buffer_size: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
        }
    }
}

/// Resource limits
///
/// Headers exceeding these are treated as corrupt before any allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum data bytes in one matrix
    pub max_matrix_bytes: usize,
    /// Maximum matrices in one frame
    pub max_frame_matrices: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_matrix_bytes: 256 * 1024 * 1024, // 256 MB
            max_frame_matrices: 65_536,
        }
    }
}

impl FileConfig {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FrameFileError::ConfigError(format!("Failed to read config file: {e}"))
        })?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| FrameFileError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.io.buffer_size == 0 {
            return Err(FrameFileError::ConfigError(
                "io.buffer_size must be > 0".to_string(),
            ));
        }

        if self.limits.max_matrix_bytes == 0 {
            return Err(FrameFileError::ConfigError(
                "limits.max_matrix_bytes must be > 0".to_string(),
            ));
        }

        if self.limits.max_frame_matrices == 0 {
            return Err(FrameFileError::ConfigError(
                "limits.max_frame_matrices must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
