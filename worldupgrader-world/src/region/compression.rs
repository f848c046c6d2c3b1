use std::io::{Read, Write};

use flate2::read::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Compression scheme not recognised: {0}")]
    UnknownCompression(u8),
    #[error("Custom compression (id {0}) is not supported")]
    Unsupported(u8),
    #[error("Error while working with zlib compression: {0}")]
    ZlibError(std::io::Error),
    #[error("Error while working with Gzip compression: {0}")]
    GZipError(std::io::Error),
    #[error("Error while working with LZ4 compression: {0}")]
    LZ4Error(std::io::Error),
}

/// Payload compression schemes of the Anvil format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    /// GZip Compression
    GZip = Self::GZIP_ID,
    /// ZLib Compression
    ZLib = Self::ZLIB_ID,
    /// Uncompressed (since a version before 1.15.1)
    None = Self::NO_COMPRESSION_ID,
    /// LZ4 Compression (since 24w04a)
    LZ4 = Self::LZ4_ID,
}

impl Compression {
    pub const GZIP_ID: u8 = 1;
    pub const ZLIB_ID: u8 = 2;
    pub const NO_COMPRESSION_ID: u8 = 3;
    pub const LZ4_ID: u8 = 4;
    pub const CUSTOM_ID: u8 = 127;

    pub fn from_byte(byte: u8) -> Result<Self, CompressionError> {
        match byte {
            Self::GZIP_ID => Ok(Self::GZip),
            Self::ZLIB_ID => Ok(Self::ZLib),
            Self::NO_COMPRESSION_ID => Ok(Self::None),
            Self::LZ4_ID => Ok(Self::LZ4),
            Self::CUSTOM_ID => Err(CompressionError::Unsupported(byte)),
            _ => Err(CompressionError::UnknownCompression(byte)),
        }
    }

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn decompress_data(&self, compressed_data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut data = Vec::new();
        match self {
            Compression::GZip => {
                GzDecoder::new(compressed_data)
                    .read_to_end(&mut data)
                    .map_err(CompressionError::GZipError)?;
            }
            Compression::ZLib => {
                ZlibDecoder::new(compressed_data)
                    .read_to_end(&mut data)
                    .map_err(CompressionError::ZlibError)?;
            }
            Compression::None => data.extend_from_slice(compressed_data),
            Compression::LZ4 => {
                lz4_java_wrc::Lz4BlockInput::new(compressed_data)
                    .read_to_end(&mut data)
                    .map_err(CompressionError::LZ4Error)?;
            }
        }
        Ok(data)
    }

    pub fn compress_data(
        &self,
        uncompressed_data: &[u8],
        compression_level: u32,
    ) -> Result<Vec<u8>, CompressionError> {
        let mut data = Vec::new();
        match self {
            Compression::GZip => {
                GzEncoder::new(
                    uncompressed_data,
                    flate2::Compression::new(compression_level),
                )
                .read_to_end(&mut data)
                .map_err(CompressionError::GZipError)?;
            }
            Compression::ZLib => {
                ZlibEncoder::new(
                    uncompressed_data,
                    flate2::Compression::new(compression_level),
                )
                .read_to_end(&mut data)
                .map_err(CompressionError::ZlibError)?;
            }
            Compression::None => data.extend_from_slice(uncompressed_data),
            Compression::LZ4 => {
                let mut encoder = lz4_java_wrc::Lz4BlockOutput::new(&mut data);
                encoder
                    .write_all(uncompressed_data)
                    .and_then(|()| encoder.flush())
                    .map_err(CompressionError::LZ4Error)?;
            }
        }
        Ok(data)
    }
}

impl From<worldupgrader_config::chunk::Compression> for Compression {
    fn from(value: worldupgrader_config::chunk::Compression) -> Self {
        match value {
            worldupgrader_config::chunk::Compression::GZip => Self::GZip,
            worldupgrader_config::chunk::Compression::ZLib => Self::ZLib,
            worldupgrader_config::chunk::Compression::None => Self::None,
            worldupgrader_config::chunk::Compression::LZ4 => Self::LZ4,
        }
    }
}
