//! Decoder infrastructure for folder coder pipelines.
//!
//! Each coder in a folder is mapped to a [`Decoder`] wrapping the previous
//! stage, so a folder chain like `pack → LZMA2 → BCJ` becomes nested
//! readers. Only 1-in/1-out coders are supported; the AES-256 slot is
//! recognised but decryption itself is out of scope.

mod copy;

#[cfg(feature = "lzma")]
mod lzma;

#[cfg(feature = "deflate")]
mod deflate;

#[cfg(feature = "bzip2")]
mod bzip2;

use std::io::Read;

use crate::format::streams::Coder;
use crate::password::Password;
use crate::{Error, Result};

pub use copy::CopyDecoder;

#[cfg(feature = "lzma")]
pub use lzma::{Lzma2Decoder, LzmaDecoder};

#[cfg(feature = "deflate")]
pub use deflate::DeflateDecoder;

#[cfg(feature = "bzip2")]
pub use bzip2::Bzip2Decoder;

/// A decoder: reads compressed bytes from its inner stream and yields
/// decompressed bytes.
pub trait Decoder: Read {
    /// The method ID this decoder implements.
    fn method_id(&self) -> &'static [u8];
}

/// Method IDs for the coders in the supported subset.
pub mod method {
    /// Copy (no compression).
    pub const COPY: &[u8] = &[0x00];
    /// LZMA.
    pub const LZMA: &[u8] = &[0x03, 0x01, 0x01];
    /// LZMA2.
    pub const LZMA2: &[u8] = &[0x21];
    /// Deflate.
    pub const DEFLATE: &[u8] = &[0x04, 0x01, 0x08];
    /// BZip2.
    pub const BZIP2: &[u8] = &[0x04, 0x02, 0x02];
    /// AES-256-CBC with SHA-256 key derivation.
    pub const AES256_SHA256: &[u8] = &[0x06, 0xF1, 0x07, 0x01];

    /// Human-readable name for a method ID.
    pub fn name(id: &[u8]) -> &'static str {
        match id {
            COPY => "Copy",
            LZMA => "LZMA",
            LZMA2 => "LZMA2",
            DEFLATE => "Deflate",
            BZIP2 => "BZip2",
            AES256_SHA256 => "AES-256 + SHA-256",
            _ => "Unknown",
        }
    }
}

/// Wraps `input` in the decoder for `coder`, producing the next stage of a
/// folder's pipeline.
///
/// `uncompressed_size` is the declared output size of this coder;
/// `password` feeds password-requiring coders.
///
/// # Errors
///
/// - [`Error::PasswordRequired`] for the AES slot without a password
/// - [`Error::UnsupportedFeature`] for the AES slot with one (decryption is
///   out of scope)
/// - [`Error::UnsupportedMethod`] for unknown methods or codecs whose
///   cargo feature is disabled
pub(crate) fn add_decoder(
    input: Box<dyn Read>,
    coder: &Coder,
    uncompressed_size: u64,
    password: Option<&Password>,
) -> Result<Box<dyn Read>> {
    #[allow(unused_variables)]
    let properties = coder.properties.as_deref().unwrap_or(&[]);

    match coder.method_id.as_slice() {
        method::COPY => Ok(Box::new(CopyDecoder::new(input, uncompressed_size))),

        #[cfg(feature = "lzma")]
        method::LZMA => {
            let decoder = LzmaDecoder::new(input, properties, uncompressed_size)?;
            Ok(Box::new(decoder))
        }

        #[cfg(feature = "lzma")]
        method::LZMA2 => {
            let decoder = Lzma2Decoder::new(input, properties)?;
            Ok(Box::new(decoder))
        }

        #[cfg(feature = "deflate")]
        method::DEFLATE => Ok(Box::new(DeflateDecoder::new(input))),

        #[cfg(feature = "bzip2")]
        method::BZIP2 => Ok(Box::new(Bzip2Decoder::new(input))),

        method::AES256_SHA256 => match password {
            None => Err(Error::PasswordRequired),
            Some(_) => Err(Error::UnsupportedFeature {
                feature: "AES-256 decryption",
            }),
        },

        _ => Err(Error::UnsupportedMethod {
            method_id: coder.method_id_u64(),
        }),
    }
}
