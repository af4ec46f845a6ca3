//! Password handling for encrypted archives.
//!
//! 7z derives encryption keys from the UTF-16LE encoding of the password.
//! The buffer is held in zeroizing storage and wiped when the reader is
//! closed or dropped.

use zeroize::Zeroizing;

/// A password for an encrypted archive.
///
/// Stored as the UTF-16LE byte sequence that 7z's key derivation consumes.
/// Construct from a string with [`Password::new`] or from already encoded
/// bytes with [`Password::from_utf16_le`].
#[derive(Clone)]
pub struct Password {
    bytes: Zeroizing<Vec<u8>>,
}

impl Password {
    /// Creates a password from a string, encoding it as UTF-16LE.
    pub fn new(password: &str) -> Self {
        let bytes = password
            .encode_utf16()
            .flat_map(|c| c.to_le_bytes())
            .collect();
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Creates a password from raw UTF-16LE bytes.
    ///
    /// This is the byte-level constructor; the bytes are used for key
    /// derivation exactly as given.
    pub fn from_utf16_le(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Returns the UTF-16LE bytes for key derivation.
    pub fn as_utf16_le(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns true if the password is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the password itself.
        f.debug_struct("Password")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
