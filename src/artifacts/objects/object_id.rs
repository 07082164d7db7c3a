//! Git object identifier (SHA-1 hash)
//!
//! Object IDs are 40-character hexadecimal strings representing SHA-1 hashes.
//!
//! ## Storage
//!
//! Objects are stored in `.git/objects/<first-2-chars>/<remaining-38-chars>`

use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;

/// All-zero id used on the wire for "no such ref"
pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// Git object identifier (SHA-1 hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object ID from a string
    ///
    /// # Arguments
    ///
    /// * `id` - 40-character hexadecimal string
    ///
    /// # Returns
    ///
    /// Validated ObjectId or error if invalid length/characters
    pub fn try_parse(id: String) -> anyhow::Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            return Err(anyhow::anyhow!("Invalid object ID length: {}", id.len()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid object ID characters: {}", id));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Hash a canonical object serialization (`<kind> <len>\0<payload>`)
    pub fn hash_of(serialized: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(serialized);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn zero() -> Self {
        Self(ZERO_OID.to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_OID
    }

    /// Write the object ID in binary format (20 bytes)
    ///
    /// Used when serializing tree objects.
    pub fn write_h40_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> anyhow::Result<[u8; 20]> {
        let hex40 = self.as_ref();
        let mut bytes = [0u8; OBJECT_ID_LENGTH / 2];

        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex40[2 * i..2 * i + 2], 16)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid hex digit"))?;
        }

        Ok(bytes)
    }

    /// Read an object ID from binary format (20 bytes)
    ///
    /// Used when deserializing tree objects.
    pub fn read_h40_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut buffer = [0u8; OBJECT_ID_LENGTH / 2];
        reader.read_exact(&mut buffer)?;

        Ok(Self::from_bytes(&buffer))
    }

    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Convert to file system path for object storage
    ///
    /// Splits the hash as `XX/YYYYYY...` where XX is the first 2 chars.
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// First 7 characters of the hash (standard Git abbreviation)
    pub fn to_short_oid(&self) -> String {
        self.0.split_at(7).0.to_string()
    }
}

impl TryFrom<&str> for ObjectId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        Self::try_parse(value.to_string())
            .map_err(|_| BitError::Corrupt(format!("'{value}' is not a valid object id")).into())
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn hash_of_empty_blob_matches_git() {
        let oid = ObjectId::hash_of(b"blob 0\0");
        assert_eq!(oid.as_ref(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn path_is_split_after_two_chars() {
        let oid = ObjectId::hash_of(b"blob 0\0");
        assert_eq!(
            oid.to_path(),
            PathBuf::from("e6").join("9de29bb2d1d6434b8b29ae775ad8c2e48c5391")
        );
    }

    proptest! {
        #[test]
        fn binary_form_preserves_the_id(bytes in prop::array::uniform20(any::<u8>())) {
            let oid = ObjectId::from_bytes(&bytes);
            let mut buffer = Vec::new();
            oid.write_h40_to(&mut buffer).unwrap();
            prop_assert_eq!(ObjectId::read_h40_from(&mut buffer.as_slice()).unwrap(), oid);
        }
    }
}
