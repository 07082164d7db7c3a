use crate::artifacts::core::errors::BitError;
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    /// Type code used in pack object headers
    pub fn pack_code(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }

    pub fn from_pack_code(code: u8) -> anyhow::Result<Self> {
        match code {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            other => Err(BitError::Corrupt(format!("unsupported pack object type {other}")).into()),
        }
    }

    /// Read the `<type> <size>\0` header, leaving the reader at the payload
    ///
    /// Returns the type and the declared payload size.
    pub fn parse_header(data_reader: &mut impl BufRead) -> anyhow::Result<(ObjectType, usize)> {
        let mut object_type = Vec::new();
        data_reader.read_until(b' ', &mut object_type)?;

        let object_type = String::from_utf8(object_type)
            .map_err(|_| BitError::Corrupt("object header is not valid UTF-8".to_string()))?;
        let object_type = ObjectType::try_from(object_type.trim())?;

        let mut size = Vec::new();
        data_reader.read_until(b'\0', &mut size)?;
        if size.pop() != Some(b'\0') {
            return Err(BitError::Corrupt("object header is truncated".to_string()).into());
        }
        let size = std::str::from_utf8(&size)
            .ok()
            .and_then(|size| size.parse::<usize>().ok())
            .ok_or_else(|| BitError::Corrupt("object header has an invalid size".to_string()))?;

        Ok((object_type, size))
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(BitError::Corrupt(format!("invalid object type '{value}'")).into()),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(b"blob 5\0hello".as_slice(), ObjectType::Blob, 5)]
    #[case(b"tree 0\0".as_slice(), ObjectType::Tree, 0)]
    #[case(b"tag 12\0object ...".as_slice(), ObjectType::Tag, 12)]
    fn header_is_parsed(#[case] data: &[u8], #[case] kind: ObjectType, #[case] size: usize) {
        let mut reader = data;
        assert_eq!(ObjectType::parse_header(&mut reader).unwrap(), (kind, size));
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let mut reader = b"blob 5".as_slice();
        let error = ObjectType::parse_header(&mut reader).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::Corrupt(_))
        ));
    }
}
