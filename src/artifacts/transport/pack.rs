//! Pack files as sent over the wire
//!
//! ```text
//! "PACK" | version: u32 = 2 | count: u32 | object* | sha1(everything before)
//! object = type/size varint header | zlib(payload)
//! ```
//!
//! The header's first byte holds the type in bits 4-6 and the low four bits of
//! the size; each following byte adds seven more size bits, least significant
//! first, while the high bit is set. Objects are always stored whole.

use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::object::with_header;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

const SIGNATURE: &[u8; 4] = b"PACK";
const VERSION: u32 = 2;
const HEADER_SIZE: usize = 12;
const TRAILER_SIZE: usize = 20;

/// Object carried in a pack, payload without the loose-object header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackObject {
    pub object_type: ObjectType,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
pub struct PackBuilder {
    objects: Vec<PackObject>,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object_type: ObjectType, payload: Bytes) {
        self.objects.push(PackObject {
            object_type,
            payload,
        });
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn build(&self) -> anyhow::Result<Bytes> {
        let mut pack = Vec::new();
        pack.write_all(SIGNATURE)?;
        pack.write_u32::<BigEndian>(VERSION)?;
        pack.write_u32::<BigEndian>(self.objects.len() as u32)?;

        for object in &self.objects {
            write_object_header(&mut pack, object.object_type, object.payload.len())?;

            let mut encoder =
                flate2::write::ZlibEncoder::new(&mut pack, flate2::Compression::default());
            encoder
                .write_all(&object.payload)
                .context("Unable to compress pack object")?;
            encoder.finish().context("Unable to finish pack object")?;
        }

        let trailer = Sha1::digest(&pack);
        pack.extend_from_slice(&trailer);

        Ok(Bytes::from(pack))
    }
}

fn write_object_header(
    pack: &mut Vec<u8>,
    object_type: ObjectType,
    size: usize,
) -> anyhow::Result<()> {
    let mut byte = (object_type.pack_code() << 4) | (size & 0x0f) as u8;
    let mut size = size >> 4;

    while size > 0 {
        pack.write_u8(byte | 0x80)?;
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    pack.write_u8(byte)?;

    Ok(())
}

fn corrupt(message: impl Into<String>) -> anyhow::Error {
    BitError::Corrupt(message.into()).into()
}

pub struct PackParser<'p> {
    data: &'p [u8],
    position: usize,
}

impl<'p> PackParser<'p> {
    pub fn new(data: &'p [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Verify the trailer checksum and header, then decode every object
    pub fn parse(mut self) -> anyhow::Result<Vec<PackObject>> {
        if self.data.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(corrupt(format!("pack of {} bytes is truncated", self.data.len())));
        }

        let (body, trailer) = self.data.split_at(self.data.len() - TRAILER_SIZE);
        if Sha1::digest(body).as_slice() != trailer {
            return Err(corrupt("pack checksum mismatch"));
        }

        if &body[..4] != SIGNATURE {
            return Err(corrupt("missing PACK signature"));
        }
        let version = BigEndian::read_u32(&body[4..8]);
        if version != VERSION {
            return Err(corrupt(format!("unsupported pack version {version}")));
        }
        let count = BigEndian::read_u32(&body[8..12]) as usize;

        self.data = body;
        self.position = HEADER_SIZE;

        let mut objects = Vec::with_capacity(count);
        for _ in 0..count {
            objects.push(self.next_object()?);
        }

        if self.position != self.data.len() {
            return Err(corrupt("trailing bytes after the last pack object"));
        }

        Ok(objects)
    }

    fn next_byte(&mut self) -> anyhow::Result<u8> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or_else(|| corrupt("pack ends inside an object header"))?;
        self.position += 1;
        Ok(byte)
    }

    fn next_object(&mut self) -> anyhow::Result<PackObject> {
        let mut byte = self.next_byte()?;
        let object_type = ObjectType::from_pack_code((byte >> 4) & 0x07)?;
        let mut size = (byte & 0x0f) as usize;
        let mut shift = 4;

        while byte & 0x80 != 0 {
            byte = self.next_byte()?;
            size |= ((byte & 0x7f) as usize) << shift;
            shift += 7;
        }

        let mut decoder = flate2::bufread::ZlibDecoder::new(&self.data[self.position..]);
        let mut payload = Vec::with_capacity(size);
        decoder
            .read_to_end(&mut payload)
            .map_err(|error| corrupt(format!("invalid zlib stream in pack: {error}")))?;
        self.position += decoder.total_in() as usize;

        if payload.len() != size {
            return Err(corrupt(format!(
                "pack object declares {size} bytes but holds {}",
                payload.len()
            )));
        }

        Ok(PackObject {
            object_type,
            payload: Bytes::from(payload),
        })
    }
}

/// Id the object will have once stored
pub fn object_id_of(object: &PackObject) -> ObjectId {
    ObjectId::hash_of(&with_header(object.object_type, &object.payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_pack() -> Bytes {
        let mut builder = PackBuilder::new();
        builder.add(ObjectType::Blob, Bytes::from_static(b"hello\n"));
        builder.add(ObjectType::Blob, Bytes::from(vec![7u8; 5000]));
        builder.build().unwrap()
    }

    #[test]
    fn built_packs_parse_back() {
        let objects = PackParser::new(&sample_pack()).parse().unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].payload.as_ref(), b"hello\n");
        assert_eq!(objects[1].payload.len(), 5000);
        assert_eq!(
            object_id_of(&objects[0]).as_ref(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
    }

    #[test]
    fn empty_packs_are_valid() {
        let pack = PackBuilder::new().build().unwrap();

        assert_eq!(pack.len(), HEADER_SIZE + TRAILER_SIZE);
        assert!(PackParser::new(&pack).parse().unwrap().is_empty());
    }

    #[test]
    fn a_flipped_byte_fails_the_trailer() {
        let mut pack = sample_pack().to_vec();
        pack[HEADER_SIZE + 3] ^= 0xff;

        let error = PackParser::new(&pack).parse().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::Corrupt(message)) if message.contains("checksum")
        ));
    }

    #[test]
    fn size_headers_use_continuation_bytes() {
        let mut header = Vec::new();
        write_object_header(&mut header, ObjectType::Blob, 5000).unwrap();

        // 5000 = 0x1388: low nibble 0x8, then 7-bit groups 0x38 and 0x02
        assert_eq!(header, vec![0x80 | (3 << 4) | 0x08, 0x80 | 0x38, 0x02]);
    }
}
