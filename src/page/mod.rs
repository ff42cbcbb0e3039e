//! Data Page 读写
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ value_count  (u32 LE)            │
//! │ first_row_id (u64 LE)            │
//! │ uncomp_size  (u32 LE)            │
//! │ data         (encoded+compressed)│
//! │ CRC32        (u32 LE)            │
//! └──────────────────────────────────┘
//! ```
//!
//! 编码与压缩方式记录在 Segment 文件头，同一列的所有页共用。

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::common::{ColumnError, Result, RowId};
use crate::compression;
use crate::encoding;
use crate::field_type::{CompressionType, EncodingType};

/// 页头长度（不含 CRC）
pub const PAGE_HEADER_LEN: usize = 16;

// ── PageBuilder ───────────────────────────────────────────────────────────────

pub struct PageBuilder {
    pub first_row_id: RowId,
    encoding:         EncodingType,
    compression:      CompressionType,
    max_rows:         usize,
    values:           Vec<String>,
}

impl PageBuilder {
    pub fn new(
        first_row_id: RowId,
        encoding:     EncodingType,
        compression:  CompressionType,
        max_rows:     usize,
    ) -> Self {
        Self { first_row_id, encoding, compression, max_rows, values: Vec::new() }
    }

    pub fn add(&mut self, v: String) {
        self.values.push(v);
    }

    pub fn len(&self)      -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool  { self.values.is_empty() }
    pub fn is_full(&self)  -> bool  { self.values.len() >= self.max_rows }

    /// 序列化为页字节（encode → compress → 加 header+CRC）
    pub fn build(self) -> Result<Vec<u8>> {
        let count       = self.values.len() as u32;
        let encoded     = encoding::encode(&self.values, self.encoding)?;
        let uncomp_size = encoded.len() as u32;
        let compressed  = compression::compress(&encoded, self.compression)?;

        let mut page = Vec::with_capacity(PAGE_HEADER_LEN + compressed.len() + 4);
        page.write_u32::<LittleEndian>(count)?;
        page.write_u64::<LittleEndian>(self.first_row_id)?;
        page.write_u32::<LittleEndian>(uncomp_size)?;
        page.extend_from_slice(&compressed);

        let crc = crc32fast::hash(&page);
        page.write_u32::<LittleEndian>(crc)?;
        Ok(page)
    }
}

// ── PageDecoder ───────────────────────────────────────────────────────────────

pub struct PageDecoder {
    pub first_row_id: RowId,
    pub values:       Vec<String>,
}

impl PageDecoder {
    pub fn decode(
        data:        &[u8],
        encoding:    EncodingType,
        compression: CompressionType,
    ) -> Result<Self> {
        if data.len() < PAGE_HEADER_LEN + 4 {
            return Err(ColumnError::SegmentIo("page data too short".into()));
        }
        let payload_end = data.len() - 4;

        let stored_crc = LittleEndian::read_u32(&data[payload_end..]);
        if crc32fast::hash(&data[..payload_end]) != stored_crc {
            return Err(ColumnError::ChecksumMismatch);
        }

        let value_count  = LittleEndian::read_u32(&data[0..4]) as usize;
        let first_row_id = LittleEndian::read_u64(&data[4..12]);
        let uncomp_size  = LittleEndian::read_u32(&data[12..16]) as usize;
        let payload      = &data[PAGE_HEADER_LEN..payload_end];

        let raw    = compression::decompress(payload, compression, uncomp_size)?;
        let values = encoding::decode(&raw, encoding, value_count)?;

        Ok(Self { first_row_id, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[&str]) -> Vec<u8> {
        let mut pb = PageBuilder::new(7, EncodingType::Dictionary, CompressionType::Lz4, 4);
        for v in values {
            pb.add(v.to_string());
        }
        pb.build().unwrap()
    }

    #[test]
    fn page_restores_values_and_row_id() {
        let bytes = build(&["a", "b", "a"]);
        let page = PageDecoder::decode(&bytes, EncodingType::Dictionary, CompressionType::Lz4).unwrap();
        assert_eq!(page.first_row_id, 7);
        assert_eq!(page.values, vec!["a", "b", "a"]);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut bytes = build(&["a", "b", "a"]);
        bytes[PAGE_HEADER_LEN] ^= 0xff;
        assert!(matches!(
            PageDecoder::decode(&bytes, EncodingType::Dictionary, CompressionType::Lz4),
            Err(ColumnError::ChecksumMismatch)
        ));
    }

    #[test]
    fn builder_reports_full() {
        let mut pb = PageBuilder::new(0, EncodingType::Plain, CompressionType::None, 2);
        assert!(pb.is_empty());
        pb.add("x".into());
        assert!(!pb.is_full());
        pb.add("y".into());
        assert!(pb.is_full());
        assert_eq!(pb.len(), 2);
    }
}
