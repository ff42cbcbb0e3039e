//! 页负载压缩/解压（LZ4 / None）

use crate::common::{ColumnError, Result};
use crate::field_type::CompressionType;

pub fn compress(data: &[u8], codec: CompressionType) -> Result<Vec<u8>> {
    match codec {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4  =>
            lz4::block::compress(data, None, false)
                .map_err(|e| ColumnError::Compression(e.to_string())),
    }
}

/// `uncompressed_len` 来自页头；LZ4 块格式本身不记录原长
pub fn decompress(
    data:             &[u8],
    codec:            CompressionType,
    uncompressed_len: usize,
) -> Result<Vec<u8>> {
    let out = match codec {
        CompressionType::None => data.to_vec(),
        CompressionType::Lz4  => {
            let len = i32::try_from(uncompressed_len)
                .map_err(|_| ColumnError::Compression(format!("page too large: {uncompressed_len}")))?;
            lz4::block::decompress(data, Some(len))
                .map_err(|e| ColumnError::Compression(e.to_string()))?
        }
    };
    if out.len() != uncompressed_len {
        return Err(ColumnError::Compression(format!(
            "expected {uncompressed_len} bytes, got {}", out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_restores_payload() {
        let data = b"150\n150\n150\n250\n".repeat(64);
        let packed = compress(&data, CompressionType::Lz4).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed, CompressionType::Lz4, data.len()).unwrap(), data);
    }

    #[test]
    fn length_from_header_must_match() {
        let data = b"abc".to_vec();
        let out = compress(&data, CompressionType::None).unwrap();
        assert!(decompress(&out, CompressionType::None, 4).is_err());
    }
}
