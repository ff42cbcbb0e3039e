//! 页内值编码
//!
//! 三种编码，值均为原始文本：
//! - **Plain**：`len(u32) + bytes` 逐个排列
//! - **RunLength**：`(count, len, bytes)` 三元组，适合连续重复值
//! - **Dictionary**：字典 + u32 码表，低基数列节省大量空间
//!
//! 所有整数均为小端。

use std::collections::HashMap;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{ColumnError, Result};
use crate::field_type::EncodingType;

// ── 统一编/解码入口 ───────────────────────────────────────────────────────────

pub fn encode(values: &[String], enc: EncodingType) -> Result<Vec<u8>> {
    match enc {
        EncodingType::Plain      => plain::encode(values),
        EncodingType::RunLength  => rle::encode(values),
        EncodingType::Dictionary => dict::encode(values),
    }
}

/// `count` 为页头记录的值个数，解码结果个数不符即视为损坏
pub fn decode(data: &[u8], enc: EncodingType, count: usize) -> Result<Vec<String>> {
    let values = match enc {
        EncodingType::Plain      => plain::decode(data, count)?,
        EncodingType::RunLength  => rle::decode(data, count)?,
        EncodingType::Dictionary => dict::decode(data, count)?,
    };
    if values.len() != count {
        return Err(ColumnError::Encoding(format!(
            "{enc:?}: decoded {} values, expected {count}", values.len()
        )));
    }
    Ok(values)
}

pub(crate) fn write_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    out.write_u32::<LittleEndian>(s.len() as u32)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn read_str(input: &mut &[u8]) -> Result<String> {
    let len = input.read_u32::<LittleEndian>()
        .map_err(|_| ColumnError::Encoding("truncated string length".into()))? as usize;
    if len > input.len() {
        return Err(ColumnError::Encoding("truncated string body".into()));
    }
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| ColumnError::Encoding(e.to_string()))
}

// ── Plain ─────────────────────────────────────────────────────────────────────
mod plain {
    use super::*;

    pub fn encode(values: &[String]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for v in values {
            write_str(&mut out, v)?;
        }
        Ok(out)
    }

    pub fn decode(mut data: &[u8], count: usize) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count && !data.is_empty() {
            out.push(read_str(&mut data)?);
        }
        Ok(out)
    }
}

// ── Run-Length Encoding ───────────────────────────────────────────────────────
mod rle {
    use super::*;

    pub fn encode(values: &[String]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let Some(first) = values.first() else { return Ok(out) };
        let mut cur = first;
        let mut run: u32 = 1;

        for v in &values[1..] {
            if v == cur {
                run += 1;
            } else {
                write_run(&mut out, run, cur)?;
                cur = v;
                run = 1;
            }
        }
        write_run(&mut out, run, cur)?;
        Ok(out)
    }

    fn write_run(out: &mut Vec<u8>, run: u32, v: &str) -> Result<()> {
        out.write_u32::<LittleEndian>(run)?;
        write_str(out, v)
    }

    pub fn decode(mut data: &[u8], count: usize) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(count);
        while !data.is_empty() {
            let run = data.read_u32::<LittleEndian>()
                .map_err(|_| ColumnError::Encoding("rle: truncated run".into()))? as usize;
            let val = read_str(&mut data)?;
            if out.len() + run > count {
                return Err(ColumnError::Encoding("rle: runs exceed value count".into()));
            }
            out.extend(std::iter::repeat(val).take(run));
        }
        Ok(out)
    }
}

// ── Dictionary ────────────────────────────────────────────────────────────────
mod dict {
    use super::*;

    pub fn encode(values: &[String]) -> Result<Vec<u8>> {
        let mut dict:  Vec<&str>              = Vec::new();
        let mut slots: HashMap<&str, u32>     = HashMap::new();
        let mut codes: Vec<u32>               = Vec::with_capacity(values.len());

        for v in values {
            let code = *slots.entry(v.as_str()).or_insert_with(|| {
                dict.push(v.as_str());
                (dict.len() - 1) as u32
            });
            codes.push(code);
        }

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(dict.len() as u32)?;
        for entry in &dict {
            write_str(&mut out, entry)?;
        }
        for c in codes {
            out.write_u32::<LittleEndian>(c)?;
        }
        Ok(out)
    }

    pub fn decode(mut data: &[u8], count: usize) -> Result<Vec<String>> {
        let dict_len = data.read_u32::<LittleEndian>()
            .map_err(|_| ColumnError::Encoding("dict: data too short".into()))? as usize;
        let mut dict = Vec::with_capacity(dict_len.min(count));
        for _ in 0..dict_len {
            dict.push(read_str(&mut data)?);
        }

        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let code = data.read_u32::<LittleEndian>()
                .map_err(|_| ColumnError::Encoding("dict: truncated codes".into()))? as usize;
            let entry = dict.get(code)
                .ok_or_else(|| ColumnError::Encoding(format!("dict: code {code} out of range")))?;
            out.push(entry.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<String> {
        ["1", "1", "1", "1", "2", "3", "", "1"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn every_encoding_restores_values() {
        for enc in [EncodingType::Plain, EncodingType::RunLength, EncodingType::Dictionary] {
            let bytes = encode(&sample(), enc).unwrap();
            assert_eq!(decode(&bytes, enc, 8).unwrap(), sample(), "{enc:?}");
        }
    }

    #[test]
    fn rle_collapses_repeats() {
        let values = vec!["x".to_string(); 100];
        let rle   = encode(&values, EncodingType::RunLength).unwrap();
        let plain = encode(&values, EncodingType::Plain).unwrap();
        assert_eq!(rle.len(), 4 + 4 + 1);
        assert!(rle.len() < plain.len());
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let bytes = encode(&sample(), EncodingType::Plain).unwrap();
        assert!(matches!(
            decode(&bytes, EncodingType::Plain, 9),
            Err(ColumnError::Encoding(_))
        ));
        let bytes = encode(&sample(), EncodingType::Dictionary).unwrap();
        assert!(decode(&bytes[..bytes.len() - 2], EncodingType::Dictionary, 8).is_err());
    }

    #[test]
    fn empty_input_encodes_to_nothing() {
        assert!(encode(&[], EncodingType::RunLength).unwrap().is_empty());
        assert!(decode(&[], EncodingType::RunLength, 0).unwrap().is_empty());
    }
}
