//! Column Segment：内存表示与单列文件读写
//!
//! 每列一个文件，格式：
//! ```text
//! ┌────────────────────────────────────┐
//! │  MAGIC   (8 bytes) "COLSEG\0\0"    │
//! │  Version (4 bytes) = 1             │
//! │  encoding (1) │ compression (1)    │
//! │  name_len (4) │ column name        │
//! ├────────────────────────────────────┤
//! │  DATA REGION                       │
//! │    [Data Page 0]                   │ ← 编码 + 压缩 + CRC32
//! │    [Data Page 1]                   │
//! │    ...                             │
//! ├────────────────────────────────────┤
//! │  FOOTER                            │
//! │    num_rows   (8 bytes)            │
//! │    page_count (4 bytes)            │
//! │    PageEntry × page_count (24 B)   │
//! │    Footer CRC32  (4 bytes)         │
//! │    Footer length (4 bytes)         │
//! │    MAGIC         (8 bytes)         │
//! └────────────────────────────────────┘
//! ```

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::column_writer::ColumnWriter;
use crate::common::{ColumnError, Result, RowId};
use crate::field_type::{CompressionType, EncodingType, StoreOptions};
use crate::page::PageDecoder;

const MAGIC: &[u8; 8] = b"COLSEG\0\0";
const VERSION: u32     = 1;
const TRAILER_LEN: u64 = 16;
const PAGE_ENTRY_LEN: usize = 24;

// ── ColumnSegment（内存）─────────────────────────────────────────────────────

/// 一列按行序排列的原始值；load 后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSegment {
    name:   String,
    values: Vec<String>,
}

impl ColumnSegment {
    pub fn new(name: &str, values: Vec<String>) -> Self {
        Self { name: name.into(), values }
    }

    pub fn name(&self)     -> &str      { &self.name }
    pub fn values(&self)   -> &[String] { &self.values }
    pub fn len(&self)      -> usize     { self.values.len() }
    pub fn is_empty(&self) -> bool      { self.values.is_empty() }

    pub fn get(&self, row: RowId) -> Option<&str> {
        usize::try_from(row).ok()
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub(crate) fn push(&mut self, value: String) {
        self.values.push(value);
    }
}

// ── PageDirectory ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub first_row_id: RowId,
    /// 页在文件内的偏移（写入前相对数据区，落盘后为绝对偏移）
    pub offset:       u64,
    pub len:          u32,
    pub num_rows:     u32,
}

/// 行号→页 的有序目录
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageDirectory {
    entries: Vec<PageEntry>,
}

impl PageDirectory {
    pub fn add(&mut self, first_row_id: RowId, offset: u64, len: u32, num_rows: u32) {
        self.entries.push(PageEntry { first_row_id, offset, len, num_rows });
    }

    pub fn entries(&self)    -> &[PageEntry] { &self.entries }
    pub fn page_count(&self) -> usize        { self.entries.len() }
    pub fn num_rows(&self)   -> u64 {
        self.entries.iter().map(|e| e.num_rows as u64).sum()
    }

    fn rebase(&mut self, base: u64) {
        for e in &mut self.entries {
            e.offset += base;
        }
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u32::<LittleEndian>(self.entries.len() as u32)?;
        for e in &self.entries {
            out.write_u64::<LittleEndian>(e.first_row_id)?;
            out.write_u64::<LittleEndian>(e.offset)?;
            out.write_u32::<LittleEndian>(e.len)?;
            out.write_u32::<LittleEndian>(e.num_rows)?;
        }
        Ok(())
    }

    fn deserialize(data: &mut &[u8]) -> Result<Self> {
        let n = data.read_u32::<LittleEndian>()? as usize;
        if data.len() < n * PAGE_ENTRY_LEN {
            return Err(ColumnError::SegmentIo("truncated page directory".into()));
        }
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            entries.push(PageEntry {
                first_row_id: data.read_u64::<LittleEndian>()?,
                offset:       data.read_u64::<LittleEndian>()?,
                len:          data.read_u32::<LittleEndian>()?,
                num_rows:     data.read_u32::<LittleEndian>()?,
            });
        }
        Ok(Self { entries })
    }
}

// ── SegmentWriter ─────────────────────────────────────────────────────────────

pub struct SegmentWriter {
    options: StoreOptions,
    column:  ColumnWriter,
}

impl SegmentWriter {
    pub fn new(name: &str, options: StoreOptions) -> Self {
        Self { options, column: ColumnWriter::new(name, options) }
    }

    pub fn append(&mut self, value: &str) -> Result<()> {
        self.column.add_value(value)
    }

    /// 完成写入，将整个 Segment 序列化到字节流，返回写入字节数
    pub fn finalize<W: Write>(self, mut writer: W) -> Result<u64> {
        let num_rows = self.column.num_rows();
        let name     = self.column.name.clone();

        // ── 文件头 ────────────────────────────────────────────────────────────
        let mut header = Vec::with_capacity(18 + name.len());
        header.extend_from_slice(MAGIC);
        header.write_u32::<LittleEndian>(VERSION)?;
        header.push(self.options.encoding.tag());
        header.push(self.options.compression.tag());
        header.write_u32::<LittleEndian>(name.len() as u32)?;
        header.extend_from_slice(name.as_bytes());

        // ── DATA REGION ───────────────────────────────────────────────────────
        let (data, mut directory) = self.column.finalize()?;
        directory.rebase(header.len() as u64);

        // ── FOOTER ────────────────────────────────────────────────────────────
        let mut footer = Vec::new();
        footer.write_u64::<LittleEndian>(num_rows)?;
        directory.serialize(&mut footer)?;
        let footer_crc = crc32fast::hash(&footer);

        writer.write_all(&header)?;
        writer.write_all(&data)?;
        writer.write_all(&footer)?;
        writer.write_u32::<LittleEndian>(footer_crc)?;
        writer.write_u32::<LittleEndian>(footer.len() as u32)?;
        writer.write_all(MAGIC)?;
        writer.flush()?;

        Ok((header.len() + data.len() + footer.len()) as u64 + TRAILER_LEN)
    }
}

/// 把一整列写成 Segment 文件
pub fn write_segment_file(path: &Path, segment: &ColumnSegment, options: StoreOptions) -> Result<u64> {
    let mut sw = SegmentWriter::new(segment.name(), options);
    for v in segment.iter() {
        sw.append(v)?;
    }
    let file = File::create(path)?;
    sw.finalize(std::io::BufWriter::new(file))
}

// ── SegmentReader ─────────────────────────────────────────────────────────────

/// 已打开的 Segment 文件：仅解析头与 Footer，数据页按需读取
#[derive(Debug, Clone)]
pub struct SegmentReader {
    path:        PathBuf,
    name:        String,
    encoding:    EncodingType,
    compression: CompressionType,
    num_rows:    u64,
    directory:   PageDirectory,
}

impl SegmentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        // ── 文件头 ────────────────────────────────────────────────────────────
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic).map_err(|_| invalid(path, "truncated header"))?;
        if &magic != MAGIC {
            return Err(invalid(path, "invalid segment magic"));
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(invalid(path, &format!("unsupported version {version}")));
        }
        let encoding = EncodingType::from_tag(file.read_u8()?)
            .ok_or_else(|| invalid(path, "unknown encoding"))?;
        let compression = CompressionType::from_tag(file.read_u8()?)
            .ok_or_else(|| invalid(path, "unknown compression"))?;
        let name_len = file.read_u32::<LittleEndian>()? as u64;
        let header_len = 18 + name_len;
        if header_len + TRAILER_LEN > file_len {
            return Err(invalid(path, "truncated header"));
        }
        let mut name = vec![0u8; name_len as usize];
        file.read_exact(&mut name)?;
        let name = String::from_utf8(name).map_err(|_| invalid(path, "column name is not UTF-8"))?;

        // ── Trailer + Footer ──────────────────────────────────────────────────
        file.seek(SeekFrom::Start(file_len - TRAILER_LEN))?;
        let footer_crc = file.read_u32::<LittleEndian>()?;
        let footer_len = file.read_u32::<LittleEndian>()? as u64;
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(invalid(path, "invalid segment magic"));
        }
        if header_len + footer_len + TRAILER_LEN > file_len {
            return Err(invalid(path, "footer length out of range"));
        }
        let footer_start = file_len - TRAILER_LEN - footer_len;
        file.seek(SeekFrom::Start(footer_start))?;
        let mut footer = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer)?;
        if crc32fast::hash(&footer) != footer_crc {
            return Err(ColumnError::ChecksumMismatch);
        }

        let mut cursor = footer.as_slice();
        let num_rows  = cursor.read_u64::<LittleEndian>()?;
        let directory = PageDirectory::deserialize(&mut cursor)?;

        if directory.num_rows() != num_rows {
            return Err(invalid(path, "page directory does not cover all rows"));
        }
        let data_end = footer_start;
        if directory.entries().iter().any(|e| e.offset < header_len || e.offset + e.len as u64 > data_end) {
            return Err(invalid(path, "page offset out of range"));
        }

        Ok(Self { path: path.to_path_buf(), name, encoding, compression, num_rows, directory })
    }

    pub fn name(&self)      -> &str           { &self.name }
    pub fn num_rows(&self)  -> u64            { self.num_rows }
    pub fn directory(&self) -> &PageDirectory { &self.directory }

    /// 打开一个按页流式解码的游标
    pub fn cursor(&self) -> Result<PageCursor> {
        let file = BufReader::new(File::open(&self.path)?);
        Ok(PageCursor {
            file,
            pages:       self.directory.entries().to_vec(),
            next_page:   0,
            buffered:    Vec::new().into_iter(),
            encoding:    self.encoding,
            compression: self.compression,
        })
    }

    /// 读取全部值
    pub fn read_all(&self) -> Result<ColumnSegment> {
        let mut segment = ColumnSegment::new(&self.name, Vec::with_capacity(self.num_rows as usize));
        let mut cursor  = self.cursor()?;
        while let Some(v) = cursor.next_value()? {
            segment.push(v);
        }
        Ok(segment)
    }
}

fn invalid(path: &Path, reason: &str) -> ColumnError {
    ColumnError::SegmentIo(format!("{}: {reason}", path.display()))
}

// ── PageCursor ────────────────────────────────────────────────────────────────

/// 前向游标：一次只在内存中保留一个解码后的页
pub struct PageCursor {
    file:        BufReader<File>,
    pages:       Vec<PageEntry>,
    next_page:   usize,
    buffered:    std::vec::IntoIter<String>,
    encoding:    EncodingType,
    compression: CompressionType,
}

impl PageCursor {
    pub fn next_value(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(v) = self.buffered.next() {
                return Ok(Some(v));
            }
            let Some(entry) = self.pages.get(self.next_page).copied() else {
                return Ok(None);
            };
            self.next_page += 1;

            self.file.seek(SeekFrom::Start(entry.offset))?;
            let mut bytes = vec![0u8; entry.len as usize];
            self.file.read_exact(&mut bytes)?;

            let page = PageDecoder::decode(&bytes, self.encoding, self.compression)?;
            if page.first_row_id != entry.first_row_id || page.values.len() != entry.num_rows as usize {
                return Err(ColumnError::SegmentIo(format!(
                    "page at offset {} disagrees with directory", entry.offset
                )));
            }
            self.buffered = page.values.into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(n: usize) -> ColumnSegment {
        let values = (0..n).map(|i| (i % 3 * 50 + 100).to_string()).collect();
        ColumnSegment::new("Sold Quantity", values)
    }

    #[test]
    fn directory_survives_footer_encoding() {
        let mut dir = PageDirectory::default();
        dir.add(0, 0, 10, 4);
        dir.add(4, 10, 10, 4);
        dir.add(8, 20, 5, 1);
        assert_eq!(dir.num_rows(), 9);

        let mut bytes = Vec::new();
        dir.serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 4 + 3 * PAGE_ENTRY_LEN);
        let decoded = PageDirectory::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, dir);

        assert!(PageDirectory::deserialize(&mut &bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn file_restores_segment_across_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("qty.seg");
        let seg = segment(10);
        let opts = StoreOptions::default().with_page_rows(4);
        let written = write_segment_file(&path, &seg, opts).unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());

        let reader = SegmentReader::open(&path).unwrap();
        assert_eq!(reader.name(), "Sold Quantity");
        assert_eq!(reader.num_rows(), 10);
        assert_eq!(reader.directory().page_count(), 3);
        assert_eq!(reader.read_all().unwrap(), seg);
    }

    #[test]
    fn empty_segment_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.seg");
        write_segment_file(&path, &ColumnSegment::new("e", vec![]), StoreOptions::default()).unwrap();
        let reader = SegmentReader::open(&path).unwrap();
        assert_eq!(reader.num_rows(), 0);
        assert!(reader.cursor().unwrap().next_value().unwrap().is_none());
    }

    #[test]
    fn corrupted_page_is_detected_on_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("qty.seg");
        write_segment_file(&path, &segment(10), StoreOptions::default()).unwrap();

        let reader = SegmentReader::open(&path).unwrap();
        let first = reader.directory().entries()[0];
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[first.offset as usize + 20] ^= 0x5a;
        std::fs::write(&path, &bytes).unwrap();

        let reader = SegmentReader::open(&path).unwrap();
        assert!(matches!(reader.read_all(), Err(ColumnError::ChecksumMismatch)));
    }

    #[test]
    fn garbage_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("junk.seg");
        std::fs::write(&path, b"not a segment file at all").unwrap();
        assert!(matches!(SegmentReader::open(&path), Err(ColumnError::SegmentIo(_))));
    }
}
