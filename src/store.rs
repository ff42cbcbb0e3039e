//! Column Segment Store
//!
//! 行式输入 → 每列一个 [`ColumnSegment`]。写一次（load）后只读。
//!
//! 落盘布局：
//! ```text
//! <dir>/
//!   MANIFEST.json          列名顺序、文件名、行数
//!   Employee_ID.seg        每列一个 Segment 文件（见 segment.rs）
//!   Sold_Quantity.seg
//!   ...
//! ```
//!
//! 扫描引擎通过 [`ScanSource`] / [`ColumnCursor`] 访问列：
//! 内存中的 `ColumnStore` 借出切片游标，磁盘上的 `SegmentDir` 按页流式解码。

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{segment_file_stem, ColumnError, Result, RowId};
use crate::field_type::{Record, StoreOptions};
use crate::segment::{write_segment_file, ColumnSegment, PageCursor, SegmentReader};

const MANIFEST_FILE: &str = "MANIFEST.json";
const MANIFEST_VERSION: u32 = 1;

// ── 扫描接口 ──────────────────────────────────────────────────────────────────

/// 单列前向游标；每次调用前进一行
pub trait ColumnCursor<'a> {
    fn next_value(&mut self) -> Result<Option<Cow<'a, str>>>;
}

/// 可被扫描的列集合
pub trait ScanSource {
    fn has_column(&self, name: &str) -> bool;

    /// 已知的列行数；未知时返回 None
    fn column_len(&self, name: &str) -> Option<u64>;

    /// 不引用任何列的计数扫描使用
    fn row_count(&self) -> u64;

    fn open_cursor<'a>(&'a self, name: &str) -> Result<Box<dyn ColumnCursor<'a> + 'a>>;
}

/// 内存切片游标
pub struct SliceCursor<'a> {
    iter: std::slice::Iter<'a, String>,
}

impl<'a> SliceCursor<'a> {
    pub fn new(values: &'a [String]) -> Self {
        Self { iter: values.iter() }
    }
}

impl<'a> ColumnCursor<'a> for SliceCursor<'a> {
    fn next_value(&mut self) -> Result<Option<Cow<'a, str>>> {
        Ok(self.iter.next().map(|s| Cow::Borrowed(s.as_str())))
    }
}

impl<'a> ColumnCursor<'a> for PageCursor {
    fn next_value(&mut self) -> Result<Option<Cow<'a, str>>> {
        Ok(PageCursor::next_value(self)?.map(Cow::Owned))
    }
}

// ── Manifest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version:   u32,
    row_count: u64,
    columns:   Vec<ManifestColumn>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestColumn {
    name: String,
    file: String,
}

impl Manifest {
    fn read(dir: &Path) -> Result<Self> {
        let bytes = fs::read(dir.join(MANIFEST_FILE))?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| ColumnError::SegmentIo(format!("manifest: {e}")))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ColumnError::SegmentIo(format!(
                "manifest: unsupported version {}", manifest.version
            )));
        }
        Ok(manifest)
    }
}

/// MANIFEST 中的文件名必须是目录内的单个普通文件名
fn segment_path(dir: &Path, file: &str) -> Result<PathBuf> {
    let mut components = Path::new(file).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(file)),
        _ => Err(ColumnError::SegmentIo(format!("manifest: file `{file}` escapes {}", dir.display()))),
    }
}

// ── ColumnStore ───────────────────────────────────────────────────────────────

/// 写一次、只读的列存
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnStore {
    segments:  Vec<ColumnSegment>,
    by_name:   HashMap<String, usize>,
    row_count: u64,
}

impl ColumnStore {
    /// 列名取自第一条记录（按字段顺序）
    pub fn load(rows: &[Record]) -> Result<Self> {
        let columns: Vec<&str> = rows.first()
            .map(|r| r.names().collect())
            .unwrap_or_default();
        Self::load_with_schema(rows, &columns)
    }

    /// 按显式 schema 拆列；任何一行缺列或多列则整体失败
    pub fn load_with_schema(rows: &[Record], columns: &[&str]) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(columns.len());
        for (i, &name) in columns.iter().enumerate() {
            if by_name.insert(name.to_owned(), i).is_some() {
                return Err(ColumnError::SchemaMismatch { row: 0, column: name.into() });
            }
        }

        let mut segments: Vec<ColumnSegment> = columns.iter()
            .map(|&name| ColumnSegment::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (row, record) in rows.iter().enumerate() {
            let row = row as RowId;
            if let Some(extra) = record.names().find(|n| !by_name.contains_key(*n)) {
                return Err(ColumnError::SchemaMismatch { row, column: extra.into() });
            }
            for seg in &mut segments {
                let value = record.get(seg.name())
                    .ok_or_else(|| ColumnError::SchemaMismatch { row, column: seg.name().into() })?;
                seg.push(value.to_raw());
            }
        }

        tracing::info!(rows = rows.len(), columns = columns.len(), "loaded column store");
        Ok(Self { segments, by_name, row_count: rows.len() as u64 })
    }

    pub fn segment(&self, name: &str) -> Result<&ColumnSegment> {
        self.by_name.get(name)
            .map(|&i| &self.segments[i])
            .ok_or_else(|| ColumnError::UnknownColumn(name.into()))
    }

    pub fn row_count(&self)   -> u64   { self.row_count }
    pub fn num_columns(&self) -> usize { self.segments.len() }

    /// load 时的列顺序
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(ColumnSegment::name)
    }

    pub fn segments(&self) -> &[ColumnSegment] { &self.segments }

    // ── 持久化 ────────────────────────────────────────────────────────────────

    /// 每列写一个 Segment 文件，最后写 MANIFEST
    pub fn persist(&self, dir: &Path, options: StoreOptions) -> Result<()> {
        fs::create_dir_all(dir)?;

        let mut files   = HashSet::with_capacity(self.segments.len());
        let mut columns = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            let file = format!("{}.seg", segment_file_stem(seg.name()));
            if !files.insert(file.clone()) {
                return Err(ColumnError::SegmentIo(format!(
                    "column `{}` maps to an existing file {file}", seg.name()
                )));
            }
            columns.push(ManifestColumn { name: seg.name().into(), file });
        }

        let mut bytes = 0u64;
        for (seg, col) in self.segments.iter().zip(&columns) {
            bytes += write_segment_file(&dir.join(&col.file), seg, options)?;
        }

        let manifest = Manifest { version: MANIFEST_VERSION, row_count: self.row_count, columns };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ColumnError::SegmentIo(format!("manifest: {e}")))?;
        fs::write(dir.join(MANIFEST_FILE), json)?;

        tracing::info!(dir = %dir.display(), columns = self.segments.len(), bytes, "persisted column store");
        Ok(())
    }

    /// 从目录完整读回内存
    pub fn open(dir: &Path) -> Result<Self> {
        let source = SegmentDir::open(dir)?;
        let mut segments = Vec::with_capacity(source.readers.len());
        let mut by_name  = HashMap::with_capacity(source.readers.len());
        for (i, reader) in source.readers.iter().enumerate() {
            segments.push(reader.read_all()?);
            by_name.insert(reader.name().to_owned(), i);
        }
        tracing::info!(dir = %dir.display(), rows = source.row_count, columns = segments.len(), "opened column store");
        Ok(Self { segments, by_name, row_count: source.row_count })
    }
}

impl ScanSource for ColumnStore {
    fn has_column(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn column_len(&self, name: &str) -> Option<u64> {
        self.segment(name).ok().map(|s| s.len() as u64)
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn open_cursor<'a>(&'a self, name: &str) -> Result<Box<dyn ColumnCursor<'a> + 'a>> {
        let seg = self.segment(name)?;
        Ok(Box::new(SliceCursor::new(seg.values())))
    }
}

// ── SegmentDir ────────────────────────────────────────────────────────────────

/// 已落盘的列存；不整体载入，扫描时逐页读取
#[derive(Debug)]
pub struct SegmentDir {
    dir:       PathBuf,
    readers:   Vec<SegmentReader>,
    by_name:   HashMap<String, usize>,
    row_count: u64,
}

impl SegmentDir {
    pub fn open(dir: &Path) -> Result<Self> {
        let manifest = Manifest::read(dir)?;
        let mut readers = Vec::with_capacity(manifest.columns.len());
        let mut by_name = HashMap::with_capacity(manifest.columns.len());

        for (i, col) in manifest.columns.iter().enumerate() {
            let reader = SegmentReader::open(&segment_path(dir, &col.file)?)?;
            if reader.name() != col.name {
                return Err(ColumnError::SegmentIo(format!(
                    "{} holds column `{}`, manifest says `{}`", col.file, reader.name(), col.name
                )));
            }
            if reader.num_rows() != manifest.row_count {
                tracing::warn!(column = %col.name, expected = manifest.row_count, actual = reader.num_rows(), "segment length differs from manifest");
                return Err(ColumnError::LengthMismatch {
                    column:   col.name.clone(),
                    expected: manifest.row_count,
                    actual:   reader.num_rows(),
                });
            }
            by_name.insert(col.name.clone(), i);
            readers.push(reader);
        }

        Ok(Self { dir: dir.to_path_buf(), readers, by_name, row_count: manifest.row_count })
    }

    pub fn dir(&self)       -> &Path { &self.dir }
    pub fn row_count(&self) -> u64   { self.row_count }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.readers.iter().map(SegmentReader::name)
    }

    pub fn reader(&self, name: &str) -> Result<&SegmentReader> {
        self.by_name.get(name)
            .map(|&i| &self.readers[i])
            .ok_or_else(|| ColumnError::UnknownColumn(name.into()))
    }
}

impl ScanSource for SegmentDir {
    fn has_column(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn column_len(&self, name: &str) -> Option<u64> {
        self.reader(name).ok().map(SegmentReader::num_rows)
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn open_cursor<'a>(&'a self, name: &str) -> Result<Box<dyn ColumnCursor<'a> + 'a>> {
        Ok(Box::new(self.reader(name)?.cursor()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::Value;

    fn rows() -> Vec<Record> {
        vec![
            Record::new().with("Date", "2023-09-23").with("Employee ID", 1).with("Sold Quantity", 100),
            Record::new().with("Date", "2023-10-20").with("Employee ID", 1).with("Sold Quantity", 100),
            Record::new().with("Date", "2023-10-21").with("Employee ID", 2).with("Sold Quantity", 150),
        ]
    }

    #[test]
    fn load_splits_rows_into_columns() {
        let store = ColumnStore::load(&rows()).unwrap();
        assert_eq!(store.row_count(), 3);
        assert_eq!(store.column_names().collect::<Vec<_>>(), vec!["Date", "Employee ID", "Sold Quantity"]);
        assert_eq!(store.segment("Sold Quantity").unwrap().values(), ["100", "100", "150"]);
        assert!(matches!(store.segment("nope"), Err(ColumnError::UnknownColumn(c)) if c == "nope"));
    }

    #[test]
    fn missing_field_fails_whole_load() {
        let mut input = rows();
        input.push(Record::new().with("Date", "2023-11-21").with("Employee ID", 3));
        match ColumnStore::load(&input) {
            Err(ColumnError::SchemaMismatch { row, column }) => {
                assert_eq!(row, 3);
                assert_eq!(column, "Sold Quantity");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn extra_field_fails_load() {
        let mut input = rows();
        input[1].insert("Bonus", Value::Int(5));
        assert!(matches!(
            ColumnStore::load(&input),
            Err(ColumnError::SchemaMismatch { row: 1, .. })
        ));
    }

    #[test]
    fn explicit_schema_and_duplicates() {
        let store = ColumnStore::load_with_schema(&rows(), &["Sold Quantity", "Employee ID", "Date"]).unwrap();
        assert_eq!(store.segments()[0].name(), "Sold Quantity");
        assert!(ColumnStore::load_with_schema(&[], &["a", "a"]).is_err());
    }

    #[test]
    fn empty_input_gives_empty_store() {
        let store = ColumnStore::load(&[]).unwrap();
        assert_eq!(store.row_count(), 0);
        assert_eq!(store.num_columns(), 0);
    }

    #[test]
    fn persist_and_open_restores_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ColumnStore::load(&rows()).unwrap();
        store.persist(tmp.path(), StoreOptions::default().with_page_rows(2)).unwrap();
        assert!(tmp.path().join("Sold_Quantity.seg").exists());

        let reopened = ColumnStore::open(tmp.path()).unwrap();
        assert_eq!(reopened, store);

        let dir = SegmentDir::open(tmp.path()).unwrap();
        assert_eq!(dir.row_count(), 3);
        let mut cursor = dir.open_cursor("Employee ID").unwrap();
        let mut seen = Vec::new();
        while let Some(v) = cursor.next_value().unwrap() {
            seen.push(v.into_owned());
        }
        assert_eq!(seen, ["1", "1", "2"]);
    }

    #[test]
    fn path_like_column_names_stay_inside_the_store_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("store");
        let input = vec![Record::new().with("../escaped", 1).with("a/b", 2).with("/abs", 3)];
        let store = ColumnStore::load(&input).unwrap();
        store.persist(&root, StoreOptions::default()).unwrap();

        assert!(!tmp.path().join("escaped.seg").exists());
        assert!(root.join("___escaped.seg").exists());
        assert!(root.join("a_b.seg").exists());
        assert!(root.join("_abs.seg").exists());

        let reopened = ColumnStore::open(&root).unwrap();
        assert_eq!(reopened, store);
        assert_eq!(reopened.segment("../escaped").unwrap().values(), ["1"]);
    }

    #[test]
    fn manifest_file_outside_dir_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("store");
        let store = ColumnStore::load(&[Record::new().with("x", 1)]).unwrap();
        store.persist(&root, StoreOptions::default()).unwrap();
        std::fs::copy(root.join("x.seg"), tmp.path().join("x.seg")).unwrap();

        let manifest = root.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&manifest).unwrap();
        std::fs::write(&manifest, text.replace("\"x.seg\"", "\"../x.seg\"")).unwrap();
        assert!(matches!(SegmentDir::open(&root), Err(ColumnError::SegmentIo(_))));
    }

    #[test]
    fn colliding_file_names_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let input = vec![Record::new().with("a b", 1).with("a_b", 2)];
        let store = ColumnStore::load(&input).unwrap();
        assert!(matches!(
            store.persist(tmp.path(), StoreOptions::default()),
            Err(ColumnError::SegmentIo(_))
        ));
    }
}
