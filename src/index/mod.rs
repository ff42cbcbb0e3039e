//! Run-Length Presence Index（游程编码位图索引）
//!
//! 每个被跟踪的列、每个不同取值 `v` 保存一串游程长度 `[r0, r1, r2, ...]`：
//! - 偶数下标（r0, r2, ...）：`v` **不出现**的连续行数
//! - 奇数下标（r1, r3, ...）：`v` **出现**的连续行数
//!
//! 首个游程 r0 可以为 0（第 0 行起即出现），其余游程均为正数。
//! 任意时刻每个取值的游程之和都等于该列已摄入的行数 `rows_ingested`。
//!
//! ```text
//! rows:     a  a  b  a  c
//! "a" →    [0, 2, 1, 1, 1]
//! "b" →    [2, 1, 2]
//! "c" →    [4, 1]
//! ```
//!
//! 持久化格式：
//! ```text
//! MAGIC "COLRLE\0\0" │ version u32 │ column_count u32
//! per column: name │ rows_ingested u64 │ value_count u32
//!   per value: text │ run_count u32 │ runs u64 × run_count
//! CRC32 (u32，覆盖以上全部字节)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{ColumnError, Result, RowId};
use crate::encoding::{read_str, write_str};
use crate::field_type::Record;
use crate::scan::Predicate;
use crate::store::ColumnStore;

const MAGIC: &[u8; 8] = b"COLRLE\0\0";
const VERSION: u32     = 1;

// ── ColumnBitmap ──────────────────────────────────────────────────────────────

/// 单列的全部取值位图
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnBitmap {
    /// (取值, 游程)，按首次出现顺序
    values:        Vec<(String, Vec<u64>)>,
    slots:         HashMap<String, usize>,
    rows_ingested: u64,
}

impl ColumnBitmap {
    pub fn new() -> Self { Self::default() }

    /// 摄入一行：`new_value` 在本行出现，其余取值在本行缺席
    pub fn extend(&mut self, new_value: &str) {
        if !self.slots.contains_key(new_value) {
            // 之前的每一行都缺席
            self.slots.insert(new_value.to_owned(), self.values.len());
            self.values.push((new_value.to_owned(), vec![self.rows_ingested]));
        }

        for (value, runs) in &mut self.values {
            let present = value == new_value;
            // 偶数长度：最后一个游程是“出现”游程
            let extends_last = (runs.len() % 2 == 0) == present;
            match runs.last_mut() {
                Some(last) if extends_last => *last += 1,
                _ => runs.push(1),
            }
        }
        self.rows_ingested += 1;
    }

    pub fn rows_ingested(&self) -> u64 { self.rows_ingested }

    pub fn distinct_values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(v, _)| v.as_str())
    }

    pub fn runs(&self, value: &str) -> Option<&[u64]> {
        self.slots.get(value).map(|&i| self.values[i].1.as_slice())
    }

    /// `value` 出现的行区间（有序、互不相交）
    pub fn positions(&self, value: &str) -> Vec<Range<RowId>> {
        self.runs(value).map(present_ranges).unwrap_or_default()
    }

    /// `value` 出现的行数
    pub fn count(&self, value: &str) -> u64 {
        self.runs(value)
            .map(|runs| runs.iter().skip(1).step_by(2).sum())
            .unwrap_or(0)
    }

    /// 点查：无需整列解码
    pub fn value_at(&self, row: RowId) -> Option<&str> {
        if row >= self.rows_ingested {
            return None;
        }
        self.values.iter()
            .find(|(_, runs)| present_ranges(runs).iter().any(|r| r.contains(&row)))
            .map(|(v, _)| v.as_str())
    }

    /// 还原整列；后处理的取值覆盖先处理的，无人认领的行返回其行号
    pub fn decode(&self) -> std::result::Result<Vec<String>, RowId> {
        let n = self.rows_ingested as usize;
        let mut out: Vec<Option<&str>> = vec![None; n];
        for (value, runs) in &self.values {
            let mut cursor = 0usize;
            for (i, &len) in runs.iter().enumerate() {
                let end = (cursor + len as usize).min(n);
                if i % 2 == 1 {
                    out[cursor..end].fill(Some(value.as_str()));
                }
                cursor = end;
            }
        }
        out.into_iter()
            .enumerate()
            .map(|(row, v)| v.map(str::to_owned).ok_or(row as RowId))
            .collect()
    }

    /// 游程和等于行数，且每行恰有一个取值；否则返回首个违例行号。
    /// 只遍历游程，开销与游程总数成正比，与行数无关。
    pub fn check_invariants(&self) -> std::result::Result<(), RowId> {
        let n = self.rows_ingested;
        let mut present: Vec<Range<RowId>> = Vec::new();
        for (_, runs) in &self.values {
            let mut total: u64 = 0;
            for (i, &len) in runs.iter().enumerate() {
                if i > 0 && len == 0 {
                    return Err(total.min(n.saturating_sub(1)));
                }
                let start = total;
                total = total.checked_add(len)
                    .filter(|&t| t <= n)
                    .ok_or(start.min(n))?;
                if i % 2 == 1 {
                    present.push(start..total);
                }
            }
            if total != n {
                return Err(total);
            }
        }

        // 所有出现区间按起点排序后必须首尾相接、恰好铺满 [0, n)
        present.sort_by_key(|r| r.start);
        let mut next: RowId = 0;
        for r in present {
            if r.start != next {
                return Err(next.min(r.start));
            }
            next = r.end;
        }
        if next != n {
            return Err(next);
        }
        Ok(())
    }
}

fn present_ranges(runs: &[u64]) -> Vec<Range<RowId>> {
    let mut out = Vec::with_capacity(runs.len() / 2);
    let mut cursor: RowId = 0;
    for (i, &len) in runs.iter().enumerate() {
        if i % 2 == 1 {
            out.push(cursor..cursor + len);
        }
        cursor += len;
    }
    out
}

// ── PresenceIndex ─────────────────────────────────────────────────────────────

/// 多列的游程位图索引；唯一写入路径是 [`PresenceIndex::ingest`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceIndex {
    columns: BTreeMap<String, ColumnBitmap>,
}

impl PresenceIndex {
    pub fn new<S: AsRef<str>>(tracked: impl IntoIterator<Item = S>) -> Self {
        let columns = tracked.into_iter()
            .map(|c| (c.as_ref().to_owned(), ColumnBitmap::new()))
            .collect();
        Self { columns }
    }

    /// 按行序把列存中的若干列逐行摄入
    pub fn from_store(store: &ColumnStore, tracked: &[&str]) -> Result<Self> {
        let segments = tracked.iter()
            .map(|c| store.segment(c))
            .collect::<Result<Vec<_>>>()?;
        let mut index = Self::new(tracked.iter().copied());
        for row in 0..store.row_count() {
            let values: Vec<(&str, &str)> = segments.iter()
                .map(|s| (s.name(), s.get(row).unwrap_or_default()))
                .collect();
            index.ingest(values)?;
        }
        tracing::info!(columns = tracked.len(), rows = store.row_count(), "built presence index");
        Ok(index)
    }

    /// 摄入一行；先整体校验再修改，失败时索引不变
    pub fn ingest<'r>(&mut self, row: impl IntoIterator<Item = (&'r str, &'r str)>) -> Result<()> {
        let row: HashMap<&str, &str> = row.into_iter().collect();
        let current = self.rows_ingested();

        if let Some(unknown) = row.keys().find(|c| !self.columns.contains_key(**c)) {
            return Err(ColumnError::UnknownColumn((*unknown).into()));
        }
        if let Some(missing) = self.columns.keys().find(|c| !row.contains_key(c.as_str())) {
            return Err(ColumnError::SchemaMismatch { row: current, column: missing.clone() });
        }

        for (name, bitmap) in &mut self.columns {
            let value = row[name.as_str()];
            if bitmap.runs(value).is_none() {
                tracing::trace!(column = %name, value, row = current, "new distinct value");
            }
            bitmap.extend(value);
        }
        Ok(())
    }

    /// 以 [`Record`] 为输入，值取原始文本；多余字段忽略
    pub fn ingest_record(&mut self, record: &Record) -> Result<()> {
        let raw: Vec<(String, String)> = self.columns.keys()
            .filter_map(|c| record.get(c).map(|v| (c.clone(), v.to_raw())))
            .collect();
        self.ingest(raw.iter().map(|(c, v)| (c.as_str(), v.as_str())))
    }

    pub fn column(&self, name: &str) -> Result<&ColumnBitmap> {
        self.columns.get(name).ok_or_else(|| ColumnError::UnknownColumn(name.into()))
    }

    pub fn tracked_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// 所有列同步前进，取任一列即可
    pub fn rows_ingested(&self) -> u64 {
        self.columns.values().next().map_or(0, ColumnBitmap::rows_ingested)
    }

    /// 按首次出现顺序
    pub fn distinct_values(&self, column: &str) -> Result<Vec<&str>> {
        Ok(self.column(column)?.distinct_values().collect())
    }

    pub fn decode(&self, column: &str) -> Result<Vec<String>> {
        self.column(column)?
            .decode()
            .map_err(|row| ColumnError::IndexCorrupt { column: column.into(), row })
    }

    pub fn runs(&self, column: &str, value: &str) -> Result<Option<&[u64]>> {
        Ok(self.column(column)?.runs(value))
    }

    pub fn positions(&self, column: &str, value: &str) -> Result<Vec<Range<RowId>>> {
        Ok(self.column(column)?.positions(value))
    }

    pub fn count(&self, column: &str, value: &str) -> Result<u64> {
        Ok(self.column(column)?.count(value))
    }

    pub fn value_at(&self, column: &str, row: RowId) -> Result<Option<&str>> {
        Ok(self.column(column)?.value_at(row))
    }

    /// 满足谓词的所有取值所覆盖的行区间，按行号排序并合并相邻区间
    pub fn lookup(&self, column: &str, predicate: &Predicate) -> Result<Vec<Range<RowId>>> {
        let bitmap = self.column(column)?;
        let compiled = predicate.compile();
        let mut ranges: Vec<Range<RowId>> = bitmap.values.iter()
            .filter(|(v, _)| compiled.matches(v))
            .flat_map(|(_, runs)| present_ranges(runs))
            .collect();
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<RowId>> = Vec::with_capacity(ranges.len());
        for r in ranges {
            match merged.last_mut() {
                Some(last) if last.end == r.start => last.end = r.end,
                _ => merged.push(r),
            }
        }
        Ok(merged)
    }

    /// 闭区间 `[lo, hi]` 查找，比较规则同扫描谓词
    pub fn lookup_range(&self, column: &str, lo: &str, hi: &str) -> Result<Vec<Range<RowId>>> {
        self.lookup(column, &Predicate::range(lo, hi))
    }

    pub fn check_invariants(&self, column: &str) -> Result<()> {
        self.column(column)?
            .check_invariants()
            .map_err(|row| ColumnError::IndexCorrupt { column: column.into(), row })
    }

    // ── 持久化 ────────────────────────────────────────────────────────────────

    pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.write_u32::<LittleEndian>(VERSION)?;
        out.write_u32::<LittleEndian>(self.columns.len() as u32)?;
        for (name, bitmap) in &self.columns {
            write_str(&mut out, name)?;
            out.write_u64::<LittleEndian>(bitmap.rows_ingested)?;
            out.write_u32::<LittleEndian>(bitmap.values.len() as u32)?;
            for (value, runs) in &bitmap.values {
                write_str(&mut out, value)?;
                out.write_u32::<LittleEndian>(runs.len() as u32)?;
                for &r in runs {
                    out.write_u64::<LittleEndian>(r)?;
                }
            }
        }
        let crc = crc32fast::hash(&out);
        out.write_u32::<LittleEndian>(crc)?;
        writer.write_all(&out)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.len() < MAGIC.len() + 12 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(ColumnError::SegmentIo("invalid index magic".into()));
        }
        let body_end = bytes.len() - 4;
        if crc32fast::hash(&bytes[..body_end]) != LittleEndian::read_u32(&bytes[body_end..]) {
            return Err(ColumnError::ChecksumMismatch);
        }

        let mut data = &bytes[MAGIC.len()..body_end];
        let version = data.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(ColumnError::SegmentIo(format!("unsupported index version {version}")));
        }
        let num_columns = data.read_u32::<LittleEndian>()?;
        let mut columns = BTreeMap::new();
        for _ in 0..num_columns {
            let name = read_str(&mut data)?;
            let rows_ingested = data.read_u64::<LittleEndian>()?;
            let num_values = data.read_u32::<LittleEndian>()? as usize;
            let mut bitmap = ColumnBitmap { rows_ingested, ..ColumnBitmap::default() };
            for i in 0..num_values {
                let value = read_str(&mut data)?;
                let num_runs = data.read_u32::<LittleEndian>()? as usize;
                let mut runs = Vec::with_capacity(num_runs.min(data.len() / 8));
                for _ in 0..num_runs {
                    runs.push(data.read_u64::<LittleEndian>()?);
                }
                bitmap.slots.insert(value.clone(), i);
                bitmap.values.push((value, runs));
            }
            if let Err(row) = bitmap.check_invariants() {
                tracing::warn!(column = %name, row, "persisted runs violate index invariants");
                return Err(ColumnError::IndexCorrupt { column: name, row });
            }
            columns.insert(name, bitmap);
        }
        if !data.is_empty() {
            return Err(ColumnError::SegmentIo("trailing bytes after index".into()));
        }
        Ok(Self { columns })
    }
}
