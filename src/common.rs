//! 全局基础类型与错误定义

use thiserror::Error;

// ── 类型别名 ──────────────────────────────────────────────────────────────────

/// 行号：同一次 load 内所有列共享的 0 基位置
pub type RowId = u64;

// ── 枚举 ──────────────────────────────────────────────────────────────────────

/// 扫描的聚合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// 按行序收集目标列原始值
    Raw,
    /// 命中行数
    Count,
    /// 目标列数值求和
    Sum,
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw   => write!(f, "raw"),
            Self::Count => write!(f, "count"),
            Self::Sum   => write!(f, "sum"),
        }
    }
}

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ColumnError {
    #[error("schema mismatch at row {row}: column `{column}`")]
    SchemaMismatch { row: RowId, column: String },
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("aggregation `{0}` requires a target column")]
    MissingTarget(AggregateKind),
    #[error("value {value:?} of column `{column}` at row {row} is not numeric")]
    NotNumeric { column: String, row: RowId, value: String },
    #[error("column `{column}` has {actual} rows, expected {expected}")]
    LengthMismatch { column: String, expected: u64, actual: u64 },
    #[error("presence index for column `{column}` is corrupt at row {row}")]
    IndexCorrupt { column: String, row: RowId },
    #[error("segment I/O error: {0}")]
    SegmentIo(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("invalid input at line {line}: {reason}")]
    Input { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, ColumnError>;

/// 列名中每段连续空白替换为一个 `_`（首尾空白同样保留为 `_`）
pub fn sanitize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// 列名 → Segment 文件名主干：只保留 `[A-Za-z0-9_-]`，其余字符替换为 `_`
pub fn segment_file_stem(name: &str) -> String {
    let stem: String = sanitize_column_name(name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() { "_".into() } else { stem }
}
