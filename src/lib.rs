//! # colscan
//!
//! 列式存储与同步扫描引擎，外加游程编码的取值位图索引：
//! - **Column Segment Store**：行式输入拆成每列一个有序值序列，可按列落盘
//! - **Synchronized Scan Engine**：多列游标按行号同步前进，谓词求 AND 后收集 / 计数 / 求和
//! - **Run-Length Presence Index**：每列每个取值一串交替的缺席/出现游程，可逐行摄入、整列还原
//!
//! ## 整体架构
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  rows (CSV / JSON Lines / Record)                       │
//! │        │                                  │             │
//! │        ▼                                  ▼             │
//! │   ColumnStore ──persist──► <dir>/    PresenceIndex      │
//! │   (ColumnSegment × N)       MANIFEST   ColumnBitmap × N │
//! │        │                    *.seg      value → runs     │
//! │        │                      │                         │
//! │        │                  SegmentDir                    │
//! │        │                  (PageCursor)                  │
//! │        └────────┬─────────────┘                         │
//! │             ScanSource                                  │
//! │                 ▼                                       │
//! │            ScanEngine                                   │
//! │   Predicates (AND) + Aggregation → ScanResult           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ```
//! use colscan::{filters, Aggregation, ColumnStore, Predicate, Record, ScanEngine, ScanResult};
//!
//! let rows: Vec<Record> = [(1, 100), (1, 150), (2, 250)]
//!     .into_iter()
//!     .map(|(e, q)| Record::new().with("Employee_ID", e).with("Sold_Quantity", q))
//!     .collect();
//! let store = ColumnStore::load(&rows)?;
//! let res = ScanEngine::new(&store).scan(
//!     &filters([("Employee_ID", Predicate::eq(1))]),
//!     &Aggregation::sum("Sold_Quantity"),
//! )?;
//! assert_eq!(res, ScanResult::Sum(250.0));
//! # Ok::<(), colscan::ColumnError>(())
//! ```

// ── 基础 ──────────────────────────────────────────────────────────────────────
pub mod common;
pub mod field_type;
pub mod input;

// ── Segment 文件层 ────────────────────────────────────────────────────────────
pub mod encoding;
pub mod compression;
pub mod page;
pub mod column_writer;
pub mod segment;

// ── 列存 / 扫描 / 索引 ────────────────────────────────────────────────────────
pub mod store;
pub mod scan;
pub mod index;

pub use common::{AggregateKind, ColumnError, Result, RowId};
pub use field_type::{CompressionType, EncodingType, Record, StoreOptions, Value};
pub use index::{ColumnBitmap, PresenceIndex};
pub use scan::{filters, Aggregation, Predicate, Predicates, ScanEngine, ScanResult};
pub use segment::ColumnSegment;
pub use store::{ColumnCursor, ColumnStore, ScanSource, SegmentDir};
