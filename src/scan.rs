//! 同步扫描引擎
//!
//! 对查询涉及的每一列（谓词列 + 目标列）各开一个前向游标，
//! 每轮所有游标同时前进一行，读齐整行后再求谓词（AND），
//! 命中行按 [`Aggregation`] 收集 / 计数 / 求和。
//!
//! 比较方式在谓词编译时一次性决定：边界字面量能解析为数字则按数值比较，
//! 否则按字典序比较；不会逐行推断。

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::common::{AggregateKind, ColumnError, Result, RowId};
use crate::store::{ColumnCursor, ScanSource};

/// 列名 → 谓词；每列至多一个
pub type Predicates = BTreeMap<String, Predicate>;

/// 由 `(列名, 谓词)` 数组构造 [`Predicates`]
pub fn filters<const N: usize>(pairs: [(&str, Predicate); N]) -> Predicates {
    pairs.into_iter().map(|(c, p)| (c.to_owned(), p)).collect()
}

// ── 谓词 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    GreaterThan(String),
    LessThan(String),
    Equal(String),
    /// 闭区间 [lo, hi]
    Range(String, String),
    Within(Vec<String>),
}

impl Predicate {
    pub fn gt(v: impl ToString) -> Self { Self::GreaterThan(v.to_string()) }
    pub fn lt(v: impl ToString) -> Self { Self::LessThan(v.to_string()) }
    pub fn eq(v: impl ToString) -> Self { Self::Equal(v.to_string()) }
    pub fn range(lo: impl ToString, hi: impl ToString) -> Self {
        Self::Range(lo.to_string(), hi.to_string())
    }
    pub fn within<T: ToString>(vs: impl IntoIterator<Item = T>) -> Self {
        Self::Within(vs.into_iter().map(|v| v.to_string()).collect())
    }

    /// 编译：确定比较域
    pub fn compile(&self) -> CompiledPredicate {
        match self {
            Self::All            => CompiledPredicate::All,
            Self::GreaterThan(v) => CompiledPredicate::Greater(Bound::from_literal(v)),
            Self::LessThan(v)    => CompiledPredicate::Less(Bound::from_literal(v)),
            Self::Equal(v)       => CompiledPredicate::Equal(v.clone()),
            Self::Range(lo, hi)  => match (parse_number(lo), parse_number(hi)) {
                (Some(lo), Some(hi)) => CompiledPredicate::Range(Bound::Numeric(lo), Bound::Numeric(hi)),
                _ => CompiledPredicate::Range(Bound::Text(lo.clone()), Bound::Text(hi.clone())),
            },
            Self::Within(vs)     => CompiledPredicate::Within(vs.iter().cloned().collect()),
        }
    }
}

/// 比较边界：数值域或文本域
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Numeric(f64),
    Text(String),
}

impl Bound {
    pub fn from_literal(s: &str) -> Self {
        match parse_number(s) {
            Some(n) => Self::Numeric(n),
            None    => Self::Text(s.to_owned()),
        }
    }

    /// `raw` 相对边界的顺序；数值域下 `raw` 不是数字则无序
    fn order(&self, raw: &str) -> Option<Ordering> {
        match self {
            Self::Numeric(b) => parse_number(raw)?.partial_cmp(b),
            Self::Text(b)    => Some(raw.cmp(b.as_str())),
        }
    }
}

/// 有限的十进制数；NaN / inf 按文本处理
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledPredicate {
    All,
    Greater(Bound),
    Less(Bound),
    /// 原始文本精确相等
    Equal(String),
    Range(Bound, Bound),
    Within(HashSet<String>),
}

impl CompiledPredicate {
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            Self::All           => true,
            Self::Greater(b)    => b.order(raw) == Some(Ordering::Greater),
            Self::Less(b)       => b.order(raw) == Some(Ordering::Less),
            Self::Equal(v)      => raw == v,
            Self::Range(lo, hi) => matches!(
                (lo.order(raw), hi.order(raw)),
                (Some(Ordering::Greater | Ordering::Equal), Some(Ordering::Less | Ordering::Equal))
            ),
            Self::Within(set)   => set.contains(raw),
        }
    }
}

// ── 聚合 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub kind:   AggregateKind,
    pub target: Option<String>,
}

impl Aggregation {
    pub fn raw(target: &str) -> Self {
        Self { kind: AggregateKind::Raw, target: Some(target.into()) }
    }
    pub fn count() -> Self {
        Self { kind: AggregateKind::Count, target: None }
    }
    /// 带目标列的计数：目标列同样参与同步前进
    pub fn count_of(target: &str) -> Self {
        Self { kind: AggregateKind::Count, target: Some(target.into()) }
    }
    pub fn sum(target: &str) -> Self {
        Self { kind: AggregateKind::Sum, target: Some(target.into()) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanResult {
    Raw(Vec<String>),
    Count(u64),
    Sum(f64),
}

impl ScanResult {
    pub fn as_raw(&self) -> Option<&[String]> {
        match self { Self::Raw(v) => Some(v), _ => None }
    }
    pub fn as_count(&self) -> Option<u64> {
        match self { Self::Count(n) => Some(*n), _ => None }
    }
    pub fn as_sum(&self) -> Option<f64> {
        match self { Self::Sum(s) => Some(*s), _ => None }
    }
}

// ── ScanEngine ────────────────────────────────────────────────────────────────

pub struct ScanEngine<'s, S: ScanSource + ?Sized> {
    source: &'s S,
}

impl<'s, S: ScanSource + ?Sized> ScanEngine<'s, S> {
    pub fn new(source: &'s S) -> Self {
        Self { source }
    }

    pub fn scan(&self, predicates: &Predicates, action: &Aggregation) -> Result<ScanResult> {
        // 1. 目标列与列名校验（打开任何游标之前）
        let target = match (action.kind, action.target.as_deref()) {
            (AggregateKind::Raw | AggregateKind::Sum, None) => {
                return Err(ColumnError::MissingTarget(action.kind));
            }
            (_, t) => t,
        };

        let mut columns: Vec<&str> = predicates.keys().map(String::as_str).collect();
        if let Some(t) = target {
            if !predicates.contains_key(t) {
                columns.push(t);
            }
        }
        if let Some(missing) = columns.iter().find(|c| !self.source.has_column(c)) {
            return Err(ColumnError::UnknownColumn((*missing).into()));
        }
        self.check_lengths(&columns)?;

        // 2. 编译谓词，定位目标列槽位
        let compiled: Vec<(usize, CompiledPredicate)> = predicates.values()
            .enumerate()
            .map(|(slot, p)| (slot, p.compile()))
            .collect();
        let target_slot = target.and_then(|t| columns.iter().position(|c| *c == t));

        if columns.is_empty() {
            // 无谓词、无目标列的计数：每行都命中
            let rows = self.source.row_count();
            tracing::debug!(rows, "scan without columns");
            return Ok(ScanResult::Count(rows));
        }

        // 3. 同步扫描
        let mut cursors = columns.iter()
            .map(|c| self.source.open_cursor(c))
            .collect::<Result<Vec<_>>>()?;

        let mut acc = Accumulator::new(action.kind);
        let mut row: RowId = 0;
        let mut values: Vec<Cow<'s, str>> = Vec::with_capacity(columns.len());
        while read_row(&mut cursors, &columns, row, &mut values)? {
            if compiled.iter().all(|(slot, p)| p.matches(&values[*slot])) {
                let value = target_slot.map(|slot| &values[slot]);
                acc.fold(row, target.unwrap_or_default(), value)?;
            }
            row += 1;
        }

        tracing::debug!(columns = ?columns, rows = row, matched = acc.matched, kind = %action.kind, "scan finished");
        Ok(acc.finish())
    }

    fn check_lengths(&self, columns: &[&str]) -> Result<()> {
        let mut known = columns.iter()
            .filter_map(|c| self.source.column_len(c).map(|n| (*c, n)));
        let Some((_, expected)) = known.next() else { return Ok(()) };
        match known.find(|(_, n)| *n != expected) {
            Some((column, actual)) => Err(ColumnError::LengthMismatch {
                column: column.into(), expected, actual,
            }),
            None => Ok(()),
        }
    }
}

/// 所有游标前进一行；全部耗尽返回 false，部分耗尽报 LengthMismatch
fn read_row<'s>(
    cursors: &mut [Box<dyn ColumnCursor<'s> + 's>],
    columns: &[&str],
    row:     RowId,
    values:  &mut Vec<Cow<'s, str>>,
) -> Result<bool> {
    values.clear();
    let mut exhausted: Option<usize> = None;
    for (i, cursor) in cursors.iter_mut().enumerate() {
        match cursor.next_value()? {
            Some(v) => values.push(v),
            None    => { exhausted.get_or_insert(i); }
        }
    }
    match exhausted {
        None                        => Ok(true),
        Some(_) if values.is_empty() => Ok(false),
        Some(i) => {
            tracing::warn!(column = columns[i], row, "column exhausted before the others");
            Err(ColumnError::LengthMismatch {
                column:   columns[i].into(),
                expected: row + 1,
                actual:   row,
            })
        }
    }
}

struct Accumulator {
    kind:    AggregateKind,
    matched: u64,
    raw:     Vec<String>,
    sum:     f64,
}

impl Accumulator {
    fn new(kind: AggregateKind) -> Self {
        Self { kind, matched: 0, raw: Vec::new(), sum: 0.0 }
    }

    fn fold(&mut self, row: RowId, column: &str, value: Option<&Cow<'_, str>>) -> Result<()> {
        self.matched += 1;
        match (self.kind, value) {
            (AggregateKind::Raw, Some(v)) => self.raw.push(v.to_string()),
            (AggregateKind::Sum, Some(v)) => {
                let n = parse_number(v).ok_or_else(|| ColumnError::NotNumeric {
                    column: column.into(), row, value: v.to_string(),
                })?;
                self.sum += n;
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> ScanResult {
        match self.kind {
            AggregateKind::Raw   => ScanResult::Raw(self.raw),
            AggregateKind::Count => ScanResult::Count(self.matched),
            AggregateKind::Sum   => ScanResult::Sum(self.sum),
        }
    }
}
