//! 输入记录、标量值与持久化选项

/// 输入记录中的标量值（load 时统一转成原始文本）
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// 写入 Segment 的原始文本
    pub fn to_raw(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v)   => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s)  => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Self::Int(v) }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self { Self::Int(v as i64) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Self::Float(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Self::Text(v.into()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Self::Text(v) }
}

/// 一行扁平记录：按字段出现顺序保存 (列名, 值)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// 同名字段覆盖旧值
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None         => self.fields.push((name.into(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self)      -> usize { self.fields.len() }
    pub fn is_empty(&self) -> bool  { self.fields.is_empty() }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut rec = Record::new();
        for (k, v) in iter {
            let k: String = k.into();
            rec.insert(&k, v);
        }
        rec
    }
}

// ── 持久化选项 ────────────────────────────────────────────────────────────────

/// 页内编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingType {
    /// 长度前缀的原始字节
    Plain,
    /// (count, value) 对，适合连续重复值
    RunLength,
    /// 字典 + 码表，适合低基数列
    Dictionary,
}

impl EncodingType {
    pub fn tag(self) -> u8 {
        match self {
            Self::Plain      => 0,
            Self::RunLength  => 1,
            Self::Dictionary => 2,
        }
    }
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Plain),
            1 => Some(Self::RunLength),
            2 => Some(Self::Dictionary),
            _ => None,
        }
    }
}

/// 压缩方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lz4,
}

impl CompressionType {
    pub fn tag(self) -> u8 {
        match self { Self::None => 0, Self::Lz4 => 1 }
    }
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            _ => None,
        }
    }
}

/// 每页最多容纳的行数（默认）
pub const DEFAULT_PAGE_ROWS: usize = 1024;

/// Segment 文件写入选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub encoding:    EncodingType,
    pub compression: CompressionType,
    pub page_rows:   usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            encoding:    EncodingType::Dictionary,
            compression: CompressionType::Lz4,
            page_rows:   DEFAULT_PAGE_ROWS,
        }
    }
}

impl StoreOptions {
    pub fn with_encoding(mut self, enc: EncodingType) -> Self {
        self.encoding = enc; self
    }
    pub fn with_compression(mut self, comp: CompressionType) -> Self {
        self.compression = comp; self
    }
    /// 至少 1 行
    pub fn with_page_rows(mut self, rows: usize) -> Self {
        self.page_rows = rows.max(1); self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_field_order_and_overwrites() {
        let rec = Record::new()
            .with("b", 1)
            .with("a", "x")
            .with("b", 2);
        assert_eq!(rec.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(rec.get("b"), Some(&Value::Int(2)));
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn raw_text_of_values() {
        assert_eq!(Value::Int(-3).to_raw(), "-3");
        assert_eq!(Value::Float(1.5).to_raw(), "1.5");
        assert_eq!(Value::from("2023-09-23").to_raw(), "2023-09-23");
    }

    #[test]
    fn options_builder() {
        let opts = StoreOptions::default()
            .with_encoding(EncodingType::Plain)
            .with_compression(CompressionType::None)
            .with_page_rows(0);
        assert_eq!(opts.encoding, EncodingType::Plain);
        assert_eq!(opts.compression, CompressionType::None);
        assert_eq!(opts.page_rows, 1);
        assert_eq!(EncodingType::from_tag(EncodingType::RunLength.tag()), Some(EncodingType::RunLength));
    }
}
