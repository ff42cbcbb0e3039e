//! 行式输入适配：CSV（首行为表头）与 JSON Lines（每行一个扁平对象）

use std::io::BufRead;

use crate::common::{sanitize_column_name, ColumnError, Result};
use crate::field_type::{Record, Value};

/// 表头中每段连续空白（含首尾）替换为 `_`，字段保留原始文本
pub fn read_csv<R: BufRead>(reader: R) -> Result<Vec<Record>> {
    let mut lines = reader.lines().enumerate();

    // 第一个非空行是表头
    let columns: Vec<String> = loop {
        let Some((_, line)) = lines.next() else { return Ok(Vec::new()) };
        let line = line?;
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            break line.split(',').map(sanitize_column_name).collect();
        }
    };

    let mut rows = Vec::new();
    for (i, line) in lines {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let values: Vec<&str> = line.split(',').collect();
        if values.len() != columns.len() {
            return Err(ColumnError::Input {
                line:   i + 1,
                reason: format!("expected {} fields, found {}", columns.len(), values.len()),
            });
        }
        rows.push(columns.iter().cloned().zip(values.into_iter().map(Value::from)).collect());
    }
    Ok(rows)
}

/// 字段按对象中的书写顺序成为列；嵌套对象 / 数组 / null 不支持（扁平化不在本 crate 范围内）
pub fn read_json_lines<R: BufRead>(reader: R) -> Result<Vec<Record>> {
    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let err = |reason: String| ColumnError::Input { line: i + 1, reason };

        let parsed: serde_json::Value = serde_json::from_str(&line).map_err(|e| err(e.to_string()))?;
        let serde_json::Value::Object(map) = parsed else {
            return Err(err("expected a JSON object".into()));
        };

        let mut record = Record::new();
        for (key, value) in map {
            let value = match value {
                serde_json::Value::String(s) => Value::Text(s),
                serde_json::Value::Bool(b)   => Value::Text(b.to_string()),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(v) => Value::Int(v),
                    None    => Value::Float(n.as_f64().ok_or_else(|| err(format!("field `{key}`: unsupported number {n}")))?),
                },
                other => return Err(err(format!("field `{key}`: unsupported value {other}"))),
            };
            record.insert(&key, value);
        }
        rows.push(record);
    }
    Ok(rows)
}
