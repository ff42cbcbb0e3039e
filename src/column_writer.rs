//! 列写入器
//!
//! 每列独立维护：
//!   - 已完成的 Data Page 字节
//!   - 当前页缓冲区（满 `page_rows` 行即落页）
//!   - PageDirectory（行号→页偏移）

use crate::common::{Result, RowId};
use crate::field_type::StoreOptions;
use crate::page::PageBuilder;
use crate::segment::PageDirectory;

pub struct ColumnWriter {
    pub name:      String,
    options:       StoreOptions,
    // 已完成的页（拼接后的字节）
    data:          Vec<u8>,
    current:       PageBuilder,
    next_row_id:   RowId,
    pub directory: PageDirectory,
}

impl ColumnWriter {
    pub fn new(name: &str, options: StoreOptions) -> Self {
        let page = PageBuilder::new(0, options.encoding, options.compression, options.page_rows);
        Self {
            name: name.into(), options,
            data: Vec::new(), current: page,
            next_row_id: 0,
            directory: PageDirectory::default(),
        }
    }

    /// 追加一个值到本列
    pub fn add_value(&mut self, value: &str) -> Result<()> {
        self.current.add(value.to_owned());
        self.next_row_id += 1;

        if self.current.is_full() {
            self.flush_page()?;
        }
        Ok(())
    }

    fn flush_page(&mut self) -> Result<()> {
        let rows      = self.current.len() as u32;
        let first_rid = self.current.first_row_id;
        let bytes     = std::mem::replace(
            &mut self.current,
            PageBuilder::new(
                self.next_row_id,
                self.options.encoding,
                self.options.compression,
                self.options.page_rows,
            ),
        ).build()?;

        tracing::debug!(column = %self.name, first_row_id = first_rid, rows, bytes = bytes.len(), "flush page");
        self.directory.add(first_rid, self.data.len() as u64, bytes.len() as u32, rows);
        self.data.extend_from_slice(&bytes);
        Ok(())
    }

    /// 完成写入，返回数据区字节（偏移相对数据区起点）与页目录
    pub fn finalize(mut self) -> Result<(Vec<u8>, PageDirectory)> {
        if !self.current.is_empty() {
            self.flush_page()?;
        }
        Ok((self.data, self.directory))
    }

    pub fn num_rows(&self) -> RowId { self.next_row_id }
}
