//! # colscan 使用案例
//!
//! 1. 从 CSV 载入销售数据，拆成列
//! 2. 在内存列存上执行同步扫描
//! 3. 落盘为每列一个 Segment 文件，按页流式扫描
//! 4. 构建游程位图索引，点查 / 区间查 / 整列还原
//!
//! 运行：`RUST_LOG=debug cargo run --example basic_usage`

use std::collections::BTreeMap;

use colscan::input::read_csv;
use colscan::{
    filters, Aggregation, ColumnStore, PresenceIndex, Predicate, ScanEngine, ScanSource,
    SegmentDir, StoreOptions,
};
use tracing_subscriber::EnvFilter;

const SALES: &str = "\
Date,Employee ID,Product ID,Sold Quantity
2023-09-23,1,1,100
2023-10-20,1,2,100
2023-10-21,1,1,150
2023-10-21,1,1,150
2023-11-21,2,1,150
2023-11-21,3,1,250
2023-12-21,4,1,350
2023-12-21,5,1,450
2023-12-21,6,1,550
";

fn run_queries<S: ScanSource>(source: &S) -> colscan::Result<()> {
    let engine = ScanEngine::new(source);
    let queries: Vec<(&str, BTreeMap<String, Predicate>, Aggregation)> = vec![
        (
            "Employee_ID = 1 AND Product_ID = 1 → Sold_Quantity",
            filters([("Employee_ID", Predicate::eq(1)), ("Product_ID", Predicate::eq(1))]),
            Aggregation::raw("Sold_Quantity"),
        ),
        (
            "COUNT(Product_ID = 1)",
            filters([("Product_ID", Predicate::eq(1))]),
            Aggregation::count(),
        ),
        (
            "Employee_ID IN [3,6] AND Product_ID = 1 → Sold_Quantity",
            filters([("Employee_ID", Predicate::range(3, 6)), ("Product_ID", Predicate::eq(1))]),
            Aggregation::raw("Sold_Quantity"),
        ),
        (
            "SUM(Sold_Quantity) WHERE Employee_ID IN (1,11,12,23) AND Product_ID = 1",
            filters([
                ("Employee_ID", Predicate::within([1, 11, 12, 23])),
                ("Product_ID", Predicate::eq(1)),
            ]),
            Aggregation::sum("Sold_Quantity"),
        ),
        (
            "COUNT(Sold_Quantity < 250)",
            filters([("Sold_Quantity", Predicate::lt(250))]),
            Aggregation::count(),
        ),
        (
            "Date < 2023-11-21 → Employee_ID",
            filters([("Date", Predicate::lt("2023-11-21"))]),
            Aggregation::raw("Employee_ID"),
        ),
        (
            "COUNT(*)",
            filters([("Date", Predicate::All)]),
            Aggregation::count(),
        ),
    ];

    for (label, predicates, action) in &queries {
        let res = engine.scan(predicates, action)?;
        println!("    {label:<72} = {res:?}");
    }
    Ok(())
}

fn main() -> colscan::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("═══════════════════════════════════════════════════════════");
    println!("   colscan 演示                                            ");
    println!("═══════════════════════════════════════════════════════════\n");

    // =========================================================================
    // 1. 载入
    // =========================================================================
    println!("【1】载入 CSV ...");
    let rows  = read_csv(SALES.as_bytes())?;
    let store = ColumnStore::load(&rows)?;
    println!("    rows    = {}", store.row_count());
    println!("    columns = {:?}\n", store.column_names().collect::<Vec<_>>());

    // =========================================================================
    // 2. 内存扫描
    // =========================================================================
    println!("【2】内存列存扫描 ...");
    run_queries(&store)?;
    println!();

    // =========================================================================
    // 3. 落盘 + 流式扫描
    // =========================================================================
    let dir = std::env::temp_dir().join(format!("colscan-demo-{}", std::process::id()));
    println!("【3】落盘到 {} ...", dir.display());
    store.persist(&dir, StoreOptions::default().with_page_rows(4))?;
    let on_disk = SegmentDir::open(&dir)?;
    for name in on_disk.column_names() {
        let reader = on_disk.reader(name)?;
        println!("    {name:<14} rows={} pages={}", reader.num_rows(), reader.directory().page_count());
    }
    run_queries(&on_disk)?;
    println!();

    // =========================================================================
    // 4. 游程位图索引
    // =========================================================================
    println!("【4】构建游程位图索引 ...");
    let index = PresenceIndex::from_store(&store, &["Employee_ID", "Product_ID"])?;
    for column in index.tracked_columns() {
        let bitmap = index.column(column)?;
        for value in bitmap.distinct_values() {
            println!("    {column}={value:<3} runs={:?}", bitmap.runs(value).unwrap_or_default());
        }
    }
    println!("    Employee_ID[5]        = {:?}", index.value_at("Employee_ID", 5)?);
    println!("    Employee_ID in [3,6]  = {:?}", index.lookup_range("Employee_ID", "3", "6")?);
    println!("    decode(Product_ID)    = {:?}", index.decode("Product_ID")?);

    std::fs::remove_dir_all(&dir)?;
    println!("\n✓ done");
    Ok(())
}
