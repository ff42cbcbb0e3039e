// End-to-end: CSV → ColumnStore → persisted segments → synchronized scans.
use colscan::input::read_csv;
use colscan::{
    filters, Aggregation, ColumnError, ColumnStore, CompressionType, EncodingType, Predicate,
    Predicates, ScanEngine, ScanResult, ScanSource, SegmentDir, StoreOptions,
};

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

fn store() -> ColumnStore {
    let rows = read_csv(SALES.as_bytes()).expect("csv");
    ColumnStore::load(&rows).expect("load")
}

/// 各查询在任意 ScanSource 上的期望结果
fn check_queries<S: ScanSource>(source: &S) {
    let engine = ScanEngine::new(source);

    let res = engine
        .scan(
            &filters([("Employee_ID", Predicate::eq(1)), ("Product_ID", Predicate::eq(1))]),
            &Aggregation::raw("Sold_Quantity"),
        )
        .expect("raw");
    assert_eq!(res.as_raw().unwrap(), ["100", "150", "150"]);

    let res = engine
        .scan(
            &filters([("Employee_ID", Predicate::eq(1)), ("Product_ID", Predicate::eq(1))]),
            &Aggregation::count(),
        )
        .expect("count");
    assert_eq!(res, ScanResult::Count(3));

    let res = engine
        .scan(
            &filters([("Employee_ID", Predicate::range(3, 6))]),
            &Aggregation::raw("Sold_Quantity"),
        )
        .expect("range");
    assert_eq!(res.as_raw().unwrap(), ["250", "350", "450", "550"]);

    let res = engine
        .scan(
            &filters([
                ("Employee_ID", Predicate::within([1, 11, 12, 23])),
                ("Product_ID", Predicate::eq(1)),
            ]),
            &Aggregation::sum("Sold_Quantity"),
        )
        .expect("sum");
    assert_eq!(res, ScanResult::Sum(400.0));

    let res = engine
        .scan(&Predicates::new(), &Aggregation::count())
        .expect("count all");
    assert_eq!(res, ScanResult::Count(9));

    let res = engine
        .scan(&filters([("Product_ID", Predicate::eq(1))]), &Aggregation::count())
        .expect("count product");
    assert_eq!(res, ScanResult::Count(8));

    let res = engine
        .scan(
            &filters([("Date", Predicate::lt("2023-11-21"))]),
            &Aggregation::raw("Employee_ID"),
        )
        .expect("dates");
    assert_eq!(res.as_raw().unwrap(), ["1", "1", "1", "1"]);

    let res = engine
        .scan(&filters([("Date", Predicate::All)]), &Aggregation::count())
        .expect("all");
    assert_eq!(res, ScanResult::Count(9));
}

#[test]
fn queries_over_in_memory_store() {
    check_queries(&store());
}

#[test]
fn queries_over_persisted_segments() {
    let temp = tempfile::tempdir().expect("tempdir");
    let options = StoreOptions::default().with_page_rows(4);
    store().persist(temp.path(), options).expect("persist");

    let dir = SegmentDir::open(temp.path()).expect("open dir");
    assert_eq!(dir.row_count(), 9);
    check_queries(&dir);
}

#[test]
fn every_page_layout_reopens_identically() {
    let original = store();
    for encoding in [EncodingType::Plain, EncodingType::RunLength, EncodingType::Dictionary] {
        for compression in [CompressionType::None, CompressionType::Lz4] {
            let temp = tempfile::tempdir().expect("tempdir");
            let options = StoreOptions::default()
                .with_encoding(encoding)
                .with_compression(compression)
                .with_page_rows(2);
            original.persist(temp.path(), options).expect("persist");
            let reopened = ColumnStore::open(temp.path()).expect("open");
            assert_eq!(reopened, original, "{encoding:?}/{compression:?}");
        }
    }
}

#[test]
fn loading_twice_gives_identical_segments_and_files() {
    let a = store();
    let b = store();
    assert_eq!(a.segments(), b.segments());

    let da = tempfile::tempdir().expect("tempdir");
    let db = tempfile::tempdir().expect("tempdir");
    a.persist(da.path(), StoreOptions::default()).expect("persist a");
    b.persist(db.path(), StoreOptions::default()).expect("persist b");
    for name in ["Date", "Employee_ID", "Product_ID", "Sold_Quantity"] {
        let file = format!("{name}.seg");
        let fa = std::fs::read(da.path().join(&file)).expect("read a");
        let fb = std::fs::read(db.path().join(&file)).expect("read b");
        assert_eq!(fa, fb, "{file}");
    }
}

#[test]
fn segment_files_of_unequal_length_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    store().persist(temp.path(), StoreOptions::default()).expect("persist");

    // 用更短的一列替换 Product_ID 的文件
    let short = read_csv("Product ID\n1\n2\n".as_bytes()).expect("csv");
    let other = tempfile::tempdir().expect("tempdir");
    ColumnStore::load(&short)
        .expect("load")
        .persist(other.path(), StoreOptions::default())
        .expect("persist short");
    std::fs::copy(other.path().join("Product_ID.seg"), temp.path().join("Product_ID.seg"))
        .expect("copy");

    match SegmentDir::open(temp.path()) {
        Err(ColumnError::LengthMismatch { column, expected, actual }) => {
            assert_eq!(column, "Product_ID");
            assert_eq!((expected, actual), (9, 2));
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn corrupted_segment_fails_the_scan() {
    let temp = tempfile::tempdir().expect("tempdir");
    store()
        .persist(temp.path(), StoreOptions::default().with_compression(CompressionType::None))
        .expect("persist");

    let path = temp.path().join("Sold_Quantity.seg");
    let mut bytes = std::fs::read(&path).expect("read");
    // 文件头 18 + 列名 13 之后即第一页；跳过页头改写负载
    bytes[18 + 13 + 20] ^= 0xff;
    std::fs::write(&path, &bytes).expect("write");

    let dir = SegmentDir::open(temp.path()).expect("footer is intact");
    let err = ScanEngine::new(&dir)
        .scan(&Predicates::new(), &Aggregation::raw("Sold_Quantity"))
        .unwrap_err();
    assert!(matches!(err, ColumnError::ChecksumMismatch));
}
