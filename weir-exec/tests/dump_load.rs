//! Dump and load round trip through the service surface.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use weir_exec::config::Config;
use weir_exec::dump::{DumpConfig, DumpWriter};
use weir_exec::io::VecRecordReader;
use weir_exec::kvs::TableDef;
use weir_exec::service::{
    InsertSpec, LoadBinding, LoadColumn, ParameterSet, Placeholder, QuerySpec, SqlService,
    Statement, TransactionOptions,
};
use weir_exec::Result;
use weir_plan::{Expression, VariableId};
use weir_types::{DataType, Record, RecordMeta, Value};

/// Retains written batches instead of encoding real columnar files.
#[derive(Default)]
struct MemoryDumpWriter {
    files: Arc<Mutex<Vec<(PathBuf, Vec<Record>)>>>,
    current: Option<(PathBuf, Vec<Record>)>,
}

impl DumpWriter for MemoryDumpWriter {
    fn open(&mut self, path: &Path, _meta: &RecordMeta, _config: &DumpConfig) -> Result<()> {
        self.current = Some((path.to_path_buf(), Vec::new()));
        Ok(())
    }

    fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        self.current
            .as_mut()
            .expect("open before write")
            .1
            .extend(records.iter().cloned());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let file = self.current.take().expect("open before close");
        self.files.lock().unwrap().push(file);
        Ok(())
    }
}

fn service_with_rows(rows: &[(i64, f64)]) -> SqlService {
    let config = Config { thread_pool_size: 2, ..Config::default() };
    let service = SqlService::new(config);
    let meta = Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8]));
    let table = service.create_table(TableDef::new("t", meta, vec![0])).unwrap();
    for (k, v) in rows {
        table
            .insert(service.database(), &Record::new(vec![Value::Int8(*k), Value::Float8(*v)]))
            .unwrap();
    }
    service
}

#[test]
fn dump_then_load_rebinds_columns() {
    let service = service_with_rows(&[(1, 10.0), (2, 20.0), (3, 30.0)]);

    // dump T as columnar files
    let tx = service.begin(TransactionOptions::default());
    let mut writer = MemoryDumpWriter::default();
    let files = Arc::clone(&writer.files);
    let (produced, file_names) = service
        .dump(
            tx,
            &QuerySpec::select_all("t", 2),
            DumpConfig::default(),
            "/tmp/weir-dump-load",
            &mut writer,
        )
        .unwrap();
    service.commit(tx).unwrap();
    assert_eq!(produced.len(), 1);
    // file metadata is a single `file_name` column
    assert_eq!(file_names.len(), 1);
    assert!(file_names[0].get(0).to_character().to_string().contains("t_0.parquet"));

    let dumped: Vec<Record> = files.lock().unwrap()[0].1.clone();
    assert_eq!(dumped.len(), 3);

    // load back into a fresh table: INSERT INTO t2 VALUES(:p0, :p1)
    // binding p0 <- C0 and p1 <- 1.0
    let meta = Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8]));
    service.create_table(TableDef::new("t2", meta, vec![0])).unwrap();
    let insert = InsertSpec {
        table: "t2".into(),
        columns: vec![0, 1],
        values: vec![
            Expression::variable(VariableId(0), DataType::Int8),
            Expression::variable(VariableId(1), DataType::Float8),
        ],
    };
    let placeholders = vec![
        Placeholder { name: "p0".into(), variable: VariableId(0), data_type: DataType::Int8 },
        Placeholder { name: "p1".into(), variable: VariableId(1), data_type: DataType::Float8 },
    ];
    let stmt = service.prepare(Statement::Insert(insert), placeholders);

    let tx = service.begin(TransactionOptions::default());
    let loaded = service
        .load(
            tx,
            stmt,
            &[
                LoadBinding { parameter: "p0".into(), source: LoadColumn::Column(0) },
                LoadBinding { parameter: "p1".into(), source: LoadColumn::Literal(Value::Float8(1.0)) },
            ],
            Box::new(VecRecordReader::new(dumped)),
        )
        .unwrap();
    assert_eq!(loaded, 3);

    let mut rows: Vec<(i64, f64)> = service
        .execute_query(tx, &QuerySpec::select_all("t2", 2))
        .unwrap()
        .into_iter()
        .map(|r| (r.get(0).to_int8(), r.get(1).to_float8()))
        .collect();
    service.commit(tx).unwrap();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(rows, vec![(1, 1.0), (2, 1.0), (3, 1.0)]);
}

#[test]
fn prepared_statement_round_trip_through_parameters() {
    let service = service_with_rows(&[]);
    let insert = InsertSpec {
        table: "t".into(),
        columns: vec![0, 1],
        values: vec![
            Expression::variable(VariableId(0), DataType::Int8),
            Expression::variable(VariableId(1), DataType::Float8),
        ],
    };
    let placeholders = vec![
        Placeholder { name: "p0".into(), variable: VariableId(0), data_type: DataType::Int8 },
        Placeholder { name: "p1".into(), variable: VariableId(1), data_type: DataType::Float8 },
    ];
    let stmt = service.prepare(Statement::Insert(insert), placeholders);
    let tx = service.begin(TransactionOptions::default());
    for k in 0..4i64 {
        let mut params = ParameterSet::new();
        params.set_int8("p0", k).set_float8("p1", k as f64 * 0.5);
        service.execute_prepared_statement(tx, stmt, &params).unwrap();
    }
    let rows = service.execute_query(tx, &QuerySpec::select_all("t", 2)).unwrap();
    service.commit(tx).unwrap();
    assert_eq!(rows.len(), 4);
}
