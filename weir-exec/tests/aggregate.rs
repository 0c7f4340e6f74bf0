//! Group aggregation over a shuffle exchange.

use std::sync::Arc;

use weir_exec::config::Config;
use weir_exec::exchange::group::{GroupExchange, GroupShuffleInfo};
use weir_exec::function::aggregate::{COUNT_ID, SUM_ID};
use weir_exec::io::{CollectingWriter, RecordWriter};
use weir_exec::memory::global_page_pool;
use weir_exec::process::ops::{Emit, RecordOperator, TakeGroup};
use weir_exec::process::variable_table::VariableTableInfo;
use weir_exec::process::{ReaderHandle, TaskContext};
use weir_plan::{AggregateColumnSpec, VariableId};
use weir_types::{DataType, Record, RecordMeta, Value};

const KEY: VariableId = VariableId(0);
const MEMBER: VariableId = VariableId(1);
const SUM_OUT: VariableId = VariableId(2);
const COUNT_OUT: VariableId = VariableId(3);

fn shuffle_info() -> Arc<GroupShuffleInfo> {
    Arc::new(GroupShuffleInfo::new(
        Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8])),
        vec![0],
    ))
}

fn variable_info() -> Arc<VariableTableInfo> {
    Arc::new(VariableTableInfo::new([
        (KEY, DataType::Int8),
        (MEMBER, DataType::Float8),
        (SUM_OUT, DataType::Float8),
        (COUNT_OUT, DataType::Int8),
    ]))
}

fn build_chain() -> TakeGroup {
    let emit = Emit::new(2, vec![KEY, SUM_OUT, COUNT_OUT]);
    let aggregate = weir_exec::process::ops::AggregateGroup::new(
        1,
        &[
            AggregateColumnSpec { definition_id: SUM_ID, arguments: vec![MEMBER], destination: SUM_OUT },
            AggregateColumnSpec {
                definition_id: COUNT_ID,
                arguments: vec![MEMBER],
                destination: COUNT_OUT,
            },
        ],
        |_| DataType::Float8,
        Some(Box::new(emit)),
    )
    .unwrap();
    TakeGroup::new(
        0,
        0,
        vec![(0, KEY)],
        vec![(0, MEMBER)],
        Some(Box::new(aggregate)),
    )
}

fn run(records: &[(i64, f64)], empty_shuffle: bool) -> Vec<Record> {
    let exchange = Arc::new(GroupExchange::new(shuffle_info(), 1, global_page_pool()));
    let mut writer = exchange.writer();
    for (k, v) in records {
        writer.write(Record::new(vec![Value::Int8(*k), Value::Float8(*v)]));
    }
    writer.release();

    let sink = CollectingWriter::new();
    let source = build_chain();
    let mut ctx = TaskContext::new(Arc::new(Config::default()), variable_info())
        .with_result_writer(Box::new(sink.clone()));
    ctx.add_reader(ReaderHandle::Group(Box::new(exchange.reader(0))));
    ctx.set_empty_input_from_shuffle(empty_shuffle && records.is_empty());
    assert!(source.process_record(&mut ctx).is_ok());
    sink.records()
}

#[test]
fn sums_and_counts_per_group() {
    let rows = run(&[(1, 1.0), (2, 5.0), (1, 2.0), (2, 1.5)], false);
    let mut results: Vec<(i64, f64, i64)> = rows
        .iter()
        .map(|r| (r.get(0).to_int8(), r.get(1).to_float8(), r.get(2).to_int8()))
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(results, vec![(1, 3.0, 2), (2, 6.5, 2)]);
}

#[test]
fn nulls_are_skipped_by_sum_and_count() {
    let exchange = Arc::new(GroupExchange::new(shuffle_info(), 1, global_page_pool()));
    let mut writer = exchange.writer();
    writer.write(Record::new(vec![Value::Int8(1), Value::Float8(2.0)]));
    writer.write(Record::new(vec![Value::Int8(1), Value::Null]));
    writer.release();

    let sink = CollectingWriter::new();
    let source = build_chain();
    let mut ctx = TaskContext::new(Arc::new(Config::default()), variable_info())
        .with_result_writer(Box::new(sink.clone()));
    ctx.add_reader(ReaderHandle::Group(Box::new(exchange.reader(0))));
    assert!(source.process_record(&mut ctx).is_ok());

    let rows = sink.records();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(1), &Value::Float8(2.0));
    assert_eq!(rows[0].get(2), &Value::Int8(1));
}

#[test]
fn empty_shuffle_input_generates_empty_values() {
    let rows = run(&[], true);
    assert_eq!(rows.len(), 1);
    // SUM of the empty group is NULL, COUNT is zero
    assert!(rows[0].get(1).is_null());
    assert_eq!(rows[0].get(2), &Value::Int8(0));
}
