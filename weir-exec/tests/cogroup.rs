//! N-way cogroup merge over shuffled inputs.

use std::sync::{Arc, Mutex};

use weir_exec::config::Config;
use weir_exec::exchange::group::{GroupExchange, GroupShuffleInfo};
use weir_exec::io::RecordWriter;
use weir_exec::memory::global_page_pool;
use weir_exec::process::ops::take_cogroup::CogroupInputSpec;
use weir_exec::process::ops::{
    Cogroup, CogroupOperator, OperationStatus, OperatorKind, RecordOperator, TakeCogroup,
};
use weir_exec::process::variable_table::VariableTableInfo;
use weir_exec::process::{ReaderHandle, TaskContext};
use weir_types::{DataType, Record, RecordMeta, Text, Value};

#[derive(Debug, Clone)]
struct DeliveredGroup {
    key: Option<i64>,
    members: Vec<String>,
}

#[derive(Default)]
struct CollectingCogroup {
    delivered: Arc<Mutex<Vec<Vec<DeliveredGroup>>>>,
    finished: Arc<Mutex<bool>>,
}

impl CogroupOperator for CollectingCogroup {
    fn process_cogroup(&self, _ctx: &mut TaskContext, cogroup: &Cogroup) -> OperationStatus {
        let snapshot = cogroup
            .groups
            .iter()
            .map(|g| DeliveredGroup {
                key: g.key.as_ref().map(|k| k.get(0).to_int8()),
                members: g
                    .members
                    .iter()
                    .map(|m| m.get(0).to_character().to_string())
                    .collect(),
            })
            .collect();
        self.delivered.lock().unwrap().push(snapshot);
        OperationStatus::Ok
    }

    fn finish(&self, _ctx: &mut TaskContext) {
        *self.finished.lock().unwrap() = true;
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::TakeCogroup
    }

    fn index(&self) -> usize {
        1
    }
}

fn shuffle_info() -> Arc<GroupShuffleInfo> {
    Arc::new(GroupShuffleInfo::new(
        Arc::new(RecordMeta::new([DataType::Int8, DataType::character_varying()])),
        vec![0],
    ))
}

fn rec(k: i64, v: &str) -> Record {
    Record::new(vec![Value::Int8(k), Value::Character(Text::from(v))])
}

fn single_partition_exchange(records: &[(i64, &str)]) -> Arc<GroupExchange> {
    let exchange = Arc::new(GroupExchange::new(shuffle_info(), 1, global_page_pool()));
    let mut writer = exchange.writer();
    for (k, v) in records {
        writer.write(rec(*k, v));
    }
    writer.release();
    exchange
}

#[test]
fn two_input_merge_delivers_key_ordered_cogroups() {
    let left = single_partition_exchange(&[(1, "a"), (3, "c")]);
    let right = single_partition_exchange(&[(1, "b"), (2, "d")]);

    let collector = CollectingCogroup::default();
    let delivered = Arc::clone(&collector.delivered);
    let finished = Arc::clone(&collector.finished);
    let op = TakeCogroup::new(
        0,
        vec![
            CogroupInputSpec { reader_index: 0, info: Arc::clone(left.info()) },
            CogroupInputSpec { reader_index: 1, info: Arc::clone(right.info()) },
        ],
        Box::new(collector),
    );

    let mut ctx = TaskContext::new(
        Arc::new(Config::default()),
        Arc::new(VariableTableInfo::new([])),
    );
    ctx.add_reader(ReaderHandle::Group(Box::new(left.reader(0))));
    ctx.add_reader(ReaderHandle::Group(Box::new(right.reader(0))));

    assert!(op.process_record(&mut ctx).is_ok());
    assert!(*finished.lock().unwrap());

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 3);

    // key=1: left=[a], right=[b]
    assert_eq!(delivered[0][0].key, Some(1));
    assert_eq!(delivered[0][0].members, vec!["a".to_string()]);
    assert_eq!(delivered[0][1].key, Some(1));
    assert_eq!(delivered[0][1].members, vec!["b".to_string()]);

    // key=2: left is empty, right=[d]
    assert_eq!(delivered[1][0].key, None);
    assert!(delivered[1][0].members.is_empty());
    assert_eq!(delivered[1][1].key, Some(2));
    assert_eq!(delivered[1][1].members, vec!["d".to_string()]);

    // key=3: left=[c], right is empty
    assert_eq!(delivered[2][0].key, Some(3));
    assert_eq!(delivered[2][0].members, vec!["c".to_string()]);
    assert_eq!(delivered[2][1].key, None);
    assert!(delivered[2][1].members.is_empty());
}

#[test]
fn merge_keys_never_decrease_across_many_inputs() {
    let inputs: Vec<Arc<GroupExchange>> = vec![
        single_partition_exchange(&[(5, "e"), (2, "b"), (9, "i")]),
        single_partition_exchange(&[(1, "a"), (7, "g")]),
        single_partition_exchange(&[(2, "bb"), (5, "ee")]),
    ];
    let collector = CollectingCogroup::default();
    let delivered = Arc::clone(&collector.delivered);
    let specs = inputs
        .iter()
        .enumerate()
        .map(|(i, x)| CogroupInputSpec { reader_index: i, info: Arc::clone(x.info()) })
        .collect();
    let op = TakeCogroup::new(0, specs, Box::new(collector));

    let mut ctx = TaskContext::new(
        Arc::new(Config::default()),
        Arc::new(VariableTableInfo::new([])),
    );
    for x in &inputs {
        ctx.add_reader(ReaderHandle::Group(Box::new(x.reader(0))));
    }
    assert!(op.process_record(&mut ctx).is_ok());

    let delivered = delivered.lock().unwrap();
    let keys: Vec<i64> = delivered
        .iter()
        .map(|cg| cg.iter().find_map(|g| g.key).expect("some input has the key"))
        .collect();
    assert_eq!(keys, vec![1, 2, 5, 7, 9]);
    // equal keys from different inputs merge into one delivery
    let key2 = &delivered[1];
    assert_eq!(key2[0].members, vec!["b".to_string()]);
    assert_eq!(key2[2].members, vec!["bb".to_string()]);
    assert!(key2[1].members.is_empty());
}
