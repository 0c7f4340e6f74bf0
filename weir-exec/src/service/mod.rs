//! Request service surface.
//!
//! Requests flow into the service through a per-session router. SQL parsing
//! and planning are external: `prepare` registers pre-compiled statements
//! (typed expression trees over host variables) and execution builds the
//! step graph, runs it on the scheduler, and materializes results to the
//! response channel or to dump files.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use hashbrown::HashMap;
use weir_plan::{Expression, VariableId};
use weir_storage::{Database, Strand, Transaction};
use weir_types::{DataType, Record, RecordMeta, Value};

use crate::config::Config;
use crate::dump::{DumpConfig, Dumper, DumpWriter};
use crate::error::{ExecError, Result, Status};
use crate::eval::{EvaluatorContext, Evaluator};
use crate::graph::{ProcessSpec, StepGraph};
use crate::io::{CollectingWriter, RecordReader};
use crate::kvs::TableDef;
use crate::process::ops::{Emit, Filter, RecordOperator, Scan, ScanBounds};
use crate::process::variable_table::{VariableTable, VariableTableInfo};
use crate::scheduler::{CancellationSource, DagController, TaskScheduler};

/// Commands the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum Command {
    /// Begin a transaction.
    Begin,
    /// Commit the transaction.
    Commit,
    /// Roll the transaction back.
    Rollback,
    /// Register a pre-compiled statement.
    Prepare,
    /// Execute a statement without results.
    ExecuteStatement,
    /// Execute a prepared statement without results.
    ExecutePreparedStatement,
    /// Execute a query returning records.
    ExecuteQuery,
    /// Execute a prepared query returning records.
    ExecutePreparedQuery,
    /// Explain a prepared statement.
    Explain,
    /// Dump query results to columnar files.
    Dump,
    /// Load records back through a prepared statement.
    Load,
}

/// Transaction options of `begin`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Read-only transaction.
    pub readonly: bool,
    /// Long (batch) transaction.
    pub long: bool,
    /// Storages a long transaction preserves for writing.
    pub write_preserves: Vec<String>,
}

/// Named statement parameters.
///
/// Parameter value kinds mirror the wire: int4/int8/float4/float8/character/
/// date/time_of_day/time_point/decimal, plus explicit NULL.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    values: HashMap<String, Value>,
}

impl ParameterSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Binds an int4.
    pub fn set_int4(&mut self, name: impl Into<String>, value: i32) -> &mut Self {
        self.set(name, Value::Int4(value))
    }

    /// Binds an int8.
    pub fn set_int8(&mut self, name: impl Into<String>, value: i64) -> &mut Self {
        self.set(name, Value::Int8(value))
    }

    /// Binds a float8.
    pub fn set_float8(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.set(name, Value::Float8(value))
    }

    /// Binds NULL.
    pub fn set_null(&mut self, name: impl Into<String>) -> &mut Self {
        self.set(name, Value::Null)
    }

    /// Looks a binding up.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// A placeholder of a prepared statement.
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// Wire name (`p0`, `p1`, ...).
    pub name: String,
    /// Host variable the expressions reference.
    pub variable: VariableId,
    /// Declared type.
    pub data_type: DataType,
}

/// A query over one table: scan, optional filter, projection.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Source table.
    pub table: String,
    /// Scan bounds over the primary index.
    pub bounds: ScanBounds,
    /// Boolean predicate over the table's column variables.
    pub filter: Option<Expression>,
    /// Projected column positions.
    pub projection: Vec<usize>,
}

impl QuerySpec {
    /// `SELECT *` over a table.
    pub fn select_all(table: impl Into<String>, column_count: usize) -> Self {
        Self {
            table: table.into(),
            bounds: ScanBounds::default(),
            filter: None,
            projection: (0..column_count).collect(),
        }
    }
}

/// An insert of one row built from expressions over host variables.
#[derive(Debug, Clone)]
pub struct InsertSpec {
    /// Target table.
    pub table: String,
    /// Target column positions, paired with `values`.
    pub columns: Vec<usize>,
    /// One expression per target column.
    pub values: Vec<Expression>,
}

/// A pre-compiled statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Query returning records.
    Query(QuerySpec),
    /// Row insert.
    Insert(InsertSpec),
}

/// A registered prepared statement.
#[derive(Debug)]
pub struct PreparedStatement {
    /// The statement body.
    pub statement: Statement,
    /// Host-variable placeholders.
    pub placeholders: Vec<Placeholder>,
}

/// Handle of a transaction within the service.
pub type TransactionHandle = u64;

/// Handle of a prepared statement within the service.
pub type StatementHandle = u64;

/// Maps source record columns to load parameters.
#[derive(Debug, Clone)]
pub enum LoadColumn {
    /// Bind the parameter from the given source column.
    Column(usize),
    /// Bind the parameter to a constant.
    Literal(Value),
}

/// One parameter binding of a load.
#[derive(Debug, Clone)]
pub struct LoadBinding {
    /// Parameter name.
    pub parameter: String,
    /// Value source.
    pub source: LoadColumn,
}

/// The in-process SQL execution service.
pub struct SqlService {
    config: Arc<Config>,
    database: Database,
    scheduler: Arc<TaskScheduler>,
    tables: RwLock<HashMap<String, Arc<TableDef>>>,
    transactions: Mutex<HashMap<TransactionHandle, Arc<Transaction>>>,
    prepared: Mutex<HashMap<StatementHandle, Arc<PreparedStatement>>>,
    next_transaction: AtomicU64,
    next_statement: AtomicU64,
}

impl SqlService {
    /// Boots the service: initializes the LOB relay and starts the worker
    /// pool.
    pub fn new(config: Config) -> Self {
        crate::lob::init();
        let scheduler = Arc::new(TaskScheduler::new(config.clone()));
        Self {
            config: Arc::new(config),
            database: Database::new(),
            scheduler,
            tables: RwLock::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            prepared: Mutex::new(HashMap::new()),
            next_transaction: AtomicU64::new(1),
            next_statement: AtomicU64::new(1),
        }
    }

    /// The backing database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The engine configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Registers a table and provisions its storages.
    pub fn create_table(&self, table: TableDef) -> Result<Arc<TableDef>> {
        table.provision(&self.database)?;
        let table = Arc::new(table);
        self.tables
            .write()
            .expect("poisoned")
            .insert(table.name.clone(), Arc::clone(&table));
        Ok(table)
    }

    /// Resolves a registered table.
    pub fn table(&self, name: &str) -> Result<Arc<TableDef>> {
        self.tables
            .read()
            .expect("poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::not_found(format!("table not found: {name}")))
    }

    /// Begins a transaction.
    pub fn begin(&self, options: TransactionOptions) -> TransactionHandle {
        let handle = self.next_transaction.fetch_add(1, Ordering::Relaxed);
        let tx = Transaction::begin(options.readonly, options.long, options.write_preserves);
        self.transactions.lock().expect("poisoned").insert(handle, tx);
        handle
    }

    /// Commits the transaction behind `handle`.
    pub fn commit(&self, handle: TransactionHandle) -> Result<()> {
        let tx = self.take_transaction(handle)?;
        tx.commit().map_err(Into::into)
    }

    /// Rolls the transaction behind `handle` back.
    pub fn rollback(&self, handle: TransactionHandle) -> Result<()> {
        let tx = self.take_transaction(handle)?;
        tx.rollback().map_err(Into::into)
    }

    fn transaction(&self, handle: TransactionHandle) -> Result<Arc<Transaction>> {
        self.transactions
            .lock()
            .expect("poisoned")
            .get(&handle)
            .cloned()
            .ok_or_else(|| ExecError::not_found(format!("transaction not found: {handle}")))
    }

    fn take_transaction(&self, handle: TransactionHandle) -> Result<Arc<Transaction>> {
        self.transactions
            .lock()
            .expect("poisoned")
            .remove(&handle)
            .ok_or_else(|| ExecError::not_found(format!("transaction not found: {handle}")))
    }

    /// Registers a prepared statement.
    pub fn prepare(&self, statement: Statement, placeholders: Vec<Placeholder>) -> StatementHandle {
        let handle = self.next_statement.fetch_add(1, Ordering::Relaxed);
        self.prepared
            .lock()
            .expect("poisoned")
            .insert(handle, Arc::new(PreparedStatement { statement, placeholders }));
        handle
    }

    /// Resolves a prepared statement.
    pub fn prepared(&self, handle: StatementHandle) -> Result<Arc<PreparedStatement>> {
        self.prepared
            .lock()
            .expect("poisoned")
            .get(&handle)
            .cloned()
            .ok_or_else(|| ExecError::not_found(format!("prepared statement not found: {handle}")))
    }

    fn host_variables(
        placeholders: &[Placeholder],
        parameters: &ParameterSet,
    ) -> Result<VariableTable> {
        let info = Arc::new(VariableTableInfo::new(
            placeholders.iter().map(|p| (p.variable, p.data_type.clone())),
        ));
        let mut table = VariableTable::new(info);
        for placeholder in placeholders {
            let value = parameters.get(&placeholder.name).cloned().ok_or_else(|| {
                ExecError::invalid_argument(format!("parameter {} is not bound", placeholder.name))
            })?;
            table.set(placeholder.variable, value);
        }
        Ok(table)
    }

    fn build_query_graph(
        &self,
        query: &QuerySpec,
        sink: &CollectingWriter,
    ) -> Result<StepGraph> {
        let table = self.table(&query.table)?;
        let column_count = table.columns.field_count();
        let variable_info = Arc::new(VariableTableInfo::new(
            (0..column_count)
                .map(|i| (VariableId(i as u32), table.columns.field_type(i).clone())),
        ));
        let emit_index = if query.filter.is_some() { 2 } else { 1 };
        let emit = Emit::new(
            emit_index,
            query.projection.iter().map(|&i| VariableId(i as u32)).collect(),
        );
        let downstream: Box<dyn RecordOperator> = match &query.filter {
            Some(predicate) => Box::new(Filter::new(1, predicate.clone(), Some(Box::new(emit)))),
            None => Box::new(emit),
        };
        let scan = Scan::new(
            0,
            (*table).clone(),
            query.bounds.clone(),
            (0..column_count).map(|i| (i, VariableId(i as u32))).collect(),
            Some(downstream),
        );
        let spec = Arc::new(ProcessSpec { variable_info, source: Arc::new(scan) });

        let mut graph = StepGraph::new();
        // the reference scan is not range-partitioned, so the step runs as a
        // single task regardless of sql.scan_default_parallel
        let process = graph.add_process(spec, 1);
        let sink = sink.clone();
        let deliver = graph
            .add_deliver(Arc::new(move || Box::new(sink.clone()) as Box<dyn crate::io::RecordWriter>));
        graph.connect(process, deliver);
        Ok(graph)
    }

    fn run_graph(&self, graph: &mut StepGraph, transaction: Option<Strand>) -> Result<()> {
        let mut env = crate::scheduler::dag::ExecutionEnv::new(Arc::clone(&self.config));
        env.database = Some(self.database.clone());
        env.transaction = transaction;
        env.cancel = CancellationSource::new();
        DagController::new(Arc::clone(&self.scheduler)).schedule(graph, &env)
    }

    /// Executes a query and returns the result records.
    pub fn execute_query(
        &self,
        transaction: TransactionHandle,
        query: &QuerySpec,
    ) -> Result<Vec<Record>> {
        let tx = self.transaction(transaction)?;
        let sink = CollectingWriter::new();
        let mut graph = self.build_query_graph(query, &sink)?;
        self.run_graph(&mut graph, Some(Strand::new(tx)))?;
        Ok(sink.records())
    }

    /// Executes a prepared query.
    pub fn execute_prepared_query(
        &self,
        transaction: TransactionHandle,
        statement: StatementHandle,
        _parameters: &ParameterSet,
    ) -> Result<Vec<Record>> {
        let prepared = self.prepared(statement)?;
        match &prepared.statement {
            Statement::Query(query) => self.execute_query(transaction, query),
            Statement::Insert(_) => Err(ExecError::invalid_argument(
                "prepared statement does not produce a result set",
            )),
        }
    }

    /// Executes an unprepared non-query statement (no placeholders).
    pub fn execute_statement(
        &self,
        transaction: TransactionHandle,
        statement: &Statement,
    ) -> Result<()> {
        match statement {
            Statement::Insert(insert) => {
                let tx = self.transaction(transaction)?;
                tx.check_writable()?;
                let host = VariableTable::new(Arc::new(VariableTableInfo::new([])));
                self.insert_row(insert, &host)
            }
            Statement::Query(_) => Err(ExecError::invalid_argument(
                "queries require execute_query",
            )),
        }
    }

    /// Executes a prepared non-query statement.
    pub fn execute_prepared_statement(
        &self,
        transaction: TransactionHandle,
        statement: StatementHandle,
        parameters: &ParameterSet,
    ) -> Result<()> {
        let prepared = self.prepared(statement)?;
        match &prepared.statement {
            Statement::Insert(insert) => {
                let tx = self.transaction(transaction)?;
                tx.check_writable()?;
                let host = Self::host_variables(&prepared.placeholders, parameters)?;
                self.insert_row(insert, &host)
            }
            Statement::Query(_) => Err(ExecError::invalid_argument(
                "prepared query requires execute_prepared_query",
            )),
        }
    }

    fn insert_row(&self, insert: &InsertSpec, host: &VariableTable) -> Result<()> {
        let table = self.table(&insert.table)?;
        debug_assert_eq!(insert.columns.len(), insert.values.len());
        let mut row = Record::nulls(table.columns.field_count());
        let mut eval_ctx = EvaluatorContext::new(Arc::clone(&self.config));
        let empty = VariableTable::new(Arc::new(VariableTableInfo::new([])));
        for (column, expression) in insert.columns.iter().zip(&insert.values) {
            let evaluator = Evaluator::with_host_variables(expression, host);
            let value = evaluator.evaluate(&mut eval_ctx, &empty);
            if value.is_error() {
                return Err(ExecError::new(
                    Status::ExpressionEvaluationFailure,
                    format!("insert value evaluation failed: {value}"),
                ));
            }
            row.set(*column, value);
        }
        table.insert(&self.database, &row)
    }

    /// Renders a plan description of a prepared statement.
    pub fn explain(&self, statement: StatementHandle) -> Result<String> {
        use itertools::Itertools;

        let prepared = self.prepared(statement)?;
        let text = match &prepared.statement {
            Statement::Query(q) => format!(
                "scan({}) -> {}emit({} columns: [{}])",
                q.table,
                if q.filter.is_some() { "filter -> " } else { "" },
                q.projection.len(),
                q.projection.iter().map(|c| format!("c{c}")).join(", "),
            ),
            Statement::Insert(i) => {
                format!("values -> write({}, {} columns)", i.table, i.columns.len())
            }
        };
        Ok(text)
    }

    /// Dumps a query's results to columnar files, returning the produced
    /// paths. File names are also emitted as `file_name` records through the
    /// returned sink.
    pub fn dump(
        &self,
        transaction: TransactionHandle,
        query: &QuerySpec,
        config: DumpConfig,
        directory: impl Into<PathBuf>,
        writer: &mut dyn DumpWriter,
    ) -> Result<(Vec<PathBuf>, Vec<Record>)> {
        let records = self.execute_query(transaction, query)?;
        let table = self.table(&query.table)?;
        let meta = RecordMeta::new(
            query.projection.iter().map(|&i| table.columns.field_type(i).clone()),
        );
        let dumper = Dumper::new(config, directory, query.table.clone());
        let names = CollectingWriter::new();
        let mut names_handle = names.clone();
        let produced = dumper.dump(&meta, &records, writer, &mut names_handle)?;
        Ok((produced, names.records()))
    }

    /// Loads records through a prepared insert, binding parameters per
    /// record.
    pub fn load(
        &self,
        transaction: TransactionHandle,
        statement: StatementHandle,
        bindings: &[LoadBinding],
        mut source: Box<dyn RecordReader>,
    ) -> Result<u64> {
        let prepared = self.prepared(statement)?;
        let Statement::Insert(insert) = &prepared.statement else {
            return Err(ExecError::invalid_argument("load requires a prepared insert"));
        };
        let tx = self.transaction(transaction)?;
        tx.check_writable()?;
        let mut loaded = 0u64;
        while let Some(record) = source.next_record() {
            let mut parameters = ParameterSet::new();
            for binding in bindings {
                let value = match &binding.source {
                    LoadColumn::Column(i) => record.get(*i).clone(),
                    LoadColumn::Literal(v) => v.clone(),
                };
                parameters.set(binding.parameter.clone(), value);
            }
            let host = Self::host_variables(&prepared.placeholders, &parameters)?;
            self.insert_row(insert, &host)?;
            loaded += 1;
        }
        Ok(loaded)
    }
}

impl core::fmt::Debug for SqlService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SqlService").field("database", &self.database).finish()
    }
}

/// A routed request.
#[derive(Debug)]
pub struct Request {
    /// Session the request belongs to.
    pub session_id: u64,
    /// Target service id.
    pub service_id: u64,
    /// The command payload.
    pub payload: RequestPayload,
}

/// Typed request payloads; the wire framing is an external collaborator.
///
/// Dump and load run through the service API directly because their sinks
/// (columnar writers, record sources) are caller-provided objects.
#[derive(Debug)]
pub enum RequestPayload {
    /// `begin` with options.
    Begin(TransactionOptions),
    /// `commit`.
    Commit(TransactionHandle),
    /// `rollback`.
    Rollback(TransactionHandle),
    /// `prepare`.
    Prepare(Statement, Vec<Placeholder>),
    /// `execute_query`.
    ExecuteQuery(TransactionHandle, QuerySpec),
    /// `execute_prepared_query`.
    ExecutePreparedQuery(TransactionHandle, StatementHandle, ParameterSet),
    /// `execute_prepared_statement`.
    ExecutePreparedStatement(TransactionHandle, StatementHandle, ParameterSet),
    /// `explain`.
    Explain(StatementHandle),
}

impl RequestPayload {
    /// The command this payload carries.
    pub fn command(&self) -> Command {
        match self {
            Self::Begin(_) => Command::Begin,
            Self::Commit(_) => Command::Commit,
            Self::Rollback(_) => Command::Rollback,
            Self::Prepare(..) => Command::Prepare,
            Self::ExecuteQuery(..) => Command::ExecuteQuery,
            Self::ExecutePreparedQuery(..) => Command::ExecutePreparedQuery,
            Self::ExecutePreparedStatement(..) => Command::ExecutePreparedStatement,
            Self::Explain(_) => Command::Explain,
        }
    }
}

/// A routed reply: status code plus body.
#[derive(Debug)]
pub struct Response {
    /// Status code; 0 on success.
    pub code: i32,
    /// Reply body.
    pub body: ResponseBody,
}

/// Typed response bodies.
#[derive(Debug)]
pub enum ResponseBody {
    /// Empty success body.
    Empty,
    /// A transaction handle.
    Transaction(TransactionHandle),
    /// A prepared-statement handle.
    Statement(StatementHandle),
    /// A result set.
    Records(Vec<Record>),
    /// A plan rendering.
    Text(String),
    /// An error message.
    Error(String),
}

/// Per-session request router over the in-process service.
#[derive(Debug)]
pub struct SessionRouter {
    service: Arc<SqlService>,
}

impl SessionRouter {
    /// Creates a router over `service`.
    pub fn new(service: Arc<SqlService>) -> Self {
        Self { service }
    }

    /// Routes one request.
    pub fn route(&self, request: Request) -> Response {
        tracing::debug!(session = request.session_id, service = request.service_id, "request");
        let result: Result<ResponseBody> = match request.payload {
            RequestPayload::Begin(options) => {
                Ok(ResponseBody::Transaction(self.service.begin(options)))
            }
            RequestPayload::Commit(handle) => {
                self.service.commit(handle).map(|()| ResponseBody::Empty)
            }
            RequestPayload::Rollback(handle) => {
                self.service.rollback(handle).map(|()| ResponseBody::Empty)
            }
            RequestPayload::Prepare(statement, placeholders) => Ok(ResponseBody::Statement(
                self.service.prepare(statement, placeholders),
            )),
            RequestPayload::ExecuteQuery(handle, query) => {
                self.service.execute_query(handle, &query).map(ResponseBody::Records)
            }
            RequestPayload::ExecutePreparedQuery(handle, statement, parameters) => self
                .service
                .execute_prepared_query(handle, statement, &parameters)
                .map(ResponseBody::Records),
            RequestPayload::ExecutePreparedStatement(handle, statement, parameters) => self
                .service
                .execute_prepared_statement(handle, statement, &parameters)
                .map(|()| ResponseBody::Empty),
            RequestPayload::Explain(handle) => {
                self.service.explain(handle).map(ResponseBody::Text)
            }
        };
        match result {
            Ok(body) => Response { code: Status::Ok.exit_code(), body },
            Err(e) => Response {
                code: e.status.exit_code(),
                body: ResponseBody::Error(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_plan::{BinaryOp, CompareOp, LossPolicy};

    fn service_with_table() -> (SqlService, Arc<TableDef>) {
        let mut config = Config::default();
        config.thread_pool_size = 2;
        let service = SqlService::new(config);
        let meta = Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8]));
        let table = service.create_table(TableDef::new("t0", meta, vec![0])).unwrap();
        (service, table)
    }

    fn insert_rows(service: &SqlService, table: &TableDef, rows: &[(i64, f64)]) {
        for (k, v) in rows {
            table
                .insert(
                    service.database(),
                    &Record::new(vec![Value::Int8(*k), Value::Float8(*v)]),
                )
                .unwrap();
        }
    }

    #[test]
    fn scan_filter_emit_end_to_end() {
        let (service, table) = service_with_table();
        insert_rows(&service, &table, &[(1, 10.0), (2, 20.0), (3, 30.0)]);
        let tx = service.begin(TransactionOptions::default());
        let filter = Expression::compare(
            CompareOp::GreaterEqual,
            Expression::variable(VariableId(1), DataType::Float8),
            Expression::immediate(Value::Float8(20.0), DataType::Float8),
        );
        let query = QuerySpec {
            filter: Some(filter),
            ..QuerySpec::select_all("t0", 2)
        };
        let mut rows: Vec<(i64, f64)> = service
            .execute_query(tx, &query)
            .unwrap()
            .into_iter()
            .map(|r| (r.get(0).to_int8(), r.get(1).to_float8()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(rows, vec![(2, 20.0), (3, 30.0)]);
        service.commit(tx).unwrap();
    }

    #[test]
    fn prepared_insert_binds_parameters() {
        let (service, _table) = service_with_table();
        let insert = InsertSpec {
            table: "t0".into(),
            columns: vec![0, 1],
            values: vec![
                Expression::variable(VariableId(100), DataType::Int8),
                Expression::binary(
                    BinaryOp::Add,
                    Expression::variable(VariableId(101), DataType::Float8),
                    Expression::immediate(Value::Float8(0.5), DataType::Float8),
                    DataType::Float8,
                ),
            ],
        };
        let placeholders = vec![
            Placeholder { name: "p0".into(), variable: VariableId(100), data_type: DataType::Int8 },
            Placeholder {
                name: "p1".into(),
                variable: VariableId(101),
                data_type: DataType::Float8,
            },
        ];
        let stmt = service.prepare(Statement::Insert(insert), placeholders);
        let tx = service.begin(TransactionOptions::default());
        let mut params = ParameterSet::new();
        params.set_int8("p0", 7).set_float8("p1", 1.0);
        service.execute_prepared_statement(tx, stmt, &params).unwrap();
        let rows = service
            .execute_query(tx, &QuerySpec::select_all("t0", 2))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0), &Value::Int8(7));
        assert_eq!(rows[0].get(1), &Value::Float8(1.5));
        service.commit(tx).unwrap();
    }

    #[test]
    fn scan_yields_cooperatively_and_still_delivers_all_rows() {
        let config = Config { thread_pool_size: 2, scan_block_size: 1, ..Config::default() };
        let service = SqlService::new(config);
        let meta = Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8]));
        let table = service.create_table(TableDef::new("t0", meta, vec![0])).unwrap();
        insert_rows(&service, &table, &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0), (5, 5.0)]);
        let tx = service.begin(TransactionOptions::default());
        let rows = service
            .execute_query(tx, &QuerySpec::select_all("t0", 2))
            .unwrap();
        service.commit(tx).unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn cancelled_request_aborts_the_scan() {
        let (service, table) = service_with_table();
        insert_rows(&service, &table, &[(1, 1.0), (2, 2.0)]);
        let tx = service.transaction(service.begin(TransactionOptions::default())).unwrap();
        let sink = CollectingWriter::new();
        let mut graph = service
            .build_query_graph(&QuerySpec::select_all("t0", 2), &sink)
            .unwrap();
        let mut env = crate::scheduler::dag::ExecutionEnv::new(Arc::clone(&service.config));
        env.database = Some(service.database.clone());
        env.transaction = Some(Strand::new(tx));
        env.cancel.cancel();
        let err = DagController::new(Arc::clone(&service.scheduler))
            .schedule(&mut graph, &env)
            .unwrap_err();
        assert_eq!(err.status, Status::Aborted);
    }

    #[test]
    fn readonly_transaction_rejects_writes() {
        let (service, _table) = service_with_table();
        let insert = InsertSpec {
            table: "t0".into(),
            columns: vec![0],
            values: vec![Expression::immediate(Value::Int8(1), DataType::Int8)],
        };
        let stmt = service.prepare(Statement::Insert(insert), vec![]);
        let tx = service.begin(TransactionOptions { readonly: true, ..Default::default() });
        let err = service
            .execute_prepared_statement(tx, stmt, &ParameterSet::new())
            .unwrap_err();
        assert_eq!(err.status, Status::InvalidArgument);
    }

    #[test]
    fn router_maps_status_codes() {
        let (service, table) = service_with_table();
        insert_rows(&service, &table, &[(1, 1.0)]);
        let router = SessionRouter::new(Arc::new(service));
        let begin = router.route(Request {
            session_id: 1,
            service_id: 1,
            payload: RequestPayload::Begin(TransactionOptions::default()),
        });
        assert_eq!(begin.code, 0);
        let ResponseBody::Transaction(tx) = begin.body else { panic!("expected handle") };
        let reply = router.route(Request {
            session_id: 1,
            service_id: 1,
            payload: RequestPayload::ExecuteQuery(tx, QuerySpec::select_all("t0", 2)),
        });
        assert_eq!(reply.code, 0);
        let ResponseBody::Records(rows) = reply.body else { panic!("expected records") };
        assert_eq!(rows.len(), 1);
        // unknown transaction surfaces a nonzero code
        let bad = router.route(Request {
            session_id: 1,
            service_id: 1,
            payload: RequestPayload::Commit(9999),
        });
        assert_ne!(bad.code, 0);
    }

    #[test]
    fn explain_describes_the_chain() {
        let (service, _table) = service_with_table();
        let stmt = service.prepare(
            Statement::Query(QuerySpec::select_all("t0", 2)),
            vec![],
        );
        let text = service.explain(stmt).unwrap();
        assert!(text.contains("scan(t0)"));
        assert!(text.contains("emit(2 columns)"));
    }

    #[test]
    fn lifecycle_flags_after_run() {
        let (service, table) = service_with_table();
        insert_rows(&service, &table, &[(1, 1.0)]);
        let tx = service.begin(TransactionOptions::default());
        let sink = CollectingWriter::new();
        let query = QuerySpec::select_all("t0", 2);
        let mut graph = service.build_query_graph(&query, &sink).unwrap();
        let tx_arc = service.transaction(tx).unwrap();
        service.run_graph(&mut graph, Some(Strand::new(tx_arc))).unwrap();
        for step in graph.steps() {
            assert!(step.flags().contains(crate::graph::StepFlags::ACTIVATED));
            assert!(step.flags().contains(crate::graph::StepFlags::DEACTIVATED));
        }
        assert_eq!(sink.records().len(), 1);
    }
}
