//! In-memory connection for tests.
//!
//! [`MemoryConnection`] keeps tables in memory and understands exactly the
//! statement shapes `rowmap-query` generates: select all or by key list,
//! insert with an explicit or generated id, update by id and delete by key
//! list. Keys may be bound as parameters (`?` or `$n`) or inlined as literals.
//!
//! Transactions work on a copy of the tables they touch; commit swaps the
//! copies in and rollback (or drop) discards them. Failures can be injected
//! per statement pattern, after a number of successful executions, or on
//! commit, and every statement is logged.
//!
//! ```ignore
//! let conn = MemoryConnection::new().with_table(
//!     "widgets",
//!     vec![
//!         ColumnInfo::new("id", SqlType::BigInt).primary_key().auto_increment(),
//!         ColumnInfo::new("name", SqlType::Text),
//!         ColumnInfo::new("price", SqlType::Integer),
//!     ],
//! );
//! let store = EntityStore::new(conn);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use num_bigint::BigInt;
use regex::Regex;
use rowmap_core::{
    ColumnInfo, Connection, Dialect, Error, Executor, IsolationLevel, QueryErrorKind, Result, Row,
    SqlDialect, TransactionOps, Value,
};

// ============================================================================
// Tables
// ============================================================================

/// Representation of keys the connection generates and reports for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyWidth {
    /// Keys are reported as 32-bit integers.
    Int32,
    /// Keys are reported as 64-bit integers.
    #[default]
    Int64,
    /// Keys are reported as arbitrary-precision integers.
    BigNum,
    /// Keys are generated but not reported to the caller.
    Unreported,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    id_index: usize,
    rows: Vec<Vec<Value>>,
    next_id: i64,
    key_width: KeyWidth,
}

impl MemoryTable {
    fn new(columns: Vec<ColumnInfo>) -> Self {
        let id_index = columns.iter().position(|c| c.primary_key).unwrap_or(0);
        Self {
            columns,
            id_index,
            rows: Vec::new(),
            next_id: 1,
            key_width: KeyWidth::default(),
        }
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::query(QueryErrorKind::Syntax, format!("no such column: {}", name)))
    }

    fn find(&self, id: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(self.id_index).is_some_and(|v| v.same_as(id)))
    }

    fn generate_key(&mut self) -> (Value, Option<Value>) {
        let next = self.next_id;
        self.next_id += 1;
        let reported = match self.key_width {
            KeyWidth::Int32 => i32::try_from(next).ok().map(Value::Int),
            KeyWidth::Int64 => Some(Value::BigInt(next)),
            KeyWidth::BigNum => Some(Value::BigNum(BigInt::from(next))),
            KeyWidth::Unreported => None,
        };
        (Value::BigInt(next), reported)
    }

    fn bump_next_id(&mut self, id: &Value) {
        if let Some(n) = id.as_i64() {
            if n >= self.next_id {
                self.next_id = n + 1;
            }
        }
    }
}

type Tables = BTreeMap<String, MemoryTable>;

#[derive(Debug)]
struct FailureRule {
    pattern: String,
    allowed: usize,
    kind: QueryErrorKind,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    log: Vec<String>,
    failures: Vec<FailureRule>,
    fail_commit: bool,
    commits: usize,
    rollbacks: usize,
}

impl MemoryState {
    /// Log `sql` and apply any matching failure rule.
    fn admit(&mut self, sql: &str) -> Result<()> {
        self.log.push(sql.to_string());
        for rule in &mut self.failures {
            if sql.contains(&rule.pattern) {
                if rule.allowed == 0 {
                    return Err(Error::query(rule.kind, format!("injected failure for '{}'", rule.pattern))
                        .with_sql_text(sql));
                }
                rule.allowed -= 1;
            }
        }
        Ok(())
    }
}

trait WithSql {
    fn with_sql_text(self, sql: &str) -> Error;
}

impl WithSql for Error {
    fn with_sql_text(self, sql: &str) -> Error {
        match self {
            Error::Query(q) => Error::Query(q.with_sql(sql)),
            other => other,
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// An in-memory, transactional stand-in for a database connection.
#[derive(Debug)]
pub struct MemoryConnection {
    dialect: Dialect,
    state: Mutex<MemoryState>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    /// An empty database using the SQLite dialect.
    pub fn new() -> Self {
        Self::with_dialect(Dialect::Sqlite)
    }

    /// An empty database using `dialect` for statement text.
    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a table. The primary-key column (or the first column) is the id.
    pub fn with_table(self, name: &str, columns: Vec<ColumnInfo>) -> Self {
        self.lock()
            .tables
            .insert(name.to_string(), MemoryTable::new(columns));
        self
    }

    /// Set how generated keys of `table` are reported.
    pub fn set_key_width(&self, table: &str, width: KeyWidth) {
        if let Some(t) = self.lock().tables.get_mut(table) {
            t.key_width = width;
        }
    }

    /// Insert a row directly, bypassing statements and the log. Values are
    /// in table column order.
    pub fn seed(&self, table: &str, values: Vec<Value>) {
        if let Some(t) = self.lock().tables.get_mut(table) {
            if let Some(id) = values.get(t.id_index) {
                t.bump_next_id(id);
            }
            t.rows.push(values);
        }
    }

    /// Change one column of one row directly, as another client would.
    pub fn set_value(&self, table: &str, id: &Value, column: &str, value: Value) {
        let mut state = self.lock();
        let Some(t) = state.tables.get_mut(table) else {
            return;
        };
        let (Some(row), Ok(col)) = (t.find(id), t.column_index(column)) else {
            return;
        };
        t.rows[row][col] = value;
    }

    /// Delete one row directly, as another client would.
    pub fn remove_row(&self, table: &str, id: &Value) {
        let mut state = self.lock();
        if let Some(t) = state.tables.get_mut(table) {
            if let Some(row) = t.find(id) {
                t.rows.remove(row);
            }
        }
    }

    /// The row with `id`, in table column order.
    pub fn row(&self, table: &str, id: &Value) -> Option<Vec<Value>> {
        let state = self.lock();
        let t = state.tables.get(table)?;
        t.find(id).map(|idx| t.rows[idx].clone())
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.fail_after(pattern, 0);
    }

    /// Let `allowed` statements containing `pattern` succeed, then fail the
    /// rest. Within a batch this fails part way through.
    pub fn fail_after(&self, pattern: &str, allowed: usize) {
        self.lock().failures.push(FailureRule {
            pattern: pattern.to_string(),
            allowed,
            kind: QueryErrorKind::Database,
        });
    }

    /// Make the next commits fail (and roll back) while `fail` is set.
    pub fn fail_on_commit(&self, fail: bool) {
        self.lock().fail_commit = fail;
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failures.clear();
        state.fail_commit = false;
    }

    /// Every statement executed so far, including transaction control.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Statements executed so far that start with `prefix`.
    pub fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|s| s.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Forget the statement log.
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// Number of committed transactions.
    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    /// Number of rolled back transactions.
    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    fn run_autocommit(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let mut state = self.lock();
        state.admit(sql)?;
        let statement = parse(sql)?;
        run(&mut state.tables, &statement, params).map_err(|e| e.with_sql_text(sql))
    }
}

impl Executor for MemoryConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run_autocommit(sql, params)?.rows()
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.run_autocommit(sql, params)?.affected())
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self.run_autocommit(sql, params)?.generated())
    }
}

impl Connection for MemoryConnection {
    type Tx<'conn>
        = MemoryTransaction<'conn>
    where
        Self: 'conn;

    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self
            .lock()
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    fn begin_with(&self, isolation: IsolationLevel) -> Result<MemoryTransaction<'_>> {
        let mut state = self.lock();
        state.admit(&format!("BEGIN ISOLATION LEVEL {}", isolation.as_sql()))?;
        Ok(MemoryTransaction {
            conn: self,
            tables: RefCell::new(state.tables.clone()),
            touched: RefCell::new(BTreeSet::new()),
            finished: Cell::new(false),
        })
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// A transaction on a [`MemoryConnection`]. Dropping it rolls back.
#[derive(Debug)]
pub struct MemoryTransaction<'conn> {
    conn: &'conn MemoryConnection,
    tables: RefCell<Tables>,
    touched: RefCell<BTreeSet<String>>,
    finished: Cell<bool>,
}

impl MemoryTransaction<'_> {
    fn run_in_tx(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        self.conn.lock().admit(sql)?;
        let statement = parse(sql)?;
        if statement.writes() {
            self.touched.borrow_mut().insert(statement.table.clone());
        }
        run(&mut self.tables.borrow_mut(), &statement, params).map_err(|e| e.with_sql_text(sql))
    }
}

impl Executor for MemoryTransaction<'_> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run_in_tx(sql, params)?.rows()
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.run_in_tx(sql, params)?.affected())
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self.run_in_tx(sql, params)?.generated())
    }
}

impl TransactionOps for MemoryTransaction<'_> {
    fn commit(self) -> Result<()> {
        self.finished.set(true);
        let mut state = self.conn.lock();
        state.log.push("COMMIT".to_string());
        if state.fail_commit {
            state.rollbacks += 1;
            return Err(Error::query(QueryErrorKind::Transaction, "injected commit failure"));
        }
        let mut tables = self.tables.take();
        for name in self.touched.take() {
            if let Some(table) = tables.remove(&name) {
                state.tables.insert(name, table);
            }
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        drop(self);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.finished.replace(true) {
            return;
        }
        let mut state = self.conn.lock();
        state.log.push("ROLLBACK".to_string());
        state.rollbacks += 1;
    }
}

// ============================================================================
// Statement Parsing
// ============================================================================

const IDENT: &str = r#"(?:"(?:[^"]|"")*"|`(?:[^`]|``)*`)"#;

struct Patterns {
    select: Regex,
    insert: Regex,
    insert_default: Regex,
    update: Regex,
    assignment: Regex,
    delete: Regex,
}

impl Patterns {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            select: Regex::new(&format!(
                r"^SELECT (.+?) FROM ({IDENT})(?: WHERE ({IDENT}) IN \((.*)\))?$"
            ))?,
            insert: Regex::new(&format!(r"^INSERT INTO ({IDENT}) \((.+?)\) VALUES \((.*)\)$"))?,
            insert_default: Regex::new(&format!(r"^INSERT INTO ({IDENT}) DEFAULT VALUES$"))?,
            update: Regex::new(&format!(r"^UPDATE ({IDENT}) SET (.+) WHERE ({IDENT}) = (.+)$"))?,
            assignment: Regex::new(&format!(r"^({IDENT}) = (.+)$"))?,
            delete: Regex::new(&format!(r"^DELETE FROM ({IDENT}) WHERE ({IDENT}) IN \((.*)\)$"))?,
        })
    }
}

fn patterns() -> Result<&'static Patterns> {
    static PATTERNS: OnceLock<std::result::Result<Patterns, String>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| Patterns::compile().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| Error::query(QueryErrorKind::Syntax, format!("statement patterns: {}", e)))
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Positional,
    Numbered(usize),
    Literal(Value),
}

#[derive(Debug)]
enum Kind {
    Select {
        columns: Vec<String>,
        filter: Option<(String, Vec<Arg>)>,
    },
    Insert {
        columns: Vec<String>,
        values: Vec<Arg>,
    },
    Update {
        sets: Vec<(String, Arg)>,
        id_column: String,
        id: Arg,
    },
    Delete {
        id_column: String,
        keys: Vec<Arg>,
    },
}

#[derive(Debug)]
struct Statement {
    table: String,
    kind: Kind,
}

impl Statement {
    fn writes(&self) -> bool {
        !matches!(self.kind, Kind::Select { .. })
    }
}

fn syntax(sql: &str) -> Error {
    Error::query(QueryErrorKind::Syntax, "unsupported statement").with_sql_text(sql)
}

fn parse(sql: &str) -> Result<Statement> {
    let p = patterns()?;
    let sql = sql.trim();
    if let Some(c) = p.select.captures(sql) {
        let filter = match (c.get(3), c.get(4)) {
            (Some(col), Some(keys)) => Some((unquote(col.as_str()), parse_args(keys.as_str())?)),
            _ => None,
        };
        return Ok(Statement {
            table: unquote(&c[2]),
            kind: Kind::Select {
                columns: split_list(&c[1]).iter().map(|s| unquote(s)).collect(),
                filter,
            },
        });
    }
    if let Some(c) = p.insert_default.captures(sql) {
        return Ok(Statement {
            table: unquote(&c[1]),
            kind: Kind::Insert {
                columns: Vec::new(),
                values: Vec::new(),
            },
        });
    }
    if let Some(c) = p.insert.captures(sql) {
        return Ok(Statement {
            table: unquote(&c[1]),
            kind: Kind::Insert {
                columns: split_list(&c[2]).iter().map(|s| unquote(s)).collect(),
                values: parse_args(&c[3])?,
            },
        });
    }
    if let Some(c) = p.update.captures(sql) {
        let mut sets = Vec::new();
        for item in split_list(&c[2]) {
            let a = p.assignment.captures(&item).ok_or_else(|| syntax(sql))?;
            sets.push((unquote(&a[1]), parse_arg(&a[2])?));
        }
        return Ok(Statement {
            table: unquote(&c[1]),
            kind: Kind::Update {
                sets,
                id_column: unquote(&c[3]),
                id: parse_arg(&c[4])?,
            },
        });
    }
    if let Some(c) = p.delete.captures(sql) {
        return Ok(Statement {
            table: unquote(&c[1]),
            kind: Kind::Delete {
                id_column: unquote(&c[2]),
                keys: parse_args(&c[3])?,
            },
        });
    }
    Err(syntax(sql))
}

fn unquote(ident: &str) -> String {
    let ident = ident.trim();
    if ident.len() >= 2 {
        if let Some(inner) = ident.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return inner.replace("\"\"", "\"");
        }
        if let Some(inner) = ident.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
            return inner.replace("``", "`");
        }
    }
    ident.to_string()
}

/// Split a comma separated list, ignoring commas inside quotes.
fn split_list(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in list.chars() {
        match (quote, ch) {
            (None, ',') => {
                items.push(current.trim().to_string());
                current.clear();
                continue;
            }
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

fn parse_args(list: &str) -> Result<Vec<Arg>> {
    split_list(list).iter().map(|s| parse_arg(s)).collect()
}

fn parse_arg(token: &str) -> Result<Arg> {
    let token = token.trim();
    if token == "?" {
        return Ok(Arg::Positional);
    }
    if let Some(n) = token.strip_prefix('$') {
        return n
            .parse::<usize>()
            .map(Arg::Numbered)
            .map_err(|_| Error::query(QueryErrorKind::Syntax, format!("bad placeholder {}", token)));
    }
    parse_literal(token).map(Arg::Literal)
}

fn parse_literal(token: &str) -> Result<Value> {
    match token.to_ascii_uppercase().as_str() {
        "NULL" => return Ok(Value::Null),
        "TRUE" => return Ok(Value::Bool(true)),
        "FALSE" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Some(inner) = token.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok(Value::Text(inner.replace("''", "'")));
    }
    if let Ok(n) = token.parse::<i64>() {
        return Ok(Value::BigInt(n));
    }
    if let Ok(n) = token.parse::<BigInt>() {
        return Ok(Value::BigNum(n));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Ok(Value::Double(f));
    }
    Err(Error::query(QueryErrorKind::Syntax, format!("bad literal {}", token)))
}

// ============================================================================
// Execution
// ============================================================================

enum Outcome {
    Rows(Vec<Row>),
    Affected(u64),
    Inserted(Option<Value>),
}

impl Outcome {
    fn rows(self) -> Result<Vec<Row>> {
        match self {
            Outcome::Rows(rows) => Ok(rows),
            _ => Err(Error::query(QueryErrorKind::Syntax, "statement does not return rows")),
        }
    }

    fn affected(self) -> u64 {
        match self {
            Outcome::Rows(rows) => rows.len() as u64,
            Outcome::Affected(n) => n,
            Outcome::Inserted(_) => 1,
        }
    }

    fn generated(self) -> Option<Value> {
        match self {
            Outcome::Inserted(key) => key,
            _ => None,
        }
    }
}

struct Binder<'p> {
    params: &'p [Value],
    next: usize,
}

impl Binder<'_> {
    fn bind(&mut self, arg: &Arg) -> Result<Value> {
        let idx = match arg {
            Arg::Literal(v) => return Ok(v.clone()),
            Arg::Positional => {
                self.next += 1;
                self.next
            }
            Arg::Numbered(n) => *n,
        };
        idx.checked_sub(1)
            .and_then(|i| self.params.get(i))
            .cloned()
            .ok_or_else(|| {
                Error::query(
                    QueryErrorKind::Parameter,
                    format!("missing parameter {} of {}", idx, self.params.len()),
                )
            })
    }

    fn bind_all(&mut self, args: &[Arg]) -> Result<Vec<Value>> {
        args.iter().map(|a| self.bind(a)).collect()
    }
}

fn table_mut<'t>(tables: &'t mut Tables, name: &str) -> Result<&'t mut MemoryTable> {
    tables
        .get_mut(name)
        .ok_or_else(|| Error::query(QueryErrorKind::Syntax, format!("no such table: {}", name)))
}

fn run(tables: &mut Tables, statement: &Statement, params: &[Value]) -> Result<Outcome> {
    let table = table_mut(tables, &statement.table)?;
    let mut binder = Binder { params, next: 0 };
    match &statement.kind {
        Kind::Select { columns, filter } => {
            let indices = columns
                .iter()
                .map(|c| table.column_index(c))
                .collect::<Result<Vec<_>>>()?;
            let keys = match filter {
                Some((col, args)) => Some((table.column_index(col)?, binder.bind_all(args)?)),
                None => None,
            };
            let names: Arc<[String]> = columns.clone().into();
            let rows = table
                .rows
                .iter()
                .filter(|row| match &keys {
                    Some((col, keys)) => keys.iter().any(|k| row[*col].same_as(k)),
                    None => true,
                })
                .map(|row| Row::new(Arc::clone(&names), indices.iter().map(|i| row[*i].clone()).collect()))
                .collect();
            Ok(Outcome::Rows(rows))
        }
        Kind::Insert { columns, values } => {
            if columns.len() != values.len() {
                return Err(Error::query(
                    QueryErrorKind::Parameter,
                    "column and value counts differ",
                ));
            }
            let values = binder.bind_all(values)?;
            let mut row = vec![Value::Null; table.columns.len()];
            let mut explicit_id = false;
            for (col, value) in columns.iter().zip(values) {
                let idx = table.column_index(col)?;
                explicit_id |= idx == table.id_index;
                row[idx] = value;
            }
            let reported = if explicit_id {
                let id = row[table.id_index].clone();
                if id.is_null() {
                    return Err(Error::query(QueryErrorKind::Constraint, "NOT NULL constraint failed on id"));
                }
                if table.find(&id).is_some() {
                    return Err(Error::query(
                        QueryErrorKind::Constraint,
                        format!("duplicate key {:?}", id),
                    ));
                }
                table.bump_next_id(&id);
                None
            } else {
                let (stored, reported) = table.generate_key();
                row[table.id_index] = stored;
                reported
            };
            table.rows.push(row);
            Ok(Outcome::Inserted(reported))
        }
        Kind::Update { sets, id_column, id } => {
            let assignments = sets
                .iter()
                .map(|(col, arg)| Ok((table.column_index(col)?, binder.bind(arg)?)))
                .collect::<Result<Vec<_>>>()?;
            let id_idx = table.column_index(id_column)?;
            let id = binder.bind(id)?;
            let mut affected = 0;
            for row in table.rows.iter_mut().filter(|r| r[id_idx].same_as(&id)) {
                for (idx, value) in &assignments {
                    row[*idx] = value.clone();
                }
                affected += 1;
            }
            Ok(Outcome::Affected(affected))
        }
        Kind::Delete { id_column, keys } => {
            let id_idx = table.column_index(id_column)?;
            let keys = binder.bind_all(keys)?;
            let before = table.rows.len();
            table
                .rows
                .retain(|row| !keys.iter().any(|k| row[id_idx].same_as(k)));
            Ok(Outcome::Affected((before - table.rows.len()) as u64))
        }
    }
}
