use crate::callbacks::{CallbackRegistry, Dest, Exec, Map, Op};
use crate::driver::{Conn, ConnPool, Dialect, Rows};
use crate::prepared::PreparedStmtDb;
use crate::statement::{ClauseBuilderFn, Statement};
use crate::{Error, Result, Value};

use loam_core::clause::{
    Column, Expr, ExprEq, ExprIn, ExprNamed, GroupBy, Join, Limit, Locking, OrderBy,
    OrderByColumn, Where,
};
use loam_core::schema::{self, Record, RecordDescriptor, RecordList, SchemaCache};
use loam_core::NamingStrategy;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Handle-level configuration, fixed at open time and overlaid per session.
#[derive(Clone)]
pub struct Config {
    /// Wrap each write in a transaction.
    pub skip_default_transaction: bool,
    pub naming_strategy: NamingStrategy,
    /// Generate SQL without touching the pool.
    pub dry_run: bool,
    /// Route statements through the prepared-statement cache.
    pub prepare_stmt: bool,
    /// Permit updates and deletes without a WHERE clause.
    pub allow_global_update: bool,
    /// Split slice creates into batches of this size; zero disables.
    pub create_batch_size: usize,
    /// Route driver errors through the dialect's translator.
    pub translate_error: bool,
    /// The clock used for auto-timestamps; overridable per session.
    pub now: NowFn,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_default_transaction: false,
            naming_strategy: NamingStrategy::default(),
            dry_run: false,
            prepare_stmt: false,
            allow_global_update: false,
            create_batch_size: 0,
            translate_error: false,
            now: Arc::new(Utc::now),
        }
    }
}

impl core::fmt::Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("skip_default_transaction", &self.skip_default_transaction)
            .field("dry_run", &self.dry_run)
            .field("prepare_stmt", &self.prepare_stmt)
            .field("allow_global_update", &self.allow_global_update)
            .field("create_batch_size", &self.create_batch_size)
            .finish()
    }
}

/// Snapshot configuration for a derived session.
#[derive(Clone, Default)]
pub struct Session {
    pub dry_run: bool,
    pub prepare_stmt: bool,
    /// Derive a fresh statement instead of copying the chain so far.
    pub new_db: bool,
    pub skip_hooks: bool,
    pub skip_default_transaction: bool,
    pub allow_global_update: bool,
    pub create_batch_size: usize,
    pub now: Option<NowFn>,
}

/// State shared by every clone of one handle; lives as long as the pool.
pub struct DbShared {
    pub(crate) dialect: Arc<dyn Dialect>,
    pub(crate) pool: Arc<dyn ConnPool>,
    pub(crate) prepared: Arc<PreparedStmtDb>,
    pub(crate) callbacks: RwLock<crate::callbacks::Callbacks>,
    pub(crate) schema_cache: SchemaCache,
    pub(crate) clause_builders: RwLock<Arc<HashMap<&'static str, ClauseBuilderFn>>>,
}

/// How a fluent call derives its statement.
///
/// Handles are immutable-style overlays, so there is no in-place "share"
/// mode: every derivation allocates. A root handle starts fresh; anything
/// already carrying a chain deep-copies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementClone {
    /// Start a fresh statement inheriting only the connection.
    Fresh,
    /// Deep-copy clauses, joins, and settings.
    Deep,
}

/// The database handle: an immutable-style overlay over the shared state.
/// Fluent methods derive a new handle according to the clone mode; terminal
/// methods run an operation's callback chain.
pub struct Db {
    shared: Arc<DbShared>,
    pub(crate) config: Config,
    pub(crate) stmt: Statement,
    clone_mode: StatementClone,
    error: Option<Error>,
}

/// The outcome of a terminal call: row count plus the built statement, so
/// dry runs stay observable.
#[derive(Debug, Clone)]
pub struct Execution {
    pub rows_affected: u64,
    pub sql: String,
    pub vars: Vec<Value>,
}

/// A `[T]` slice can't be unsize-coerced into `&mut dyn RecordList` directly
/// (Rust only allows that coercion from a `Sized` source), so batch chunks
/// are wrapped in this `Sized` forwarder to obtain the trait object.
struct ChunkList<'a, T>(&'a mut [T]);

impl<T: Record + Default> RecordList for ChunkList<'_, T> {
    fn len(&self) -> usize {
        RecordList::len(self.0)
    }

    fn is_empty(&self) -> bool {
        RecordList::is_empty(self.0)
    }

    fn get(&self, index: usize) -> &dyn Record {
        RecordList::get(self.0, index)
    }

    fn get_mut(&mut self, index: usize) -> &mut dyn Record {
        RecordList::get_mut(self.0, index)
    }

    fn push_default(&mut self) {
        RecordList::push_default(self.0)
    }

    fn clear(&mut self) {
        RecordList::clear(self.0)
    }

    fn descriptor(&self) -> RecordDescriptor {
        RecordList::descriptor(self.0)
    }
}

impl Db {
    /// Open a handle over a dialect and pool. The dialect registers its
    /// callbacks (and clause overrides) during initialization.
    pub fn open(
        dialect: impl Dialect + 'static,
        pool: impl ConnPool + 'static,
        config: Config,
    ) -> Result<Db> {
        let dialect: Arc<dyn Dialect> = Arc::new(dialect);
        let pool: Arc<dyn ConnPool> = Arc::new(pool);
        let prepared = Arc::new(PreparedStmtDb::new(pool.clone()));

        let shared = Arc::new(DbShared {
            dialect: dialect.clone(),
            pool: pool.clone(),
            prepared: prepared.clone(),
            callbacks: RwLock::new(crate::callbacks::Callbacks::default()),
            schema_cache: SchemaCache::new(),
            clause_builders: RwLock::new(Arc::new(HashMap::new())),
        });

        let conn = if config.prepare_stmt {
            Conn::Pool(prepared)
        } else {
            Conn::Pool(pool)
        };
        let builders = shared
            .clause_builders
            .read()
            .expect("clause builder registry poisoned")
            .clone();

        let mut db = Db {
            shared,
            config,
            stmt: Statement::new(dialect.clone(), conn, builders),
            clone_mode: StatementClone::Fresh,
            error: None,
        };

        dialect.initialize(&mut db)?;
        Ok(db)
    }

    pub(crate) fn shared(&self) -> &Arc<DbShared> {
        &self.shared
    }

    /// The callback registration facade.
    pub fn callback(&self) -> CallbackRegistry<'_> {
        CallbackRegistry {
            shared: &self.shared,
        }
    }

    /// Override the emission of a named clause.
    pub fn register_clause_builder(&self, name: &'static str, builder: ClauseBuilderFn) {
        let mut builders = self
            .shared
            .clause_builders
            .write()
            .expect("clause builder registry poisoned");
        let mut map = (**builders).clone();
        map.insert(name, builder);
        *builders = Arc::new(map);
    }

    /// Derive the handle the next mutation applies to.
    fn instance(&self) -> Db {
        let stmt = match self.clone_mode {
            StatementClone::Fresh => {
                let mut stmt = self.stmt.fresh();
                stmt.clause_builders = self
                    .shared
                    .clause_builders
                    .read()
                    .expect("clause builder registry poisoned")
                    .clone();
                stmt
            }
            StatementClone::Deep => self.stmt.clone(),
        };

        Db {
            shared: self.shared.clone(),
            config: self.config.clone(),
            stmt,
            // the derived handle carries a chain now; branching off it copies
            clone_mode: StatementClone::Deep,
            error: self.error.clone(),
        }
    }

    fn add_error(&mut self, err: Error) {
        self.error = Some(match self.error.take() {
            None => err,
            Some(prev) => prev.context(err),
        });
    }

    /// Derive a session with overlaid configuration.
    pub fn session(&self, session: Session) -> Db {
        let mut db = self.instance();

        if session.dry_run {
            db.config.dry_run = true;
        }
        if session.skip_default_transaction {
            db.config.skip_default_transaction = true;
        }
        if session.allow_global_update {
            db.config.allow_global_update = true;
        }
        if session.create_batch_size > 0 {
            db.config.create_batch_size = session.create_batch_size;
        }
        if let Some(now) = session.now {
            db.config.now = now;
        }
        if session.skip_hooks {
            db.stmt.skip_hooks = true;
        }
        if session.prepare_stmt && !db.config.prepare_stmt {
            db.config.prepare_stmt = true;
            if matches!(db.stmt.conn, Conn::Pool(_)) {
                db.stmt.conn = Conn::Pool(db.shared.prepared.clone());
            }
        }
        if session.new_db {
            db.stmt = db.stmt.fresh();
        }

        db
    }

    /// Resolve (and cache) the schema for a record type, pinning the
    /// statement's model and table.
    pub fn model<T: Record>(&self) -> Db {
        let mut db = self.instance();
        db.set_schema::<T>();
        db
    }

    fn set_schema<T: Record>(&mut self) {
        match schema::parse::<T>(&self.shared.schema_cache, &self.config.naming_strategy) {
            Ok(schema) => {
                if self.stmt.table.is_empty() {
                    self.stmt.table = schema.table.clone();
                }
                self.stmt.schema = Some(schema);
            }
            Err(err) => self.add_error(err),
        }
    }

    fn ensure_schema<T: Record>(&mut self) {
        if self.stmt.schema.is_none() {
            self.set_schema::<T>();
        }
    }

    /// Target an explicit table.
    pub fn table(&self, name: impl Into<String>) -> Db {
        let mut db = self.instance();
        db.stmt.table = name.into();
        db
    }

    pub fn select(&self, columns: impl IntoIterator<Item = impl Into<String>>) -> Db {
        let mut db = self.instance();
        db.stmt.selects = columns.into_iter().map(Into::into).collect();
        db
    }

    pub fn omit(&self, columns: impl IntoIterator<Item = impl Into<String>>) -> Db {
        let mut db = self.instance();
        db.stmt.omits = columns.into_iter().map(Into::into).collect();
        db
    }

    pub fn distinct(&self) -> Db {
        let mut db = self.instance();
        db.stmt.distinct = true;
        db
    }

    pub fn unscoped(&self) -> Db {
        let mut db = self.instance();
        db.stmt.unscoped = true;
        db
    }

    /// Add conditions joined by AND.
    pub fn where_(&self, query: &str, args: Vec<Value>) -> Db {
        let mut db = self.instance();
        let conds = db.stmt.build_condition(query, args);
        if !conds.is_empty() {
            db.stmt.add_clause(Where { exprs: conds });
        }
        db
    }

    /// Splice conditions in as an OR branch of the accumulated WHERE.
    pub fn or_(&self, query: &str, args: Vec<Value>) -> Db {
        let mut db = self.instance();
        let conds = db.stmt.build_condition(query, args);
        db.stmt.or_where(conds);
        db
    }

    /// Add negated conditions.
    pub fn not(&self, query: &str, args: Vec<Value>) -> Db {
        let mut db = self.instance();
        let conds = db.stmt.build_condition(query, args);
        if let Some(expr) = Expr::not(conds) {
            db.stmt.add_clause(Where { exprs: vec![expr] });
        }
        db
    }

    /// Equality conditions from a column/value map; list values become IN
    /// groups.
    pub fn where_map(&self, conds: Map) -> Db {
        let mut db = self.instance();
        let exprs: Vec<Expr> = conds
            .into_iter()
            .map(|(column, value)| match value {
                Value::List(values) => Expr::In(ExprIn {
                    column: Column::new(column),
                    values,
                }),
                value => Expr::Eq(ExprEq {
                    column: Column::new(column),
                    value,
                }),
            })
            .collect();
        if !exprs.is_empty() {
            db.stmt.add_clause(Where { exprs });
        }
        db
    }

    /// Equality conditions from a record's non-zero readable fields.
    pub fn where_record<T: Record>(&self, record: &T) -> Db {
        let mut db = self.instance();
        db.ensure_schema::<T>();

        let Some(schema) = db.stmt.schema.clone() else {
            return db;
        };

        let mut exprs = Vec::new();
        for field in &schema.fields {
            if field.db_name.is_empty() || !field.readable {
                continue;
            }
            let (value, is_zero) = field.value_of(record);
            if !is_zero {
                exprs.push(Expr::Eq(ExprEq {
                    column: Column::with_table(loam_core::clause::CURRENT_TABLE, &field.db_name),
                    value,
                }));
            }
        }

        if !exprs.is_empty() {
            db.stmt.add_clause(Where { exprs });
        }
        db
    }

    pub fn group(&self, column: &str) -> Db {
        let mut db = self.instance();
        db.stmt.add_clause(GroupBy {
            columns: vec![Column::new(column)],
            having: Vec::new(),
        });
        db
    }

    pub fn having(&self, query: &str, args: Vec<Value>) -> Db {
        let mut db = self.instance();
        let conds = db.stmt.build_condition(query, args);
        db.stmt.add_clause(GroupBy {
            columns: Vec::new(),
            having: conds,
        });
        db
    }

    /// Raw ordering, e.g. `"age DESC"`.
    pub fn order(&self, value: &str) -> Db {
        let mut db = self.instance();
        db.stmt.add_clause(OrderBy {
            columns: vec![OrderByColumn {
                column: Column {
                    name: value.to_owned(),
                    raw: true,
                    ..Column::new("")
                },
                desc: false,
                reorder: false,
            }],
            expression: None,
        });
        db
    }

    pub fn limit(&self, limit: i64) -> Db {
        let mut db = self.instance();
        db.stmt.add_clause(Limit {
            limit: Some(limit),
            offset: None,
        });
        db
    }

    pub fn offset(&self, offset: i64) -> Db {
        let mut db = self.instance();
        db.stmt.add_clause(Limit {
            limit: None,
            offset: Some(offset),
        });
        db
    }

    /// Raw join text appended to FROM.
    pub fn joins(&self, query: &str, args: Vec<Value>) -> Db {
        let mut db = self.instance();
        db.stmt.joins.push(Join::raw(Expr::raw(query, args)));
        db
    }

    /// Row-locking clause, e.g. `FOR UPDATE`.
    pub fn locking(&self, locking: Locking) -> Db {
        let mut db = self.instance();
        db.stmt.add_clause(locking);
        db
    }

    /// Merge an arbitrary clause into the statement, e.g. an ON CONFLICT.
    pub fn clauses(&self, clause: impl loam_core::clause::Interface) -> Db {
        let mut db = self.instance();
        db.stmt.add_clause(clause);
        db
    }

    /// Store a statement-scoped setting.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Db {
        let mut db = self.instance();
        db.stmt.settings.insert(key.into(), value.into());
        db
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.stmt.settings.get(key).cloned()
    }

    /// Seed the statement buffer with raw SQL and positional variables.
    pub fn raw(&self, sql: &str, args: Vec<Value>) -> Db {
        let mut db = self.instance();
        db.stmt.sql.clear();
        db.stmt.vars.clear();
        Expr::raw(sql, args).build(&mut db.stmt);
        let errors: Vec<Error> = db.stmt.errors.drain(..).collect();
        for err in errors {
            db.add_error(err);
        }
        db
    }

    /// Raw SQL with `@name` parameters resolved from a map.
    pub fn raw_named(&self, sql: &str, names: Map) -> Db {
        let mut db = self.instance();
        db.stmt.sql.clear();
        db.stmt.vars.clear();
        let named = ExprNamed {
            sql: sql.to_owned(),
            vars: Vec::new(),
            names: names.into_iter().collect::<IndexMap<String, Value>>(),
        };
        named.build(&mut db.stmt);
        let errors: Vec<Error> = db.stmt.errors.drain(..).collect();
        for err in errors {
            db.add_error(err);
        }
        db
    }

    /// Render a human-readable expansion of an execution.
    pub fn explain(&self, execution: &Execution) -> String {
        self.shared.dialect.explain(&execution.sql, &execution.vars)
    }

    // Terminal operations

    pub fn create<T: Record>(&self, record: &mut T) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Create, Dest::Record(record)).map(|r| r.0)
    }

    pub fn create_many<T: Record + Default>(&self, records: &mut Vec<T>) -> Result<Execution> {
        let batch = self.config.create_batch_size;

        if batch > 0 && records.len() > batch {
            let mut total = 0;
            let mut last: Option<Execution> = None;
            for chunk in records.chunks_mut(batch) {
                let mut db = self.instance();
                db.ensure_schema::<T>();
                let (execution, _) =
                    db.execute(Op::Create, Dest::Records(&mut ChunkList(chunk)))?;
                total += execution.rows_affected;
                last = Some(execution);
            }
            let mut execution = last.expect("at least one batch ran");
            execution.rows_affected = total;
            return Ok(execution);
        }

        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Create, Dest::Records(records)).map(|r| r.0)
    }

    /// Insert from a column/value map. Requires an explicit table or model.
    pub fn create_map<T: Record>(&self, values: &mut Map) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Create, Dest::Map(values)).map(|r| r.0)
    }

    pub fn create_maps<T: Record>(&self, values: &mut Vec<Map>) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Create, Dest::Maps(values)).map(|r| r.0)
    }

    pub fn find<T: Record + Default>(&self, records: &mut Vec<T>) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Query, Dest::Records(records)).map(|r| r.0)
    }

    /// First row by primary-key order; `record-not-found` when absent.
    pub fn first<T: Record>(&self, record: &mut T) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.stmt.add_clause(OrderBy {
            columns: vec![OrderByColumn {
                column: Column::primary(),
                desc: false,
                reorder: false,
            }],
            expression: None,
        });
        db.stmt.add_clause(Limit {
            limit: Some(1),
            offset: None,
        });
        db.stmt.raise_error_on_not_found = true;
        db.execute(Op::Query, Dest::Record(record)).map(|r| r.0)
    }

    /// Last row by primary-key order; `record-not-found` when absent.
    pub fn last<T: Record>(&self, record: &mut T) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.stmt.add_clause(OrderBy {
            columns: vec![OrderByColumn {
                column: Column::primary(),
                desc: true,
                reorder: false,
            }],
            expression: None,
        });
        db.stmt.add_clause(Limit {
            limit: Some(1),
            offset: None,
        });
        db.stmt.raise_error_on_not_found = true;
        db.execute(Op::Query, Dest::Record(record)).map(|r| r.0)
    }

    /// One row without imposing an order.
    pub fn take<T: Record>(&self, record: &mut T) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.stmt.add_clause(Limit {
            limit: Some(1),
            offset: None,
        });
        db.stmt.raise_error_on_not_found = true;
        db.execute(Op::Query, Dest::Record(record)).map(|r| r.0)
    }

    /// Scan the first row into a column/value map.
    pub fn scan_map(&self, map: &mut Map) -> Result<Execution> {
        self.instance().execute(Op::Query, Dest::Map(map)).map(|r| r.0)
    }

    pub fn scan_maps(&self, maps: &mut Vec<Map>) -> Result<Execution> {
        self.instance().execute(Op::Query, Dest::Maps(maps)).map(|r| r.0)
    }

    /// Scan the first column of the first row.
    pub fn scan_value(&self, value: &mut Value) -> Result<Execution> {
        self.instance()
            .execute(Op::Query, Dest::Value(value))
            .map(|r| r.0)
    }

    /// Update a single column. Requires a WHERE clause or the global flag.
    pub fn update(&self, column: &str, value: impl Into<Value>) -> Result<Execution> {
        let mut values = Map::new();
        values.insert(column.to_owned(), value.into());
        self.updates(values)
    }

    /// Update from a column/value map.
    pub fn updates(&self, values: Map) -> Result<Execution> {
        self.instance()
            .execute(Op::Update, Dest::OwnedMap(values))
            .map(|r| r.0)
    }

    /// Update from a record's non-zero fields; its primary narrows the
    /// statement.
    pub fn updates_record<T: Record>(&self, record: &mut T) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Update, Dest::Record(record)).map(|r| r.0)
    }

    /// Delete rows matched by the accumulated conditions.
    pub fn delete<T: Record>(&self) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Delete, Dest::None).map(|r| r.0)
    }

    /// Delete the given record by its identity.
    pub fn delete_record<T: Record>(&self, record: &mut T) -> Result<Execution> {
        let mut db = self.instance();
        db.ensure_schema::<T>();
        db.execute(Op::Delete, Dest::Record(record)).map(|r| r.0)
    }

    /// Run the row chain and hand back the raw cursor.
    pub fn rows(&self) -> Result<Box<dyn Rows>> {
        let (_, rows) = self.instance().execute(Op::Row, Dest::None)?;
        rows.ok_or_else(|| Error::invalid_db("row query produced no cursor"))
    }

    /// Execute raw SQL through the raw chain.
    pub fn exec(&self, sql: &str, args: Vec<Value>) -> Result<Execution> {
        self.raw(sql, args)
            .instance()
            .execute(Op::Raw, Dest::None)
            .map(|r| r.0)
    }

    /// Execute raw SQL with `@name` parameters through the raw chain.
    pub fn exec_named(&self, sql: &str, names: Map) -> Result<Execution> {
        self.raw_named(sql, names)
            .instance()
            .execute(Op::Raw, Dest::None)
            .map(|r| r.0)
    }

    /// Run one operation's callback chain to completion.
    fn execute(mut self, op: Op, dest: Dest<'_>) -> Result<(Execution, Option<Box<dyn Rows>>)> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }

        let (stages, clauses, cb_config) = {
            let callbacks = self
                .shared
                .callbacks
                .read()
                .expect("callback registry poisoned");
            let processor = callbacks.processor(op);
            (
                processor.compiled()?,
                processor.clauses.clone(),
                callbacks.config,
            )
        };

        self.stmt.build_clauses = clauses;

        let shared = self.shared.clone();
        let config = self.config.clone();
        let mut cx = Exec {
            shared: &shared,
            config: &config,
            stmt: &mut self.stmt,
            dest,
            op,
            error: None,
            rows_affected: 0,
            rows_out: None,
            cb_config,
        };

        for (guard, handler) in stages {
            if let Some(guard) = guard {
                if !guard(&cx) {
                    continue;
                }
            }
            handler(&mut cx);
        }
        cx.collect_stmt_errors();

        let error = cx.error.take();
        let rows_affected = cx.rows_affected;
        let rows_out = cx.rows_out.take();

        match error {
            Some(err) => Err(err),
            None => Ok((
                Execution {
                    rows_affected,
                    sql: self.stmt.sql.clone(),
                    vars: self.stmt.vars.clone(),
                },
                rows_out,
            )),
        }
    }
}

impl Clone for Db {
    fn clone(&self) -> Self {
        Db {
            shared: self.shared.clone(),
            config: self.config.clone(),
            stmt: self.stmt.clone(),
            clone_mode: self.clone_mode,
            error: self.error.clone(),
        }
    }
}

impl Db {
    /// Surface an error recorded by the fluent chain without running an
    /// operation.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}
