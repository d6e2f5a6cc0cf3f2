mod associations;
mod create;
mod delete;
mod query;
mod row;
mod transaction;
mod update;

use crate::db::{Config as DbConfig, Db, DbShared};
use crate::driver::{Conn, Rows};
use crate::statement::Statement;
use crate::{Error, Result, Value};

use loam_core::schema::{HookContext, HookFlags, Record, RecordList};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// String-keyed destination for map-shaped reads and writes. Ordered so
/// that generated column lists are deterministic.
pub type Map = BTreeMap<String, Value>;

/// The six operation kinds, each with an independent callback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Query,
    Update,
    Delete,
    Row,
    Raw,
}

/// The destination (or value source) of the running operation.
pub enum Dest<'a> {
    None,
    Record(&'a mut dyn Record),
    Records(&'a mut dyn RecordList),
    Map(&'a mut Map),
    Maps(&'a mut Vec<Map>),
    Value(&'a mut Value),
    /// Update values assembled by the fluent API.
    OwnedMap(Map),
}

/// Per-operation execution context threaded through the callback chain.
/// Stages record failures here; later stages short-circuit on a recorded
/// error (the transaction bookend still runs, to roll back).
pub struct Exec<'a, 'b> {
    pub(crate) shared: &'a Arc<DbShared>,
    pub(crate) config: &'a DbConfig,
    pub stmt: &'a mut Statement,
    pub dest: Dest<'b>,
    pub op: Op,
    pub error: Option<Error>,
    pub rows_affected: u64,
    pub rows_out: Option<Box<dyn Rows>>,
    pub(crate) cb_config: CallbacksConfig,
}

impl Exec<'_, '_> {
    pub fn add_error(&mut self, err: Error) {
        let err = if self.config.translate_error {
            self.shared.dialect.translate_error(err)
        } else {
            err
        };
        tracing::debug!(error = %err, "recording operation error");

        self.error = Some(match self.error.take() {
            None => err,
            Some(prev) => prev.context(err),
        });
    }

    /// Fold errors recorded by clause emission into the operation error.
    pub(crate) fn collect_stmt_errors(&mut self) {
        let errors: Vec<Error> = self.stmt.errors.drain(..).collect();
        for err in errors {
            self.add_error(err);
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.config.now)()
    }

    /// The connection a statement outside any transaction runs on.
    pub(crate) fn base_conn(&self) -> Conn {
        if self.config.prepare_stmt {
            Conn::Pool(self.shared.prepared.clone())
        } else {
            Conn::Pool(self.shared.pool.clone())
        }
    }
}

pub type CallbackFn = fn(&mut Exec<'_, '_>);
pub type GuardFn = fn(&Exec<'_, '_>) -> bool;

/// Dialect-supplied pipeline configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbacksConfig {
    /// The driver reports the last row's id for batch inserts; distribute
    /// backwards.
    pub last_insert_id_reversed: bool,
}

struct Callback {
    name: String,
    handler: Option<CallbackFn>,
    guard: Option<GuardFn>,
    before: Option<String>,
    after: Option<String>,
}

/// One operation's ordered stage list.
#[derive(Default)]
pub struct Processor {
    pub clauses: Vec<&'static str>,
    callbacks: Vec<Callback>,
    /// Registration problems surface at first use, not at install time.
    reg_error: Option<Error>,
}

impl Processor {
    fn register(&mut self, callback: Callback) {
        if let Some(existing) = self
            .callbacks
            .iter_mut()
            .find(|existing| existing.name == callback.name)
        {
            *existing = callback;
            return;
        }
        self.callbacks.push(callback);
    }

    fn remove(&mut self, name: &str) {
        self.callbacks.retain(|callback| callback.name != name);
    }

    /// Snapshot the chain in topological order.
    pub(crate) fn compiled(&self) -> Result<Vec<(Option<GuardFn>, CallbackFn)>> {
        if let Some(err) = &self.reg_error {
            return Err(err.clone());
        }

        let mut order: Vec<usize> = (0..self.callbacks.len()).collect();

        let position = |order: &[usize], callbacks: &[Callback], name: &str| {
            order
                .iter()
                .position(|&idx| callbacks[idx].name == name)
        };

        for idx in 0..self.callbacks.len() {
            if let Some(target) = &self.callbacks[idx].before {
                let from = position(&order, &self.callbacks, &self.callbacks[idx].name)
                    .expect("registered callback is in the order");
                let Some(to) = position(&order, &self.callbacks, target) else {
                    return Err(Error::invalid_db(format!(
                        "callback {} requires {}, which is not registered",
                        self.callbacks[idx].name, target
                    )));
                };
                if from > to {
                    let moved = order.remove(from);
                    order.insert(to, moved);
                }
            }

            if let Some(target) = &self.callbacks[idx].after {
                let from = position(&order, &self.callbacks, &self.callbacks[idx].name)
                    .expect("registered callback is in the order");
                let Some(to) = position(&order, &self.callbacks, target) else {
                    return Err(Error::invalid_db(format!(
                        "callback {} requires {}, which is not registered",
                        self.callbacks[idx].name, target
                    )));
                };
                if from < to {
                    let moved = order.remove(from);
                    order.insert(to, moved);
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|idx| {
                let callback = &self.callbacks[idx];
                callback
                    .handler
                    .map(|handler| (callback.guard, handler))
            })
            .collect())
    }
}

/// All six chains plus the dialect configuration.
#[derive(Default)]
pub struct Callbacks {
    pub config: CallbacksConfig,
    create: Processor,
    query: Processor,
    update: Processor,
    delete: Processor,
    row: Processor,
    raw: Processor,
}

impl Callbacks {
    pub(crate) fn processor(&self, op: Op) -> &Processor {
        match op {
            Op::Create => &self.create,
            Op::Query => &self.query,
            Op::Update => &self.update,
            Op::Delete => &self.delete,
            Op::Row => &self.row,
            Op::Raw => &self.raw,
        }
    }

    fn processor_mut(&mut self, op: Op) -> &mut Processor {
        match op {
            Op::Create => &mut self.create,
            Op::Query => &mut self.query,
            Op::Update => &mut self.update,
            Op::Delete => &mut self.delete,
            Op::Row => &mut self.row,
            Op::Raw => &mut self.raw,
        }
    }
}

/// Registration facade: `db.callback().create().register(...)`.
pub struct CallbackRegistry<'a> {
    pub(crate) shared: &'a Arc<DbShared>,
}

impl<'a> CallbackRegistry<'a> {
    pub fn create(&self) -> ProcessorHandle<'a> {
        self.handle(Op::Create)
    }

    pub fn query(&self) -> ProcessorHandle<'a> {
        self.handle(Op::Query)
    }

    pub fn update(&self) -> ProcessorHandle<'a> {
        self.handle(Op::Update)
    }

    pub fn delete(&self) -> ProcessorHandle<'a> {
        self.handle(Op::Delete)
    }

    pub fn row(&self) -> ProcessorHandle<'a> {
        self.handle(Op::Row)
    }

    pub fn raw(&self) -> ProcessorHandle<'a> {
        self.handle(Op::Raw)
    }

    fn handle(&self, op: Op) -> ProcessorHandle<'a> {
        ProcessorHandle {
            shared: self.shared,
            op,
            guard: None,
        }
    }
}

/// Handle to one chain; `guarded` scopes a predicate onto the next
/// registration.
pub struct ProcessorHandle<'a> {
    shared: &'a Arc<DbShared>,
    op: Op,
    guard: Option<GuardFn>,
}

impl ProcessorHandle<'_> {
    fn with_processor(&self, f: impl FnOnce(&mut Processor)) {
        let mut callbacks = self
            .shared
            .callbacks
            .write()
            .expect("callback registry poisoned");
        f(callbacks.processor_mut(self.op));
    }

    pub fn guarded(mut self, guard: GuardFn) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn register(&self, name: &str, handler: CallbackFn) -> &Self {
        self.with_processor(|processor| {
            processor.register(Callback {
                name: name.to_owned(),
                handler: Some(handler),
                guard: self.guard,
                before: None,
                after: None,
            })
        });
        self
    }

    pub fn register_before(&self, name: &str, target: &str, handler: CallbackFn) -> &Self {
        self.with_processor(|processor| {
            processor.register(Callback {
                name: name.to_owned(),
                handler: Some(handler),
                guard: self.guard,
                before: Some(target.to_owned()),
                after: None,
            })
        });
        self
    }

    pub fn register_after(&self, name: &str, target: &str, handler: CallbackFn) -> &Self {
        self.with_processor(|processor| {
            processor.register(Callback {
                name: name.to_owned(),
                handler: Some(handler),
                guard: self.guard,
                before: None,
                after: Some(target.to_owned()),
            })
        });
        self
    }

    /// Swap the handler of an existing stage, keeping its position.
    pub fn replace(&self, name: &str, handler: CallbackFn) -> &Self {
        self.register(name, handler)
    }

    pub fn remove(&self, name: &str) -> &Self {
        self.with_processor(|processor| processor.remove(name));
        self
    }

    pub fn set_clauses(&self, clauses: Vec<&'static str>) -> &Self {
        self.with_processor(|processor| processor.clauses = clauses);
        self
    }
}

/// Dialect-facing pipeline configuration, passed to
/// [`register_default_callbacks`] from `Dialect::initialize`.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub last_insert_id_reversed: bool,
    pub create_clauses: Vec<&'static str>,
    pub query_clauses: Vec<&'static str>,
    pub update_clauses: Vec<&'static str>,
    pub delete_clauses: Vec<&'static str>,
}

fn with_transaction(cx: &Exec<'_, '_>) -> bool {
    !cx.config.skip_default_transaction
}

/// Install the default composition of every chain.
pub fn register_default_callbacks(db: &Db, config: Config) {
    let create_clauses = non_empty(config.create_clauses, &["INSERT", "VALUES", "ON CONFLICT"]);
    let query_clauses = non_empty(
        config.query_clauses,
        &["SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "LIMIT", "FOR"],
    );
    let update_clauses = non_empty(config.update_clauses, &["UPDATE", "SET", "WHERE"]);
    let delete_clauses = non_empty(config.delete_clauses, &["DELETE", "FROM", "WHERE"]);

    {
        let mut callbacks = db.shared().callbacks.write().expect("callback registry poisoned");
        callbacks.config.last_insert_id_reversed = config.last_insert_id_reversed;
    }

    let callback = db.callback();

    let create = callback.create();
    create
        .guarded(with_transaction)
        .register("loam:begin_transaction", transaction::begin_transaction);
    let create = callback.create();
    create
        .register("loam:before_create", create::before_create)
        .register(
            "loam:save_before_associations",
            associations::save_before_associations,
        )
        .register("loam:create", create::create)
        .register(
            "loam:save_after_associations",
            associations::save_after_associations,
        )
        .register("loam:after_create", create::after_create);
    callback
        .create()
        .guarded(with_transaction)
        .register(
            "loam:commit_or_rollback_transaction",
            transaction::commit_or_rollback,
        );
    callback.create().set_clauses(create_clauses);

    let query = callback.query();
    query
        .register("loam:query", query::query)
        .register("loam:after_query", query::after_query)
        .set_clauses(query_clauses.clone());

    callback
        .update()
        .guarded(with_transaction)
        .register("loam:begin_transaction", transaction::begin_transaction);
    callback
        .update()
        .register("loam:before_update", update::before_update)
        .register("loam:update", update::update)
        .register("loam:after_update", update::after_update);
    callback
        .update()
        .guarded(with_transaction)
        .register(
            "loam:commit_or_rollback_transaction",
            transaction::commit_or_rollback,
        );
    callback.update().set_clauses(update_clauses);

    callback
        .delete()
        .guarded(with_transaction)
        .register("loam:begin_transaction", transaction::begin_transaction);
    callback
        .delete()
        .register("loam:before_delete", delete::before_delete)
        .register("loam:delete", delete::delete)
        .register("loam:after_delete", delete::after_delete);
    callback
        .delete()
        .guarded(with_transaction)
        .register(
            "loam:commit_or_rollback_transaction",
            transaction::commit_or_rollback,
        );
    callback.delete().set_clauses(delete_clauses);

    callback
        .row()
        .register("loam:row", row::row_query)
        .set_clauses(query_clauses.clone());

    callback
        .raw()
        .register("loam:raw", row::raw_exec)
        .set_clauses(query_clauses);
}

fn non_empty(
    configured: Vec<&'static str>,
    default: &[&'static str],
) -> Vec<&'static str> {
    if configured.is_empty() {
        default.to_vec()
    } else {
        configured
    }
}

/// One hook point; `enabled` consults the schema flags, `invoke` dispatches
/// to the trait method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    BeforeSave,
    BeforeCreate,
    AfterCreate,
    AfterSave,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterFind,
}

impl HookKind {
    fn enabled(self, flags: HookFlags) -> bool {
        match self {
            Self::BeforeSave => flags.before_save,
            Self::BeforeCreate => flags.before_create,
            Self::AfterCreate => flags.after_create,
            Self::AfterSave => flags.after_save,
            Self::BeforeUpdate => flags.before_update,
            Self::AfterUpdate => flags.after_update,
            Self::BeforeDelete => flags.before_delete,
            Self::AfterDelete => flags.after_delete,
            Self::AfterFind => flags.after_find,
        }
    }

    fn invoke(self, record: &mut dyn Record, cx: &mut HookContext<'_>) -> Result<()> {
        match self {
            Self::BeforeSave => record.before_save(cx),
            Self::BeforeCreate => record.before_create(cx),
            Self::AfterCreate => record.after_create(cx),
            Self::AfterSave => record.after_save(cx),
            Self::BeforeUpdate => record.before_update(cx),
            Self::AfterUpdate => record.after_update(cx),
            Self::BeforeDelete => record.before_delete(cx),
            Self::AfterDelete => record.after_delete(cx),
            Self::AfterFind => record.after_find(cx),
        }
    }
}

/// Run the given hook points over the destination, in declaration order,
/// inside a statement-scoped context. Hook errors are fatal for the
/// operation; staged column assignments apply afterwards.
pub(crate) fn call_hooks(cx: &mut Exec<'_, '_>, kinds: &[HookKind]) {
    if cx.error.is_some() || cx.stmt.skip_hooks {
        return;
    }
    let Some(schema) = cx.stmt.schema.clone() else {
        return;
    };

    let active: Vec<HookKind> = kinds
        .iter()
        .copied()
        .filter(|kind| kind.enabled(schema.hooks))
        .collect();
    if active.is_empty() {
        return;
    }

    let now = cx.now();
    let mut errors: Vec<Error> = Vec::new();
    let set_columns;

    {
        let Exec {
            ref mut stmt,
            ref mut dest,
            ..
        } = *cx;
        let mut hook_cx = HookContext::new(now, &mut stmt.settings);

        let mut run = |record: &mut dyn Record, hook_cx: &mut HookContext<'_>| -> Option<Error> {
            for kind in &active {
                if let Err(err) = kind.invoke(record, hook_cx) {
                    return Some(err);
                }
            }
            None
        };

        match dest {
            Dest::Record(record) => {
                if let Some(err) = run(&mut **record, &mut hook_cx) {
                    errors.push(err);
                }
            }
            Dest::Records(records) => {
                for idx in 0..records.len() {
                    if let Some(err) = run(records.get_mut(idx), &mut hook_cx) {
                        errors.push(err);
                        break;
                    }
                }
            }
            _ => {}
        }

        set_columns = hook_cx.take_set_columns();
    }

    for (name, value) in set_columns {
        match schema.look_up_field(&name) {
            Some(field) => {
                let result = match &mut cx.dest {
                    Dest::Record(record) => field.set(&mut **record, value),
                    Dest::Records(records) => {
                        let mut result = Ok(());
                        for idx in 0..records.len() {
                            result = field.set(records.get_mut(idx), value.clone());
                            if result.is_err() {
                                break;
                            }
                        }
                        result
                    }
                    _ => Ok(()),
                };
                if let Err(err) = result {
                    errors.push(err);
                }
            }
            None => errors.push(Error::invalid_field(name)),
        }
    }

    for err in errors {
        cx.add_error(err);
    }
}
