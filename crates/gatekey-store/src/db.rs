//! The record store engine and its connection handles
//!
//! One [`Engine`] holds everything that varies per deployment: the dialect,
//! the clock used for `created_at`, the error hook, and the statement
//! observer. [`Db`], [`Tx`] and [`Rx`] differ only in which connection the
//! engine's statements run on.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use gatekey_core::types::StoreConfig;
use gatekey_core::KeyHash;
use sea_orm::sqlx::sqlite::SqliteJournalMode;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend,
    DbErr, ExecResult, QueryResult, Statement, TransactionTrait, Value,
};
use tokio::sync::Mutex;

use crate::dialect::{dialect_for_driver, Dialect};
use crate::error::{Error, ErrorCode, ErrorHook, Result};
use crate::fields::{
    RecordCreateFields, RecordCreatedAt, RecordEncryptedAccessGrant, RecordEncryptedSecretKey,
    RecordEncryptionKeyHash, RecordExpiresAt, RecordInvalidAt, RecordInvalidReason,
    RecordMacaroonHead, RecordPublic, RecordSatelliteAddress, RecordUpdateFields,
};
use crate::observer::{StatementObserver, TracingStatementObserver};
use crate::record::{NewRecord, Record, RECORD_COLUMNS};
use crate::sqlbundle::{render_and_rebind, RenderOptions, Sql};

/// Source of the current instant for `created_at`
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Operations every store handle supports
///
/// Implemented by [`Db`] (autocommit), [`Tx`] (explicit transaction) and
/// [`Rx`] (transaction opened on first use), so call sites can be written
/// once against the trait.
pub trait RecordStore: Send + Sync {
    /// Insert a new record. `created_at` is always assigned by the store.
    fn create(
        &self,
        record: &NewRecord,
        optional: &RecordCreateFields,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Look up a record. A missing row is `Ok(None)`.
    fn find_by_key_hash(
        &self,
        key_hash: &KeyHash,
    ) -> impl Future<Output = Result<Option<Record>>> + Send;

    /// Mark a valid record invalid
    ///
    /// Succeeds without effect when the record is already invalid or absent.
    /// Use [`RecordStore::invalidate_by_key_hash_count`] to tell those apart.
    fn invalidate_by_key_hash(
        &self,
        key_hash: &KeyHash,
        update: &RecordUpdateFields,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.invalidate_by_key_hash_count(key_hash, update)
                .await
                .map(|_| ())
        }
    }

    /// Mark a valid record invalid and report how many rows changed (0 or 1)
    fn invalidate_by_key_hash_count(
        &self,
        key_hash: &KeyHash,
        update: &RecordUpdateFields,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Physically delete a record. `false` when nothing matched.
    fn delete_by_key_hash(&self, key_hash: &KeyHash) -> impl Future<Output = Result<bool>> + Send;

    /// Delete every record, returning the count
    fn delete_all(&self) -> impl Future<Output = Result<u64>> + Send;
}

/// Construction-time collaborators for a [`Db`]
#[derive(Clone)]
pub struct StoreOptions {
    clock: Clock,
    error_hook: Option<ErrorHook>,
    observer: Arc<dyn StatementObserver>,
    max_connections: Option<u32>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(Utc::now),
            error_hook: None,
            observer: Arc::new(TracingStatementObserver),
            max_connections: None,
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("error_hook", &self.error_hook.is_some())
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

impl StoreOptions {
    /// Replace the clock used for `created_at`
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Transform every error before it is returned
    pub fn with_error_hook(mut self, hook: impl Fn(Error) -> Error + Send + Sync + 'static) -> Self {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Replace the statement observer
    pub fn with_observer(mut self, observer: impl StatementObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Share an existing statement observer
    pub fn with_shared_observer(mut self, observer: Arc<dyn StatementObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cap the connection pool. Ignored for in-memory SQLite, which is
    /// always a single connection.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }
}

fn apply_hook(hook: &Option<ErrorHook>, err: Error) -> Error {
    match hook {
        Some(hook) => hook(err),
        None => err,
    }
}

/// Collects supplied columns and the values bound for them
#[derive(Default)]
struct Assignments {
    columns: Vec<Option<&'static str>>,
    values: Vec<Value>,
}

impl Assignments {
    fn required(&mut self, column: &'static str, value: Value) {
        self.columns.push(Some(column));
        self.values.push(value);
    }

    fn optional(&mut self, column: &'static str, set: bool, value: Value) {
        if set {
            self.required(column, value);
        } else {
            self.columns.push(None);
        }
    }

    fn names(&self) -> Sql {
        Sql::Literals {
            join: ", ".into(),
            sqls: self.columns.iter().map(|c| c.map(Sql::literal)).collect(),
        }
    }

    fn placeholders(&self) -> Sql {
        Sql::join(", ", vec![Sql::literal("?"); self.values.len()])
    }

    fn set_clause(&self) -> Sql {
        Sql::Literals {
            join: ", ".into(),
            sqls: self
                .columns
                .iter()
                .map(|c| c.map(|column| Sql::literal(format!("{} = ?", column))))
                .collect(),
        }
    }
}

fn key_hash_value(key_hash: &KeyHash) -> Value {
    RecordEncryptionKeyHash::new(key_hash.as_bytes().to_vec()).value()
}

fn insert_sql(assignments: &Assignments) -> Sql {
    Sql::join(
        " ",
        vec![
            Sql::literal("INSERT INTO records ("),
            assignments.names(),
            Sql::literal(") VALUES ("),
            assignments.placeholders(),
            Sql::literal(")"),
        ],
    )
}

fn select_by_key_hash_sql() -> Sql {
    let columns = RECORD_COLUMNS
        .iter()
        .map(|column| Sql::literal(format!("records.{}", column)))
        .collect();
    Sql::join(
        " ",
        vec![
            Sql::literal("SELECT"),
            Sql::join(", ", columns),
            Sql::literal("FROM records WHERE records.encryption_key_hash = ?"),
        ],
    )
}

fn invalidate_sql(assignments: &Assignments) -> Sql {
    let mut set = Sql::hole();
    set.fill(assignments.set_clause());
    Sql::join(
        " ",
        vec![
            Sql::literal("UPDATE records SET"),
            set,
            Sql::literal("WHERE records.encryption_key_hash = ? AND"),
            Sql::Condition {
                left: "records.invalid_reason".into(),
                right: "?".into(),
                equal: true,
                null: true,
            },
        ],
    )
}

/// Statement logic shared by every handle
///
/// Methods return errors without the hook applied; the public handle
/// methods apply it exactly once.
#[derive(Clone)]
struct Engine {
    dialect: Arc<dyn Dialect>,
    clock: Clock,
    error_hook: Option<ErrorHook>,
    observer: Arc<dyn StatementObserver>,
}

impl Engine {
    fn finish(&self, err: Error) -> Error {
        apply_hook(&self.error_hook, err)
    }

    /// Current instant at the microsecond precision every backend keeps
    fn now(&self) -> DateTime<Utc> {
        (self.clock)().trunc_subsecs(6)
    }

    fn classify(&self, err: DbErr) -> Error {
        match self.dialect.classify_constraint(&err) {
            Some(constraint) => Error::constraint_violation(constraint, err),
            None => Error::unknown(err),
        }
    }

    fn statement(&self, operation: &str, sql: &Sql, values: Vec<Value>) -> Statement {
        let sql = render_and_rebind(self.dialect.as_ref(), sql, RenderOptions::default());
        self.observer.on_statement(operation, &sql, &values);
        Statement::from_sql_and_values(self.dialect.backend(), sql, values)
    }

    async fn execute<C: ConnectionTrait>(
        &self,
        conn: &C,
        operation: &str,
        sql: &Sql,
        values: Vec<Value>,
    ) -> Result<ExecResult> {
        conn.execute(self.statement(operation, sql, values))
            .await
            .map_err(|err| self.classify(err))
    }

    async fn query<C: ConnectionTrait>(
        &self,
        conn: &C,
        operation: &str,
        sql: &Sql,
        values: Vec<Value>,
    ) -> Result<Vec<QueryResult>> {
        conn.query_all(self.statement(operation, sql, values))
            .await
            .map_err(|err| self.classify(err))
    }

    async fn create<C: ConnectionTrait>(
        &self,
        conn: &C,
        record: &NewRecord,
        optional: &RecordCreateFields,
    ) -> Result<()> {
        let mut row = Assignments::default();
        row.required(RecordEncryptionKeyHash::COLUMN, key_hash_value(&record.key_hash));
        row.required(RecordCreatedAt::COLUMN, RecordCreatedAt::new(self.now()).value());
        row.required(RecordPublic::COLUMN, RecordPublic::new(record.public).value());
        row.required(
            RecordSatelliteAddress::COLUMN,
            RecordSatelliteAddress::new(record.satellite_address.clone()).value(),
        );
        row.required(
            RecordMacaroonHead::COLUMN,
            RecordMacaroonHead::new(record.macaroon_head.clone()).value(),
        );
        row.optional(
            RecordExpiresAt::COLUMN,
            optional.expires_at.is_set(),
            optional.expires_at.value(),
        );
        row.required(
            RecordEncryptedSecretKey::COLUMN,
            RecordEncryptedSecretKey::new(record.encrypted_secret_key.clone()).value(),
        );
        row.required(
            RecordEncryptedAccessGrant::COLUMN,
            RecordEncryptedAccessGrant::new(record.encrypted_access_grant.clone()).value(),
        );
        row.optional(
            RecordInvalidReason::COLUMN,
            optional.invalid_reason.is_set(),
            optional.invalid_reason.value(),
        );
        row.optional(
            RecordInvalidAt::COLUMN,
            optional.invalid_at.is_set(),
            optional.invalid_at.value(),
        );

        let sql = insert_sql(&row);
        self.execute(conn, "create", &sql, row.values).await?;
        Ok(())
    }

    /// Read exactly one row. Missing is `NoRows`, several is `TooManyRows`.
    async fn get_by_key_hash<C: ConnectionTrait>(
        &self,
        conn: &C,
        key_hash: &KeyHash,
    ) -> Result<Record> {
        let rows = self
            .query(
                conn,
                "find_by_key_hash",
                &select_by_key_hash_sql(),
                vec![key_hash_value(key_hash)],
            )
            .await?;

        match rows.as_slice() {
            [] => Err(Error::no_rows()),
            [row] => Record::from_row(row).map_err(Error::unknown),
            _ => Err(Error::too_many_rows("find_by_key_hash")),
        }
    }

    async fn find_by_key_hash<C: ConnectionTrait>(
        &self,
        conn: &C,
        key_hash: &KeyHash,
    ) -> Result<Option<Record>> {
        match self.get_by_key_hash(conn, key_hash).await {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.code() == ErrorCode::NoRows => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn invalidate_by_key_hash<C: ConnectionTrait>(
        &self,
        conn: &C,
        key_hash: &KeyHash,
        update: &RecordUpdateFields,
    ) -> Result<u64> {
        if update.is_empty() {
            return Err(Error::empty_update());
        }

        let mut set = Assignments::default();
        set.optional(
            RecordInvalidReason::COLUMN,
            update.invalid_reason.is_set(),
            update.invalid_reason.value(),
        );
        set.optional(
            RecordInvalidAt::COLUMN,
            update.invalid_at.is_set(),
            update.invalid_at.value(),
        );

        let sql = invalidate_sql(&set);
        let mut values = set.values;
        values.push(key_hash_value(key_hash));

        let result = self
            .execute(conn, "invalidate_by_key_hash", &sql, values)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_key_hash<C: ConnectionTrait>(
        &self,
        conn: &C,
        key_hash: &KeyHash,
    ) -> Result<bool> {
        let sql = Sql::literal("DELETE FROM records WHERE records.encryption_key_hash = ?");
        let result = self
            .execute(conn, "delete_by_key_hash", &sql, vec![key_hash_value(key_hash)])
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all<C: ConnectionTrait>(&self, conn: &C) -> Result<u64> {
        let result = self
            .execute(conn, "delete_all", &Sql::literal("DELETE FROM records"), Vec::new())
            .await?;
        Ok(result.rows_affected())
    }
}

fn is_sqlite_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn connection_url(dialect: &dyn Dialect, source: &str) -> String {
    match dialect.backend() {
        DbBackend::Sqlite => {
            let url = if source.starts_with("sqlite:") {
                source.to_string()
            } else {
                format!("sqlite:{}", source)
            };
            if url.contains('?') || is_sqlite_memory(&url) {
                url
            } else {
                format!("{}?mode=rwc", url)
            }
        }
        _ => source.to_string(),
    }
}

/// A pooled connection to the record store
#[derive(Clone)]
pub struct Db {
    conn: DatabaseConnection,
    engine: Engine,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.engine.dialect.name())
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Connect with default collaborators
    pub async fn open(driver: &str, source: &str) -> Result<Self> {
        Self::open_with(driver, source, StoreOptions::default()).await
    }

    /// Connect using a store configuration section
    pub async fn from_config(config: &StoreConfig, options: StoreOptions) -> Result<Self> {
        let options = options.with_max_connections(config.max_connections);
        Self::open_with(&config.driver, &config.connection_string, options).await
    }

    /// Connect, then ping to confirm the backend is reachable
    pub async fn open_with(driver: &str, source: &str, options: StoreOptions) -> Result<Self> {
        let dialect = dialect_for_driver(driver).map_err(|err| apply_hook(&options.error_hook, err))?;

        let url = connection_url(dialect.as_ref(), source);
        let mut connect = ConnectOptions::new(url.clone());
        connect.sqlx_logging(false);
        if dialect.backend() == DbBackend::Sqlite && is_sqlite_memory(&url) {
            // every pooled connection would otherwise see its own database
            connect.max_connections(1).min_connections(1);
        } else {
            if dialect.backend() == DbBackend::Sqlite {
                // applied to every pooled connection as it is opened
                connect.map_sqlx_sqlite_opts(|opts| {
                    opts.foreign_keys(true).journal_mode(SqliteJournalMode::Wal)
                });
            }
            if let Some(max_connections) = options.max_connections {
                connect.max_connections(max_connections);
            }
        }

        let engine = Engine {
            dialect,
            clock: options.clock,
            error_hook: options.error_hook,
            observer: options.observer,
        };

        let conn = Database::connect(connect)
            .await
            .map_err(|err| engine.finish(Error::unknown(err).with_context("open")))?;

        let db = Self { conn, engine };
        db.ping().await?;
        tracing::debug!(driver = db.engine.dialect.name(), "record store opened");
        Ok(db)
    }

    /// The active dialect
    pub fn dialect(&self) -> &dyn Dialect {
        self.engine.dialect.as_ref()
    }

    /// DDL for the `records` table
    pub fn schema(&self) -> &'static str {
        self.engine.dialect.schema()
    }

    /// Rewrite `?` placeholders for this backend
    pub fn rebind(&self, sql: &str) -> String {
        self.engine.dialect.rebind(sql)
    }

    /// Create the `records` table if it does not exist
    pub async fn migrate(&self) -> Result<()> {
        let schema = self.schema();
        self.engine.observer.on_statement("migrate", schema, &[]);
        self.conn
            .execute_unprepared(schema)
            .await
            .map_err(|err| self.engine.finish(self.engine.classify(err).with_context("migrate")))?;
        tracing::info!(driver = self.engine.dialect.name(), "records schema applied");
        Ok(())
    }

    /// Current value of a SQLite pragma
    #[cfg(test)]
    async fn pragma(&self, name: &str) -> Result<String> {
        let row = self
            .conn
            .query_one(Statement::from_string(DbBackend::Sqlite, format!("PRAGMA {}", name)))
            .await
            .map_err(Error::unknown)?
            .ok_or_else(|| Error::unknown(format!("PRAGMA {} returned no row", name)))?;
        let value = row.try_get_by_index::<String>(0);
        value.or_else(|_| row.try_get_by_index::<i64>(0).map(|v| v.to_string())).map_err(Error::unknown)
    }

    /// Health check
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|err| self.engine.finish(Error::unknown(err).with_context("ping")))?;
        Ok(())
    }

    /// Close the pool. Outstanding clones stop working.
    pub async fn close(self) -> Result<()> {
        let Self { conn, engine } = self;
        conn.close()
            .await
            .map_err(|err| engine.finish(Error::unknown(err).with_context("close")))?;
        tracing::debug!("record store closed");
        Ok(())
    }

    async fn begin(&self) -> Result<Tx> {
        let txn = self
            .conn
            .begin()
            .await
            .map_err(|err| Error::unknown(err).with_context("begin"))?;
        Ok(Tx {
            txn,
            engine: self.engine.clone(),
        })
    }

    /// Begin an explicit transaction
    ///
    /// Dropping the [`Tx`] without committing rolls it back.
    pub async fn open_tx(&self) -> Result<Tx> {
        self.begin().await.map_err(|err| self.engine.finish(err))
    }

    /// A handle that opens its transaction on first use
    pub fn rx(&self) -> Rx {
        Rx {
            db: self.clone(),
            state: Mutex::new(RxState::NotStarted),
        }
    }
}

impl RecordStore for Db {
    async fn create(&self, record: &NewRecord, optional: &RecordCreateFields) -> Result<()> {
        self.engine
            .create(&self.conn, record, optional)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    async fn find_by_key_hash(&self, key_hash: &KeyHash) -> Result<Option<Record>> {
        self.engine
            .find_by_key_hash(&self.conn, key_hash)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    async fn invalidate_by_key_hash_count(
        &self,
        key_hash: &KeyHash,
        update: &RecordUpdateFields,
    ) -> Result<u64> {
        self.engine
            .invalidate_by_key_hash(&self.conn, key_hash, update)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    async fn delete_by_key_hash(&self, key_hash: &KeyHash) -> Result<bool> {
        self.engine
            .delete_by_key_hash(&self.conn, key_hash)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    /// Runs in its own transaction. A failed rollback is reported to the
    /// observer and the original error is returned.
    async fn delete_all(&self) -> Result<u64> {
        let tx = self.begin().await.map_err(|err| self.engine.finish(err))?;

        match self.engine.delete_all(&tx.txn).await {
            Ok(count) => {
                tx.commit().await?;
                tracing::info!(count, "deleted all records");
                Ok(count)
            }
            Err(err) => {
                if let Err(rollback) = tx.txn.rollback().await {
                    self.engine.observer.on_rollback_failed("delete_all", &rollback);
                }
                Err(self.engine.finish(err))
            }
        }
    }
}

/// An explicit transaction
pub struct Tx {
    txn: DatabaseTransaction,
    engine: Engine,
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("dialect", &self.engine.dialect.name())
            .finish_non_exhaustive()
    }
}

impl Tx {
    /// Commit every statement run on this transaction
    pub async fn commit(self) -> Result<()> {
        let Self { txn, engine } = self;
        txn.commit()
            .await
            .map_err(|err| engine.finish(Error::unknown(err).with_context("commit")))
    }

    /// Discard every statement run on this transaction
    pub async fn rollback(self) -> Result<()> {
        let Self { txn, engine } = self;
        txn.rollback()
            .await
            .map_err(|err| engine.finish(Error::unknown(err).with_context("rollback")))
    }
}

impl RecordStore for Tx {
    async fn create(&self, record: &NewRecord, optional: &RecordCreateFields) -> Result<()> {
        self.engine
            .create(&self.txn, record, optional)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    async fn find_by_key_hash(&self, key_hash: &KeyHash) -> Result<Option<Record>> {
        self.engine
            .find_by_key_hash(&self.txn, key_hash)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    async fn invalidate_by_key_hash_count(
        &self,
        key_hash: &KeyHash,
        update: &RecordUpdateFields,
    ) -> Result<u64> {
        self.engine
            .invalidate_by_key_hash(&self.txn, key_hash, update)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    async fn delete_by_key_hash(&self, key_hash: &KeyHash) -> Result<bool> {
        self.engine
            .delete_by_key_hash(&self.txn, key_hash)
            .await
            .map_err(|err| self.engine.finish(err))
    }

    /// Deletes within this transaction; nothing is final until commit
    async fn delete_all(&self) -> Result<u64> {
        self.engine
            .delete_all(&self.txn)
            .await
            .map_err(|err| self.engine.finish(err))
    }
}

#[derive(Debug)]
enum RxState {
    NotStarted,
    Open(Tx),
    Committed,
    RolledBack,
}

/// A transaction opened lazily by the first operation
///
/// States move `NotStarted -> Open -> Committed | RolledBack`. Committing or
/// rolling back before any operation ran just ends the handle. Anything
/// after the handle has ended fails with `TransactionAlreadyDone`.
#[derive(Debug)]
pub struct Rx {
    db: Db,
    state: Mutex<RxState>,
}

impl Rx {
    fn already_done(&self) -> Error {
        self.db.engine.finish(Error::transaction_already_done())
    }

    async fn open<'a>(&self, state: &'a mut RxState) -> Result<&'a Tx> {
        if matches!(state, RxState::NotStarted) {
            *state = RxState::Open(self.db.open_tx().await?);
        }
        match &*state {
            RxState::Open(tx) => Ok(tx),
            _ => Err(self.already_done()),
        }
    }

    /// Whether the handle has committed or rolled back
    pub async fn is_done(&self) -> bool {
        matches!(
            *self.state.lock().await,
            RxState::Committed | RxState::RolledBack
        )
    }

    /// Commit the open transaction, if one was started
    pub async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, RxState::Committed) {
            RxState::NotStarted => Ok(()),
            RxState::Open(tx) => tx.commit().await,
            done => {
                *state = done;
                Err(self.already_done())
            }
        }
    }

    /// Roll back the open transaction, if one was started
    pub async fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, RxState::RolledBack) {
            RxState::NotStarted => Ok(()),
            RxState::Open(tx) => tx.rollback().await,
            done => {
                *state = done;
                Err(self.already_done())
            }
        }
    }
}

impl RecordStore for Rx {
    async fn create(&self, record: &NewRecord, optional: &RecordCreateFields) -> Result<()> {
        let mut state = self.state.lock().await;
        self.open(&mut state).await?.create(record, optional).await
    }

    async fn find_by_key_hash(&self, key_hash: &KeyHash) -> Result<Option<Record>> {
        let mut state = self.state.lock().await;
        self.open(&mut state).await?.find_by_key_hash(key_hash).await
    }

    async fn invalidate_by_key_hash_count(
        &self,
        key_hash: &KeyHash,
        update: &RecordUpdateFields,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        self.open(&mut state)
            .await?
            .invalidate_by_key_hash_count(key_hash, update)
            .await
    }

    async fn delete_by_key_hash(&self, key_hash: &KeyHash) -> Result<bool> {
        let mut state = self.state.lock().await;
        self.open(&mut state).await?.delete_by_key_hash(key_hash).await
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        self.open(&mut state).await?.delete_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, Sqlite3};

    fn render(dialect: &dyn Dialect, sql: &Sql) -> String {
        render_and_rebind(dialect, sql, RenderOptions::default())
    }

    #[tokio::test]
    async fn test_file_sqlite_uses_wal_and_foreign_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("records.db").to_string_lossy().to_string();

        let db = Db::open("sqlite3", &source).await.unwrap();
        assert_eq!(db.pragma("journal_mode").await.unwrap().to_lowercase(), "wal");
        assert_eq!(db.pragma("foreign_keys").await.unwrap(), "1");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_sqlite_keeps_memory_journal() {
        let db = Db::open("sqlite3", ":memory:").await.unwrap();
        assert_eq!(db.pragma("journal_mode").await.unwrap().to_lowercase(), "memory");
        db.close().await.unwrap();
    }

    #[test]
    fn test_insert_skips_unset_optional_columns() {
        let mut row = Assignments::default();
        row.required("encryption_key_hash", Value::from(vec![1u8]));
        row.optional("expires_at", false, Value::String(None));
        row.required("public", Value::from(true));
        row.optional("invalid_reason", true, Value::from("x".to_string()));

        assert_eq!(
            render(&Postgres, &insert_sql(&row)),
            "INSERT INTO records ( encryption_key_hash, public, invalid_reason ) VALUES ( $1, $2, $3 );"
        );
        assert_eq!(row.values.len(), 3);
    }

    #[test]
    fn test_invalidate_is_guarded_by_null_reason() {
        let mut set = Assignments::default();
        set.optional("invalid_reason", true, Value::from("revoked".to_string()));
        set.optional("invalid_at", false, Value::String(None));

        assert_eq!(
            render(&Sqlite3, &invalidate_sql(&set)),
            "UPDATE records SET invalid_reason = ? \
             WHERE records.encryption_key_hash = ? AND records.invalid_reason is null;"
        );
        assert_eq!(
            render(&Postgres, &invalidate_sql(&set)),
            "UPDATE records SET invalid_reason = $1 \
             WHERE records.encryption_key_hash = $2 AND records.invalid_reason is null;"
        );
    }

    #[test]
    fn test_select_names_every_column() {
        let sql = render(&Sqlite3, &select_by_key_hash_sql());
        assert!(sql.starts_with("SELECT records.encryption_key_hash, records.created_at,"));
        assert!(sql.ends_with("FROM records WHERE records.encryption_key_hash = ?;"));
        for column in RECORD_COLUMNS {
            assert!(sql.contains(&format!("records.{}", column)));
        }
    }

    #[test]
    fn test_sqlite_connection_urls() {
        assert_eq!(connection_url(&Sqlite3, "sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            connection_url(&Sqlite3, "/var/lib/gatekey/records.db"),
            "sqlite:/var/lib/gatekey/records.db?mode=rwc"
        );
        assert_eq!(
            connection_url(&Sqlite3, "sqlite:records.db?mode=ro"),
            "sqlite:records.db?mode=ro"
        );
        assert_eq!(
            connection_url(&Postgres, "postgres://localhost/gatekey"),
            "postgres://localhost/gatekey"
        );
    }
}
