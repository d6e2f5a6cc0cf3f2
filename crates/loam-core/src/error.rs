use std::sync::Arc;

/// An error that can occur anywhere in loam.
///
/// The type is a single word: the kind and the optional cause live behind a
/// shared allocation so results stay cheap to move through the pipeline.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorInner>,
}

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    cause: Option<Error>,
}

#[derive(Debug)]
enum ErrorKind {
    /// The destination value cannot be used for the requested operation.
    InvalidData(String),
    /// A value could not be converted or assigned.
    InvalidValue(String),
    /// A referenced field does not exist on the schema.
    InvalidField(String),
    /// A record type (or value) the introspector cannot handle.
    UnsupportedDataType(String),
    /// An update or delete without a WHERE clause and without the global flag.
    MissingWhereClause,
    /// A query matched no rows and the statement opted into the error.
    RecordNotFound(String),
    /// The database handle is unusable for the requested operation.
    InvalidDb(String),
    /// A plugin or codec name was registered twice.
    Registered(String),
    /// A create was invoked with an empty slice destination.
    EmptySlice,
    /// A transaction operation on a pool that does not support it, or a
    /// commit/rollback outside a transaction.
    InvalidTransaction(String),
    /// The schema could not be parsed.
    InvalidSchema(String),
    /// Translated driver error: unique constraint violation.
    DuplicatedKey(String),
    /// Translated driver error: foreign key violation.
    ForeignKeyViolated(String),
    /// Translated driver error: check constraint violation.
    CheckConstraintViolated(String),
    /// An untranslated driver-native failure.
    Driver(String),
}

macro_rules! constructors {
    ( $( $(#[$doc:meta])* $name:ident => $variant:ident ),* $(,)? ) => {
        impl Error {
            $(
                $(#[$doc])*
                pub fn $name(msg: impl Into<String>) -> Self {
                    ErrorKind::$variant(msg.into()).into()
                }
            )*
        }
    };
}

constructors! {
    invalid_data => InvalidData,
    invalid_value => InvalidValue,
    invalid_field => InvalidField,
    unsupported_data_type => UnsupportedDataType,
    record_not_found => RecordNotFound,
    invalid_db => InvalidDb,
    registered => Registered,
    invalid_transaction => InvalidTransaction,
    invalid_schema => InvalidSchema,
    duplicated_key => DuplicatedKey,
    foreign_key_violated => ForeignKeyViolated,
    check_constraint_violated => CheckConstraintViolated,
    driver => Driver,
}

impl Error {
    pub fn missing_where_clause() -> Self {
        ErrorKind::MissingWhereClause.into()
    }

    pub fn empty_slice() -> Self {
        ErrorKind::EmptySlice.into()
    }

    /// Adds context to this error.
    ///
    /// Context is displayed first, followed by earlier context, ending with
    /// the root cause.
    pub fn context(self, consequent: Error) -> Error {
        let mut err = consequent;
        let inner = Arc::get_mut(&mut err.inner)
            .expect("consequent error must be uniquely owned");
        assert!(
            inner.cause.is_none(),
            "consequent error must not already have a cause"
        );
        inner.cause = Some(self);
        err
    }

    pub fn is_record_not_found(&self) -> bool {
        self.chain()
            .any(|err| matches!(err.kind(), ErrorKind::RecordNotFound(_)))
    }

    pub fn is_missing_where_clause(&self) -> bool {
        self.chain()
            .any(|err| matches!(err.kind(), ErrorKind::MissingWhereClause))
    }

    pub fn is_duplicated_key(&self) -> bool {
        self.chain()
            .any(|err| matches!(err.kind(), ErrorKind::DuplicatedKey(_)))
    }

    pub fn is_invalid_transaction(&self) -> bool {
        self.chain()
            .any(|err| matches!(err.kind(), ErrorKind::InvalidTransaction(_)))
    }

    fn chain(&self) -> impl Iterator<Item = &Error> {
        let mut err = self;
        core::iter::once(err).chain(core::iter::from_fn(move || {
            err = err.inner.cause.as_ref()?;
            Some(err)
        }))
    }

    fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut it = self.chain().peekable();
        while let Some(err) = it.next() {
            core::fmt::Display::fmt(err.kind(), f)?;
            if it.peek().is_some() {
                f.write_str(": ")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !f.alternate() {
            core::fmt::Display::fmt(self, f)
        } else {
            f.debug_struct("Error")
                .field("kind", &self.inner.kind)
                .field("cause", &self.inner.cause)
                .finish()
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use ErrorKind::*;

        match self {
            InvalidData(msg) => write!(f, "unsupported data: {msg}"),
            InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            InvalidField(msg) => write!(f, "invalid field: {msg}"),
            UnsupportedDataType(msg) => write!(f, "unsupported data type: {msg}"),
            MissingWhereClause => write!(f, "WHERE conditions required"),
            RecordNotFound(msg) => write!(f, "record not found: {msg}"),
            InvalidDb(msg) => write!(f, "invalid db: {msg}"),
            Registered(name) => write!(f, "`{name}` already registered"),
            EmptySlice => write!(f, "empty slice found"),
            InvalidTransaction(msg) => write!(f, "invalid transaction: {msg}"),
            InvalidSchema(msg) => write!(f, "invalid schema: {msg}"),
            DuplicatedKey(msg) => write!(f, "duplicated key: {msg}"),
            ForeignKeyViolated(msg) => write!(f, "violates foreign key constraint: {msg}"),
            CheckConstraintViolated(msg) => write!(f, "violates check constraint: {msg}"),
            Driver(msg) => write!(f, "driver error: {msg}"),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Arc::new(ErrorInner { kind, cause: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_size() {
        // Error stays at one word
        assert_eq!(
            core::mem::size_of::<usize>(),
            core::mem::size_of::<Error>()
        );
    }

    #[test]
    fn chain_display() {
        let err = Error::record_not_found("users")
            .context(Error::invalid_db("first failed"));
        assert_eq!(err.to_string(), "invalid db: first failed: record not found: users");
        assert!(err.is_record_not_found());
    }

    #[test]
    fn missing_where_predicate_survives_chaining() {
        let err = Error::missing_where_clause().context(Error::driver("update aborted"));
        assert!(err.is_missing_where_clause());
        assert!(!err.is_record_not_found());
    }
}
