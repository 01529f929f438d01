//! The capability contract a value must satisfy to flow through a [`Sender`](crate::Sender).

use std::fmt;

use bytes::Bytes;

/// A single positional bind parameter.
///
/// This is the scalar domain common to mainstream SQL driver bind-parameter APIs: enough to
/// cover columnar inserts without tying the core to any one driver's type system.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Error produced while reconstructing a [`Record`] from its marshalled bytes.
///
/// Implementors of [`Record::unmarshal`] can wrap any underlying decode failure (a `serde_json`
/// error, a malformed varint, whatever their own encoding uses) behind this type via [`From`].
#[derive(Debug)]
pub struct RecordDecodeError(Box<dyn std::error::Error + Send + Sync>);

impl RecordDecodeError {
    pub fn new<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(source))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        #[derive(Debug)]
        struct Message(String);
        impl fmt::Display for Message {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
        impl std::error::Error for Message {}
        Self(Box::new(Message(message.into())))
    }
}

impl fmt::Display for RecordDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for RecordDecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// A value that can be pushed through a [`Sender`](crate::Sender).
///
/// A `Record` carries four capabilities: it can serialize itself ([`marshal`](Record::marshal)),
/// deserialize itself in place ([`unmarshal`](Record::unmarshal)), name the statement it batches
/// under ([`statement_key`](Record::statement_key)), and produce the positional parameters to
/// bind when that statement is executed ([`exec_params`](Record::exec_params)).
///
/// For a given concrete type, [`statement_key`](Record::statement_key) must be a pure function of
/// the type, not the instance — the same SQL string, with the same parameter arity, every time.
/// The durable queue and the pool both rely on this to decide that two records belong to the same
/// on-disk file and the same transaction.
///
/// The trait is fully object-safe on purpose: the pool holds heterogeneous record types behind
/// `Box<dyn Record>`, keyed only by the runtime value of `statement_key()`. See
/// [`empty_instance`](Record::empty_instance) for how a fresh instance of the concrete type is
/// obtained without generics or reflection.
pub trait Record: fmt::Debug + Send + Sync {
    /// The parameterised SQL statement this record batches under.
    fn statement_key(&self) -> &str;

    /// The positional parameters to bind when this record's statement is executed.
    fn exec_params(&self) -> Vec<ExecValue>;

    /// Serializes this record to its on-disk / in-memory representation.
    fn marshal(&self) -> Bytes;

    /// Populates `self` from bytes previously produced by [`marshal`](Record::marshal).
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` does not decode to a valid instance of this type.
    fn unmarshal(&mut self, payload: &[u8]) -> Result<(), RecordDecodeError>;

    /// Returns a freshly constructed, still-empty instance of the same concrete type as `self`.
    ///
    /// This is the "type witness" the durable and memory queues use to reconstruct records on
    /// [`Eject`](crate::queue::Backend::eject) without knowing the concrete type ahead of time:
    /// the pool captures it once, from the first record pushed under a given statement key, and
    /// the queue calls it once per record it needs to reconstruct, immediately followed by
    /// [`unmarshal`](Record::unmarshal).
    ///
    /// Typical implementation: `Box::new(Self::default())`.
    fn empty_instance(&self) -> Box<dyn Record>;
}
