/*!
 * Atomic Value
 *
 * Lock-free publish/subscribe of an immutable, type-checked value.
 *
 * # Design
 *
 * A cell is two words: a type tag and a reference to the payload. The tag
 * moves through three states, decoded into [`TagState`]:
 *
 * - **Empty**: never published, loads return an empty [`Value`]
 * - **Publishing**: the first store claimed the cell and is writing the
 *   payload; loads still see empty, other stores wait
 * - **Published**: the tag is fixed for the life of the cell; later stores
 *   only replace the payload
 *
 * The payload is written before the tag is published, and readers load the
 * tag before the payload, so a reader never pairs a payload with a missing
 * tag. Payloads live in an [`ArcSwapOption`] so a reader can keep a loaded
 * value alive while a writer replaces it.
 */

mod tag;

pub use tag::TypeTag;

use self::tag::{TAG_EMPTY, TAG_PUBLISHING};
use crate::errors::{fatal, SyncError, SyncResult};
use arc_swap::ArcSwapOption;
use parking_lot_core::SpinWait;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Type-erased payload
///
/// Boxed so that `Arc<Payload>` is a thin pointer `ArcSwapOption` can hold.
pub type Payload = Box<dyn Any + Send + Sync>;

/// A tagged handle to a published payload, or empty
///
/// Cloning is cheap and shares the payload.
#[derive(Clone, Default)]
pub struct Value {
    inner: Option<(TypeTag, Arc<Payload>)>,
}

impl Value {
    /// Wrap `value`, tagging it with its type
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        let payload: Payload = Box::new(value);
        Self {
            inner: Some((TypeTag::of::<T>(), Arc::new(payload))),
        }
    }

    /// The empty value
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    #[inline]
    fn from_parts(tag: TypeTag, data: Option<Arc<Payload>>) -> Self {
        Self {
            inner: data.map(|data| (tag, data)),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    #[inline]
    pub fn tag(&self) -> Option<TypeTag> {
        self.inner.as_ref().map(|(tag, _)| *tag)
    }

    /// Name of the payload type, for diagnostics
    pub fn type_name(&self) -> Option<&'static str> {
        self.tag().map(TypeTag::name)
    }

    /// Borrow the payload as a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner
            .as_ref()
            .and_then(|(_, data)| (***data).downcast_ref::<T>())
    }

    /// Clone the payload out as a `T`
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Whether both handles refer to the same payload (or are both empty)
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some((_, a)), Some((_, b))) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[inline]
    fn data(&self) -> Option<&Arc<Payload>> {
        self.inner.as_ref().map(|(_, data)| data)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name() {
            Some(name) => write!(f, "Value({})", name),
            None => f.write_str("Value(<empty>)"),
        }
    }
}

/// Decoded tag word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    Empty,
    Publishing,
    Published(TypeTag),
}

impl TagState {
    #[inline]
    fn decode(word: usize) -> Self {
        match word {
            TAG_EMPTY => TagState::Empty,
            TAG_PUBLISHING => TagState::Publishing,
            tag => TagState::Published(TypeTag::from_word(tag)),
        }
    }
}

/// Wait out another thread's first publish
///
/// The publisher cannot be pinned to its CPU, so after a few spins yield
/// instead of burning the time slice it may need.
#[inline]
fn wait_for_publish(spin: &mut SpinWait) {
    if !spin.spin() {
        std::thread::yield_now();
    }
}

/// Atomically published value of a fixed (but dynamically checked) type
///
/// # Examples
///
/// ```
/// use adaptive_sync::{AtomicValue, Value};
///
/// let config = AtomicValue::new();
/// assert!(config.load().is_empty());
///
/// config.store(Value::new(String::from("v1")));
/// config.store(Value::new(String::from("v2")));
/// assert_eq!(config.load().get::<String>().as_deref(), Some("v2"));
/// ```
pub struct AtomicValue {
    tag: AtomicUsize,
    data: ArcSwapOption<Payload>,
}

impl Default for AtomicValue {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicValue {
    /// Create a never-published cell
    pub const fn new() -> Self {
        Self {
            tag: AtomicUsize::new(TAG_EMPTY),
            data: ArcSwapOption::const_empty(),
        }
    }

    /// Current state of the tag word
    #[inline]
    pub fn state(&self) -> TagState {
        TagState::decode(self.tag.load(Ordering::Acquire))
    }

    /// Most recently stored value, or empty if no store has completed
    ///
    /// Never blocks.
    pub fn load(&self) -> Value {
        match self.state() {
            TagState::Empty | TagState::Publishing => Value::empty(),
            TagState::Published(tag) => Value::from_parts(tag, self.data.load_full()),
        }
    }

    /// Claim a never-published cell; false if another store got there first
    #[inline]
    fn claim_first_publish(&self) -> bool {
        self.tag
            .compare_exchange(TAG_EMPTY, TAG_PUBLISHING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Finish a claimed first publish: payload, then tag
    #[inline]
    fn complete_first_publish(&self, tag: TypeTag, data: Arc<Payload>) {
        self.data.store(Some(data));
        self.tag.store(tag.get(), Ordering::Release);
        trace!(value_type = tag.name(), "atomic value first publish");
    }

    fn check_type(stored: TypeTag, attempted: TypeTag) -> SyncResult<()> {
        if stored == attempted {
            Ok(())
        } else {
            Err(SyncError::InconsistentType {
                stored: stored.name(),
                attempted: attempted.name(),
            })
        }
    }

    /// Publish `value`, reporting misuse instead of aborting
    ///
    /// Fails if `value` is empty or its type differs from the type this cell
    /// was first published with; the cell is left unchanged.
    pub fn try_store(&self, value: Value) -> SyncResult<()> {
        let (tag, data) = value.inner.ok_or(SyncError::StoreOfEmptyValue)?;
        let mut spin = SpinWait::new();

        loop {
            match self.state() {
                TagState::Empty => {
                    if self.claim_first_publish() {
                        self.complete_first_publish(tag, data);
                        return Ok(());
                    }
                }
                TagState::Publishing => wait_for_publish(&mut spin),
                TagState::Published(stored) => {
                    Self::check_type(stored, tag)?;
                    self.data.store(Some(data));
                    return Ok(());
                }
            }
        }
    }

    /// Publish `value`
    ///
    /// Storing an empty value, or a value of a different type than the first
    /// one stored, aborts the process.
    pub fn store(&self, value: Value) {
        if let Err(err) = self.try_store(value) {
            fatal(err);
        }
    }

    /// Publish `new` and return the previous value (empty if none)
    pub fn try_swap(&self, new: Value) -> SyncResult<Value> {
        let (tag, data) = new.inner.ok_or(SyncError::StoreOfEmptyValue)?;
        let mut spin = SpinWait::new();

        loop {
            match self.state() {
                TagState::Empty => {
                    if self.claim_first_publish() {
                        self.complete_first_publish(tag, data);
                        return Ok(Value::empty());
                    }
                }
                TagState::Publishing => wait_for_publish(&mut spin),
                TagState::Published(stored) => {
                    Self::check_type(stored, tag)?;
                    let old = self.data.swap(Some(data));
                    return Ok(Value::from_parts(stored, old));
                }
            }
        }
    }

    /// Publish `new` and return the previous value, aborting on misuse
    pub fn swap(&self, new: Value) -> Value {
        self.try_swap(new).unwrap_or_else(|err| fatal(err))
    }

    /// Replace the current value with `new` if it is still `current`
    ///
    /// `current` is compared by identity (the same payload handle, see
    /// [`Value::ptr_eq`]), not by payload equality. An empty `current` only
    /// matches a never-published cell.
    pub fn try_compare_and_swap(&self, current: &Value, new: Value) -> SyncResult<bool> {
        let (tag, data) = new.inner.ok_or(SyncError::StoreOfEmptyValue)?;
        if let Some(expected) = current.tag() {
            Self::check_type(expected, tag)?;
        }
        let mut spin = SpinWait::new();

        loop {
            match self.state() {
                TagState::Empty => {
                    if !current.is_empty() {
                        return Ok(false);
                    }
                    if self.claim_first_publish() {
                        self.complete_first_publish(tag, data);
                        return Ok(true);
                    }
                }
                TagState::Publishing => wait_for_publish(&mut spin),
                TagState::Published(stored) => {
                    Self::check_type(stored, tag)?;
                    let Some(expected) = current.data() else {
                        return Ok(false);
                    };
                    let guard = self.data.compare_and_swap(expected, Some(data));
                    let prev: &Option<Arc<Payload>> = &guard;
                    return Ok(prev.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, expected)));
                }
            }
        }
    }

    /// Compare-and-swap, aborting on misuse
    pub fn compare_and_swap(&self, current: &Value, new: Value) -> bool {
        self.try_compare_and_swap(current, new)
            .unwrap_or_else(|err| fatal(err))
    }
}

impl fmt::Debug for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicValue")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
