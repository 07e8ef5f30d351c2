//! Concurrent execution of heterogeneous operations against one list.
//!
//! A batch is a slice of [`Operation`] descriptors. Each descriptor runs as an
//! independent task; the call returns only after every task has written its
//! outcome back into its descriptor.
//!
//! ```text
//! [Insert 5] [Remove 5] [Contains 5]
//!      │          │           │        one task each, any order
//!      ▼          ▼           ▼
//!   insert()   remove()     find()
//!      └──────────┴───────────┘
//!                 │                    join
//!                 ▼
//!        results written back
//! ```
//!
//! No ordering holds between descriptors: they race exactly as independent
//! callers would. Two inserts of one key resolve as one success and one
//! [`ListError::DuplicateKey`].

use std::fmt as StdFmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::List;
use crate::alloc::NodeAllocator;
use crate::error::{ListError, SUCCESS};
use crate::tracing_helpers::{debug_log, warn_log};
use crate::transform::Transform;

/// Environment variable overriding [`BatchConfig::workers`].
pub const WORKERS_ENV: &str = "COUPLIST_BATCH_WORKERS";

// ============================================================================
//  Descriptor
// ============================================================================

/// Which structural operation a descriptor dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpKind {
    /// [`List::insert`].
    Insert = 0,
    /// [`List::remove`].
    Remove = 1,
    /// [`List::find`].
    Contains = 2,
    /// [`List::update`].
    Update = 3,
    /// [`List::compute`].
    Compute = 4,
}

/// Successful outcome of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Insert, remove, update or compute completed.
    Success,
    /// Contains found the key.
    Found,
    /// Contains did not find the key.
    NotFound,
}

impl Status {
    /// Integer form: `Found` is 1, the others are 0.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Found => 1,
            Self::Success | Self::NotFound => SUCCESS,
        }
    }
}

/// Outcome written into [`Operation::result`].
pub type OpResult = Result<Status, ListError>;

/// One request in a batch, plus the slots its outcome is written to.
pub struct Operation<V> {
    /// Target key.
    pub key: i32,

    /// Payload for insert and update.
    ///
    /// Insert consumes it. A successful update leaves the replaced value here.
    pub value: Option<V>,

    /// Operation to run.
    pub kind: OpKind,

    /// Required for [`OpKind::Compute`], ignored otherwise.
    pub transform: Option<Arc<dyn Transform<V>>>,

    /// `None` until the batch has run this descriptor.
    pub result: Option<OpResult>,

    /// Integer produced by a successful compute.
    pub computed: Option<i32>,
}

impl<V> Operation<V> {
    fn new(kind: OpKind, key: i32, value: Option<V>) -> Self {
        Self {
            key,
            value,
            kind,
            transform: None,
            result: None,
            computed: None,
        }
    }

    /// Insert `value` under `key`.
    #[must_use]
    pub fn insert(key: i32, value: V) -> Self {
        Self::new(OpKind::Insert, key, Some(value))
    }

    /// Remove `key`.
    #[must_use]
    pub fn remove(key: i32) -> Self {
        Self::new(OpKind::Remove, key, None)
    }

    /// Test whether `key` is present.
    #[must_use]
    pub fn contains(key: i32) -> Self {
        Self::new(OpKind::Contains, key, None)
    }

    /// Replace the value under `key`.
    #[must_use]
    pub fn update(key: i32, value: V) -> Self {
        Self::new(OpKind::Update, key, Some(value))
    }

    /// Evaluate `transform` against the value under `key`.
    #[must_use]
    pub fn compute<T>(key: i32, transform: T) -> Self
    where
        T: Transform<V> + 'static,
    {
        let mut op: Self = Self::new(OpKind::Compute, key, None);
        op.transform = Some(Arc::new(transform));
        op
    }

    /// Integer result code, or `None` if the descriptor has not run.
    ///
    /// Errors map to their negative codes; see [`Status::code`] for the rest.
    #[must_use]
    pub fn result_code(&self) -> Option<i32> {
        self.result.map(|outcome| match outcome {
            Ok(status) => status.code(),
            Err(err) => err.code(),
        })
    }

    /// Dispatch to the matching list operation and record the outcome.
    ///
    /// A missing payload or transform is recorded as [`ListError::Param`]
    /// without touching the list.
    fn apply<A: NodeAllocator>(&mut self, list: &List<V, A>) {
        let key: i32 = self.key;

        let outcome: OpResult = match self.kind {
            OpKind::Insert => match self.value.take() {
                Some(value) => list.insert(key, value).map(|()| Status::Success),
                None => Err(ListError::Param),
            },
            OpKind::Remove => list.remove(key).map(|()| Status::Success),
            OpKind::Contains => list.find(key).map(|found| {
                if found {
                    Status::Found
                } else {
                    Status::NotFound
                }
            }),
            OpKind::Update => match self.value.take() {
                Some(value) => list.update(key, value).map(|previous| {
                    self.value = Some(previous);
                    Status::Success
                }),
                None => Err(ListError::Param),
            },
            OpKind::Compute => match self.transform.as_deref() {
                Some(transform) => list.compute(key, transform).map(|n| {
                    self.computed = Some(n);
                    Status::Success
                }),
                None => Err(ListError::Param),
            },
        };

        self.result = Some(outcome);
    }
}

impl<V: StdFmt::Debug> StdFmt::Debug for Operation<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("Operation")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("has_transform", &self.transform.is_some())
            .field("result", &self.result)
            .field("computed", &self.computed)
            .finish()
    }
}

/// Run every descriptor on the current rayon pool and wait for all of them.
fn run<V: Send, A: NodeAllocator>(list: &List<V, A>, ops: &mut [Operation<V>]) {
    if ops.is_empty() {
        return;
    }

    ops.par_iter_mut().for_each(|op| op.apply(list));
    debug_log!(ops = ops.len(), "batch: joined");
}

impl<V: Send, A: NodeAllocator> List<V, A> {
    /// Execute `ops` concurrently on rayon's global pool.
    ///
    /// Returns once every descriptor carries a result. An empty slice does
    /// nothing. Use a [`BatchExecutor`] to bound the number of workers.
    pub fn batch(&self, ops: &mut [Operation<V>]) {
        run(self, ops);
    }
}

// ============================================================================
//  Executor
// ============================================================================

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of worker threads. Zero is treated as one.
    pub workers: usize,

    /// Prefix for worker thread names; the worker index is appended.
    pub thread_name: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            thread_name: "couplist-batch".to_string(),
        }
    }
}

impl BatchConfig {
    /// Defaults, with `workers` taken from `COUPLIST_BATCH_WORKERS` when it
    /// holds a positive integer.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_workers_var(std::env::var(WORKERS_ENV).ok().as_deref())
    }

    fn with_workers_var(mut self, raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().parse::<usize>()) {
            Some(Ok(n)) if n > 0 => self.workers = n,
            Some(_) => {
                warn_log!(var = WORKERS_ENV, "ignoring invalid worker count");
            }
            None => {}
        }
        self
    }
}

/// A bounded pool that runs batches.
///
/// Descriptors are queued to at most [`BatchConfig::workers`] threads instead
/// of one thread each.
///
/// # Example
///
/// ```rust
/// use couplist::{BatchConfig, BatchExecutor, List, Operation, Status};
///
/// let list: List<u32> = List::new();
/// let executor = BatchExecutor::new(&BatchConfig { workers: 2, ..BatchConfig::default() }).unwrap();
///
/// let mut ops = vec![Operation::insert(1, 10), Operation::insert(2, 20)];
/// executor.execute(&list, &mut ops);
///
/// assert!(ops.iter().all(|op| op.result == Some(Ok(Status::Success))));
/// assert_eq!(list.len(), Ok(2));
/// ```
pub struct BatchExecutor {
    pool: ThreadPool,
}

impl BatchExecutor {
    /// Build the worker pool.
    ///
    /// # Errors
    ///
    /// [`ListError::Alloc`] if the worker threads cannot be spawned.
    pub fn new(config: &BatchConfig) -> Result<Self, ListError> {
        let prefix: String = config.thread_name.clone();

        let pool: ThreadPool = ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|_err| {
                warn_log!(workers = config.workers, error = %_err, "batch pool build failed");
                ListError::Alloc
            })?;

        Ok(Self { pool })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Execute `ops` against `list` on this pool and wait for all of them.
    ///
    /// An empty slice does nothing.
    pub fn execute<V: Send, A: NodeAllocator>(&self, list: &List<V, A>, ops: &mut [Operation<V>]) {
        if ops.is_empty() {
            return;
        }
        self.pool.install(|| run(list, ops));
    }
}

impl StdFmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("BatchExecutor")
            .field("workers", &self.workers())
            .finish()
    }
}
