//! Portal engine: session locking, worker processes, traversal and page IO.
mod crawl;
mod decode;
mod dispatch;
mod document;
mod fetch;
mod lock;
mod persist;
mod progress;
mod runner;
mod session;
mod store;
mod types;
mod worker;

pub use crawl::{CrawlError, CrawlSettings, Crawler, HostPolicy, LinkFilter};
pub use decode::{decode_body, DecodedBody};
pub use dispatch::Dispatcher;
pub use document::{FormField, PageDocument};
pub use fetch::{FetchSettings, ReqwestFetcher};
pub use lock::{
    CleanupOutcome, Clock, Liveness, LockError, LockManager, LockRecord, ProcessProbe,
    SessionLease, SignalProbe, SystemClock, ENGINE_SINGLETON_MARKER, LOCK_FILE_NAME,
};
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use progress::{LineWriterSink, NullSink, ProgressSink};
pub use runner::{RunError, Runner, RunnerConfig, WorkerCommand, WorkerPrograms, DEFAULT_LOG_TAIL};
pub use session::{HttpPageSession, PageSession};
pub use store::{AssignmentsStore, MemoryAssignmentsStore, StoreError};
pub use types::{FailureKind, FetchMetadata, FetchOutput, NavError};
pub use worker::{job_from_env, run_worker, WorkerError};
