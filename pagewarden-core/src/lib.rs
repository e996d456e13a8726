pub mod analysis;
pub mod config;
pub mod events;
pub mod fingerprint;
pub mod model;
pub mod pool;
pub mod report;
pub mod service;
pub mod store;

use colored::Colorize;

pub use config::AnalyzerConfig;
pub use events::{BroadcastSink, EventKind, EventSink, NullSink, StatusEvent};
pub use model::{BrokenLink, SortDirection, SortField, UrlFilter, UrlPage, UrlRecord, UrlStatus};
pub use pool::{
    Job, JobError, JobHandler, JobOutcome, JobType, OutcomeStatus, PoolError, PoolStats,
    WorkerPool, WorkerPoolBuilder,
};
pub use service::{AnalyzerService, ServiceError};
pub use store::{MemoryRepository, SqliteRepository, StoreError, UrlRepository};

pub fn print_banner() {
    let banner = r#"
  ┏━┓┏━┓┏━╸┏━╸╻ ╻┏━┓┏━┓╺┳┓┏━╸┏┓╻
  ┣━┛┣━┫┃╺┓┣╸ ┃╻┃┣━┫┣┳┛ ┃┃┣╸ ┃┗┫
  ╹  ╹ ╹┗━┛┗━╸┗┻┛╹ ╹╹┗╸╺┻┛┗━╸╹ ╹"#;
    eprintln!("{}", banner.cyan());
    eprintln!(
        "  {}\n",
        format!("v{} - page structure and link liveness", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
