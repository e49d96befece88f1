//! A self-healing memory bank: a fixed catalogue of markdown documents under
//! one root directory.
//!
//! ```text
//! <root>/
//! ├── core/            projectbrief.md, productContext.md, activeContext.md
//! ├── systemPatterns/  architecture.md, patterns.md, conventions.md
//! ├── techContext/     stack.md, dependencies.md, environment.md
//! ├── progress/        milestones.md, backlog.md, issues.md
//! ├── systemPatterns.md
//! ├── techContext.md
//! └── progress.md
//! ```
//!
//! [`MemoryBank`] owns the in-memory copy of every document and is the only
//! way to change it. All file access goes through
//! [`membank_storage`]: paths are validated against the root, transient
//! failures are retried, and large files are streamed.
//!
//! ```no_run
//! # async fn run() -> membank::error::Result<()> {
//! use membank::{DocumentType, MemoryBank};
//!
//! let bank = MemoryBank::local("/home/me/project/memory-bank")?;
//! let created = bank.load_files().await?;
//! println!("created {} missing documents", created.len());
//! bank.update_file(DocumentType::ActiveContext, "# Active Context\n\nReleasing 1.0\n").await?;
//! assert!(bank.get_is_memory_bank_initialized().await);
//! # Ok(())
//! # }
//! ```

mod bank;
mod document;
pub mod error;
mod health;
mod record;
mod template;

pub use crate::bank::{BankState, MemoryBank, Options};
pub use crate::document::{Category, DocumentType};
pub use crate::health::{HealthIssue, HealthReport, InitializationStatus, Invalidity, Problem};
pub use crate::record::DocumentRecord;
pub use crate::template::{BuiltinTemplates, TemplateProvider};
pub use membank_cache::{CacheConfig, CacheStatistics};
pub use membank_config::Config;
pub use membank_storage::{FileSystem, FileSystemHandle, LocalFileSystem, StreamingStatistics};
