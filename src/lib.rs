//! dirtidy - A directory organization and cleanup utility
//!
//! This library sorts files into category folders by extension, optionally
//! partitioned by date, with duplicate detection by content digest. Every
//! change is planned first: a [`Plan`] can be previewed without side effects
//! and then executed, and each execution is recorded as a [`Batch`] in a
//! JSON history so it can be undone.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod file_category;
pub mod file_organizer;
pub mod filter;
pub mod hasher;
pub mod history;
pub mod logging;
pub mod output;
pub mod plan;
pub mod planner;
pub mod policy;
pub mod undo;

pub use config::{Config, Overrides, Settings};
pub use error::{
    AccessError, ConfigError, Error, ExecuteError, HistoryError, MoveError, PlanError, Result,
    UndoError,
};
pub use file_category::{Category, CategoryMap};
pub use file_organizer::FileOrganizer;
pub use history::{Batch, BatchKind, HistoryStore, MoveRecord};
pub use plan::{ActionKind, Plan, PlanEntry};
pub use planner::{PlanRequest, build_plan};
pub use policy::{CollisionPolicy, DateGranularity, DateSource, DedupePolicy};
pub use undo::{UndoManager, UndoReport};

pub use cli::{OrganizeCommand, run_cli, run_cli_with_config};
