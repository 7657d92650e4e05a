//! Taskflow Engine: validates, schedules and runs execution plans
//!
//! A plan is leveled into groups of independent steps. Each group runs
//! concurrently (tool calls through the batcher, under a concurrency
//! ceiling), results are merged into the run's context, and the next group
//! starts. A fatal failure rolls back completed steps in reverse order.

pub mod analyzer;
pub mod backoff;
pub mod batch;
pub mod checkpoint;
pub mod checks;
pub mod config;
pub mod context;
pub mod controller;
pub mod functions;
pub mod memory;
pub mod plan_file;
pub mod registry;
pub mod resolve;
pub mod runner;
pub mod scheduler;
pub mod strategy;
pub mod validate;

pub use analyzer::{Analyzer, StructuralAnalyzer};
pub use backoff::{BackoffKind, BackoffPolicy};
pub use batch::{BatchExecutionResult, ToolBatcher};
pub use checkpoint::{CompensationHandler, RollbackManager, RollbackReport};
pub use config::{BatchConfig, EngineConfig, EngineSection, StrategyKind};
pub use context::ExecutionContext;
pub use controller::{Engine, EngineBuilder};
pub use functions::FunctionRegistry;
pub use memory::{InMemoryStore, MemoryRecord, MemoryStore};
pub use plan_file::{load_plan, parse_plan, PlanFileError, PlanFormat};
pub use resolve::{resolve, Scope};
pub use runner::StepRunner;
pub use strategy::{BatchedStrategy, GroupStrategy, SequentialStrategy};
pub use validate::validate;
