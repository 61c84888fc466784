//! Driftwatch Core Library
//!
//! Lifestyle-drift analytics over a personal transaction ledger:
//! - Database access and migrations
//! - CSV ledger import
//! - Period spending rollups (totals, categories, merchants)
//! - Discretionary spending baselines
//! - Recurring income detection and monthly cash flow
//! - Lifestyle creep scoring, pacing and summaries
//! - A staged pipeline that runs everything for one user

pub mod aggregator;
pub mod baseline;
pub mod cash_flow;
pub mod categories;
pub mod computation;
pub mod config;
pub mod creep;
pub mod db;
pub mod error;
pub mod import;
pub mod income;
pub mod models;
pub mod money;
pub mod period;
pub mod pipeline;
pub mod repository;
pub mod transfer;

pub use baseline::{BaselineCalculator, BaselineComputationResult};
pub use cash_flow::{CashFlowAggregator, CashFlowComputationResult};
pub use categories::Category;
pub use computation::{ComputationManager, ComputationResult, RecomputeMode};
pub use config::EngineConfig;
pub use creep::{
    CreepScorer, LifestyleCreepComputationResult, LifestyleCreepSummary, PacingMode,
    PacingResponse, PacingStatus,
};
pub use db::Database;
pub use error::{ComputationError, Error, Result};
pub use import::ImportResult;
pub use income::IncomeDetector;
pub use pipeline::{AnalyticsPipeline, PipelineResult, PipelineStage};
pub use repository::{Repositories, TransactionQuery};
