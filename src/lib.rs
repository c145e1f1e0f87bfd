//! DataFusion ML - статистическое слияние двух таблиц через взаимно предсказанные колонки

pub mod config;
pub mod error;
pub mod fusion;
pub mod models;
pub mod preprocessing;
pub mod schema;
pub mod service;
pub mod types;

pub use config::FusionConfig;
pub use error::{FusionError, Result};
pub use fusion::{fuse, FusionResult};
pub use models::{MetricMap, ModelBackend, TrainedModel};
pub use schema::{resolve, ResolvedSchema};
pub use types::*;
