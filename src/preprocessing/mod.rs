//! Модуль предобработки данных

pub mod encoding;
pub mod normalization;

pub use encoding::{EncodedMatrix, FeatureEncoder, FeatureMatrix, FeatureSchema, FeatureSource};
pub use normalization::DataNormalizer;
