pub mod average;
pub mod engine;
pub mod etl;
pub mod grouper;
pub mod pipeline;
pub mod ranker;
pub mod report;
pub mod resolver;

pub use crate::domain::model::{
    CanonicalItem, ComparisonOutcome, RawHit, RawPrice, TermResults, TransformResult,
};
pub use crate::domain::ports::{Pipeline, SearchBackend, Storage};
pub use crate::utils::error::Result;
