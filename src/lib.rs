pub mod cli;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod report;
pub mod tagger;
pub mod trainer;
pub mod util;

pub use report::TrainingReport;
pub use trainer::{ConfigHolder, ModelHolder, Trainer, TrainerError, TrainerStatus};
