pub mod data;
pub mod epoch_stats;
pub mod loop_fn;
pub mod train_config;
pub mod trainer;

pub use data::{synthetic_clusters, Batch, DataSource, InMemoryDataset};
pub use epoch_stats::{EpochStats, TrainReport};
pub use loop_fn::{evaluate, train_loop, Evaluation};
pub use train_config::TrainConfig;
pub use trainer::{train_step, TrainState};
