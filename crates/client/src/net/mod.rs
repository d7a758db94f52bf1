pub mod client;
pub mod config;
pub mod input;
pub mod interpolation;
pub mod prediction;

pub use client::{ClientError, ClientEvent, ClientStats, ConnectionState, SyncClient};
pub use config::ClientConfig;
pub use input::InputState;
pub use interpolation::{
    InterpolatedEntity, InterpolatedProjectile, InterpolationConfig, InterpolationStats,
    Interpolator, Lifecycle,
};
pub use prediction::{PredictedProjectile, Prediction, PredictionStats, Reconciliation};
