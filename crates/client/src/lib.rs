//! Predicting game client: snapshot intake, interpolation and reconciliation.

pub mod bot;
pub mod net;

pub use net::{
    ClientConfig, ClientError, ClientEvent, ClientStats, ConnectionState, InputState,
    Interpolator, Prediction, Reconciliation, SyncClient,
};
