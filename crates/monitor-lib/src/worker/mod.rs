//! Background worker tier
//!
//! Consumes jobs from a `ChannelJobQueue`. Workers never touch
//! `IntervalState`; their only effect on the sampling loops is a model
//! swap in the registry.

mod notify;
mod retrain;

pub use notify::{LogChannel, NotificationChannel, NotifyWorker};
pub use retrain::RetrainWorker;
