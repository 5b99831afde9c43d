mod cache;
mod client;
mod diff;
mod error;
mod logger;
mod protocol;
mod registry;
#[cfg(test)]
mod testing;
mod translate;
mod types;
mod view;
mod zone;

pub use cache::{CacheBuilder, CacheHandle, CacheHealth, DEFAULT_POLL_INTERVAL};
pub use client::{HttpSystemClient, HttpSystemClientBuilder, SystemClient};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use registry::SystemRegistry;
pub use translate::{CommandPlan, HoldState, RemoteWrite, TemperatureRequest, ZoneCommand, plan};
pub use types::*;
pub use view::*;
pub use zone::ClimateZone;
