pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod studio;

pub use config::{GenerationSettings, StudioConfig};
pub use error::{Result, StudioError};
pub use models::*;
pub use studio::{
    CatalogClient, GenerationController, HttpTransport, RawResponse, StudioClient, SubmitOutcome,
    Transport,
};
