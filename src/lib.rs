pub mod annotate;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod local;
pub mod predictions;
pub mod remote;
pub mod server;
pub mod source;

pub mod mocks;

pub use annotate::Annotator;
pub use config::Config;
pub use errors::{CropscanError, Result};
pub use ingest::{decode_upload, UploadedImage};
pub use local::LocalClassifier;
pub use predictions::{top_k, Prediction, TOP_K};
pub use remote::RemoteClassifier;
pub use server::{router, AppState, PredictResponse};
pub use source::PredictionSource;
