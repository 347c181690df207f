use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration for the cropscan server.
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Path to the local ONNX classification model.
    #[arg(short, long)]
    pub model_path: PathBuf,

    /// Optional labels file (one class name per line). Overrides the name table
    /// embedded in the model metadata.
    #[arg(long)]
    pub labels_path: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Input resolution used when the model does not declare a static shape.
    #[arg(long, default_value_t = 640)]
    pub image_size: u32,

    /// Base URL of the hosted inference endpoint.
    #[arg(long, default_value = "https://detect.roboflow.com")]
    pub api_url: String,

    /// API key for the hosted endpoint.
    #[arg(long, env = "CROPSCAN_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Model identifier on the hosted endpoint, e.g. `date-j2ljc/1`.
    #[arg(long, default_value = "date-j2ljc/1")]
    pub api_model_id: String,

    /// Background image inlined into the page as a data URL.
    #[arg(long)]
    pub background_path: Option<PathBuf>,

    /// TrueType font used for annotation. Falls back to common system fonts.
    #[arg(long)]
    pub font_path: Option<PathBuf>,

    /// When set, the re-encoded upload is written here as `uploaded_image.jpg`
    /// before each hosted-backend call.
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,
}
