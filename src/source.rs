use crate::errors::Result;
use crate::ingest::UploadedImage;
use crate::predictions::Prediction;

/// A prediction backend: something that turns an uploaded image into a list of
/// class/confidence pairs.
///
/// Both the hosted HTTP adapter and the local ONNX model implement this, so the
/// request handlers and tests are written against the trait rather than either
/// concrete backend. Implementations block the calling thread; callers run them
/// on a blocking worker.
pub trait PredictionSource: Send + Sync {
    /// Short backend name used in responses, logs, and error messages.
    fn name(&self) -> &str;

    /// Run inference on one uploaded image.
    ///
    /// The returned list carries whatever the backend produced, in backend
    /// order; ranking and truncation happen in the caller. An empty list is a
    /// valid return value and is turned into a `NoPredictions` error upstream.
    fn predict(&self, upload: &UploadedImage) -> Result<Vec<Prediction>>;
}
