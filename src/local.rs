use std::fs;
use std::path::Path;

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

use crate::errors::{CropscanError, Result};
use crate::ingest::UploadedImage;
use crate::predictions::{Prediction, TOP_K};
use crate::source::PredictionSource;

/// Local ONNX classification backend.
///
/// Expects an Ultralytics-style classification export: input `images` of shape
/// `[N, 3, S, S]`, output `output0` of shape `[N, num_classes]`, and a `names`
/// entry in the model metadata mapping class indices to labels.
pub struct LocalClassifier {
    pub image_size: u32,
    names: Vec<String>,
    session: Mutex<Session>,
}

impl LocalClassifier {
    pub fn new(
        model_path: &Path,
        device_id: i32,
        fallback_size: u32,
        labels: Option<Vec<String>>,
    ) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| CropscanError::Model {
                operation: "session builder initialization".to_string(),
                source: Box::new(e),
            })?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| CropscanError::Model {
                operation: "execution provider setup".to_string(),
                source: Box::new(e),
            })?
            .with_memory_pattern(true)
            .map_err(|e| CropscanError::Model {
                operation: "memory pattern setup".to_string(),
                source: Box::new(e),
            })?
            .commit_from_file(model_path)
            .map_err(|e| CropscanError::Model {
                operation: format!("model file loading: {}", model_path.display()),
                source: Box::new(e),
            })?;

        // Static exports declare [N, 3, S, S]; dynamic axes show up as -1 and
        // fall back to the configured resolution.
        let image_size = session.inputs[0]
            .input_type
            .tensor_shape()
            .filter(|shape| shape.len() == 4 && shape[2] > 0)
            .map_or(fallback_size, |shape| shape[2] as u32);

        let names = match labels {
            Some(labels) => labels,
            None => session
                .metadata()
                .ok()
                .and_then(|metadata| metadata.custom("names").ok().flatten())
                .map(|raw| parse_names_map(&raw))
                .unwrap_or_default(),
        };
        if names.is_empty() {
            tracing::warn!("no class name table found; labels will be synthesized from indices");
        }

        // Warm-up run so the first request does not pay graph optimization cost.
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs!["images" => TensorRef::from_array_view(&data).map_err(|e| {
                CropscanError::Model {
                    operation: "warm-up tensor creation".to_string(),
                    source: Box::new(e),
                }
            })?])
            .map_err(|e| CropscanError::Model {
                operation: "model warm-up run".to_string(),
                source: Box::new(e),
            })?;

        tracing::info!(
            model = %model_path.display(),
            image_size,
            classes = names.len(),
            "local model loaded"
        );

        Ok(Self {
            image_size,
            names,
            session: Mutex::new(session),
        })
    }

    fn run(&self, tensor: ArrayView4<f32>) -> Result<Array2<f32>> {
        let mut session = self.session.lock();
        let outputs = session.run(
            ort::inputs!["images" => TensorRef::from_array_view(&tensor.as_standard_layout())?],
        )?;
        Ok(outputs["output0"]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix2>()?
            .to_owned())
    }
}

impl PredictionSource for LocalClassifier {
    fn name(&self) -> &str {
        "local"
    }

    fn predict(&self, upload: &UploadedImage) -> Result<Vec<Prediction>> {
        let tensor = preprocess(&upload.image.to_rgb8(), self.image_size);
        let scores = self.run(tensor.view())?;
        let mut scores = scores.row(0).to_vec();
        normalize_scores(&mut scores);

        let mut indices: Vec<usize> = (0..scores.len()).collect();
        indices.sort_unstable_by(|a, b| scores[*b].total_cmp(&scores[*a]));
        indices.truncate(TOP_K);

        Ok(indices
            .into_iter()
            .map(|i| Prediction::new(class_label(&self.names, i), scores[i]))
            .collect())
    }
}

/// Resize to the model resolution and convert to a normalized NCHW tensor.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, image_size, image_size, FilterType::CatmullRom);
    resized
        .as_ndarray3()
        .slice_move(s![NewAxis, .., .., ..])
        .map(|v| f32::from(*v) / 255.0)
}

/// Map a class index through the name table, synthesizing a label when the
/// table has no usable entry. Never returns an empty string.
pub fn class_label(names: &[String], index: usize) -> String {
    match names.get(index) {
        Some(name) if !name.is_empty() => name.clone(),
        _ => format!("class_{index}"),
    }
}

/// Turn a raw score vector into probabilities.
///
/// Classification exports differ by version: some emit post-softmax
/// probabilities, some raw logits. Scores that already form a distribution are
/// left untouched; anything else goes through a numerically stable softmax.
pub fn normalize_scores(scores: &mut [f32]) {
    if scores.is_empty() {
        return;
    }
    let sum: f32 = scores.iter().sum();
    let in_unit_range = scores.iter().all(|v| (0.0..=1.0).contains(v));
    if in_unit_range && (sum - 1.0).abs() < 0.05 {
        return;
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut total = 0.0;
    for v in scores.iter_mut() {
        *v = (*v - max).exp();
        total += *v;
    }
    for v in scores.iter_mut() {
        *v /= total;
    }
}

/// Parse the Ultralytics metadata name table, e.g. `{0: 'healthy', 1: 'blight'}`.
///
/// The value is a Python dict repr, not JSON, so this is a small hand scanner:
/// index, colon, quoted label. Unknown indices leave gaps that `class_label`
/// papers over.
pub fn parse_names_map(raw: &str) -> Vec<String> {
    let bytes = raw.as_bytes();
    let mut entries: Vec<(usize, String)> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let Ok(index) = raw[digits_start..i].parse::<usize>() else {
            continue;
        };
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b':') {
            i += 1;
        }
        if i < bytes.len() && (bytes[i] == b'\'' || bytes[i] == b'"') {
            let quote = bytes[i];
            i += 1;
            let label_start = i;
            while i < bytes.len() && bytes[i] != quote {
                i += 1;
            }
            entries.push((index, raw[label_start..i].to_string()));
            i += 1;
        }
    }

    let size = entries.iter().map(|(index, _)| index + 1).max().unwrap_or(0);
    let mut names = vec![String::new(); size];
    for (index, label) in entries {
        names[index] = label;
    }
    names
}

/// Read a labels file: one class name per line, blank lines skipped.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| CropscanError::FileSystem {
        path: path.to_path_buf(),
        operation: "labels file read".to_string(),
        source: e,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
