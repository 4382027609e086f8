//! Currency classifier: preprocessing, inference and reduction of the scores to a label.
//!
use std::path::Path;

use anyhow::{bail, Context, Result};
use common::labels::Label;
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Side length of the square model input in pixels.
pub const INPUT_SIDE: usize = 224;

/// Location of the classifier artifact relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "model/currency.onnx";

/// Model turning a frame into a score vector over the label table.
pub trait InferModel: Send + Sync {
    fn scores(&self, frame: &RgbImage) -> Result<Vec<f32>>;

    /// Classify a frame by its highest score.
    fn classify(&self, frame: &RgbImage) -> Result<Label> {
        label_from_scores(&self.scores(frame)?)
    }
}

/// Currency classifier exported to ONNX.
///
/// The network expects an NHWC input of shape `[1, 224, 224, 3]` with pixel values in `[0, 1]`
/// and outputs one score per entry of [`common::labels::LABELS`].
pub struct CurrencyModel {
    model: NnModel,
}

impl CurrencyModel {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, INPUT_SIDE, INPUT_SIDE, 3),
        );
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to read model {}", path.display()))?
            .with_input_fact(0, input_fact)?
            .into_optimized()?
            .into_runnable()?;

        log::info!("Loaded model {}", path.display());
        Ok(Self { model })
    }
}

impl InferModel for CurrencyModel {
    fn scores(&self, frame: &RgbImage) -> Result<Vec<f32>> {
        // Input and output tensors are dropped when this returns
        let raw_nn_out = self.model.run(tvec!(preprocess(frame).into()))?;
        let scores = raw_nn_out
            .first()
            .context("model produced no output")?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();

        Ok(scores)
    }
}

/// Resize a frame bilinearly to the model input and scale the pixels to `[0, 1]`.
pub fn preprocess(frame: &RgbImage) -> Tensor {
    let side = INPUT_SIDE as u32;
    let resized: RgbImage = image::imageops::resize(frame, side, side, FilterType::Triangle);

    tract_ndarray::Array4::from_shape_fn((1, INPUT_SIDE, INPUT_SIDE, 3), |(_, y, x, c)| {
        resized[(x as _, y as _)][c] as f32 / 255.0
    })
    .into()
}

/// Index of the highest score.
///
/// The lowest index wins ties and NaN scores are never selected. There is no minimum
/// confidence, a weak maximum is still a maximum.
pub fn top_index(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (index, &score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
}

/// Reduce a score vector to the label at its maximum.
pub fn label_from_scores(scores: &[f32]) -> Result<Label> {
    let Some(index) = top_index(scores) else {
        bail!("model produced no usable scores ({} values)", scores.len());
    };

    Label::from_index(index).with_context(|| format!("no label for model output index {index}"))
}
