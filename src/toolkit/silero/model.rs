//! ONNX session wrapper for the Silero VAD model.
//!
//! The model takes a 512-sample frame prefixed with 64 context samples
//! from the previous frame, an LSTM state tensor `[2, 1, 128]` and the
//! sample rate, and returns a speech probability plus the updated state.

use std::path::Path;

use ndarray::Array3;
use ort::session::builder::SessionBuilder;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use super::{ToolkitError, CONTEXT_SIZE, FRAME_SIZE};

const STATE_DIM_0: usize = 2;
const STATE_DIM_1: usize = 1;
const STATE_DIM_2: usize = 128;
const STATE_SIZE: usize = STATE_DIM_0 * STATE_DIM_1 * STATE_DIM_2;

/// Silero ONNX model with its recurrent state.
pub struct SileroModel {
    session: Session,
    state: Array3<f32>,
    context: Vec<f32>,
}

impl SileroModel {
    pub fn new(model_path: &Path, num_threads: Option<usize>) -> Result<Self, ToolkitError> {
        if !model_path.is_file() {
            return Err(ToolkitError::ModelNotFound(model_path.to_path_buf()));
        }

        info!("loading Silero VAD model from {}", model_path.display());

        let mut builder =
            SessionBuilder::new().map_err(|e| ToolkitError::ModelLoad(e.to_string()))?;
        if let Some(threads) = num_threads {
            builder = builder
                .with_intra_threads(threads)
                .and_then(|b| b.with_inter_threads(1))
                .map_err(|e| ToolkitError::ModelLoad(e.to_string()))?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| ToolkitError::ModelLoad(e.to_string()))?;

        if session.inputs.len() < 3 {
            return Err(ToolkitError::ModelLoad(format!(
                "Silero model has {} inputs, expected at least 3 (input, state, sr)",
                session.inputs.len()
            )));
        }

        Ok(Self {
            session,
            state: Array3::zeros((STATE_DIM_0, STATE_DIM_1, STATE_DIM_2)),
            context: vec![0.0; CONTEXT_SIZE],
        })
    }

    /// Run one frame through the model and return the speech probability.
    pub fn process_frame(&mut self, frame: &[f32]) -> Result<f32, ToolkitError> {
        if frame.len() != FRAME_SIZE {
            return Err(ToolkitError::Inference(format!(
                "invalid frame size: got {}, expected {FRAME_SIZE}",
                frame.len()
            )));
        }

        let mut input = Vec::with_capacity(CONTEXT_SIZE + FRAME_SIZE);
        input.extend_from_slice(&self.context);
        input.extend_from_slice(frame);
        self.context.copy_from_slice(&frame[FRAME_SIZE - CONTEXT_SIZE..]);

        let input_len = input.len();
        let input_value = Value::from_array(([1, input_len], input))
            .map_err(|e| ToolkitError::Inference(e.to_string()))?
            .into();

        let state_data: Vec<f32> = self.state.iter().copied().collect();
        let state_value = Value::from_array(([STATE_DIM_0, STATE_DIM_1, STATE_DIM_2], state_data))
            .map_err(|e| ToolkitError::Inference(e.to_string()))?
            .into();

        let sr_value = Value::from_array(([1usize], vec![16_000i64]))
            .map_err(|e| ToolkitError::Inference(e.to_string()))?
            .into();

        let inputs: Vec<(&str, ort::value::Value)> = vec![
            ("input", input_value),
            ("state", state_value),
            ("sr", sr_value),
        ];

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| ToolkitError::Inference(e.to_string()))?;

        let (_, output_data) = outputs
            .get("output")
            .ok_or_else(|| ToolkitError::Inference("no 'output' tensor".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| ToolkitError::Inference(e.to_string()))?;
        let probability = output_data.first().copied().unwrap_or(0.0);

        if let Some(state_tensor) = outputs.get("stateN") {
            let (_, state_data) = state_tensor
                .try_extract_tensor::<f32>()
                .map_err(|e| ToolkitError::Inference(e.to_string()))?;
            if state_data.len() == STATE_SIZE {
                self.state = Array3::from_shape_vec(
                    (STATE_DIM_0, STATE_DIM_1, STATE_DIM_2),
                    state_data.to_vec(),
                )
                .map_err(|e| ToolkitError::Inference(e.to_string()))?;
            }
        }

        debug!("silero speech probability: {probability:.4}");
        Ok(probability)
    }

    /// Clear the LSTM state and context buffer for a new audio stream.
    pub fn reset(&mut self) {
        self.state = Array3::zeros((STATE_DIM_0, STATE_DIM_1, STATE_DIM_2));
        self.context = vec![0.0; CONTEXT_SIZE];
    }
}
