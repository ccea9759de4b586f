use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::{InferenceError, TensorModel};

/// A TorchScript module loaded once and shared by all workers. Forward passes
/// are serialized through the mutex.
pub struct TorchModel {
    name: String,
    module: Mutex<CModule>,
    device: Device,
}

impl TorchModel {
    pub fn load(name: &str, model_path: &Path) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let mut module = CModule::load_on_device(model_path, device).map_err(|e| {
            InferenceError::LoadError(format!("{} from {}: {}", name, model_path.display(), e))
        })?;
        module.set_eval();
        log::info!("Loaded {} model from {} on {:?}", name, model_path.display(), device);
        Ok(Self {
            name: name.to_string(),
            module: Mutex::new(module),
            device,
        })
    }
}

impl TensorModel for TorchModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let contiguous = input.as_standard_layout();
        let data = contiguous
            .as_slice()
            .ok_or_else(|| InferenceError::PreprocessingError("input is not contiguous".into()))?;
        let tensor = Tensor::from_slice(data).view(shape.as_slice()).to_device(self.device);

        let output = {
            let module = self
                .module
                .lock()
                .map_err(|_| InferenceError::LockPoisoned(self.name.clone()))?;
            tch::no_grad(|| module.forward_ts(&[tensor]))?
        };

        let output = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous();
        let dims: Vec<usize> = output.size().iter().map(|&d| d as usize).collect();
        let values = Vec::<f32>::try_from(output.view([-1]))?;
        ArrayD::from_shape_vec(IxDyn(&dims), values)
            .map_err(|e| InferenceError::OutputError(format!("{}: {}", self.name, e)))
    }
}
