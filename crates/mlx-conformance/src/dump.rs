//! Self-contained test directories for external ONNX runtimes.
//!
//! Layout per case:
//!
//! ```text
//! <output_dir>/test_operator_<case>/model.onnx
//! <output_dir>/test_operator_<case>/test_data_set_0/input_<i>.pb
//! <output_dir>/test_operator_<case>/test_data_set_0/output_<i>.pb
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use mlx_core::{Tensor, Value};
use mlx_nn::Module;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};

pub const CASE_DIR_PREFIX: &str = "test_operator_";
pub const MODEL_FILE: &str = "model.onnx";
pub const DATA_SET_DIR: &str = "test_data_set_0";

#[derive(Clone, Debug)]
pub struct ArtifactDumper {
    output_dir: PathBuf,
}

impl ArtifactDumper {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn case_dir(&self, case: &str) -> PathBuf {
        self.output_dir.join(format!("{CASE_DIR_PREFIX}{case}"))
    }

    /// Write the model bytes, the flattened inputs, and the flattened outputs
    /// of running `module` directly in the mode it was exported in.
    ///
    /// Any previous directory for `case` is removed first. The module runs
    /// and its output arity is checked before anything is written, and a
    /// failed write removes the partial directory, so a case directory on
    /// disk is always complete.
    pub fn dump(
        &self,
        case: &str,
        model_bytes: &[u8],
        module: &mut dyn Module,
        inputs: &[Value],
        training: bool,
        exported_outputs: usize,
    ) -> Result<PathBuf> {
        let dir = self.case_dir(case);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(HarnessError::io(&dir))?;
        }

        let input_leaves: Vec<Tensor> = inputs.iter().flat_map(Value::flatten).collect();
        let was_training = module.is_training();
        module.train(training);
        let outputs = module.forward(inputs);
        module.train(was_training);
        let output_leaves = outputs?.flatten();

        if output_leaves.len() != exported_outputs {
            return Err(HarnessError::OutputArity {
                case: case.to_string(),
                exported: exported_outputs,
                executed: output_leaves.len(),
            });
        }

        if let Err(e) = write_case(&dir, model_bytes, &input_leaves, &output_leaves) {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %cleanup, "could not remove partial test case");
            }
            return Err(e);
        }

        info!(
            case,
            dir = %dir.display(),
            inputs = input_leaves.len(),
            outputs = output_leaves.len(),
            "dumped test case"
        );
        Ok(dir)
    }
}

fn write_case(dir: &Path, model_bytes: &[u8], inputs: &[Tensor], outputs: &[Tensor]) -> Result<()> {
    let data_dir = dir.join(DATA_SET_DIR);
    fs::create_dir_all(&data_dir).map_err(HarnessError::io(&data_dir))?;
    mlx_io::save_model_bytes(&dir.join(MODEL_FILE), model_bytes)?;
    write_tensors(&data_dir, "input", inputs)?;
    write_tensors(&data_dir, "output", outputs)
}

fn write_tensors(dir: &Path, prefix: &str, tensors: &[Tensor]) -> Result<()> {
    for (i, t) in tensors.iter().enumerate() {
        let path = dir.join(format!("{prefix}_{i}.pb"));
        mlx_io::save_tensor_pb(&path, t, None)?;
        debug!(path = %path.display(), dims = ?t.shape().0, "wrote tensor");
    }
    Ok(())
}

/// Remove every `test_operator_*` directory under `output_dir`, returning how
/// many were removed. A missing `output_dir` removes nothing.
pub fn clean_generated(output_dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(HarnessError::io(output_dir)(e)),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(HarnessError::io(output_dir))?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(CASE_DIR_PREFIX) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir_all(&path).map_err(HarnessError::io(&path))?;
        } else {
            fs::remove_file(&path).map_err(HarnessError::io(&path))?;
        }
        removed += 1;
    }
    if removed > 0 {
        info!(removed, dir = %output_dir.display(), "removed generated test cases");
    }
    Ok(removed)
}
