//! ONNX Runtime backend
//!
//! Expects a scikit-learn style classifier graph: one float input of shape
//! `[N, 13]`, outputs `[label: int64 [N], probabilities: float [N, 2]]`
//! (exported with zipmap disabled).

use std::io::ErrorKind;
use std::path::Path;

use ndarray::Array2;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::tensor::TensorElementType;
use ort::value::Value;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{ClassProbabilities, Classifier, ClassifierError, Label, ModelError, ModelInfo};
use crate::models::{FeatureRecord, FEATURE_COUNT, REQUIRED_FIELDS};

pub struct OnnxClassifier {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    label_output: String,
    probability_output: String,
    info: ModelInfo,
}

impl OnnxClassifier {
    /// Load the artifact from disk. Absence is reported separately from
    /// every other failure so startup can say exactly what is wrong.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        tracing::info!("Loading classifier artifact from: {}", path.display());

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ModelError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(ModelError::Load(e.to_string())),
        };

        Self::from_bytes(&bytes, &path.display().to_string())
    }

    /// Load the artifact from memory; `origin` is only used for reporting
    pub fn from_bytes(model_bytes: &[u8], origin: &str) -> Result<Self, ModelError> {
        let session = Session::builder()
            .map_err(|e| ModelError::Load(format!("session builder error: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ModelError::Load(format!("optimization error: {}", e)))?
            .commit_from_memory(model_bytes)
            .map_err(|e| ModelError::Load(e.to_string()))?;

        let (label_output, probability_output) = check_signature(&session)?;

        let info = ModelInfo {
            path: origin.to_string(),
            sha256: fingerprint(model_bytes),
            loaded_at: chrono::Utc::now(),
        };

        tracing::info!(
            "Classifier artifact loaded (sha256 {}, outputs: {}, {})",
            info.sha256, label_output, probability_output
        );

        Ok(Self {
            session: Mutex::new(session),
            label_output,
            probability_output,
            info,
        })
    }

    /// One graph run yields both the label and the probabilities
    fn run(&self, record: &FeatureRecord) -> Result<(Label, ClassProbabilities), ClassifierError> {
        let start_time = std::time::Instant::now();

        let row = record.to_row();
        check_finite(&row)?;

        let input_array = Array2::<f32>::from_shape_vec((1, FEATURE_COUNT), row.to_vec())
            .map_err(|e| ClassifierError::Runtime(format!("Array error: {}", e)))?;

        let input_tensor = Value::from_array(input_array)
            .map_err(|e| ClassifierError::Runtime(format!("Tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![input_tensor])
            .map_err(|e| ClassifierError::Runtime(format!("Inference failed: {}", e)))?;

        let labels = outputs.get(self.label_output.as_str())
            .ok_or_else(|| ClassifierError::Runtime(format!("No output '{}'", self.label_output)))?;
        let (_, classes) = labels.try_extract_tensor::<i64>()
            .map_err(|e| ClassifierError::Runtime(format!("Extract error: {}", e)))?;
        let class = classes.first().copied()
            .ok_or_else(|| ClassifierError::Runtime("Empty label output".to_string()))?;

        let probabilities = outputs.get(self.probability_output.as_str())
            .ok_or_else(|| ClassifierError::Runtime(format!("No output '{}'", self.probability_output)))?;
        let (_, data) = probabilities.try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Runtime(format!("Extract error: {}", e)))?;
        let first_row = data.get(..2).unwrap_or(data);

        let result = (Label::from_class(class)?, ClassProbabilities::from_pair(first_row)?);

        tracing::trace!("ONNX inference took {}us", start_time.elapsed().as_micros());

        Ok(result)
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, record: &FeatureRecord) -> Result<(Label, ClassProbabilities), ClassifierError> {
        self.run(record)
    }

    fn classify(&self, record: &FeatureRecord) -> Result<Label, ClassifierError> {
        self.run(record).map(|(label, _)| label)
    }

    fn class_probabilities(&self, record: &FeatureRecord) -> Result<ClassProbabilities, ClassifierError> {
        self.run(record).map(|(_, probabilities)| probabilities)
    }

    fn info(&self) -> Option<&ModelInfo> {
        Some(&self.info)
    }
}

/// Reject graphs the handlers could not use. The input must be a float32
/// tensor of `[N, 13]`; the outputs an int64 label tensor followed by a
/// float32 probability tensor (a zipmap sequence-of-maps is refused).
fn check_signature(session: &Session) -> Result<(String, String), ModelError> {
    let [input] = session.inputs.as_slice() else {
        return Err(ModelError::Load(format!(
            "expected a single input, model declares {}",
            session.inputs.len()
        )));
    };
    let input_ok = input.input_type.tensor_type() == Some(TensorElementType::Float32)
        && input.input_type.tensor_shape()
            .is_some_and(|shape| shape.last() == Some(&(FEATURE_COUNT as i64)));
    if !input_ok {
        return Err(ModelError::Load(format!(
            "input '{}' must be a float tensor of shape [N, {}], found {:?}",
            input.name, FEATURE_COUNT, input.input_type
        )));
    }

    let [label, probabilities, ..] = session.outputs.as_slice() else {
        return Err(ModelError::Load(
            "expected label and probability outputs".to_string(),
        ));
    };
    if label.output_type.tensor_type() != Some(TensorElementType::Int64) {
        return Err(ModelError::Load(format!(
            "label output '{}' must be an int64 tensor, found {:?}",
            label.name, label.output_type
        )));
    }
    // A dynamic class dimension is reported as -1
    let probabilities_ok = probabilities.output_type.tensor_type() == Some(TensorElementType::Float32)
        && probabilities.output_type.tensor_shape()
            .is_some_and(|shape| matches!(shape.last(), Some(&2) | Some(&-1)));
    if !probabilities_ok {
        return Err(ModelError::Load(format!(
            "probability output '{}' must be a float tensor of shape [N, 2], found {:?}",
            probabilities.name, probabilities.output_type
        )));
    }

    Ok((label.name.clone(), probabilities.name.clone()))
}

/// The graph takes float32; anything that is not finite after narrowing is
/// rejected the way the training-side estimator rejects it.
fn check_finite(row: &[f32; FEATURE_COUNT]) -> Result<(), ClassifierError> {
    match row.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(ClassifierError::InvalidValue(format!(
            "Input contains NaN, infinity or a value too large for dtype('float32') (field '{}')",
            REQUIRED_FIELDS[i]
        ))),
        None => Ok(()),
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    /// Fixtures written by `testdata/make_fixtures.py`:
    /// p_positive = sigmoid(0.01 * sum(features) - 3)
    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("src/classifier/testdata").join(name)
    }

    fn expected_positive(row: &[f64; FEATURE_COUNT]) -> f64 {
        let z = 0.01 * row.iter().sum::<f64>() - 3.0;
        1.0 / (1.0 + (-z).exp())
    }

    fn sample_row() -> [f64; FEATURE_COUNT] {
        [63.0, 1.0, 3.0, 145.0, 233.0, 1.0, 0.0, 150.0, 0.0, 2.3, 0.0, 0.0, 1.0]
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heart_disease.onnx");

        let err = OnnxClassifier::load(&path).err().unwrap();
        assert!(matches!(err, ModelError::NotFound(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_corrupt_artifact_fails_to_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not an onnx graph").unwrap();

        let err = OnnxClassifier::load(file.path()).err().unwrap();
        assert!(matches!(err, ModelError::Load(_)));
        assert!(err.to_string().starts_with("failed to load the classifier artifact"));
    }

    #[test]
    fn test_check_finite() {
        let mut row = [1.0f32; FEATURE_COUNT];
        assert!(check_finite(&row).is_ok());

        row[12] = 1e300_f64 as f32;
        match check_finite(&row) {
            Err(ClassifierError::InvalidValue(msg)) => assert!(msg.contains("'thal'")),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fixture_predicts_positive() {
        let classifier = OnnxClassifier::load(&fixture("heart_disease.onnx")).unwrap();
        let record = FeatureRecord::from_row(sample_row());

        assert_eq!(classifier.classify(&record).unwrap(), Label::Positive);

        let probs = classifier.class_probabilities(&record).unwrap();
        assert!((probs.negative + probs.positive - 1.0).abs() < 1e-5);
        assert!((probs.positive - expected_positive(&sample_row())).abs() < 1e-4);
    }

    #[test]
    fn test_fixture_predicts_negative() {
        let classifier = OnnxClassifier::load(&fixture("heart_disease.onnx")).unwrap();
        let row = [0.0; FEATURE_COUNT];

        let (label, probs) = classifier.predict(&FeatureRecord::from_row(row)).unwrap();
        assert_eq!(label, Label::Negative);
        assert!((probs.positive - expected_positive(&row)).abs() < 1e-4);
        assert!(probs.negative > probs.positive);
    }

    #[test]
    fn test_fixture_label_agrees_with_probabilities() {
        let classifier = OnnxClassifier::load(&fixture("heart_disease.onnx")).unwrap();

        for total in [0.0, 150.0, 290.0, 310.0, 600.0] {
            let mut row = [0.0; FEATURE_COUNT];
            row[0] = total;
            let (label, probs) = classifier.predict(&FeatureRecord::from_row(row)).unwrap();
            let expected = if probs.positive > probs.negative { Label::Positive } else { Label::Negative };
            assert_eq!(label, expected, "sum of features {}", total);
        }
    }

    #[test]
    fn test_fixture_info() {
        let path = fixture("heart_disease.onnx");
        let classifier = OnnxClassifier::load(&path).unwrap();

        let info = classifier.info().unwrap();
        assert_eq!(info.path, path.display().to_string());
        assert_eq!(info.sha256, fingerprint(&std::fs::read(&path).unwrap()));
    }

    #[test]
    fn test_wrong_feature_count_is_rejected() {
        let err = OnnxClassifier::load(&fixture("twelve_features.onnx")).err().unwrap();
        match err {
            ModelError::Load(msg) => assert!(msg.contains("[N, 13]"), "{}", msg),
            other => panic!("expected Load, got {:?}", other),
        }
    }

    #[test]
    fn test_zipmap_probabilities_are_rejected() {
        let err = OnnxClassifier::load(&fixture("zipmap_probabilities.onnx")).err().unwrap();
        match err {
            ModelError::Load(msg) => assert!(msg.contains("probability output"), "{}", msg),
            other => panic!("expected Load, got {:?}", other),
        }
    }
}
