//! Match scoring for filtered candidates.
//!
//! Two scorers share one contract: a profile vector and a batch of candidate
//! embeddings in, one score in [0, 1] per candidate out, same order.
//!
//! - `CosineScorer`: `(cosine + 1) / 2`, always available
//! - `MlpScorer`: learned ranker loaded from JSON weights
//!
//! `GatedScorer` runs the learned scorer when one is configured and falls
//! back to cosine whenever its batch output fails the quality check.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::semantic::{dot, l2_norm};

/// Stands in for a zero norm so degenerate vectors score 0.5 instead of NaN
const NORM_EPSILON: f32 = 1e-9;

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed model file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model shape: {0}")]
    Shape(String),

    #[error("expected input of {expected} values, got {got}")]
    InputMismatch { expected: usize, got: usize },
}

pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, profile: &[f32], candidates: &[&[f32]]) -> Result<Vec<f32>, ScorerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CosineScorer;

impl CosineScorer {
    pub fn cosine_scores(&self, profile: &[f32], candidates: &[&[f32]]) -> Vec<f32> {
        let profile_norm = nonzero(l2_norm(profile));

        candidates
            .iter()
            .map(|candidate| {
                let cosine = dot(profile, candidate) / (profile_norm * nonzero(l2_norm(candidate)));
                ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
            })
            .collect()
    }
}

fn nonzero(norm: f32) -> f32 {
    if norm == 0.0 {
        NORM_EPSILON
    } else {
        norm
    }
}

impl Scorer for CosineScorer {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn score(&self, profile: &[f32], candidates: &[&[f32]]) -> Result<Vec<f32>, ScorerError> {
        Ok(self.cosine_scores(profile, candidates))
    }
}

/// One dense layer, weights are `outputs x inputs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl Layer {
    fn inputs(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or_default()
    }

    fn outputs(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| dot(row, input) + bias)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MlpWeights {
    layers: Vec<Layer>,
}

/// Feed-forward ranker over `concat(profile, candidate)`.
///
/// Hidden layers use ReLU, the single output unit uses a sigmoid.
#[derive(Debug, Clone)]
pub struct MlpScorer {
    layers: Vec<Layer>,
}

impl MlpScorer {
    /// Load weights written as `{"layers": [{"weights": [[..]], "bias": [..]}]}`.
    pub fn load(path: &Path, dimensions: usize) -> Result<Self, ScorerError> {
        let file = std::fs::File::open(path)?;
        let weights: MlpWeights = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::new(weights.layers, dimensions)
    }

    /// Validate that the layers chain from `2 * dimensions` inputs to one output.
    pub fn new(layers: Vec<Layer>, dimensions: usize) -> Result<Self, ScorerError> {
        if layers.is_empty() {
            return Err(ScorerError::Shape("model has no layers".to_string()));
        }

        let mut expected_inputs = dimensions * 2;
        for (idx, layer) in layers.iter().enumerate() {
            if layer.outputs() == 0 {
                return Err(ScorerError::Shape(format!("layer {idx} has no outputs")));
            }
            if layer.weights.iter().any(|row| row.len() != expected_inputs) {
                return Err(ScorerError::Shape(format!(
                    "layer {idx} expects {expected_inputs} inputs per row, found {}",
                    layer.inputs()
                )));
            }
            if layer.bias.len() != layer.outputs() {
                return Err(ScorerError::Shape(format!(
                    "layer {idx} has {} outputs but {} biases",
                    layer.outputs(),
                    layer.bias.len()
                )));
            }
            expected_inputs = layer.outputs();
        }

        if expected_inputs != 1 {
            return Err(ScorerError::Shape(format!(
                "last layer must have one output, found {expected_inputs}"
            )));
        }

        Ok(MlpScorer { layers })
    }

    fn forward(&self, input: Vec<f32>) -> f32 {
        let last = self.layers.len() - 1;
        let mut activations = input;

        for (idx, layer) in self.layers.iter().enumerate() {
            activations = layer.forward(&activations);
            if idx < last {
                for x in activations.iter_mut() {
                    *x = x.max(0.0);
                }
            }
        }

        let logit = activations.first().copied().unwrap_or_default();
        1.0 / (1.0 + (-logit).exp())
    }
}

impl Scorer for MlpScorer {
    fn name(&self) -> &'static str {
        "mlp"
    }

    fn score(&self, profile: &[f32], candidates: &[&[f32]]) -> Result<Vec<f32>, ScorerError> {
        let expected = self.layers[0].inputs();

        candidates
            .iter()
            .map(|candidate| {
                let got = profile.len() + candidate.len();
                if got != expected {
                    return Err(ScorerError::InputMismatch { expected, got });
                }

                let mut input = Vec::with_capacity(got);
                input.extend_from_slice(profile);
                input.extend_from_slice(candidate);
                Ok(self.forward(input))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOrigin {
    Cosine,
    Learned,
}

/// Picks between the learned scorer and the cosine baseline per batch.
pub struct GatedScorer {
    baseline: CosineScorer,
    learned: Option<Box<dyn Scorer>>,
    min_spread: f32,
}

impl GatedScorer {
    pub fn cosine() -> Self {
        GatedScorer {
            baseline: CosineScorer,
            learned: None,
            min_spread: 0.0,
        }
    }

    pub fn with_learned(learned: Box<dyn Scorer>, min_spread: f32) -> Self {
        GatedScorer {
            baseline: CosineScorer,
            learned: Some(learned),
            min_spread,
        }
    }

    pub fn has_learned(&self) -> bool {
        self.learned.is_some()
    }

    pub fn score(&self, profile: &[f32], candidates: &[&[f32]]) -> (Vec<f32>, ScoreOrigin) {
        if let Some(learned) = &self.learned {
            match learned.score(profile, candidates) {
                Ok(scores) => match self.check(&scores, candidates.len()) {
                    Ok(()) => return (scores, ScoreOrigin::Learned),
                    Err(reason) => {
                        log::warn!("{} scores rejected ({reason}), using cosine", learned.name())
                    }
                },
                Err(err) => log::warn!("{} scorer failed ({err}), using cosine", learned.name()),
            }
        }

        (
            self.baseline.cosine_scores(profile, candidates),
            ScoreOrigin::Cosine,
        )
    }

    fn check(&self, scores: &[f32], expected: usize) -> Result<(), String> {
        if scores.len() != expected {
            return Err(format!("{} scores for {expected} candidates", scores.len()));
        }

        if scores
            .iter()
            .any(|s| !s.is_finite() || !(0.0..=1.0).contains(s))
        {
            return Err("score outside [0, 1]".to_string());
        }

        let spread = std_dev(scores);
        if spread < self.min_spread {
            return Err(format!("spread {spread:.4} below {}", self.min_spread));
        }

        Ok(())
    }
}

/// Population standard deviation, 0 for an empty batch.
fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    impl Scorer for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn score(&self, _: &[f32], _: &[&[f32]]) -> Result<Vec<f32>, ScorerError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn cosine_maps_identical_to_one_and_negation_to_zero() {
        let profile = [0.6, 0.8];
        let same: &[f32] = &[0.6, 0.8];
        let opposite: &[f32] = &[-0.6, -0.8];
        let orthogonal: &[f32] = &[0.8, -0.6];

        let scores = CosineScorer.cosine_scores(&profile, &[same, opposite, orthogonal]);

        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!(scores[1].abs() < 1e-6);
        assert!((scores[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cosine_ignores_magnitude() {
        let a: &[f32] = &[3.0, 0.0];
        let scores = CosineScorer.cosine_scores(&[1.0, 0.0], &[a]);
        assert!((scores[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_scores_half() {
        let zero: &[f32] = &[0.0, 0.0];
        let scores = CosineScorer.cosine_scores(&[1.0, 0.0], &[zero]);
        assert!((scores[0] - 0.5).abs() < 1e-6);

        let one: &[f32] = &[1.0, 0.0];
        let scores = CosineScorer.cosine_scores(&[0.0, 0.0], &[one]);
        assert!(scores[0].is_finite());
    }

    fn tiny_mlp() -> MlpScorer {
        // 2 dims -> 4 inputs -> 2 hidden -> 1 output
        let layers = vec![
            Layer {
                weights: vec![vec![1.0, 0.0, 1.0, 0.0], vec![0.0, 1.0, 0.0, 1.0]],
                bias: vec![0.0, 0.0],
            },
            Layer {
                weights: vec![vec![2.0, -2.0]],
                bias: vec![0.0],
            },
        ];
        MlpScorer::new(layers, 2).unwrap()
    }

    #[test]
    fn mlp_forward_pass() {
        let mlp = tiny_mlp();
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];

        let scores = mlp.score(&[1.0, 0.0], &[a, b]).unwrap();

        // hidden [2, 0] -> logit 4; hidden [1, 1] -> logit 0
        assert!((scores[0] - 1.0 / (1.0 + (-4.0f32).exp())).abs() < 1e-6);
        assert!((scores[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mlp_rejects_wrong_input_width() {
        let mlp = tiny_mlp();
        let short: &[f32] = &[1.0];
        let result = mlp.score(&[1.0, 0.0], &[short]);
        assert!(matches!(result, Err(ScorerError::InputMismatch { .. })));
    }

    #[test]
    fn mlp_shape_is_validated() {
        let no_layers = MlpScorer::new(vec![], 2);
        assert!(matches!(no_layers, Err(ScorerError::Shape(_))));

        let wide_output = MlpScorer::new(
            vec![Layer {
                weights: vec![vec![0.0; 4], vec![0.0; 4]],
                bias: vec![0.0, 0.0],
            }],
            2,
        );
        assert!(matches!(wide_output, Err(ScorerError::Shape(_))));

        let bad_bias = MlpScorer::new(
            vec![Layer {
                weights: vec![vec![0.0; 4]],
                bias: vec![],
            }],
            2,
        );
        assert!(matches!(bad_bias, Err(ScorerError::Shape(_))));
    }

    #[test]
    fn mlp_loads_from_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ranker.json");
        std::fs::write(
            &path,
            r#"{"layers":[{"weights":[[0.5,0.5,0.5,0.5]],"bias":[0.1]}]}"#,
        )
        .unwrap();

        let mlp = MlpScorer::load(&path, 2).unwrap();
        assert_eq!(mlp.name(), "mlp");

        assert!(MlpScorer::load(&path, 3).is_err());
    }

    #[test]
    fn gate_uses_learned_scores_when_spread_is_healthy() {
        let gate = GatedScorer::with_learned(Box::new(Fixed(vec![0.9, 0.1])), 0.01);
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];

        let (scores, origin) = gate.score(&[1.0, 0.0], &[a, b]);
        assert_eq!(origin, ScoreOrigin::Learned);
        assert_eq!(scores, vec![0.9, 0.1]);
    }

    #[test]
    fn gate_falls_back_on_flat_output() {
        let gate = GatedScorer::with_learned(Box::new(Fixed(vec![0.5, 0.502])), 0.01);
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[-1.0, 0.0];

        let (scores, origin) = gate.score(&[1.0, 0.0], &[a, b]);
        assert_eq!(origin, ScoreOrigin::Cosine);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!(scores[1].abs() < 1e-6);
    }

    #[test]
    fn gate_falls_back_on_wrong_length_or_range() {
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];

        let short = GatedScorer::with_learned(Box::new(Fixed(vec![0.9])), 0.01);
        assert_eq!(short.score(&[1.0, 0.0], &[a, b]).1, ScoreOrigin::Cosine);

        let out_of_range = GatedScorer::with_learned(Box::new(Fixed(vec![1.5, 0.0])), 0.01);
        assert_eq!(out_of_range.score(&[1.0, 0.0], &[a, b]).1, ScoreOrigin::Cosine);

        let nan = GatedScorer::with_learned(Box::new(Fixed(vec![f32::NAN, 0.0])), 0.01);
        assert_eq!(nan.score(&[1.0, 0.0], &[a, b]).1, ScoreOrigin::Cosine);
    }

    #[test]
    fn gate_falls_back_when_learned_scorer_errors() {
        let gate = GatedScorer::with_learned(Box::new(tiny_mlp()), 0.01);
        let wrong_width: &[f32] = &[1.0, 0.0, 0.0];

        let (_, origin) = gate.score(&[1.0, 0.0], &[wrong_width]);
        assert_eq!(origin, ScoreOrigin::Cosine);
    }

    #[test]
    fn cosine_gate_is_deterministic() {
        let gate = GatedScorer::cosine();
        let a: &[f32] = &[0.3, 0.9];
        let b: &[f32] = &[0.9, 0.3];

        let first = gate.score(&[1.0, 0.0], &[a, b]);
        let second = gate.score(&[1.0, 0.0], &[a, b]);
        assert_eq!(first, second);
        assert!(!gate.has_learned());
    }
}
