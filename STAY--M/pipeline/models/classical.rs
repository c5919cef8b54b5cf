use anyhow::ensure;
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::unit::TrainingMetrics;

/// Seed for the deterministic train/test shuffle.
pub const SPLIT_SEED: u64 = 0x5EED;

/// Fewest labelled rows a model will train on.
pub const MIN_TRAINING_ROWS: usize = 2;

const TEST_RATIO: f64 = 0.2;
const REGRESSION_LR: f64 = 0.05;
const REGRESSION_EPOCHS: usize = 500;

/// Per-feature mean/std scaling. Missing inputs are imputed with the training mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl Standardizer {
    /// Fits means and standard deviations, ignoring missing values.
    #[must_use]
    pub fn fit(samples: &[Vec<Option<f64>>]) -> Self {
        let dim = samples.first().map_or(0, Vec::len);
        let mut means = vec![0.0; dim];
        let mut stds = vec![1.0; dim];
        for idx in 0..dim {
            let observed: Vec<f64> = samples.iter().filter_map(|sample| sample[idx]).collect();
            if observed.is_empty() {
                continue;
            }
            let mean = observed.iter().sum::<f64>() / observed.len() as f64;
            let variance = observed
                .iter()
                .map(|value| (value - mean).powi(2))
                .sum::<f64>()
                / observed.len() as f64;
            means[idx] = mean;
            stds[idx] = variance.sqrt().max(1e-6);
        }
        Self { means, stds }
    }

    /// Scales one sample.
    #[must_use]
    pub fn transform(&self, sample: &[Option<f64>]) -> Vec<f64> {
        self.means
            .iter()
            .zip(&self.stds)
            .enumerate()
            .map(|(idx, (mean, std))| {
                let value = sample.get(idx).copied().flatten().unwrap_or(*mean);
                (value - mean) / std
            })
            .collect()
    }

    /// Scales a batch.
    #[must_use]
    pub fn transform_all(&self, samples: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
        samples.iter().map(|sample| self.transform(sample)).collect()
    }

    /// Feature dimensionality.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.means.len()
    }
}

/// Shuffles with a fixed seed and splits off `test_ratio` of the samples.
/// The training side always keeps at least one sample.
#[must_use]
pub fn train_test_split<T: Clone>(samples: &[T], test_ratio: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut shuffled = samples.to_vec();
    shuffled.shuffle(&mut SmallRng::seed_from_u64(seed));
    let test_len = ((samples.len() as f64) * test_ratio.clamp(0.0, 0.5)).floor() as usize;
    let test_len = test_len.min(samples.len().saturating_sub(1));
    let test = shuffled.split_off(shuffled.len() - test_len);
    (shuffled, test)
}

/// Linear regression with bias, fit by batch gradient descent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionModel {
    weights: Vec<f64>,
    bias: f64,
}

impl LinearRegressionModel {
    /// Zero-initialised model.
    #[must_use]
    pub fn new(feature_dim: usize) -> Self {
        Self {
            weights: vec![0.0; feature_dim],
            bias: 0.0,
        }
    }

    /// Predicts one sample.
    #[must_use]
    pub fn predict_one(&self, sample: &[f64]) -> f64 {
        sample
            .iter()
            .zip(&self.weights)
            .map(|(feature, weight)| feature * weight)
            .sum::<f64>()
            + self.bias
    }

    /// Predicts a batch.
    #[must_use]
    pub fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features.iter().map(|sample| self.predict_one(sample)).collect()
    }

    /// Runs gradient descent and returns the final training MSE.
    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[f64], lr: f64, epochs: usize) -> f64 {
        if features.is_empty() {
            return 0.0;
        }
        let count = features.len() as f64;
        for _ in 0..epochs {
            let error: Vec<f64> = self
                .predict(features)
                .iter()
                .zip(labels)
                .map(|(pred, label)| pred - label)
                .collect();

            for (idx, weight) in self.weights.iter_mut().enumerate() {
                let grad = error
                    .iter()
                    .zip(features)
                    .map(|(err, sample)| err * sample[idx])
                    .sum::<f64>()
                    / count;
                *weight -= lr * grad;
            }
            self.bias -= lr * error.iter().sum::<f64>() / count;
        }
        mean_squared_error(&self.predict(features), labels)
    }
}

/// Assigns each sample to the class with the closest mean feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroidClassifier {
    classes: Vec<String>,
    centroids: Vec<Vec<f64>>,
}

impl NearestCentroidClassifier {
    /// Fits class centroids. Classes keep first-seen order.
    #[must_use]
    pub fn fit(features: &[Vec<f64>], labels: &[String]) -> Self {
        let dim = features.first().map_or(0, Vec::len);
        let mut classes: Vec<String> = Vec::new();
        let mut sums: Vec<Vec<f64>> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for (sample, label) in features.iter().zip(labels) {
            let idx = if let Some(idx) = classes.iter().position(|class| class == label) {
                idx
            } else {
                classes.push(label.clone());
                sums.push(vec![0.0; dim]);
                counts.push(0);
                classes.len() - 1
            };
            for (acc, value) in sums[idx].iter_mut().zip(sample) {
                *acc += value;
            }
            counts[idx] += 1;
        }
        let centroids = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| sum.into_iter().map(|value| value / count as f64).collect())
            .collect();
        Self { classes, centroids }
    }

    /// Predicts one sample. `None` only when no class was fitted.
    #[must_use]
    pub fn predict_one(&self, sample: &[f64]) -> Option<&str> {
        self.centroids
            .iter()
            .map(|centroid| {
                centroid
                    .iter()
                    .zip(sample)
                    .map(|(c, x)| (c - x).powi(2))
                    .sum::<f64>()
            })
            .enumerate()
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| self.classes[idx].as_str())
    }

    /// Known classes.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Share of matching labels.
#[must_use]
pub fn accuracy(predictions: &[String], labels: &[String]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    let hits = predictions
        .iter()
        .zip(labels)
        .filter(|(pred, label)| pred == label)
        .count();
    hits as f64 / predictions.len() as f64
}

/// Mean squared error.
#[must_use]
pub fn mean_squared_error(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (pred - label).powi(2))
        .sum::<f64>()
        / predictions.len() as f64
}

/// Mean absolute error.
#[must_use]
pub fn mean_absolute_error(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (pred - label).abs())
        .sum::<f64>()
        / predictions.len() as f64
}

/// Coefficient of determination; 0 when the labels have no variance.
#[must_use]
pub fn r2_score(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    let mean = labels.iter().sum::<f64>() / labels.len() as f64;
    let total: f64 = labels.iter().map(|label| (label - mean).powi(2)).sum();
    if total <= f64::EPSILON {
        return 0.0;
    }
    let residual: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(pred, label)| (label - pred).powi(2))
        .sum();
    1.0 - residual / total
}

/// Persisted state of a standardized nearest-centroid classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierState {
    /// Input columns, in model order.
    pub inputs: Vec<String>,
    /// Input scaling.
    pub scaler: Standardizer,
    /// Fitted classifier.
    pub model: NearestCentroidClassifier,
}

impl ClassifierState {
    /// Fits on labelled samples and reports held-out metrics.
    pub fn fit(
        inputs: &[&str],
        samples: &[Vec<Option<f64>>],
        labels: &[String],
    ) -> anyhow::Result<(Self, TrainingMetrics)> {
        ensure!(
            samples.len() >= MIN_TRAINING_ROWS,
            "need at least {MIN_TRAINING_ROWS} labelled rows, found {}",
            samples.len()
        );
        let indices: Vec<usize> = (0..samples.len()).collect();
        let (train_idx, test_idx) = train_test_split(&indices, TEST_RATIO, SPLIT_SEED);
        let pick_x = |idx: &[usize]| idx.iter().map(|&i| samples[i].clone()).collect::<Vec<_>>();
        let pick_y = |idx: &[usize]| idx.iter().map(|&i| labels[i].clone()).collect::<Vec<_>>();

        let train_x = pick_x(train_idx.as_slice());
        let scaler = Standardizer::fit(&train_x);
        let model = NearestCentroidClassifier::fit(
            &scaler.transform_all(&train_x),
            &pick_y(train_idx.as_slice()),
        );
        let state = Self {
            inputs: inputs.iter().map(ToString::to_string).collect(),
            scaler,
            model,
        };

        let eval_idx: &[usize] = if test_idx.is_empty() { &train_idx } else { &test_idx };
        let predicted: Vec<String> = pick_x(eval_idx)
            .iter()
            .map(|sample| state.predict(sample).unwrap_or_default())
            .collect();
        let mut metrics = TrainingMetrics::new();
        metrics.insert("accuracy".into(), json!(accuracy(&predicted, &pick_y(eval_idx))));
        metrics.insert("n_train".into(), json!(train_idx.len()));
        metrics.insert("n_test".into(), json!(test_idx.len()));
        metrics.insert("classes".into(), json!(state.model.classes()));
        Ok((state, metrics))
    }

    /// Predicts a label for raw (unscaled) inputs.
    #[must_use]
    pub fn predict(&self, sample: &[Option<f64>]) -> Option<String> {
        self.model
            .predict_one(&self.scaler.transform(sample))
            .map(ToString::to_string)
    }
}

/// Persisted state of a standardized linear regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorState {
    /// Input columns, in model order.
    pub inputs: Vec<String>,
    /// Input scaling.
    pub scaler: Standardizer,
    /// Fitted regressor.
    pub model: LinearRegressionModel,
}

impl RegressorState {
    /// Fits on labelled samples and reports held-out metrics.
    pub fn fit(
        inputs: &[&str],
        samples: &[Vec<Option<f64>>],
        targets: &[f64],
    ) -> anyhow::Result<(Self, TrainingMetrics)> {
        ensure!(
            samples.len() >= MIN_TRAINING_ROWS,
            "need at least {MIN_TRAINING_ROWS} labelled rows, found {}",
            samples.len()
        );
        let indices: Vec<usize> = (0..samples.len()).collect();
        let (train_idx, test_idx) = train_test_split(&indices, TEST_RATIO, SPLIT_SEED);
        let pick_x = |idx: &[usize]| idx.iter().map(|&i| samples[i].clone()).collect::<Vec<_>>();
        let pick_y = |idx: &[usize]| idx.iter().map(|&i| targets[i]).collect::<Vec<_>>();

        let train_x = pick_x(train_idx.as_slice());
        let scaler = Standardizer::fit(&train_x);
        let mut model = LinearRegressionModel::new(scaler.dim());
        model.fit(
            &scaler.transform_all(&train_x),
            &pick_y(train_idx.as_slice()),
            REGRESSION_LR,
            REGRESSION_EPOCHS,
        );
        let state = Self {
            inputs: inputs.iter().map(ToString::to_string).collect(),
            scaler,
            model,
        };

        let eval_idx: &[usize] = if test_idx.is_empty() { &train_idx } else { &test_idx };
        let predicted: Vec<f64> = pick_x(eval_idx)
            .iter()
            .map(|sample| state.predict(sample))
            .collect();
        let actual = pick_y(eval_idx);
        let mut metrics = TrainingMetrics::new();
        metrics.insert("mse".into(), json!(mean_squared_error(&predicted, &actual)));
        metrics.insert("mae".into(), json!(mean_absolute_error(&predicted, &actual)));
        metrics.insert("r2".into(), json!(r2_score(&predicted, &actual)));
        metrics.insert("n_train".into(), json!(train_idx.len()));
        metrics.insert("n_test".into(), json!(test_idx.len()));
        Ok((state, metrics))
    }

    /// Predicts a value for raw (unscaled) inputs.
    #[must_use]
    pub fn predict(&self, sample: &[Option<f64>]) -> f64 {
        self.model.predict_one(&self.scaler.transform(sample))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizer_imputes_missing_with_mean() {
        let samples = vec![vec![Some(1.0), None], vec![Some(3.0), Some(4.0)]];
        let scaler = Standardizer::fit(&samples);
        assert_eq!(scaler.dim(), 2);
        let scaled = scaler.transform(&[None, Some(4.0)]);
        assert!(scaled[0].abs() < 1e-9);
        assert!(scaled[1].abs() < 1e-9);
    }

    #[test]
    fn split_is_deterministic_and_keeps_training_rows() {
        let samples: Vec<u32> = (0..10).collect();
        let (train, test) = train_test_split(&samples, 0.2, SPLIT_SEED);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert_eq!(train_test_split(&samples, 0.2, SPLIT_SEED), (train, test));

        let (train, test) = train_test_split(&[7_u32], 0.2, SPLIT_SEED);
        assert_eq!(train, vec![7]);
        assert!(test.is_empty());
    }

    #[test]
    fn linear_model_learns_a_line() {
        let features: Vec<Vec<f64>> = (0..20).map(|x| vec![f64::from(x) / 10.0]).collect();
        let labels: Vec<f64> = features.iter().map(|x| 3.0 * x[0] + 1.0).collect();
        let mut model = LinearRegressionModel::new(1);
        let mse = model.fit(&features, &labels, 0.1, 2_000);
        assert!(mse < 1e-3, "mse {mse}");
        assert!((model.predict_one(&[1.0]) - 4.0).abs() < 0.05);
    }

    #[test]
    fn centroid_classifier_separates_clusters() {
        let features = vec![vec![0.0, 0.1], vec![0.2, 0.0], vec![5.0, 5.1], vec![4.9, 5.0]];
        let labels: Vec<String> = ["low", "low", "high", "high"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let model = NearestCentroidClassifier::fit(&features, &labels);
        assert_eq!(model.classes(), &["low", "high"]);
        assert_eq!(model.predict_one(&[4.0, 4.0]), Some("high"));
        assert_eq!(model.predict_one(&[0.5, 0.5]), Some("low"));
    }

    #[test]
    fn scores_handle_edge_inputs() {
        assert!((mean_squared_error(&[1.0, 2.0], &[1.0, 1.5]) - 0.125).abs() < 1e-9);
        assert!((mean_absolute_error(&[1.0, 2.0], &[1.0, 1.5]) - 0.25).abs() < 1e-9);
        assert_eq!(r2_score(&[1.0, 1.0], &[2.0, 2.0]), 0.0);
        let labels = vec!["a".to_string(), "b".to_string()];
        assert!((accuracy(&labels, &labels) - 1.0).abs() < 1e-9);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }
}
