// Classifier - pluggable supervised model used by the trainer
//
// The trainer only needs fit / predict / score over dense targets; any model
// that can be retrained from scratch on the cumulative dataset fits here.
// KnnClassifier is the default.

use crate::analysis::FeatureVector;
use crate::error::ClassifierError;

/// Supervised model over feature vectors with integer targets
pub trait Classifier: Send {
    /// Short name recorded in session summaries
    fn name(&self) -> &str;

    /// Replace the model with one fitted on `features` / `targets`
    fn fit(&mut self, features: &[FeatureVector], targets: &[usize]) -> Result<(), ClassifierError>;

    fn predict(&self, features: &[f32]) -> Result<usize, ClassifierError>;

    /// Fraction of `features` predicted as their target
    fn score(&self, features: &[FeatureVector], targets: &[usize]) -> Result<f32, ClassifierError> {
        if features.len() != targets.len() {
            return Err(ClassifierError::LengthMismatch {
                features: features.len(),
                targets: targets.len(),
            });
        }
        if features.is_empty() {
            return Err(ClassifierError::EmptyDataset);
        }

        let mut correct = 0usize;
        for (x, &y) in features.iter().zip(targets) {
            if self.predict(x)? == y {
                correct += 1;
            }
        }
        Ok(correct as f32 / features.len() as f32)
    }
}

/// k-nearest-neighbour vote over Euclidean distance
///
/// Ties between labels with equal votes go to the label whose closest member is
/// nearest.
pub struct KnnClassifier {
    k: usize,
    examples: Vec<FeatureVector>,
    targets: Vec<usize>,
}

impl KnnClassifier {
    pub const DEFAULT_NEIGHBORS: usize = 3;

    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            examples: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn neighbors(&self) -> usize {
        self.k
    }

    fn dimension(&self) -> Option<usize> {
        self.examples.first().map(Vec::len)
    }
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NEIGHBORS)
    }
}

impl Classifier for KnnClassifier {
    fn name(&self) -> &str {
        "KNN"
    }

    fn fit(&mut self, features: &[FeatureVector], targets: &[usize]) -> Result<(), ClassifierError> {
        if features.len() != targets.len() {
            return Err(ClassifierError::LengthMismatch {
                features: features.len(),
                targets: targets.len(),
            });
        }
        let Some(first) = features.first() else {
            return Err(ClassifierError::EmptyDataset);
        };
        let dimension = first.len();
        if let Some(bad) = features.iter().find(|x| x.len() != dimension) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.examples = features.to_vec();
        self.targets = targets.to_vec();
        Ok(())
    }

    fn predict(&self, features: &[f32]) -> Result<usize, ClassifierError> {
        let expected = self.dimension().ok_or(ClassifierError::NotFitted)?;
        if features.len() != expected {
            return Err(ClassifierError::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }

        let mut distances: Vec<(f32, usize)> = self
            .examples
            .iter()
            .zip(&self.targets)
            .map(|(example, &target)| (squared_distance(example, features), target))
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));

        // (target, votes, rank of nearest member)
        let mut tally: Vec<(usize, usize, usize)> = Vec::new();
        for (rank, &(_, target)) in distances.iter().take(self.k).enumerate() {
            match tally.iter_mut().find(|(t, _, _)| *t == target) {
                Some(entry) => entry.1 += 1,
                None => tally.push((target, 1, rank)),
            }
        }

        tally
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
            .map(|(target, _, _)| target)
            .ok_or(ClassifierError::NotFitted)
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters() -> (Vec<FeatureVector>, Vec<usize>) {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.2],
            vec![0.2, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 4.9],
            vec![4.8, 5.2],
        ];
        let targets = vec![0, 0, 0, 1, 1, 1];
        (features, targets)
    }

    #[test]
    fn test_predicts_nearest_cluster() {
        let (features, targets) = clusters();
        let mut knn = KnnClassifier::default();
        knn.fit(&features, &targets).unwrap();

        assert_eq!(knn.predict(&[0.05, 0.05]).unwrap(), 0);
        assert_eq!(knn.predict(&[4.9, 5.0]).unwrap(), 1);
        assert_eq!(knn.score(&features, &targets).unwrap(), 1.0);
    }

    #[test]
    fn test_tie_goes_to_nearest_label() {
        let mut knn = KnnClassifier::new(2);
        knn.fit(&[vec![0.0], vec![10.0]], &[0, 1]).unwrap();

        assert_eq!(knn.predict(&[3.0]).unwrap(), 0);
        assert_eq!(knn.predict(&[7.0]).unwrap(), 1);
    }

    #[test]
    fn test_k_larger_than_dataset() {
        let mut knn = KnnClassifier::new(10);
        knn.fit(&[vec![1.0], vec![1.1], vec![9.0]], &[4, 4, 2]).unwrap();
        assert_eq!(knn.predict(&[8.0]).unwrap(), 4);
    }

    #[test]
    fn test_predict_before_fit() {
        let knn = KnnClassifier::default();
        assert_eq!(knn.predict(&[1.0]), Err(ClassifierError::NotFitted));
    }

    #[test]
    fn test_fit_validation() {
        let mut knn = KnnClassifier::default();
        assert_eq!(knn.fit(&[], &[]), Err(ClassifierError::EmptyDataset));
        assert_eq!(
            knn.fit(&[vec![1.0]], &[0, 1]),
            Err(ClassifierError::LengthMismatch {
                features: 1,
                targets: 2
            })
        );
        assert_eq!(
            knn.fit(&[vec![1.0, 2.0], vec![1.0]], &[0, 1]),
            Err(ClassifierError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_predict_dimension_mismatch() {
        let (features, targets) = clusters();
        let mut knn = KnnClassifier::default();
        knn.fit(&features, &targets).unwrap();

        assert_eq!(
            knn.predict(&[1.0, 2.0, 3.0]),
            Err(ClassifierError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn test_score_partial_accuracy() {
        let (features, targets) = clusters();
        let mut knn = KnnClassifier::default();
        knn.fit(&features, &targets).unwrap();

        let probe = vec![vec![0.0, 0.1], vec![5.0, 5.1]];
        assert_eq!(knn.score(&probe, &[0, 0]).unwrap(), 0.5);
        assert_eq!(knn.score(&[], &[]), Err(ClassifierError::EmptyDataset));
    }
}
