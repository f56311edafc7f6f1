//! Distance-weighted k-nearest-neighbor regression over contiguous
//! numeric buffers.
//!
//! The training sets here are at most a few tens of thousands of points
//! in two or three dimensions, so neighbor selection is a brute-force
//! partial sort per query rather than a spatial index.

use crate::errors::DataProcessingError;

#[derive(Debug, Clone)]
pub struct KnnRegressor {
    n_neighbors: usize,
    dims: usize,
    /// Row-major training coordinates, `dims` values per point.
    points: Vec<f64>,
    targets: Vec<f64>,
}

impl KnnRegressor {
    pub fn fit(
        points: Vec<f64>,
        dims: usize,
        targets: Vec<f64>,
        n_neighbors: usize,
    ) -> Result<Self, DataProcessingError> {
        if targets.is_empty() {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some("KnnRegressor::fit got an empty training set".to_string()),
            });
        }
        if points.len() != targets.len() * dims {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: targets.len() * dims,
                other: points.len(),
                context: "KnnRegressor::fit coordinate buffer".to_string(),
            });
        }
        if n_neighbors == 0 || n_neighbors > targets.len() {
            return Err(DataProcessingError::NotEnoughNeighbors {
                requested: n_neighbors,
                available: targets.len(),
            });
        }
        Ok(Self {
            n_neighbors,
            dims,
            points,
            targets,
        })
    }

    pub fn num_points(&self) -> usize {
        self.targets.len()
    }

    /// Predicts the regression value at one query point.
    ///
    /// Neighbors are weighted by inverse distance. A query that lands
    /// exactly on training points is answered by the mean of the
    /// coincident points only, since their weight dominates everything
    /// else.
    pub fn predict_one(&self, query: &[f64]) -> f64 {
        debug_assert_eq!(query.len(), self.dims);
        let mut dists: Vec<(f64, usize)> = self
            .points
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(i, p)| {
                let d2: f64 = p
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (d2, i)
            })
            .collect();

        let k = self.n_neighbors;
        if k < dists.len() {
            dists.select_nth_unstable_by(k - 1, |a, b| a.0.partial_cmp(&b.0).unwrap());
        }
        let neighbors = &dists[..k];

        let mut exact_sum = 0.0;
        let mut exact_count = 0usize;
        for (d2, i) in neighbors {
            if *d2 == 0.0 {
                exact_sum += self.targets[*i];
                exact_count += 1;
            }
        }
        if exact_count > 0 {
            return exact_sum / exact_count as f64;
        }

        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for (d2, i) in neighbors {
            let w = 1.0 / d2.sqrt();
            weighted += w * self.targets[*i];
            weight_sum += w;
        }
        weighted / weight_sum
    }

    pub fn predict(&self, queries: &[f64]) -> Vec<f64> {
        queries
            .chunks_exact(self.dims)
            .map(|q| self.predict_one(q))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_rejects_too_few_points() {
        let err = KnnRegressor::fit(vec![1.0, 2.0], 1, vec![0.5, 0.6], 3);
        assert!(matches!(
            err,
            Err(DataProcessingError::NotEnoughNeighbors {
                requested: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_fit_rejects_mismatched_buffers() {
        let err = KnnRegressor::fit(vec![1.0, 2.0, 3.0], 2, vec![0.5, 0.6], 1);
        assert!(matches!(
            err,
            Err(DataProcessingError::ExpectedSlicesSameLength { .. })
        ));
    }

    #[test]
    fn test_exact_match_returns_training_value() {
        let points = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let knn = KnnRegressor::fit(points, 2, vec![5.0, 7.0, 9.0], 2).unwrap();
        assert_eq!(knn.predict_one(&[1.0, 0.0]), 7.0);
    }

    #[test]
    fn test_inverse_distance_weighting_pulls_toward_closer_point() {
        // Query at x = 0.25 between training points at 0 and 1.
        let knn = KnnRegressor::fit(vec![0.0, 1.0], 1, vec![0.0, 10.0], 2).unwrap();
        let pred = knn.predict_one(&[0.25]);
        // Weights 1/0.25 and 1/0.75 -> (0*4 + 10*4/3) / (4 + 4/3) = 2.5
        assert!((pred - 2.5).abs() < 1e-9);
        assert!(pred < 5.0);
    }

    #[test]
    fn test_constant_targets_predict_constant() {
        let points: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let targets = vec![4.2; 50];
        let knn = KnnRegressor::fit(points, 1, targets, 10).unwrap();
        for q in [0.5, 12.3, 49.0, 25.0] {
            assert!((knn.predict_one(&[q]) - 4.2).abs() < 1e-9);
        }
    }
}
