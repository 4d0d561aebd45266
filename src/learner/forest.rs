//! Random forest meta-learner
//!
//! Bagged CART trees with Gini impurity and a random feature subset per split
//! (`sqrt(#features)`, at least one). Bootstrap rows and feature subsets are
//! drawn from a single seeded PCG stream, so the same table and params always
//! yield the same forest.
//!
//! Missing feature values (NaN) always route to the left child.

use super::{argmax, class_labels, feature_columns, Learner, Model};
use crate::table::MetaTable;
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// Forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees
    pub num_trees: usize,
    /// Maximum tree depth (`None` grows until pure)
    pub max_depth: Option<usize>,
    /// Minimum rows needed to split a node
    pub min_samples_split: usize,
    /// Seed of the sampling stream
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            num_trees: 10,
            max_depth: None,
            min_samples_split: 2,
            seed: 1,
        }
    }
}

impl ForestParams {
    /// Set the number of trees
    #[must_use]
    pub const fn num_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = num_trees;
        self
    }

    /// Limit tree depth
    #[must_use]
    pub const fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Set the minimum rows needed to split a node
    #[must_use]
    pub const fn min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the sampling seed
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Random forest learner
#[derive(Debug, Clone, Default)]
pub struct RandomForest {
    params: ForestParams,
}

impl RandomForest {
    /// Create a forest learner
    #[must_use]
    pub const fn new(params: ForestParams) -> Self {
        Self { params }
    }

    /// Hyperparameters
    #[must_use]
    pub const fn params(&self) -> &ForestParams {
        &self.params
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, values: &[f64]) -> usize {
        let mut node = 0;
        loop {
            match self.nodes[node] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if goes_left(values[feature], threshold) {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn goes_left(value: f64, threshold: f64) -> bool {
    !(value > threshold)
}

/// Training matrix, column-major
struct Samples<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [usize],
    num_classes: usize,
}

struct Grower<'a, R: Rng> {
    samples: Samples<'a>,
    params: ForestParams,
    per_split: usize,
    rng: &'a mut R,
    nodes: Vec<Node>,
}

impl<R: Rng> Grower<'_, R> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&rows);
        let majority = argmax(&counts);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_deep = self.params.max_depth.is_some_and(|max| depth >= max);

        if pure || too_deep || rows.len() < self.params.min_samples_split.max(2) {
            return self.push(Node::Leaf { class: majority });
        }

        let Some((feature, threshold)) = self.best_split(&rows, &counts) else {
            return self.push(Node::Leaf { class: majority });
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| goes_left(self.samples.features[feature][r], threshold));
        if left_rows.is_empty() || right_rows.is_empty() {
            return self.push(Node::Leaf { class: majority });
        }

        let index = self.push(Node::Leaf { class: majority });
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.samples.num_classes];
        for &r in rows {
            counts[self.samples.labels[r]] += 1;
        }
        counts
    }

    #[allow(clippy::cast_precision_loss)]
    fn best_split(&mut self, rows: &[usize], counts: &[usize]) -> Option<(usize, f64)> {
        let mut candidates: Vec<usize> = (0..self.samples.features.len()).collect();
        candidates.shuffle(&mut *self.rng);
        candidates.truncate(self.per_split);

        let total = rows.len() as f64;
        let parent = gini(counts, rows.len());
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in candidates {
            let column = &self.samples.features[feature];
            let mut sorted: Vec<(f64, usize)> = rows
                .iter()
                .map(|&r| {
                    let v = column[r];
                    (if v.is_nan() { f64::NEG_INFINITY } else { v }, self.samples.labels[r])
                })
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0; self.samples.num_classes];
            let mut right = counts.to_vec();
            for i in 0..sorted.len() - 1 {
                let (value, label) = sorted[i];
                left[label] += 1;
                right[label] -= 1;
                let next = sorted[i + 1].0;
                if next <= value {
                    continue;
                }
                let n_left = i + 1;
                let n_right = sorted.len() - n_left;
                let impurity = (n_left as f64 / total) * gini(&left, n_left)
                    + (n_right as f64 / total) * gini(&right, n_right);
                let gain = parent - impurity;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    let threshold = if value == f64::NEG_INFINITY {
                        f64::MIN
                    } else {
                        value + (next - value) / 2.0
                    };
                    best = Some((feature, threshold, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

#[allow(clippy::cast_precision_loss)]
fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

struct Forest {
    features: Vec<usize>,
    num_columns: usize,
    num_classes: usize,
    trees: Vec<Tree>,
}

impl Model for Forest {
    fn predict(&self, table: &MetaTable, row: usize) -> Result<usize> {
        if table.num_columns() != self.num_columns {
            return Err(Error::Learner(format!(
                "table `{}` has {} columns, forest was trained on {}",
                table.name(),
                table.num_columns(),
                self.num_columns
            )));
        }
        let values = self
            .features
            .iter()
            .map(|&c| table.numeric(row, c))
            .collect::<Result<Vec<f64>>>()
            .map_err(|e| Error::Learner(e.to_string()))?;

        let mut votes = vec![0; self.num_classes];
        for tree in &self.trees {
            votes[tree.predict(&values)] += 1;
        }
        Ok(argmax(&votes))
    }
}

impl Learner for RandomForest {
    fn name(&self) -> &str {
        "random-forest"
    }

    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_sign_loss)]
    fn train(&self, table: &MetaTable, class: usize) -> Result<Box<dyn Model>> {
        if self.params.num_trees == 0 {
            return Err(Error::Learner("forest needs at least one tree".to_string()));
        }
        let (num_classes, labels) = class_labels(table, class)?;
        let features = feature_columns(table, class);
        let matrix = features
            .iter()
            .map(|&c| {
                (0..table.num_rows())
                    .map(|r| table.numeric(r, c))
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<Vec<f64>>>>()
            .map_err(|e| Error::Learner(e.to_string()))?;

        let per_split = ((features.len() as f64).sqrt().floor() as usize).max(1);
        let mut rng = Pcg64::seed_from_u64(self.params.seed);
        let n = table.num_rows();
        let mut trees = Vec::with_capacity(self.params.num_trees);
        for _ in 0..self.params.num_trees {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut grower = Grower {
                samples: Samples {
                    features: &matrix,
                    labels: &labels,
                    num_classes,
                },
                params: self.params,
                per_split,
                rng: &mut rng,
                nodes: Vec::new(),
            };
            grower.grow(bootstrap, 0);
            trees.push(Tree {
                nodes: grower.nodes,
            });
        }

        Ok(Box::new(Forest {
            features,
            num_columns: table.num_columns(),
            num_classes,
            trees,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> MetaTable {
        let x: Vec<f64> = (0..40).map(f64::from).collect();
        let labels: Vec<&str> = (0..40).map(|i| if i < 20 { "low" } else { "high" }).collect();
        MetaTable::builder("t")
            .numeric("x", x)
            .categorical("class", ["low", "high"], labels)
            .build()
            .unwrap()
    }

    #[test]
    fn test_learns_separable_threshold() {
        let table = separable();
        let model = RandomForest::new(ForestParams::default().num_trees(15))
            .train(&table, 1)
            .unwrap();
        assert_eq!(model.predict(&table, 0).unwrap(), 0);
        assert_eq!(model.predict(&table, 39).unwrap(), 1);
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let table = separable();
        let a = RandomForest::new(ForestParams::default().seed(7)).train(&table, 1).unwrap();
        let b = RandomForest::new(ForestParams::default().seed(7)).train(&table, 1).unwrap();
        for row in 0..table.num_rows() {
            assert_eq!(a.predict(&table, row).unwrap(), b.predict(&table, row).unwrap());
        }
    }

    #[test]
    fn test_no_features_falls_back_to_majority() {
        let table = MetaTable::builder("t")
            .categorical("class", ["a", "b"], ["b", "b", "a"])
            .build()
            .unwrap();
        let model = RandomForest::default().train(&table, 0).unwrap();
        // every bootstrap leaf is a majority leaf; "b" dominates
        let prediction = model.predict(&table, 0).unwrap();
        assert!(prediction < 2);
    }

    #[test]
    fn test_nan_goes_left() {
        assert!(goes_left(f64::NAN, 0.5));
        assert!(goes_left(0.5, 0.5));
        assert!(!goes_left(0.6, 0.5));
    }

    #[test]
    fn test_gini() {
        assert!(gini(&[5, 0], 5).abs() < f64::EPSILON);
        assert!((gini(&[1, 1], 2) - 0.5).abs() < f64::EPSILON);
        assert!(gini(&[], 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_trees_rejected() {
        let table = separable();
        let result = RandomForest::new(ForestParams::default().num_trees(0)).train(&table, 1);
        assert!(matches!(result, Err(Error::Learner(_))));
    }

    #[test]
    fn test_predict_on_foreign_schema_fails() {
        let table = separable();
        let model = RandomForest::default().train(&table, 1).unwrap();
        let other = MetaTable::builder("o")
            .numeric("x", vec![1.0])
            .numeric("y", vec![1.0])
            .categorical("class", ["low", "high"], ["low"])
            .build()
            .unwrap();
        assert!(model.predict(&other, 0).is_err());
    }
}
