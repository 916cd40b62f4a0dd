//! Random forest regression with marginal attributions.
//!
//! Attribution-based steps need, for each observed configuration and each
//! parameter, an estimate of how much that parameter's value moved the
//! objective away from the average. The forest here is a plain variance-
//! reduction regression forest; the attribution of feature `j` at row `i`
//! is the forest's marginal prediction over `j` alone, minus the global
//! target mean. Under minimization a negative attribution means the value
//! was beneficial.

/// Forest hyperparameters.
#[derive(Clone, Debug)]
pub struct ForestConfig {
    /// Number of bootstrap trees.
    pub n_trees: usize,
    /// Maximum tree depth. `None` for unlimited.
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node.
    pub min_samples_split: usize,
    /// Minimum samples required in a leaf.
    pub min_samples_leaf: usize,
    /// Seed for bootstrap and feature subsampling.
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
    },
}

/// An arena-allocated regression tree.
#[derive(Clone, Debug)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        config: &ForestConfig,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(rows, targets, indices, 0, config, rng);
        tree
    }

    fn push_leaf(&mut self, value: f64, n_samples: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value, n_samples });
        idx
    }

    #[allow(clippy::cast_precision_loss)]
    fn grow(
        &mut self,
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        config: &ForestConfig,
        rng: &mut fastrand::Rng,
    ) -> usize {
        let n = indices.len();
        let mean = indices.iter().map(|&i| targets[i]).sum::<f64>() / n as f64;

        if n < config.min_samples_split || config.max_depth.is_some_and(|d| depth >= d) {
            return self.push_leaf(mean, n);
        }

        let total_var: f64 = indices.iter().map(|&i| (targets[i] - mean).powi(2)).sum();
        if total_var <= f64::EPSILON {
            return self.push_leaf(mean, n);
        }

        let n_features = rows[0].len();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let max_features = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features);
        let candidates = subsample_features(n_features, max_features, rng);

        let mut best_score = f64::NEG_INFINITY;
        let mut best_feature = 0;
        let mut best_threshold = 0.0;

        for &feat in &candidates {
            let mut values: Vec<f64> = indices.iter().map(|&i| rows[i][feat]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            if values.len() < 2 {
                continue;
            }
            for pair in values.windows(2) {
                let threshold = f64::midpoint(pair[0], pair[1]);
                let (l_sum, l_sq, l_n, r_sum, r_sq, r_n) =
                    split_stats(rows, targets, indices, feat, threshold);
                if l_n < config.min_samples_leaf || r_n < config.min_samples_leaf {
                    continue;
                }
                let l_var = l_sq - l_sum * l_sum / l_n as f64;
                let r_var = r_sq - r_sum * r_sum / r_n as f64;
                let score = total_var - l_var - r_var;
                if score > best_score {
                    best_score = score;
                    best_feature = feat;
                    best_threshold = threshold;
                }
            }
        }

        if best_score <= 0.0 {
            return self.push_leaf(mean, n);
        }

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| rows[i][best_feature] <= best_threshold);
        if left_indices.is_empty() || right_indices.is_empty() {
            return self.push_leaf(mean, n);
        }

        // Reserve a slot; children are built before the split is written.
        let node_idx = self.push_leaf(0.0, 0);
        let left = self.grow(rows, targets, &left_indices, depth + 1, config, rng);
        let right = self.grow(rows, targets, &right_indices, depth + 1, config, rng);
        self.nodes[node_idx] = Node::Split {
            feature: best_feature,
            threshold: best_threshold,
            left,
            right,
            n_samples: n,
        };
        node_idx
    }

    /// Prediction with every feature except `feature` marginalized out by
    /// weighting branches in proportion to their training fractions.
    fn marginal_predict(&self, feature: usize, value: f64) -> f64 {
        self.marginal_at(0, feature, value)
    }

    #[allow(clippy::cast_precision_loss)]
    fn marginal_at(&self, idx: usize, target_feature: usize, value: f64) -> f64 {
        match self.nodes[idx] {
            Node::Leaf { value, .. } => value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
                n_samples,
            } => {
                if feature == target_feature {
                    if value <= threshold {
                        self.marginal_at(left, target_feature, value)
                    } else {
                        self.marginal_at(right, target_feature, value)
                    }
                } else {
                    let l_n = self.node_samples(left) as f64;
                    let r_n = self.node_samples(right) as f64;
                    let total = n_samples as f64;
                    (l_n / total) * self.marginal_at(left, target_feature, value)
                        + (r_n / total) * self.marginal_at(right, target_feature, value)
                }
            }
        }
    }

    fn node_samples(&self, idx: usize) -> usize {
        match self.nodes[idx] {
            Node::Leaf { n_samples, .. } | Node::Split { n_samples, .. } => n_samples,
        }
    }
}

fn subsample_features(n: usize, k: usize, rng: &mut fastrand::Rng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let k = k.min(n);
    for i in 0..k {
        let j = rng.usize(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

#[allow(clippy::cast_precision_loss)]
fn split_stats(
    rows: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    feature: usize,
    threshold: f64,
) -> (f64, f64, usize, f64, f64, usize) {
    let (mut l_sum, mut l_sq, mut l_n) = (0.0, 0.0, 0usize);
    let (mut r_sum, mut r_sq, mut r_n) = (0.0, 0.0, 0usize);
    for &i in indices {
        let y = targets[i];
        if rows[i][feature] <= threshold {
            l_sum += y;
            l_sq += y * y;
            l_n += 1;
        } else {
            r_sum += y;
            r_sq += y * y;
            r_n += 1;
        }
    }
    (l_sum, l_sq, l_n, r_sum, r_sq, r_n)
}

/// A fitted bootstrap forest over a fixed training matrix.
#[derive(Clone, Debug)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    target_mean: f64,
    n_features: usize,
}

impl RandomForest {
    /// Fits a forest to the given rows and targets.
    ///
    /// Returns `None` when there is nothing to fit: no rows, or rows with
    /// no columns.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], config: &ForestConfig) -> Option<Self> {
        if rows.is_empty() || rows[0].is_empty() || rows.len() != targets.len() {
            return None;
        }
        let n_samples = rows.len();
        let mut rng = fastrand::Rng::with_seed(config.seed);
        let trees: Vec<RegressionTree> = (0..config.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.usize(0..n_samples)).collect();
                RegressionTree::fit(rows, targets, &bootstrap, config, &mut rng)
            })
            .collect();
        let target_mean = targets.iter().sum::<f64>() / n_samples as f64;
        Some(Self {
            trees,
            target_mean,
            n_features: rows[0].len(),
        })
    }

    /// The global mean of the training targets.
    #[must_use]
    pub fn target_mean(&self) -> f64 {
        self.target_mean
    }

    /// The number of features the forest was fitted on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// The marginal effect of feature `feature` taking value `value`,
    /// relative to the mean objective.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn attribution(&self, feature: usize, value: f64) -> f64 {
        let marginal = self
            .trees
            .iter()
            .map(|t| t.marginal_predict(feature, value))
            .sum::<f64>()
            / self.trees.len() as f64;
        marginal - self.target_mean
    }

    /// Per-row, per-feature attributions: `out[i][j]` is the marginal
    /// effect of row `i`'s value of feature `j`.
    #[must_use]
    pub fn attributions(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                (0..self.n_features)
                    .map(|j| self.attribution(j, row[j]))
                    .collect()
            })
            .collect()
    }

    /// Per-feature importance scores over the given rows.
    ///
    /// Scores are the negated mean absolute attribution, so more important
    /// features score lower.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn importances(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        if rows.is_empty() {
            return vec![0.0; self.n_features];
        }
        let attributions = self.attributions(rows);
        (0..self.n_features)
            .map(|j| {
                let mean_abs = attributions.iter().map(|a| a[j].abs()).sum::<f64>()
                    / attributions.len() as f64;
                -mean_abs
            })
            .collect()
    }
}
