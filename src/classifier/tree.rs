//! Gradient boosted regression trees loaded from an XGBoost JSON model

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use super::Scorer;
use crate::error::ModelError;

/// Objectives whose prediction is the raw margin
const IDENTITY_OBJECTIVES: [&str; 4] = [
    "reg:squarederror",
    "reg:linear",
    "reg:pseudohubererror",
    "reg:absoluteerror",
];

#[derive(Debug, Deserialize)]
struct ModelFile {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    learner_model_param: LearnerModelParam,
    gradient_booster: GradientBooster,
    objective: Objective,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    num_feature: String,
}

#[derive(Debug, Deserialize)]
struct Objective {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GradientBooster {
    name: String,
    #[serde(default)]
    model: Option<BoosterModel>,
}

#[derive(Debug, Deserialize)]
struct BoosterModel {
    trees: Vec<TreeFile>,
}

#[derive(Debug, Deserialize)]
struct TreeFile {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
}

/// `default_left` is written as 0/1 by some XGBoost versions and as booleans
/// by others
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(u8),
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f32),
}

/// One regression tree, nodes indexed from the root at 0
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_file(index: usize, tree: TreeFile, num_feature: usize) -> Result<Self, ModelError> {
        let n = tree.left_children.len();
        if n == 0
            || tree.right_children.len() != n
            || tree.split_indices.len() != n
            || tree.split_conditions.len() != n
            || tree.default_left.len() != n
        {
            return Err(ModelError::ModelLoad(format!(
                "tree {} has inconsistent node arrays",
                index
            )));
        }

        let child = |c: i32, node: usize| -> Result<usize, ModelError> {
            match usize::try_from(c) {
                Ok(c) if c != node && c < n => Ok(c),
                _ => Err(ModelError::ModelLoad(format!(
                    "tree {} node {} has invalid child {}",
                    index, node, c
                ))),
            }
        };

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let left = tree.left_children[i];
            if left == -1 {
                nodes.push(Node::Leaf(tree.split_conditions[i]));
                continue;
            }

            let feature = tree.split_indices[i] as usize;
            if feature >= num_feature {
                return Err(ModelError::ModelLoad(format!(
                    "tree {} node {} splits on feature {} of {}",
                    index, i, feature, num_feature
                )));
            }

            nodes.push(Node::Split {
                feature,
                threshold: tree.split_conditions[i],
                left: child(left, i)?,
                right: child(tree.right_children[i], i)?,
                default_left: tree.default_left[i].is_set(),
            });
        }

        let tree = Self { nodes };
        tree.check_is_tree(index)?;
        Ok(tree)
    }

    /// Every node reachable from the root must be reached exactly once,
    /// otherwise a walk could loop forever
    fn check_is_tree(&self, index: usize) -> Result<(), ModelError> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut visited[idx], true) {
                return Err(ModelError::ModelLoad(format!(
                    "tree {} node {} is reachable more than once",
                    index, idx
                )));
            }
            if let Node::Split { left, right, .. } = self.nodes[idx] {
                stack.push(left);
                stack.push(right);
            }
        }
        Ok(())
    }

    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = features[feature];
                    idx = if x.is_nan() {
                        if default_left {
                            left
                        } else {
                            right
                        }
                    } else if x < threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Regression tree ensemble: `base_score + sum(leaf values)`
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    base_score: f32,
    num_feature: usize,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    /// Parse an XGBoost JSON model (`Booster.save_model("model.json")`)
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let file: ModelFile =
            serde_json::from_str(json).map_err(|e| ModelError::ModelLoad(e.to_string()))?;
        let learner = file.learner;

        if !IDENTITY_OBJECTIVES.contains(&learner.objective.name.as_str()) {
            return Err(ModelError::Unsupported(format!(
                "objective {}",
                learner.objective.name
            )));
        }
        if learner.gradient_booster.name != "gbtree" {
            return Err(ModelError::Unsupported(format!(
                "booster {}",
                learner.gradient_booster.name
            )));
        }

        let base_score = parse_param::<f32>("base_score", &learner.learner_model_param.base_score)?;
        let num_feature =
            parse_param::<usize>("num_feature", &learner.learner_model_param.num_feature)?;
        if num_feature == 0 {
            return Err(ModelError::ModelLoad("model declares zero features".to_string()));
        }

        let booster = learner
            .gradient_booster
            .model
            .ok_or_else(|| ModelError::ModelLoad("gbtree model section missing".to_string()))?;

        let trees = booster
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| Tree::from_file(i, tree, num_feature))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Parsed tree ensemble: {} trees, {} features, base_score={}",
            trees.len(),
            num_feature,
            base_score
        );

        Ok(Self {
            base_score,
            num_feature,
            trees,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Scorer for TreeEnsemble {
    fn input_width(&self) -> usize {
        self.num_feature
    }

    fn score(&self, features: &[f32]) -> Result<f64, ModelError> {
        if features.len() != self.num_feature {
            return Err(ModelError::Scoring(format!(
                "expected {} features, got {}",
                self.num_feature,
                features.len()
            )));
        }

        let margin = self
            .trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.leaf_value(features));
        Ok(margin as f64)
    }
}

/// Numeric model parameters are stored as strings, newer versions wrap them
/// in brackets (`"[5E-1]"`)
fn parse_param<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ModelError> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .parse()
        .map_err(|_| ModelError::ModelLoad(format!("invalid {}: {:?}", name, raw)))
}

/// Load the regressor from disk
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<TreeEnsemble, ModelError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ModelError::ModelNotFound(path.display().to_string()));
    }

    info!("Loading model from: {}", path.display());

    let json = std::fs::read_to_string(path)
        .map_err(|e| ModelError::ModelLoad(format!("{}: {}", path.display(), e)))?;
    let model = TreeEnsemble::from_json(&json)?;

    info!(
        "Model loaded: {} trees, {} input features",
        model.num_trees(),
        model.input_width()
    );

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two stumps on features 0 and 1 plus base score 0.5
    const MODEL: &str = r#"{
        "learner": {
            "learner_model_param": {"base_score": "5E-1", "num_feature": "2", "num_class": "0"},
            "objective": {"name": "reg:squarederror", "reg_loss_param": {"scale_pos_weight": "1"}},
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": {"num_trees": "2"},
                    "trees": [
                        {
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [0, 0, 0],
                            "split_conditions": [0.0, -1.0, 1.0],
                            "default_left": [1, 0, 0],
                            "base_weights": [0.0, -1.0, 1.0]
                        },
                        {
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [1, 0, 0],
                            "split_conditions": [10.0, 0.25, 2.0],
                            "default_left": [false, false, false]
                        }
                    ],
                    "tree_info": [0, 0]
                }
            }
        },
        "version": [2, 0, 3]
    }"#;

    #[test]
    fn test_sum_of_leaves() {
        let model = TreeEnsemble::from_json(MODEL).unwrap();
        assert_eq!(model.num_trees(), 2);
        assert_eq!(model.input_width(), 2);

        // x0 < 0 -> -1.0, x1 < 10 -> 0.25
        assert_eq!(model.score(&[-3.0, 5.0]).unwrap(), -0.25);
        // x0 >= 0 -> 1.0, x1 >= 10 -> 2.0
        assert_eq!(model.score(&[0.0, 10.0]).unwrap(), 3.5);
    }

    #[test]
    fn test_missing_follows_default() {
        let model = TreeEnsemble::from_json(MODEL).unwrap();
        // Tree 0 defaults left (-1.0), tree 1 defaults right (2.0)
        assert_eq!(model.score(&[f32::NAN, f32::NAN]).unwrap(), 1.5);
    }

    #[test]
    fn test_width_mismatch() {
        let model = TreeEnsemble::from_json(MODEL).unwrap();
        assert!(matches!(model.score(&[0.0]), Err(ModelError::Scoring(_))));
    }

    #[test]
    fn test_bracketed_params() {
        let json = MODEL.replace("\"5E-1\"", "\"[5E-1]\"");
        let model = TreeEnsemble::from_json(&json).unwrap();
        assert_eq!(model.score(&[-3.0, 5.0]).unwrap(), -0.25);
    }

    #[test]
    fn test_rejects_unsupported_objective() {
        let json = MODEL.replace("reg:squarederror", "binary:logistic");
        assert!(matches!(
            TreeEnsemble::from_json(&json),
            Err(ModelError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_bad_child() {
        let json = MODEL.replace("\"left_children\": [1, -1, -1]", "\"left_children\": [7, -1, -1]");
        assert!(matches!(
            TreeEnsemble::from_json(&json),
            Err(ModelError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_rejects_cycle() {
        let json = MODEL.replace(
            "\"left_children\": [1, -1, -1],\n                            \"right_children\": [2, -1, -1],\n                            \"split_indices\": [0, 0, 0]",
            "\"left_children\": [1, 0, -1],\n                            \"right_children\": [2, 2, -1],\n                            \"split_indices\": [0, 0, 0]",
        );
        assert_ne!(json, MODEL);
        assert!(matches!(
            TreeEnsemble::from_json(&json),
            Err(ModelError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_feature() {
        let json = MODEL.replace("\"split_indices\": [1, 0, 0]", "\"split_indices\": [5, 0, 0]");
        assert!(TreeEnsemble::from_json(&json).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_model("/nonexistent/model.json");
        assert!(matches!(result, Err(ModelError::ModelNotFound(_))));
    }
}
