//! Validation dataset access: one CSV with a header row, feature columns
//! first and the class label in the last column.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seed used for the calibration sample.
pub const CALIBRATION_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("validation dataset not found at {0}")]
    NotFound(String),

    #[error("malformed validation dataset: {0}")]
    Malformed(String),

    #[error("validation dataset has no rows")]
    Empty,

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// One feature row and its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features: Vec<f64>,
    pub label: String,
}

impl Sample {
    /// Proof input document for this row, carrying the label alongside.
    pub fn input_document(&self) -> serde_json::Value {
        serde_json::json!({ "input_data": [&self.features], "label": &self.label })
    }
}

/// Feature rows with labels, in file order.
#[derive(Debug, Clone)]
pub struct ValidationDataset {
    rows: Vec<Sample>,
}

impl ValidationDataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        if !path.is_file() {
            return Err(DatasetError::NotFound(path.display().to_string()));
        }
        let file = std::fs::File::open(path)
            .map_err(|e| DatasetError::Malformed(format!("{}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = csv.headers()?.len();
        if columns < 2 {
            return Err(DatasetError::Malformed(format!(
                "expected at least one feature column and a label column, found {columns} column(s)"
            )));
        }

        let mut rows = Vec::new();
        for (i, record) in csv.records().enumerate() {
            let record = record?;
            let line = i + 2;
            let (label, features) = match record.iter().collect::<Vec<_>>().split_last() {
                Some((label, features)) => (label.to_string(), features.to_vec()),
                None => continue,
            };
            let features = features
                .iter()
                .map(|v| {
                    v.parse::<f64>().map_err(|_| {
                        DatasetError::Malformed(format!("line {line}: {v:?} is not a number"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(Sample { features, label });
        }

        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Sample] {
        &self.rows
    }

    /// Distinct labels in sorted order mapped to their position.
    pub fn label_index(&self) -> HashMap<String, usize> {
        sorted_labels(self.rows.iter().map(|r| r.label.as_str()))
            .into_iter()
            .enumerate()
            .map(|(i, label)| (label, i))
            .collect()
    }

    /// One row chosen uniformly at random.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> &Sample {
        &self.rows[rng.gen_range(0..self.rows.len())]
    }

    /// `min(n, len)` distinct rows drawn with a fixed seed, so repeated runs
    /// over the same dataset calibrate against the same data.
    pub fn calibration_rows(&self, n: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let amount = n.min(self.rows.len());
        rand::seq::index::sample(&mut rng, self.rows.len(), amount)
            .into_iter()
            .map(|i| self.rows[i].features.clone())
            .collect()
    }
}

/// Sort distinct labels: numerically when every label is a number,
/// lexicographically otherwise.
pub fn sorted_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut distinct: Vec<String> = labels.into_iter().map(str::to_string).collect();
    distinct.sort();
    distinct.dedup();

    let numeric: Option<Vec<f64>> = distinct.iter().map(|l| l.parse::<f64>().ok()).collect();
    if let Some(values) = numeric {
        let mut paired: Vec<(f64, String)> = values.into_iter().zip(distinct).collect();
        paired.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        paired.into_iter().map(|(_, label)| label).collect()
    } else {
        distinct
    }
}

/// Calibration document: `{"input_data": [[features...], ...]}`.
pub fn input_document(rows: &[Vec<f64>]) -> serde_json::Value {
    serde_json::json!({ "input_data": rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IRIS: &str = "\
sepal_length,sepal_width,petal_length,petal_width,species
5.1,3.5,1.4,0.2,setosa
7.0,3.2,4.7,1.4,versicolor
6.3,3.3,6.0,2.5,virginica
4.9,3.0,1.4,0.2,setosa
";

    fn iris() -> ValidationDataset {
        ValidationDataset::from_reader(IRIS.as_bytes()).unwrap()
    }

    #[test]
    fn last_column_is_the_label() {
        let data = iris();
        assert_eq!(data.len(), 4);
        assert_eq!(data.rows()[1].label, "versicolor");
        assert_eq!(data.rows()[1].features, vec![7.0, 3.2, 4.7, 1.4]);
    }

    #[test]
    fn label_index_is_sorted_and_stable() {
        let data = iris();
        let first = data.label_index();
        assert_eq!(first["setosa"], 0);
        assert_eq!(first["versicolor"], 1);
        assert_eq!(first["virginica"], 2);
        assert_eq!(first, data.label_index());
    }

    #[test]
    fn two_label_scenario() {
        let data = ValidationDataset::from_reader("x,y\n1,B\n2,A\n3,B\n".as_bytes()).unwrap();
        let map = data.label_index();
        assert_eq!(map.len(), 2);
        assert_eq!(map["A"], 0);
        assert_eq!(map["B"], 1);
    }

    #[test]
    fn numeric_labels_sort_by_value() {
        assert_eq!(sorted_labels(["10", "2", "1", "2"]), vec!["1", "2", "10"]);
        assert_eq!(sorted_labels(["10", "2", "x"]), vec!["10", "2", "x"]);
    }

    #[test]
    fn calibration_sample_is_deterministic_and_capped() {
        let data = iris();
        let a = data.calibration_rows(3, CALIBRATION_SEED);
        assert_eq!(a.len(), 3);
        assert_eq!(a, data.calibration_rows(3, CALIBRATION_SEED));
        assert_eq!(data.calibration_rows(50, CALIBRATION_SEED).len(), 4);
    }

    #[test]
    fn sample_draws_from_the_dataset() {
        let data = iris();
        let mut rng = StdRng::seed_from_u64(7);
        let sample = data.sample(&mut rng);
        assert!(data.rows().contains(sample));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            ValidationDataset::from_reader("only\n1\n".as_bytes()),
            Err(DatasetError::Malformed(_))
        ));
        assert!(matches!(
            ValidationDataset::from_reader("a,b\n".as_bytes()),
            Err(DatasetError::Empty)
        ));
        assert!(matches!(
            ValidationDataset::from_reader("a,b\nx,1\n".as_bytes()),
            Err(DatasetError::Malformed(_))
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ValidationDataset::load(Path::new("/nonexistent/iris.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[test]
    fn documents_use_nested_rows() {
        let doc = input_document(&[vec![1.0, 2.5]]);
        assert_eq!(doc, serde_json::json!({"input_data": [[1.0, 2.5]]}));

        let sample = Sample {
            features: vec![0.5],
            label: "B".to_string(),
        };
        assert_eq!(
            sample.input_document(),
            serde_json::json!({"input_data": [[0.5]], "label": "B"})
        );
    }
}
