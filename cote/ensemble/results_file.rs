//! Modules whose predictions come from results files written by an earlier run.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    combining::func::one_hot,
    dataset::{Dataset, Instance},
    errors::{EstimatorError, EstimatorResult},
    estimator::{Capabilities, Estimator},
    evaluation::{EstimateMethod, TrainEstimate},
};

/// Header lines preceding the prediction rows.
pub const HEADER_LINES: usize = 3;

/// Which half of a resample a file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    /// Out-of-sample train predictions.
    Train,
    /// Test predictions.
    Test,
}

impl Split {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

/// `{root}/{estimator}/Predictions/{dataset}/{split}Fold{fold}.csv`
#[must_use]
pub fn results_path(root: &Path, estimator: &str, dataset: &str, split: Split, fold: usize) -> PathBuf {
    root.join(estimator)
        .join("Predictions")
        .join(dataset)
        .join(format!("{}Fold{fold}.csv", split.prefix()))
}

/// One prediction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    /// True class.
    pub actual: usize,
    /// Predicted class.
    pub predicted: usize,
    /// Class distribution, filled to full width.
    pub distribution: Vec<f64>,
    /// Prediction time, when recorded.
    pub pred_time_nanos: Option<i64>,
}

/// Parsed results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    /// First header line, split on commas.
    pub description: Vec<String>,
    /// Second header line, verbatim.
    pub parameters: String,
    /// Accuracy recorded on the third line, when parseable.
    pub accuracy: Option<f64>,
    /// Prediction rows in instance order.
    pub rows: Vec<PredictionRow>,
}

impl ResultsFile {
    /// Reads `path`, expecting distributions over `num_classes`.
    ///
    /// A row whose distribution is empty or short is replaced by a one-hot of
    /// its predicted class when `fill_missing` is set; otherwise it is an error.
    pub fn load(path: &Path, num_classes: usize, fill_missing: bool) -> EstimatorResult<Self> {
        let fail = |message: String| EstimatorError::ResultsFile {
            path: path.to_path_buf(),
            message,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|err| fail(err.to_string()))?;

        let mut description = Vec::new();
        let mut parameters = String::new();
        let mut accuracy = None;
        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|err| fail(err.to_string()))?;
            match line {
                0 => description = record.iter().map(str::to_string).collect(),
                1 => parameters = record.iter().collect::<Vec<_>>().join(","),
                2 => accuracy = record.get(0).and_then(|field| field.parse().ok()),
                _ => rows.push(
                    parse_row(&record, num_classes, fill_missing)
                        .map_err(|message| fail(format!("line {}: {message}", line + 1)))?,
                ),
            }
        }
        if description.is_empty() {
            return Err(fail(format!("expected {HEADER_LINES} header lines")));
        }
        Ok(Self {
            description,
            parameters,
            accuracy,
            rows,
        })
    }
}

fn parse_row(
    record: &csv::StringRecord,
    num_classes: usize,
    fill_missing: bool,
) -> Result<PredictionRow, String> {
    let class = |index: usize, what: &str| -> Result<usize, String> {
        let field = record.get(index).unwrap_or_default();
        field
            .parse::<f64>()
            .ok()
            .filter(|value| value.fract() == 0.0 && *value >= 0.0)
            .map(|value| value as usize)
            .ok_or_else(|| format!("{what} class '{field}' is not a class index"))
    };
    let actual = class(0, "actual")?;
    let predicted = class(1, "predicted")?;
    if actual >= num_classes || predicted >= num_classes {
        return Err(format!("class out of range for {num_classes} classes"));
    }

    // Layout after the labels: "", p0..pk, "", predTime, ...
    let mut fields = record.iter().skip(3);
    let mut distribution = Vec::new();
    for field in fields.by_ref() {
        if field.is_empty() {
            break;
        }
        distribution.push(
            field
                .parse::<f64>()
                .map_err(|_| format!("probability '{field}' is not a number"))?,
        );
    }
    let pred_time_nanos = fields.next().and_then(|field| field.parse().ok());

    if distribution.len() > num_classes {
        return Err(format!(
            "{} probabilities for {num_classes} classes",
            distribution.len()
        ));
    }
    if distribution.len() < num_classes {
        if !fill_missing {
            return Err(format!(
                "{} probabilities for {num_classes} classes and filling is off",
                distribution.len()
            ));
        }
        distribution = one_hot(predicted, num_classes);
    }
    Ok(PredictionRow {
        actual,
        predicted,
        distribution,
        pred_time_nanos,
    })
}

/// Where a file-backed module finds its predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsFileSource {
    /// Results root directory.
    pub root: PathBuf,
    /// Estimator directory name; also the module name.
    pub estimator: String,
    /// Dataset directory name; the training data's name when unset.
    pub dataset: Option<String>,
    /// Resample index.
    pub fold: usize,
    /// Fill empty or short distributions with a one-hot of the prediction.
    pub fill_missing_distributions: bool,
}

/// Module that "trains" by reading stored train and test predictions.
///
/// The train file supplies the module's train estimate; test predictions are
/// served by the instance's position in the test set.
#[derive(Debug, Clone)]
pub struct FileLoadedEstimator {
    source: ResultsFileSource,
    train: Option<TrainEstimate>,
    test: Option<Vec<Vec<f64>>>,
}

impl FileLoadedEstimator {
    /// Module reading from `source`.
    #[must_use]
    pub const fn new(source: ResultsFileSource) -> Self {
        Self {
            source,
            train: None,
            test: None,
        }
    }

    /// Where predictions are read from.
    #[must_use]
    pub const fn source(&self) -> &ResultsFileSource {
        &self.source
    }

    fn path(&self, dataset: &str, split: Split) -> PathBuf {
        results_path(
            &self.source.root,
            &self.source.estimator,
            self.source.dataset.as_deref().unwrap_or(dataset),
            split,
            self.source.fold,
        )
    }
}

impl Estimator for FileLoadedEstimator {
    fn name(&self) -> &str {
        &self.source.estimator
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().self_estimating(true)
    }

    fn train(&mut self, data: &Dataset) -> EstimatorResult<()> {
        let classes = data.num_classes();
        let fill = self.source.fill_missing_distributions;
        let train_path = self.path(data.name(), Split::Train);
        let train = ResultsFile::load(&train_path, classes, fill)?;
        if train.rows.len() != data.len() {
            return Err(EstimatorError::ResultsFile {
                path: train_path,
                message: format!("{} rows for {} training instances", train.rows.len(), data.len()),
            });
        }
        let mut posteriors = Array2::zeros((data.len(), classes));
        for (index, (row, label)) in train.rows.iter().zip(data.labels()).enumerate() {
            if row.actual != *label {
                return Err(EstimatorError::ResultsFile {
                    path: train_path,
                    message: format!(
                        "row {index} records class {} but the training instance is class {label}",
                        row.actual
                    ),
                });
            }
            for (class, probability) in row.distribution.iter().enumerate() {
                posteriors[[index, class]] = *probability;
            }
        }
        let test = ResultsFile::load(&self.path(data.name(), Split::Test), classes, fill)?;

        self.train = Some(TrainEstimate::fully_evaluated(
            EstimateMethod::Train,
            posteriors,
            data.labels().to_vec(),
        )?);
        self.test = Some(test.rows.into_iter().map(|row| row.distribution).collect());
        Ok(())
    }

    fn predict_distribution(&self, instance: &Instance<'_>) -> EstimatorResult<Vec<f64>> {
        let test = self
            .test
            .as_ref()
            .ok_or_else(|| EstimatorError::Predict(format!("{} has not loaded its results", self.name())))?;
        let position = instance.position.ok_or_else(|| {
            EstimatorError::Predict(format!("{} serves stored predictions by position only", self.name()))
        })?;
        test.get(position).cloned().ok_or_else(|| {
            EstimatorError::Predict(format!(
                "{} has {} stored predictions, asked for {position}",
                self.name(),
                test.len()
            ))
        })
    }

    fn train_estimate(&self) -> Option<TrainEstimate> {
        self.train.clone()
    }

    fn spawn_untrained(&self) -> Box<dyn Estimator> {
        Box::new(Self::new(self.source.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "Toy,Stored,train,0,MILLISECONDS,PREDICTIONS,\nparams\n0.75\n";

    fn write(root: &Path, split: Split, body: &str) {
        let path = results_path(root, "Stored", "Toy", split, 0);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("{HEADER}{body}")).unwrap();
    }

    fn toy() -> Dataset {
        Dataset::from_rows("Toy", &[vec![0.0], vec![1.0]], vec![0, 1], 2).unwrap()
    }

    fn source(root: &Path, fill: bool) -> ResultsFileSource {
        ResultsFileSource {
            root: root.to_path_buf(),
            estimator: "Stored".into(),
            dataset: None,
            fold: 0,
            fill_missing_distributions: fill,
        }
    }

    #[test]
    fn path_follows_results_layout() {
        let path = results_path(Path::new("/r"), "TDE", "Chinatown", Split::Test, 9);
        assert_eq!(path, PathBuf::from("/r/TDE/Predictions/Chinatown/testFold9.csv"));
    }

    #[test]
    fn loads_train_estimate_and_serves_test_by_position() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), Split::Train, "0,0,,0.9,0.1,,1200,\n1,0,,0.6,0.4\n");
        write(tmp.path(), Split::Test, "1,1,,0.2,0.8\n0,0,,1,0\n");
        let mut module = FileLoadedEstimator::new(source(tmp.path(), false));
        module.train(&toy()).unwrap();
        let estimate = module.train_estimate().unwrap();
        assert!((estimate.accuracy() - 0.5).abs() < 1e-12);
        let data = toy();
        assert_eq!(module.predict_distribution(&data.instance(0)).unwrap(), vec![0.2, 0.8]);
        let detached = ndarray::array![0.0];
        assert!(module
            .predict_distribution(&Instance::detached(detached.view()))
            .is_err());
    }

    #[test]
    fn short_rows_need_fill_option() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), Split::Train, "0,0,,1,0\n1,1,,\n");
        write(tmp.path(), Split::Test, "0,0,,1,0\n1,1,,0,1\n");
        let mut strict = FileLoadedEstimator::new(source(tmp.path(), false));
        assert!(matches!(
            strict.train(&toy()).unwrap_err(),
            EstimatorError::ResultsFile { .. }
        ));
        let mut filled = FileLoadedEstimator::new(source(tmp.path(), true));
        filled.train(&toy()).unwrap();
        assert_eq!(
            filled.train_estimate().unwrap().posteriors.row(1).to_vec(),
            vec![0.0, 1.0]
        );
    }

    #[test]
    fn row_count_must_match_dataset() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), Split::Train, "0,0,,1,0\n");
        write(tmp.path(), Split::Test, "0,0,,1,0\n");
        let mut module = FileLoadedEstimator::new(source(tmp.path(), false));
        assert!(module.train(&toy()).is_err());
    }

    #[test]
    fn train_rows_must_agree_with_training_labels() {
        let tmp = tempdir().unwrap();
        // Same rows as the training data, swapped order.
        write(tmp.path(), Split::Train, "1,1,,0,1\n0,0,,1,0\n");
        write(tmp.path(), Split::Test, "0,0,,1,0\n1,1,,0,1\n");
        let mut module = FileLoadedEstimator::new(source(tmp.path(), false));
        let err = module.train(&toy()).unwrap_err();
        assert!(matches!(err, EstimatorError::ResultsFile { ref message, .. } if message.contains("row 0")));
        assert!(module.train_estimate().is_none());
    }

    #[test]
    fn header_fields_are_kept() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), Split::Train, "0,0,,1,0\n");
        let file = ResultsFile::load(
            &results_path(tmp.path(), "Stored", "Toy", Split::Train, 0),
            2,
            false,
        )
        .unwrap();
        assert_eq!(file.description[1], "Stored");
        assert_eq!(file.parameters, "params");
        assert_eq!(file.accuracy, Some(0.75));
    }
}
