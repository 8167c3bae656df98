use crate::error::{AppError, Result};
use crate::ml::schema::{self, FeatureSchema, CANONICAL_FEATURES, ID_COLUMN, LABEL_COLUMN};
use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Tabular numeric dataset with named columns (one row per customer)
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Column names, in file order
    columns: Vec<String>,

    /// Values (n_rows × n_columns)
    values: Array2<f64>,
}

/// Feature matrix and labels split out of a dataset
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub schema: FeatureSchema,

    /// Feature matrix (n_samples × n_features), columns in schema order
    pub features: Array2<f64>,

    /// Binary labels
    pub labels: Vec<u8>,
}

impl LabeledData {
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }
}

impl Dataset {
    /// Create a dataset, checking the column count against the matrix width
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(AppError::Dataset(format!(
                "{} column names for {} value columns",
                columns.len(),
                values.ncols()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Read a headered CSV file
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            AppError::Dataset(format!("cannot open dataset {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_csv_reader(file)?;
        info!(
            path = %path.display(),
            rows = dataset.n_rows(),
            columns = dataset.columns.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Read headered CSV from any reader; every cell must be numeric
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(AppError::Dataset("dataset has no header row".to_string()));
        }

        let mut data = Vec::new();
        let mut n_rows = 0;
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            for (col, field) in record.iter().enumerate() {
                let value = field.parse::<f64>().map_err(|_| {
                    AppError::Dataset(format!(
                        "row {}, column '{}': non-numeric value '{}'",
                        row + 1,
                        columns[col],
                        field
                    ))
                })?;
                data.push(value);
            }
            n_rows += 1;
        }

        let values = Array2::from_shape_vec((n_rows, columns.len()), data)
            .map_err(|e| AppError::Dataset(format!("malformed dataset: {}", e)))?;

        debug!(rows = n_rows, columns = columns.len(), "Parsed CSV dataset");
        Self::new(columns, values)
    }

    /// Write the dataset as headered CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.columns)?;
        for row in self.values.axis_iter(Axis(0)) {
            csv_writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write the dataset as headered CSV to a file
    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_csv(file)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// View of a single column by name
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(idx))
    }

    /// Drop identifier columns and split into features and binary labels.
    ///
    /// Feature columns keep their dataset order; the derived schema records it.
    pub fn split_features_labels<T: AsRef<str>>(
        &self,
        label_column: &str,
        id_columns: &[T],
    ) -> Result<LabeledData> {
        let label_idx = self
            .columns
            .iter()
            .position(|c| c == label_column)
            .ok_or_else(|| {
                AppError::Dataset(format!("label column '{}' not found", label_column))
            })?;

        if self.is_empty() {
            return Err(AppError::Dataset("dataset has no rows".to_string()));
        }

        let schema = schema::derive_schema(&self.columns, label_column, id_columns)
            .map_err(|e| AppError::Dataset(e.to_string()))?;

        let feature_idx: Vec<usize> = schema
            .iter()
            .filter_map(|name| self.columns.iter().position(|c| c == name))
            .collect();

        let labels = self
            .values
            .column(label_idx)
            .iter()
            .enumerate()
            .map(|(row, &v)| {
                if v == 0.0 {
                    Ok(0u8)
                } else if v == 1.0 {
                    Ok(1u8)
                } else {
                    Err(AppError::Dataset(format!(
                        "row {}: label '{}' must be 0 or 1, got {}",
                        row + 1,
                        label_column,
                        v
                    )))
                }
            })
            .collect::<Result<Vec<u8>>>()?;

        let features = self.values.select(Axis(1), &feature_idx);

        Ok(LabeledData {
            schema,
            features,
            labels,
        })
    }

    /// Generate a dataset shaped like the UCI credit card data.
    ///
    /// Columns are `ID`, the 23 canonical features, then the label. Roughly a
    /// fifth of the rows default; the default probability rises with recent
    /// repayment delays and credit utilisation.
    pub fn synthetic(n_rows: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_cols = CANONICAL_FEATURES.len() + 2;
        let mut values = Array2::zeros((n_rows, n_cols));

        for (i, mut row) in values.outer_iter_mut().enumerate() {
            let limit = rng.gen_range(1..=80) as f64 * 10_000.0;
            let sex = rng.gen_range(1..=2) as f64;
            let education = rng.gen_range(1..=4) as f64;
            let marriage = rng.gen_range(1..=3) as f64;
            let age = rng.gen_range(21..=75) as f64;

            // Latent financial stress drives delays, utilisation and repayments
            let stress: f64 = rng.gen();
            let pay_status: Vec<f64> = (0..6)
                .map(|_| {
                    if rng.gen::<f64>() < stress * 0.6 {
                        rng.gen_range(1..=3) as f64
                    } else {
                        rng.gen_range(-2..=0) as f64
                    }
                })
                .collect();

            let utilisation: f64 = (rng.gen::<f64>() * 0.7 + stress * 0.3).min(1.0);
            let bills: Vec<f64> = (0..6)
                .map(|_| (limit * utilisation * rng.gen_range(0.8..1.2)).round())
                .collect();
            let payments: Vec<f64> = bills
                .iter()
                .map(|bill| (bill * rng.gen_range(0.0..0.3) * (1.0 - stress * 0.5)).round())
                .collect();

            let z = -0.9 + 0.8 * pay_status[0] + 0.3 * pay_status[1] + 1.2 * (utilisation - 0.5)
                - 2.0e-6 * limit;
            let p_default = 1.0 / (1.0 + (-z).exp());
            let label = if rng.gen::<f64>() < p_default { 1.0 } else { 0.0 };

            let fields = std::iter::once((i + 1) as f64)
                .chain([limit, sex, education, marriage, age])
                .chain(pay_status)
                .chain(bills)
                .chain(payments)
                .chain(std::iter::once(label));
            for (cell, value) in row.iter_mut().zip(fields) {
                *cell = value;
            }
        }

        let columns = std::iter::once(ID_COLUMN)
            .chain(CANONICAL_FEATURES.iter().copied())
            .chain(std::iter::once(LABEL_COLUMN))
            .map(str::to_string)
            .collect();

        Self { columns, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_CSV: &str = "ID,LIMIT_BAL,AGE,default.payment.next.month\n\
                             1,20000,24,1\n\
                             2,120000,26,0\n\
                             3,90000,34,0\n";

    #[test]
    fn test_from_csv_reader() {
        let dataset = Dataset::from_csv_reader(SMALL_CSV.as_bytes()).unwrap();

        assert_eq!(dataset.n_rows(), 3);
        assert_eq!(
            dataset.columns(),
            &["ID", "LIMIT_BAL", "AGE", "default.payment.next.month"]
        );
        assert_eq!(dataset.column("AGE").unwrap()[2], 34.0);
    }

    #[test]
    fn test_from_csv_rejects_non_numeric() {
        let csv = "ID,AGE,label\n1,thirty,0\n";
        let err = Dataset::from_csv_reader(csv.as_bytes()).unwrap_err();
        match err {
            AppError::Dataset(msg) => assert!(msg.contains("AGE")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_csv_rejects_ragged_rows() {
        let csv = "ID,AGE,label\n1,30\n";
        assert!(matches!(
            Dataset::from_csv_reader(csv.as_bytes()),
            Err(AppError::Dataset(_))
        ));
    }

    #[test]
    fn test_split_features_labels() {
        let dataset = Dataset::from_csv_reader(SMALL_CSV.as_bytes()).unwrap();
        let data = dataset
            .split_features_labels(LABEL_COLUMN, &[ID_COLUMN])
            .unwrap();

        assert_eq!(data.schema.names(), &["LIMIT_BAL", "AGE"]);
        assert_eq!(data.features.shape(), &[3, 2]);
        assert_eq!(data.features[[1, 0]], 120000.0);
        assert_eq!(data.labels, vec![1, 0, 0]);
    }

    #[test]
    fn test_split_missing_label_is_dataset_error() {
        let csv = "ID,AGE\n1,30\n";
        let dataset = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
        let err = dataset
            .split_features_labels(LABEL_COLUMN, &[ID_COLUMN])
            .unwrap_err();
        assert!(matches!(err, AppError::Dataset(_)));
    }

    #[test]
    fn test_split_empty_dataset() {
        let csv = "ID,AGE,default.payment.next.month\n";
        let dataset = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
        assert!(dataset.is_empty());
        assert!(matches!(
            dataset.split_features_labels(LABEL_COLUMN, &[ID_COLUMN]),
            Err(AppError::Dataset(_))
        ));
    }

    #[test]
    fn test_split_rejects_non_binary_labels() {
        let csv = "ID,AGE,default.payment.next.month\n1,30,2\n";
        let dataset = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
        assert!(matches!(
            dataset.split_features_labels(LABEL_COLUMN, &[ID_COLUMN]),
            Err(AppError::Dataset(_))
        ));
    }

    #[test]
    fn test_synthetic_shape_and_determinism() {
        let a = Dataset::synthetic(500, 7);
        let b = Dataset::synthetic(500, 7);
        let c = Dataset::synthetic(500, 8);

        assert_eq!(a.n_rows(), 500);
        assert_eq!(a.columns().len(), 25);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let data = a.split_features_labels(LABEL_COLUMN, &[ID_COLUMN]).unwrap();
        assert_eq!(data.schema, FeatureSchema::canonical());
    }

    #[test]
    fn test_synthetic_rows_are_fully_populated() {
        let dataset = Dataset::synthetic(300, 4);
        assert_eq!(dataset.values().dim(), (300, 25));

        let ids = dataset.column(ID_COLUMN).unwrap();
        assert!(ids.iter().enumerate().all(|(i, id)| *id == (i + 1) as f64));

        let limits = dataset.column("LIMIT_BAL").unwrap();
        assert!(limits.iter().all(|v| *v >= 10_000.0));
        let ages = dataset.column("AGE").unwrap();
        assert!(ages.iter().all(|v| (21.0..=75.0).contains(v)));
        let labels = dataset.column(LABEL_COLUMN).unwrap();
        assert!(labels.iter().all(|v| *v == 0.0 || *v == 1.0));

        assert_eq!(Dataset::synthetic(0, 4).values().dim(), (0, 25));
    }

    #[test]
    fn test_synthetic_label_distribution() {
        let dataset = Dataset::synthetic(5000, 42);
        let labels = dataset.column(LABEL_COLUMN).unwrap();
        let rate = labels.sum() / labels.len() as f64;
        assert!(rate > 0.1 && rate < 0.4, "default rate {}", rate);
    }

    #[test]
    fn test_csv_round_trip() {
        let dataset = Dataset::synthetic(20, 3);
        let mut buffer = Vec::new();
        dataset.write_csv(&mut buffer).unwrap();

        let parsed = Dataset::from_csv_reader(buffer.as_slice()).unwrap();
        assert_eq!(parsed, dataset);
    }
}
