//! Classification metrics over (true, predicted) label pairs.
//!
//! Labels are plain strings so the same code serves the multiclass and the
//! binary relevance views. Divisions by zero yield 0.

use std::fmt;

/// Precision, recall and F1 for one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Averaged metrics across classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy and averages.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

/// Counts indexed `[true][predicted]` in `labels` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Sorted union of every label seen on either side.
pub fn observed_labels(pairs: &[(String, String)]) -> Vec<String> {
    let mut labels: Vec<String> = pairs
        .iter()
        .flat_map(|(t, p)| [t.clone(), p.clone()])
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

impl ConfusionMatrix {
    pub fn new(pairs: &[(String, String)], labels: &[String]) -> Self {
        let position = |label: &str| labels.iter().position(|l| l == label);
        let mut counts = vec![vec![0; labels.len()]; labels.len()];

        for (truth, predicted) in pairs {
            if let (Some(row), Some(col)) = (position(truth), position(predicted)) {
                counts[row][col] += 1;
            }
        }

        Self {
            labels: labels.to_vec(),
            counts,
        }
    }
}

impl ClassificationReport {
    pub fn new(pairs: &[(String, String)], labels: &[String]) -> Self {
        let matrix = ConfusionMatrix::new(pairs, labels);

        let classes: Vec<ClassMetrics> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let true_positive = matrix.counts[i][i];
                let support: usize = matrix.counts[i].iter().sum();
                let predicted: usize = matrix.counts.iter().map(|row| row[i]).sum();
                let precision = ratio(true_positive, predicted);
                let recall = ratio(true_positive, support);
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1: f1(precision, recall),
                    support,
                }
            })
            .collect();

        let total: usize = classes.iter().map(|c| c.support).sum();
        let correct: usize = (0..labels.len()).map(|i| matrix.counts[i][i]).sum();

        let count = classes.len().max(1) as f64;
        let macro_avg = AverageMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / count,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / count,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / count,
            support: total,
        };

        let weighted = |metric: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes
                    .iter()
                    .map(|c| metric(c) * c.support as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|c: &ClassMetrics| c.precision),
            recall: weighted(|c: &ClassMetrics| c.recall),
            f1: weighted(|c: &ClassMetrics| c.f1),
            support: total,
        };

        Self {
            accuracy: ratio(correct, total),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain([12])
            .max()
            .unwrap_or(12);

        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10} {:>10}\n",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(String::len)
            .chain([10])
            .max()
            .unwrap_or(10);

        write!(f, "{:>width$}", "true \\ pred")?;
        for label in &self.labels {
            write!(f, " {:>width$}", label)?;
        }
        writeln!(f)?;

        for (label, row) in self.labels.iter().zip(&self.counts) {
            write!(f, "{:>width$}", label)?;
            for count in row {
                write!(f, " {:>width$}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
