// ============================================================
// Layer 4 — Training metrics log
// ============================================================
// Append-only CSV next to the checkpoints, one row per epoch.
// The validation column is blank when the epoch produced no
// defined score (every validation weight zero).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct EpochMetrics {
    pub phase: &'static str,
    pub epoch: usize,
    pub train_loss: f64,
    pub val_score: Option<f64>,
}

pub struct MetricsLogger {
    file: File,
}

impl MetricsLogger {
    pub fn create(dir: &Path) -> Result<Self> {
        let path = dir.join("training_metrics.csv");
        let fresh = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening metrics log {}", path.display()))?;
        if fresh {
            writeln!(file, "phase,epoch,train_loss,val_score")?;
        }
        Ok(Self { file })
    }

    pub fn record(&mut self, metrics: &EpochMetrics) -> Result<()> {
        let val = metrics
            .val_score
            .map(|v| format!("{v:.6}"))
            .unwrap_or_default();
        writeln!(
            self.file,
            "{},{},{:.6},{}",
            metrics.phase, metrics.epoch, metrics.train_loss, val
        )?;
        info!(
            phase = metrics.phase,
            epoch = metrics.epoch,
            train_loss = metrics.train_loss,
            val_score = metrics.val_score,
            "epoch complete"
        );
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_appended_under_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut logger = MetricsLogger::create(dir.path()).unwrap();
            logger
                .record(&EpochMetrics {
                    phase: "sentence",
                    epoch: 1,
                    train_loss: 0.7,
                    val_score: Some(0.65),
                })
                .unwrap();
        }
        {
            let mut logger = MetricsLogger::create(dir.path()).unwrap();
            logger
                .record(&EpochMetrics {
                    phase: "document",
                    epoch: 1,
                    train_loss: 1.1,
                    val_score: None,
                })
                .unwrap();
        }

        let text = std::fs::read_to_string(dir.path().join("training_metrics.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "phase,epoch,train_loss,val_score");
        assert!(lines[1].starts_with("sentence,1,0.700000,0.650000"));
        assert!(lines[2].starts_with("document,1,1.100000,"));
    }
}
