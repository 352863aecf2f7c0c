use crate::Result;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Plain-text price history: one decimal price per line, oldest first
///
/// Saved with a full overwrite on shutdown and loaded once at startup.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load prices. A missing or malformed file yields an empty history.
    pub fn load(&self) -> Vec<f64> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No price history yet, starting fresh");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to read price history: {}", e);
                return Vec::new();
            }
        };

        match parse_history(&content) {
            Ok(prices) => {
                tracing::info!(
                    path = %self.path.display(),
                    "Loaded {} historical prices",
                    prices.len()
                );
                prices
            }
            Err(line) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Malformed price history at line {}, starting fresh",
                    line
                );
                Vec::new()
            }
        }
    }

    /// Overwrite the file with `prices`
    ///
    /// Written to a sibling temp file and renamed into place.
    pub fn save(&self, prices: &[f64]) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");

        {
            let mut file = io::BufWriter::new(fs::File::create(&tmp_path)?);
            for price in prices {
                writeln!(file, "{}", price)?;
            }
            file.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::info!(
            path = %self.path.display(),
            "Saved {} prices to history",
            prices.len()
        );
        Ok(())
    }
}

/// Parse every non-blank line, returning the 1-based line number of the first bad one
fn parse_history(content: &str) -> std::result::Result<Vec<f64>, usize> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| match line.trim().parse::<f64>() {
            Ok(price) if price.is_finite() => Ok(price),
            _ => Err(i + 1),
        })
        .collect()
}
