//! Token estimation and the per-model capacity report.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tiktoken_rs::{CoreBPE, cl100k_base};

use crate::infra::config::ModelLimit;

fn tokenizer() -> Option<Arc<CoreBPE>> {
    static CL100K: OnceLock<Option<Arc<CoreBPE>>> = OnceLock::new();
    CL100K
        .get_or_init(|| match cl100k_base() {
            Ok(bpe) => Some(Arc::new(bpe)),
            Err(err) => {
                tracing::warn!(error = %err, "tokenizer unavailable, using character heuristic");
                None
            }
        })
        .clone()
}

/// Approximate token count of `text` with the cl100k BPE; `chars / 4` when the
/// tokenizer cannot be loaded.
pub fn estimate_tokens(text: &str) -> usize {
    match tokenizer() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count() / 4,
    }
}

/// Sum of per-file token counts. Unreadable files count as zero.
pub fn total_tokens(paths: &[PathBuf]) -> usize {
    paths
        .iter()
        .map(|path| match fs::read_to_string(path) {
            Ok(contents) => estimate_tokens(&contents),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "skipping unreadable file");
                0
            }
        })
        .sum()
}

/// Usage of one model's context window.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityEntry {
    pub name: String,
    pub context_window: usize,
    pub percent: f64,
    pub fits: bool,
}

/// Size and token figures of a bundle against every configured model limit.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityReport {
    pub bytes: u64,
    pub tokens: usize,
    pub entries: Vec<CapacityEntry>,
}

impl CapacityReport {
    pub fn new(bytes: u64, tokens: usize, models: &[ModelLimit]) -> Self {
        let entries = models
            .iter()
            .map(|model| {
                let window = model.context_window.max(1);
                CapacityEntry {
                    name: model.name.clone(),
                    context_window: model.context_window,
                    percent: tokens as f64 / window as f64 * 100.0,
                    fits: tokens <= model.context_window,
                }
            })
            .collect();
        Self {
            bytes,
            tokens,
            entries,
        }
    }

    /// Whether the bundle fits every configured model.
    pub fn fits_all(&self) -> bool {
        self.entries.iter().all(|entry| entry.fits)
    }
}

impl fmt::Display for CapacityEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.fits { "✅" } else { "🔴" };
        write!(f, "{status} {:5.1}%\t{}", self.percent, self.name)
    }
}

impl fmt::Display for CapacityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File size: {} bytes", group_thousands(self.bytes))?;
        writeln!(f, "Tokensize: {} tokens", group_thousands(self.tokens as u64))?;
        writeln!(f)?;
        write!(f, "Model capacity:")?;
        for entry in &self.entries {
            write!(f, "\n{entry}")?;
        }
        Ok(())
    }
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;

    fn models() -> Vec<ModelLimit> {
        vec![ModelLimit::new("GPT-4", 32_768), ModelLimit::new("Claude", 200_000)]
    }

    #[test]
    fn estimates_tokens_for_plain_text() {
        assert_eq!(estimate_tokens(""), 0);
        let tokens = estimate_tokens("hello world, this is a short sentence.");
        assert!(tokens > 0 && tokens < 20, "unexpected token count {tokens}");
    }

    #[test]
    fn totals_skip_unreadable_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let present = temp.path().join("present.txt");
        fs::write(&present, "fn main() {}\n")?;
        let expected = estimate_tokens("fn main() {}\n");

        let total = total_tokens(&[present, temp.path().join("missing.txt")]);
        assert_eq!(total, expected);
        Ok(())
    }

    #[test]
    fn report_flags_models_that_overflow() {
        let report = CapacityReport::new(1_000, 40_000, &models());
        assert!(!report.entries[0].fits);
        assert!(report.entries[1].fits);
        assert!(!report.fits_all());
        assert_eq!(report.entries[1].to_string(), "✅  20.0%\tClaude");
        assert_eq!(report.entries[0].to_string(), "🔴 122.1%\tGPT-4");
    }

    #[test]
    fn report_renders_summary_block() {
        let report = CapacityReport::new(12_345, 24_600, &models());
        insta::assert_snapshot!(report.to_string(), @r"
        File size: 12,345 bytes
        Tokensize: 24,600 tokens

        Model capacity:
        ✅  75.1%	GPT-4
        ✅  12.3%	Claude
        ");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
