//! Input unit discovery
//!
//! Source files are named `{GROUP}{UF}{YYMM}.parquet`, optionally followed by
//! a lower-case split suffix for very large months (`PASP2401a.parquet`).

use crate::error::{Error, Result};
use crate::types::{Locator, Period};
use regex::RegexBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locates input units for a record group
pub trait Discovery: Send + Sync {
    /// Ordered locators of units in the given regions and period range
    ///
    /// An empty `regions` slice selects every region.
    fn discover(
        &self,
        record_group: &str,
        regions: &[String],
        period_start: Period,
        period_end: Period,
    ) -> Result<Vec<Locator>>;
}

/// Discovery over a local directory tree
#[derive(Debug, Clone)]
pub struct LocalDiscovery {
    base_path: PathBuf,
    extension: String,
}

/// A file that matched the naming convention
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    period: Period,
    region: String,
    path: PathBuf,
}

impl LocalDiscovery {
    /// Discover `.parquet` files under `base_path`
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            extension: "parquet".to_string(),
        }
    }

    /// Use a different file extension
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn walk(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::discovery(format!("cannot list '{}': {e}", dir.display())))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                self.walk(&path, files)?;
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
            {
                files.push(path);
            }
        }
        Ok(())
    }
}

impl Discovery for LocalDiscovery {
    fn discover(
        &self,
        record_group: &str,
        regions: &[String],
        period_start: Period,
        period_end: Period,
    ) -> Result<Vec<Locator>> {
        if !self.base_path.is_dir() {
            return Err(Error::discovery(format!(
                "base path '{}' is not a directory",
                self.base_path.display()
            )));
        }

        let pattern = format!(r"^{}([a-z]{{2}})(\d{{2}})(\d{{2}})[a-z]?$", regex::escape(record_group));
        let name_re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::discovery(format!("invalid record group '{record_group}': {e}")))?;

        let wanted: Vec<String> = regions.iter().map(|r| r.to_ascii_uppercase()).collect();

        let mut files = Vec::new();
        self.walk(&self.base_path, &mut files)?;

        let mut candidates: Vec<Candidate> = files
            .into_iter()
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?;
                let caps = name_re.captures(stem)?;
                let region = caps[1].to_ascii_uppercase();
                let yy: u16 = caps[2].parse().ok()?;
                let month: u8 = caps[3].parse().ok()?;
                let period = Period::new(expand_year(yy), month).ok()?;
                Some(Candidate {
                    period,
                    region,
                    path,
                })
            })
            .filter(|c| wanted.is_empty() || wanted.contains(&c.region))
            .filter(|c| c.period >= period_start && c.period <= period_end)
            .collect();

        candidates.sort();
        debug!(
            record_group,
            units = candidates.len(),
            "Discovered units under {}",
            self.base_path.display()
        );

        Ok(candidates
            .into_iter()
            .map(|c| c.path.display().to_string())
            .collect())
    }
}

/// Two-digit years from the 1990s stay in that century
fn expand_year(yy: u16) -> u16 {
    if yy >= 90 {
        1900 + yy
    } else {
        2000 + yy
    }
}

/// Unit identifier of a locator: its file stem
pub fn unit_id(locator: &str) -> String {
    Path::new(locator)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(locator)
        .to_string()
}
