use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use tokio::{fs, task};

use crate::output::error::OutputError;
use crate::output::image::{annotate, encode_png, heatmap};
use crate::output::json::to_json;
use crate::output::types::ComparisonRecord;
use crate::pipeline::ComparisonReport;

/// Paths produced for one comparison.
#[derive(Debug, Clone)]
pub struct WrittenFiles {
    pub report: PathBuf,
    pub heatmap: Option<PathBuf>,
    pub annotated: Option<PathBuf>,
}

/// Writes reports and rendered images into one directory.
#[derive(Debug, Clone)]
pub struct OutputManager {
    directory: PathBuf,
    pretty: bool,
    images: bool,
}

impl OutputManager {
    pub fn new(directory: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            directory: directory.into(),
            pretty,
            images: true,
        }
    }

    /// Skips the heatmap and annotated renders.
    pub fn without_images(mut self) -> Self {
        self.images = false;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub async fn write_comparison(
        &self,
        report: &ComparisonReport,
    ) -> Result<WrittenFiles, OutputError> {
        fs::create_dir_all(&self.directory).await?;
        let stem = format!("page-{}", report.page);

        let encoded = to_json(&ComparisonRecord::from(report), self.pretty)?;
        let report_path = self.directory.join(format!("{stem}-report.json"));
        fs::write(&report_path, encoded).await?;
        debug!("wrote {}", report_path.display());

        if !self.images {
            return Ok(WrittenFiles {
                report: report_path,
                heatmap: None,
                annotated: None,
            });
        }

        let sample = report.artifacts.aligned_sample.clone();
        let map = report.artifacts.difference_map.clone();
        let differences = report.differences.clone();
        let (heatmap_png, annotated_png) = task::spawn_blocking(move || {
            let heat = encode_png(&heatmap(&sample, &map)?)?;
            let marked = encode_png(&annotate(&sample, &differences)?)?;
            Ok::<_, OutputError>((heat, marked))
        })
        .await??;

        let heatmap_path = self.directory.join(format!("{stem}-heatmap.png"));
        let annotated_path = self.directory.join(format!("{stem}-annotated.png"));
        fs::write(&heatmap_path, heatmap_png).await?;
        fs::write(&annotated_path, annotated_png).await?;
        Ok(WrittenFiles {
            report: report_path,
            heatmap: Some(heatmap_path),
            annotated: Some(annotated_path),
        })
    }

    pub async fn write_json<T>(&self, filename: &str, data: &T) -> Result<PathBuf, OutputError>
    where
        T: Serialize + ?Sized,
    {
        fs::create_dir_all(&self.directory).await?;
        let path = self.directory.join(filename);
        fs::write(&path, to_json(data, self.pretty)?).await?;
        debug!("wrote {}", path.display());
        Ok(path)
    }
}
