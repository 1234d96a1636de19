use crate::config::Config;
use crate::core::flatten::{flatten, FlattenMode};
use crate::core::parser::UniversalParser;
use crate::core::writer::{OnlvXmlWriter, Writer};
use anyhow::{Context, Result};
use log::{debug, error, info};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    pub input: PathBuf,
    pub rows_file: PathBuf,
    pub onlv_file: PathBuf,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub input: PathBuf,
    pub error: String,
}

/// Outcome of a batch run, one entry per input file.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub processed: Vec<ProcessedFile>,
    pub failed: Vec<FailedFile>,
    pub skipped: Vec<PathBuf>,
}

pub struct DocumentProcessor {
    parser: UniversalParser,
    writer: OnlvXmlWriter,
    mode: FlattenMode,
}

impl DocumentProcessor {
    pub fn new(config: &Config, mode: FlattenMode) -> Self {
        Self {
            parser: UniversalParser::new(),
            writer: OnlvXmlWriter::new(config.export.clone()),
            mode,
        }
    }

    /// Process all ONLV documents below the input directory and write rows and
    /// re-exported files to the output directory, mirroring subdirectories
    pub fn process_documents<P: AsRef<Path>, Q: AsRef<Path>>(&self, input_dir: P, output_dir: Q) -> Result<BatchReport> {
        let input_path = input_dir.as_ref();
        let output_path = output_dir.as_ref();

        info!("Starting to process documents from: {}", input_path.display());
        let mut report = BatchReport::default();
        self.process_directory(input_path, output_path, &mut report)?;

        info!(
            "Completed batch: {} processed, {} failed, {} skipped",
            report.processed.len(),
            report.failed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn process_directory(&self, dir: &Path, output_dir: &Path, report: &mut BatchReport) -> Result<()> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read input directory {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()
            .context("Failed to read directory entry")?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                let sub_output = output_dir.join(path.file_name().unwrap_or_default());
                debug!("Descending into directory: {}", path.display());
                self.process_directory(&path, &sub_output, report)?;
            } else if UniversalParser::is_supported(&path) {
                info!("Processing file: {}", path.display());
                match self.process_file(&path, output_dir) {
                    Ok(done) => {
                        info!("Successfully processed {} ({} rows)", path.display(), done.row_count);
                        report.processed.push(done);
                    }
                    Err(e) => {
                        // Continue with the other files
                        error!("Failed to process {}: {:#}", path.display(), e);
                        report.failed.push(FailedFile {
                            input: path,
                            error: format!("{e:#}"),
                        });
                    }
                }
            } else {
                debug!("Skipping unsupported file: {}", path.display());
                report.skipped.push(path);
            }
        }
        Ok(())
    }

    fn process_file(&self, path: &Path, output_dir: &Path) -> Result<ProcessedFile> {
        let doc = self
            .parser
            .parse(path)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let rows = flatten(Some(&doc), self.mode);
        let stem = path.file_stem().unwrap_or_default().to_string_lossy();

        let rows_file = output_dir.join(format!("{stem}_rows.json"));
        fs::write(&rows_file, serde_json::to_string_pretty(&rows)?)
            .with_context(|| format!("Failed to write {}", rows_file.display()))?;

        let onlv_file = output_dir.join(format!("{stem}.onlv"));
        self.writer
            .write(&doc, &onlv_file)
            .with_context(|| format!("Failed to export {}", onlv_file.display()))?;

        Ok(ProcessedFile {
            input: path.to_path_buf(),
            rows_file,
            onlv_file,
            row_count: rows.len(),
        })
    }
}

/// Runs a batch with configuration from the environment.
pub fn run_document_processing<P: AsRef<Path>, Q: AsRef<Path>>(input_dir: P, output_dir: Q) -> Result<BatchReport> {
    // Initialize logger if not already initialized
    let _ = env_logger::try_init();

    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Initializing document processor...");
    let processor = DocumentProcessor::new(&config, FlattenMode::default());
    processor.process_documents(input_dir, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<onlv><ausschreibungs-lv><gliederung-lg><lg-liste>
  <lg nr="01"><ulg-liste><ulg nr="02"><positionen>
    <grundtextnr nr="03"><folgeposition ftnr="A"><pos-eigenschaften><stichwort>Wand</stichwort></pos-eigenschaften></folgeposition></grundtextnr>
  </positionen></ulg></ulg-liste></lg>
</lg-liste></gliederung-lg></ausschreibungs-lv></onlv>"#;

    #[test]
    fn batch_records_each_file_independently() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("good.onlv"), LV).unwrap();
        fs::write(input.path().join("broken.xml"), "<onlv>").unwrap();
        fs::write(input.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(input.path().join("sub")).unwrap();
        fs::write(input.path().join("sub").join("nested.onlv"), LV).unwrap();

        let processor = DocumentProcessor::new(&Config::default(), FlattenMode::Compact);
        let report = processor.process_documents(input.path(), output.path()).unwrap();

        assert_eq!(report.processed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.processed[0].row_count, 3);
        assert!(output.path().join("good_rows.json").exists());
        assert!(output.path().join("good.onlv").exists());
        assert!(output.path().join("sub").join("nested.onlv").exists());
        assert!(!output.path().join("broken.onlv").exists());
    }
}
