//! CSV export of a committed experiment.
//!
//! Three files per export, named `{exp_id}_{kind}_{timestamp}.csv`:
//! metadata as bare key/value rows, metrics and distributions with a header
//! row. Timestamps keep repeated exports of the same run apart.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;

use fedscope_store::ExperimentContent;

/// Where one export landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub meta: PathBuf,
    pub metrics: PathBuf,
    pub distributions: PathBuf,
}

/// Export `content` into `dir`, creating it if needed.
pub fn export_experiment(
    dir: &Path,
    exp_id: &str,
    content: &ExperimentContent,
) -> Result<ExportPaths, anyhow::Error> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    export_experiment_at(dir, exp_id, content, &stamp)
}

fn export_experiment_at(
    dir: &Path,
    exp_id: &str,
    content: &ExperimentContent,
    stamp: &str,
) -> Result<ExportPaths, anyhow::Error> {
    fs::create_dir_all(dir).with_context(|| format!("creating export dir {}", dir.display()))?;

    let paths = ExportPaths {
        meta: dir.join(format!("{exp_id}_meta_{stamp}.csv")),
        metrics: dir.join(format!("{exp_id}_metrics_{stamp}.csv")),
        distributions: dir.join(format!("{exp_id}_dist_{stamp}.csv")),
    };

    write_file(&paths.meta, |writer| write_meta_csv(content, writer))?;
    write_file(&paths.metrics, |writer| write_metrics_csv(content, writer))?;
    write_file(&paths.distributions, |writer| {
        write_distributions_csv(content, writer)
    })?;

    Ok(paths)
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> Result<(), anyhow::Error> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer).with_context(|| format!("writing {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))
}

/// Metadata as `key,value` rows without a header.
pub fn write_meta_csv<W: Write>(content: &ExperimentContent, writer: &mut W) -> std::io::Result<()> {
    for (key, value) in &content.metadata {
        writeln!(
            writer,
            "{},{}",
            csv_field(key),
            csv_field(&display_value(value))
        )?;
    }
    Ok(())
}

/// Every sample of every series, one row each.
pub fn write_metrics_csv<W: Write>(
    content: &ExperimentContent,
    writer: &mut W,
) -> std::io::Result<()> {
    writeln!(writer, "role,device,round,accuracy,loss")?;
    for samples in content.metrics.values() {
        for sample in samples {
            writeln!(
                writer,
                "{},{},{},{},{}",
                sample.role,
                csv_field(&sample.device),
                sample.round,
                sample.accuracy,
                sample.loss
            )?;
        }
    }
    Ok(())
}

/// Label histograms of every client loader, one row per label.
pub fn write_distributions_csv<W: Write>(
    content: &ExperimentContent,
    writer: &mut W,
) -> std::io::Result<()> {
    writeln!(writer, "client,loader,label,count,num_items")?;
    for (client, loaders) in &content.distributions {
        for (loader, distribution) in loaders {
            for (label, count) in &distribution.label_distribution {
                writeln!(
                    writer,
                    "{},{},{},{},{}",
                    csv_field(client),
                    csv_field(loader),
                    csv_field(label),
                    count,
                    distribution.num_items
                )?;
            }
        }
    }
    Ok(())
}

/// Strings render bare, everything else as compact JSON.
pub(crate) fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Quote a field that holds a comma, quote, or line break.
fn csv_field(raw: &str) -> Cow<'_, str> {
    if raw.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", raw.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(raw)
    }
}
