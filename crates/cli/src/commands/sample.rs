//! One-shot sampling commands

use anyhow::{Context, Result};
use health_lib::{
    collector::{Sampler, SysinfoReader},
    models::Sample,
    sync::AnalyzerClientBuilder,
};
use serde_json::json;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

use crate::output::{
    color_class, color_pct, format_mb, format_usage, percent, print_json, print_success,
    OutputFormat,
};

/// Row for the sample table
#[derive(Tabled)]
pub(crate) struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl FieldRow {
    pub(crate) fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

pub(crate) fn sample_rows(sample: &Sample) -> Vec<FieldRow> {
    let mem_pct = percent(sample.used_memory_mb as f64, sample.total_memory_mb as f64);
    let disk_pct = percent(sample.used_disk.bytes(), sample.total_disk.bytes());
    let swap_pct = percent(sample.used_swap_mb as f64, sample.total_swap_mb as f64);

    let mut rows = vec![
        FieldRow::new(
            "Memory",
            color_pct(
                format_usage(
                    &format_mb(sample.used_memory_mb),
                    &format_mb(sample.total_memory_mb),
                    mem_pct,
                ),
                mem_pct,
            ),
        ),
        FieldRow::new(
            "CPU",
            color_pct(format!("{:.1}%", sample.cpu_usage_pct), sample.cpu_usage_pct),
        ),
        FieldRow::new(
            "Disk",
            color_pct(
                format_usage(
                    &sample.used_disk.to_string(),
                    &sample.total_disk.to_string(),
                    disk_pct,
                ),
                disk_pct,
            ),
        ),
        FieldRow::new(
            "Swap",
            color_pct(
                format_usage(
                    &format_mb(sample.used_swap_mb),
                    &format_mb(sample.total_swap_mb),
                    swap_pct,
                ),
                swap_pct,
            ),
        ),
    ];
    rows.extend(
        sample
            .kernel_params
            .iter()
            .map(|(key, value)| FieldRow::new(key, value.to_string())),
    );
    rows
}

pub(crate) fn print_rows(rows: Vec<FieldRow>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

async fn take_sample(mount_point: &str) -> Result<Sample> {
    let sampler = Sampler::new(Arc::new(SysinfoReader::new()), mount_point);
    sampler
        .collect()
        .await
        .with_context(|| format!("Failed to sample host (mount {})", mount_point))
}

/// Sample the local host once and print it
pub async fn collect(mount_point: &str, format: OutputFormat) -> Result<()> {
    let sample = take_sample(mount_point).await?;

    match format {
        OutputFormat::Json => print_json(&sample)?,
        OutputFormat::Table => print_rows(sample_rows(&sample)),
    }

    Ok(())
}

/// Sample once and send it to the analyzer
pub async fn push(
    analyzer_url: &str,
    mount_point: &str,
    max_retries: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let sample = take_sample(mount_point).await?;

    let mut builder = AnalyzerClientBuilder::new().endpoint(analyzer_url);
    if let Some(retries) = max_retries {
        builder = builder.max_retries(retries);
    }
    let client = builder.build().context("Failed to create analyzer client")?;

    let classification = client
        .send_sample(&sample)
        .await
        .with_context(|| format!("Failed to deliver sample to {}", client.analyze_url()))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "sample": sample,
            "classification": classification,
        }))?,
        OutputFormat::Table => {
            print_rows(sample_rows(&sample));
            print_success(&format!(
                "Class {}: {}",
                color_class(classification.predicted_class),
                classification.recommendation
            ));
        }
    }

    Ok(())
}
