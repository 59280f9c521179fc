//! Record listing commands

use anyhow::Result;
use health_lib::models::AnalysisRecord;
use tabled::{settings::Style, Table, Tabled};

use super::sample::{print_rows, sample_rows, FieldRow};
use crate::client::{ApiClient, RecordQuery};
use crate::output::{color_class, format_mb, print_json, print_warning, OutputFormat};

/// Row for the records table
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Received")]
    received_at: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Mem Used")]
    memory: String,
    #[tabled(rename = "Disk Used")]
    disk: String,
}

fn format_received(record: &AnalysisRecord) -> String {
    record.received_at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// List stored records, newest first
pub async fn list(client: &ApiClient, query: RecordQuery, format: OutputFormat) -> Result<()> {
    let records = client.list_records(&query).await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No records found");
                return Ok(());
            }

            let rows: Vec<RecordRow> = records
                .iter()
                .map(|r| RecordRow {
                    id: r.id,
                    received_at: format_received(r),
                    class: color_class(r.classification.predicted_class),
                    recommendation: r.classification.recommendation.clone(),
                    cpu: format!("{:.1}%", r.sample.cpu_usage_pct),
                    memory: format_mb(r.sample.used_memory_mb),
                    disk: r.sample.used_disk.to_string(),
                })
                .collect();

            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);

            // Oldest id on this page is the cursor for the next one
            if let Some(last) = records.last() {
                println!(
                    "\nTotal: {} records (next page: --before-id {})",
                    records.len(),
                    last.id
                );
            }
        }
    }

    Ok(())
}

/// Show one record in full
pub async fn show(client: &ApiClient, id: i64, format: OutputFormat) -> Result<()> {
    let record = client.get_record(id).await?;

    match format {
        OutputFormat::Json => print_json(&record)?,
        OutputFormat::Table => {
            let mut rows = vec![
                FieldRow::new("ID", record.id.to_string()),
                FieldRow::new("Received", format_received(&record)),
                FieldRow::new("Class", color_class(record.classification.predicted_class)),
                FieldRow::new("Recommendation", record.classification.recommendation.clone()),
            ];
            rows.extend(sample_rows(&record.sample));
            print_rows(rows);
        }
    }

    Ok(())
}
