//! Table formatting for analysis results.

use crate::pipeline::AnalysisReport;
use crate::text::{WordFrequency, truncate_chars};
use crate::vector::{ClusterResult, FetchStats};
use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

/// Characters of the example comment shown per cluster row.
const EXAMPLE_CHARS: usize = 60;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

fn confidence_cell(percent: u32) -> Cell {
    // comfy-table mangles ANSI codes, so color goes through the cell
    let color = match percent {
        70.. => Color::Green,
        40..=69 => Color::Yellow,
        _ => Color::Red,
    };
    Cell::new(format!("{percent}%")).fg(color)
}

/// One row per cluster of `level`, with its name when one was assigned.
pub fn create_cluster_table(report: &AnalysisReport, level: &ClusterResult) -> String {
    let mut builder =
        TableBuilder::new().set_headers(vec!["#", "Name", "Comments", "Confidence", "Dissent", "Example"]);

    for cluster in &level.clusters {
        let example = report
            .member_texts(cluster)
            .next()
            .map(|text| truncate_chars(text, EXAMPLE_CHARS).to_string())
            .unwrap_or_default();

        builder = builder.add_row(vec![
            Cell::new(cluster.id),
            Cell::new(report.name_of(cluster.id).unwrap_or("-")).add_attribute(Attribute::Bold),
            Cell::new(cluster.len()),
            confidence_cell(cluster.confidence.percent()),
            Cell::new(report.dissenting_for(cluster.id).len()),
            Cell::new(example),
        ]);
    }

    builder.build()
}

/// Embedding counters for the run summary.
pub fn create_stats_table(stats: &FetchStats) -> String {
    let rows = [
        ("Comments", stats.requested),
        ("Embedded", stats.embedded),
        ("Empty", stats.skipped),
        ("Failed", stats.failed),
        ("Batches", stats.batches),
        ("Rate limited", stats.rate_limited),
    ];

    rows.into_iter()
        .fold(
            TableBuilder::new().set_headers(vec!["Metric", "Value"]),
            |builder, (label, value)| builder.add_row(vec![Cell::new(label), Cell::new(value)]),
        )
        .build()
}

/// Word frequencies, most common first.
pub fn create_word_table(words: &[WordFrequency]) -> String {
    words
        .iter()
        .enumerate()
        .fold(
            TableBuilder::new().set_headers(vec!["Rank", "Word", "Count"]),
            |builder, (rank, word)| {
                builder.add_row(vec![
                    Cell::new(rank + 1),
                    Cell::new(&word.text),
                    Cell::new(word.value),
                ])
            },
        )
        .build()
}
