use arrow::array::RecordBatch;
use arrow::error::ArrowError;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use rgindex::{FileIndex, Value};
use scan::{PruneOutcome, ScanReport};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();

    // Apply UTF8 preset for nice borders
    table.load_preset(UTF8_FULL);

    // Set content arrangement to dynamically adjust to terminal width
    table.set_content_arrangement(ContentArrangement::DynamicFullWidth);
    table.set_header(header.into_iter().map(Cell::new).collect::<Vec<_>>());
    table
}

/// Format RecordBatches as a table with terminal width awareness
pub fn format_batches(batches: &[RecordBatch]) -> Result<String, ArrowError> {
    let Some(first) = batches.first() else {
        return Ok(String::new());
    };

    let schema = first.schema();
    let mut table = new_table(schema.fields().iter().map(|f| f.name().as_str()).collect());
    let options = FormatOptions::default().with_null("NULL");

    for batch in batches {
        let formatters = batch
            .columns()
            .iter()
            .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
            .collect::<Result<Vec<_>, _>>()?;

        for row_idx in 0..batch.num_rows() {
            let row: Vec<Cell> = formatters
                .iter()
                .map(|f| Cell::new(f.value(row_idx).to_string()))
                .collect();
            table.add_row(row);
        }
    }

    Ok(table.to_string())
}

/// One line per indexed file: surviving and skipped row groups
pub fn format_prune_report(report: &ScanReport<PruneOutcome>) -> String {
    let mut table = new_table(vec!["file", "row groups", "surviving", "skipped", "surviving ids"]);

    for (file_id, outcome) in report.successes() {
        let ids = outcome
            .surviving_groups
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        table.add_row(vec![
            Cell::new(file_id),
            Cell::new(outcome.row_group_count),
            Cell::new(outcome.surviving_groups.len()),
            Cell::new(outcome.skipped()),
            Cell::new(ids),
        ]);
    }

    table.to_string()
}

/// Per row group, per column statistics of one index
pub fn format_index(index: &FileIndex) -> String {
    let mut table = new_table(vec!["row group", "rows", "column", "min", "max", "nulls"]);

    for group in &index.groups {
        for stats in group.columns.values() {
            table.add_row(vec![
                Cell::new(group.row_group_id),
                Cell::new(group.row_count),
                Cell::new(&stats.column_name),
                Cell::new(format_bound(stats.min.as_ref())),
                Cell::new(format_bound(stats.max.as_ref())),
                Cell::new(
                    stats
                        .null_count
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ]);
        }
    }

    table.to_string()
}

fn format_bound(bound: Option<&Value>) -> String {
    bound
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}
