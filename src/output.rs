use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::Path;

use tabled::builder::Builder;
use tabled::settings::Style;

use crate::domain::{OutputFormat, ProjectConfig};
use crate::error::ScoutError;
use crate::table::{ResultRow, ResultTable};

/// Print search results in the requested format.
pub fn render(
    out: &mut dyn Write,
    project: &ProjectConfig,
    table: &ResultTable,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::List => render_list(out, table),
        OutputFormat::Facets => render_facets(out, project, table),
        OutputFormat::Stats => render_stats(out, project, table),
    }
}

/// One line per dataset, sorted by identifier: the local path when the
/// dataset is held locally, otherwise the identifier itself.
fn render_list(out: &mut dyn Write, table: &ResultTable) -> io::Result<()> {
    let mut rows: Vec<&ResultRow> = table.rows().collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));

    for row in rows {
        match &row.path {
            Some(path) => writeln!(out, "{path}")?,
            None => writeln!(out, "{}", row.id)?,
        }
    }
    Ok(())
}

/// Full table with one column per facet and the path last, sorted by the
/// facet-column tuple. Nothing is truncated.
fn render_facets(
    out: &mut dyn Write,
    project: &ProjectConfig,
    table: &ResultTable,
) -> io::Result<()> {
    let facets: Vec<&str> = project.facet_names().collect();

    let mut rows: Vec<Vec<String>> = table
        .rows()
        .map(|row| {
            let mut cells: Vec<String> = facets
                .iter()
                .map(|&facet| row.value(facet).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            cells.push(
                row.path
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
            );
            cells
        })
        .collect();
    rows.sort();

    let mut builder = Builder::default();
    let mut header: Vec<String> = facets.iter().map(|f| f.to_string()).collect();
    header.push("path".to_string());
    builder.push_record(header);
    for row in rows {
        builder.push_record(row);
    }

    writeln!(out, "{}", builder.build().with(Style::sharp()))
}

/// Row counts and distinct values per facet.
fn render_stats(
    out: &mut dyn Write,
    project: &ProjectConfig,
    table: &ResultTable,
) -> io::Result<()> {
    let local = table.rows().filter(|row| row.path.is_some()).count();
    writeln!(out, "datasets: {}", table.len())?;
    writeln!(out, "local: {local}")?;
    writeln!(out, "remote only: {}", table.len() - local)?;

    for facet in project.facet_names() {
        let values: BTreeSet<String> = table
            .rows()
            .filter_map(|row| row.value(facet))
            .flat_map(|value| value.values().map(str::to_string))
            .collect();
        writeln!(out, "{facet}: {} values", values.len())?;
    }
    Ok(())
}

/// Write the result table to a CSV file: identifier, facet columns in schema
/// order, path.
pub fn write_csv(
    path: &Path,
    project: &ProjectConfig,
    table: &ResultTable,
) -> Result<(), ScoutError> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|err| ScoutError::CsvWrite(err.to_string()))?;

    let mut header = vec!["instance_id".to_string()];
    header.extend(project.facet_names().map(str::to_string));
    header.push("path".to_string());
    writer
        .write_record(&header)
        .map_err(|err| ScoutError::CsvWrite(err.to_string()))?;

    let mut rows: Vec<&ResultRow> = table.rows().collect();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    for row in rows {
        let mut record = vec![row.id.clone()];
        for facet in project.facet_names() {
            record.push(row.value(facet).map(|v| v.to_string()).unwrap_or_default());
        }
        record.push(
            row.path
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default(),
        );
        writer
            .write_record(&record)
            .map_err(|err| ScoutError::CsvWrite(err.to_string()))?;
    }

    writer
        .flush()
        .map_err(|err| ScoutError::CsvWrite(err.to_string()))
}
