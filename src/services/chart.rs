use serde_json::{json, Map, Value};
use tracing::debug;

/// Supported figure shapes. Unknown request values fall back to `Bar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Pie,
}

impl ChartType {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("line") => ChartType::Line,
            Some("pie") => ChartType::Pie,
            _ => ChartType::Bar,
        }
    }
}

/// Derive a plotly-style figure document from a result set, best-effort.
///
/// Needs at least two columns and one row, with a numeric second column:
/// the first column becomes labels, the second the measured series. Anything
/// else is not plottable and yields `None`.
pub fn build_figure(
    question: &str,
    columns: &[String],
    rows: &[Map<String, Value>],
    chart_type: ChartType,
) -> Option<Value> {
    if columns.len() < 2 || rows.is_empty() {
        debug!(
            columns = columns.len(),
            rows = rows.len(),
            "result shape is not plottable"
        );
        return None;
    }

    let label_column = &columns[0];
    let value_column = &columns[1];

    let labels: Vec<Value> = rows
        .iter()
        .map(|row| row.get(label_column).cloned().unwrap_or(Value::Null))
        .collect();
    let values: Vec<f64> = rows
        .iter()
        .map(|row| row.get(value_column).and_then(Value::as_f64))
        .collect::<Option<Vec<_>>>()?;

    let trace = match chart_type {
        ChartType::Bar => json!({
            "type": "bar",
            "x": labels,
            "y": values,
            "name": value_column,
        }),
        ChartType::Line => json!({
            "type": "scatter",
            "mode": "lines+markers",
            "x": labels,
            "y": values,
            "name": value_column,
        }),
        ChartType::Pie => json!({
            "type": "pie",
            "labels": labels,
            "values": values,
        }),
    };

    Some(json!({
        "data": [trace],
        "layout": {
            "title": { "text": question },
            "xaxis": { "title": { "text": label_column } },
            "yaxis": { "title": { "text": value_column } },
        },
    }))
}
