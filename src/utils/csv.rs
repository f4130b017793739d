use serde_json::{Map, Value};

/// Render a result set as CSV text: header row in column order, one line per
/// row, fields quoted only when they need to be.
pub fn render_csv(columns: &[String], rows: &[Map<String, Value>]) -> String {
    let mut out = String::new();
    push_line(&mut out, columns.iter().map(|c| c.as_str()));
    for row in rows {
        let fields: Vec<String> = columns
            .iter()
            .map(|column| field_text(row.get(column)))
            .collect();
        push_line(&mut out, fields.iter().map(|f| f.as_str()));
    }
    out
}

fn push_line<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        // Nested structures keep their JSON form inside one field.
        Some(other) => other.to_string(),
    }
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
