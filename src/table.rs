use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;

use crate::cache::write_atomic;
use crate::error::HarvestError;

/// A header-labeled table with a fixed column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub file_name: &'static str,
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenTable {
    pub name: String,
    pub path: String,
    pub rows: usize,
}

impl Table {
    pub fn new(
        name: &'static str,
        file_name: &'static str,
        columns: &'static [&'static str],
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            name,
            file_name,
            columns,
            rows,
        }
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, self.columns.iter().copied());
        for row in &self.rows {
            push_record(&mut out, row.iter().map(String::as_str));
        }
        out
    }

    pub fn write_csv(&self, dir: &Utf8Path) -> Result<WrittenTable, HarvestError> {
        let path: Utf8PathBuf = dir.join(self.file_name);
        write_atomic(&path, self.to_csv().as_bytes())?;
        Ok(WrittenTable {
            name: self.name.to_string(),
            path: path.to_string(),
            rows: self.rows.len(),
        })
    }
}

pub fn write_tables(dir: &Utf8Path, tables: &[Table]) -> Result<Vec<WrittenTable>, HarvestError> {
    tables.iter().map(|table| table.write_csv(dir)).collect()
}

/// Renders a JSON value as a table cell. Absent and null become empty.
pub fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => other.to_string(),
    }
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (index, field) in fields.enumerate() {
        if index > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\r', '\n']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}
