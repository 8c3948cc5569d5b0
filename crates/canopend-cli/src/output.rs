//! Output formatting for canopend-cli (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                print_csv(data);
            }
        }
    }

    /// Print one streamed item: a line for tables, compact JSON otherwise
    pub fn print_line<T: Serialize>(&self, data: &T, line: &str) {
        match self.format {
            OutputFormat::Table => println!("{}", line),
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(data) {
                    println!("{}", json);
                }
            }
            OutputFormat::Csv => print_csv_rows(std::slice::from_ref(data), false),
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    print_csv_rows(data, true);
}

fn print_csv_rows<T: Serialize>(data: &[T], header: bool) {
    if data.is_empty() {
        return;
    }

    // Get field names from the first item
    let first = serde_json::to_value(&data[0]).unwrap_or_default();
    if let serde_json::Value::Object(map) = &first {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        if header {
            println!("{}", headers.join(","));
        }

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                serde_json::Value::Null => String::new(),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Format a node id the way CANopen tools print it
pub fn node_label(node_id: u8) -> String {
    format!("0x{:02X}", node_id)
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Node display for nodes and state commands
#[derive(Debug, Tabled, Serialize)]
pub struct NodeRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "State")]
    pub state: String,
}

/// Catalog entry display for entries command
#[derive(Debug, Tabled, Serialize)]
pub struct EntryDefRow {
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub data_type: String,
    #[tabled(rename = "Access")]
    pub access: String,
    #[tabled(rename = "Fields")]
    pub fields: String,
}

/// Entry value display for read command
#[derive(Debug, Tabled, Serialize)]
pub struct ValueRow {
    #[tabled(rename = "Entry")]
    pub entry: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Raw")]
    pub raw: String,
}

/// Per-node value display for read-all command
#[derive(Debug, Tabled, Serialize)]
pub struct NodeValueRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Per-node outcome display for network-wide commands
#[derive(Debug, Tabled, Serialize)]
pub struct NodeResultRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Result")]
    pub result: String,
}

/// Daemon event display for monitor command
#[derive(Debug, Tabled, Serialize)]
pub struct EventRow {
    #[tabled(rename = "Time")]
    pub elapsed: String,
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Event")]
    pub kind: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}
