//! Descriptor synthesis from a live schema.
//!
//! Writes APP documents for introspected tables: one desk per table holding
//! a grid, its edit form and the standard INSERT/UPDATE/DELETE hooks, plus a
//! dashboard desk counting rows and a menu linking everything. The output
//! feeds straight back into [`crate::parser::parse`].
//!
//! Column types map onto field kinds as follows:
//!
//! | Data type                                  | Field kind    | Width          |
//! |--------------------------------------------|---------------|----------------|
//! | `boolean`                                  | `checkbox`    | 50             |
//! | `date`, `timestamp`, `timestamptz`         | `textdate`    | 120            |
//! | `integer`, `bigint`                        | `textfield`   | 80             |
//! | `numeric`, `decimal`, `real`, `double precision` | `textdecimal` | 100      |
//! | `text`                                     | `textarea`    | length rule    |
//! | anything else                              | `textfield`   | length rule    |
//!
//! The length rule is `min(max_length * 8, 200)` when a maximum length is
//! declared and 150 otherwise.

use tracing::info;

use crate::ast::{Component, FieldType, Grid};
use crate::error::{DeskError, DeskResult};
use crate::markup::escape;
use crate::parser::parse_desk_document;
use crate::schema::{ColumnInfo, Introspect, TableSchema};

/// Key of the generated dashboard desk, unless a table desk already uses it.
pub const DASHBOARD_DESK: &str = "dashboard_desk";

const FORM_X: u32 = 10;
const FORM_FIELD_WIDTH: u32 = 200;
const FORM_FIELD_HEIGHT: u32 = 25;
const FORM_TEXTAREA_HEIGHT: u32 = 60;

/// Field kind for a column's declared data type.
pub fn field_type_for(data_type: &str) -> FieldType {
    match data_type.trim().to_ascii_lowercase().as_str() {
        "boolean" => FieldType::Checkbox,
        "date" | "timestamp" | "timestamptz" | "timestamp without time zone"
        | "timestamp with time zone" => FieldType::TextDate,
        "numeric" | "decimal" | "real" | "double precision" => FieldType::TextDecimal,
        "text" => FieldType::TextArea,
        _ => FieldType::TextField,
    }
}

/// Grid column width for a column.
pub fn default_width(column: &ColumnInfo) -> u32 {
    match column.data_type.trim().to_ascii_lowercase().as_str() {
        "boolean" => 50,
        "date" | "timestamp" | "timestamptz" | "timestamp without time zone"
        | "timestamp with time zone" => 120,
        "integer" | "bigint" => 80,
        "numeric" | "decimal" | "real" | "double precision" => 100,
        _ => column
            .max_length
            .map(|n| n.saturating_mul(8).min(200))
            .unwrap_or(150),
    }
}

/// Key of the desk generated for `table`.
pub fn desk_key(table: &str) -> String {
    format!("{}_desk", table)
}

/// Key for the dashboard desk that no table desk in `tables` takes.
///
/// A table named `dashboard` owns `dashboard_desk`, so the dashboard moves
/// to `dashboard_desk_1` (or the next free suffix).
pub fn dashboard_key(tables: &[TableSchema]) -> String {
    let taken = |key: &str| tables.iter().any(|t| desk_key(&t.name) == key);
    let mut key = DASHBOARD_DESK.to_string();
    let mut n = 1;
    while taken(&key) {
        key = format!("{}_{}", DASHBOARD_DESK, n);
        n += 1;
    }
    key
}

/// Write a complete APP document for `tables`.
pub fn synthesize(app_name: &str, tables: &[TableSchema]) -> String {
    let name = escape(app_name);
    let dashboard = dashboard_key(tables);
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<APP name=\"{}\" title=\"{}\" database=\"postgresql\" authentication=\"true\">\n",
        name, name
    ));
    push_menu(&mut xml, &dashboard, tables);
    push_dashboard(&mut xml, &dashboard, tables);
    for table in tables {
        push_table_desk(&mut xml, table, 1);
    }
    xml.push_str("</APP>\n");
    xml
}

/// Write a standalone DESK document for one table.
pub fn synthesize_table_desk(table: &TableSchema) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    push_table_desk(&mut xml, table, 0);
    xml
}

fn push_menu(xml: &mut String, dashboard: &str, tables: &[TableSchema]) {
    xml.push_str("  <MENU name=\"main\" title=\"Main Menu\" icon=\"fas fa-home\">\n");
    xml.push_str(&format!(
        "    <MENU name=\"dashboard\" title=\"Dashboard\" icon=\"fas fa-tachometer-alt\">{}</MENU>\n",
        escape(dashboard)
    ));
    for table in tables {
        let name = escape(&table.name);
        xml.push_str(&format!(
            "    <MENU name=\"{}\" title=\"{}\" icon=\"fas fa-table\">{}</MENU>\n",
            name,
            escape(&capitalize(&table.name)),
            escape(&desk_key(&table.name))
        ));
    }
    xml.push_str("  </MENU>\n");
}

fn push_dashboard(xml: &mut String, dashboard: &str, tables: &[TableSchema]) {
    xml.push_str(&format!(
        "  <DESK name=\"Dashboard\" key=\"{}\">\n",
        escape(dashboard)
    ));
    xml.push_str("    <DASHBOARD name=\"Dashboard\" w=\"1200\" refresh=\"30\">\n");
    for table in tables {
        let name = escape(&table.name);
        xml.push_str(&format!(
            "      <TILE name=\"{}_count\" title=\"Total {}\" table=\"{}\" jumpview=\"{}\">\n",
            name,
            escape(&capitalize(&table.name)),
            name,
            escape(&desk_key(&table.name))
        ));
        xml.push_str(&format!(
            "        <TEXTFIELD icon=\"fas fa-database\" fnct=\"COUNT(*)\">total_{}</TEXTFIELD>\n",
            name
        ));
        xml.push_str("      </TILE>\n");
    }
    xml.push_str("    </DASHBOARD>\n");
    xml.push_str("  </DESK>\n");
}

fn push_table_desk(xml: &mut String, table: &TableSchema, level: usize) {
    let pad = "  ".repeat(level);
    let name = escape(&table.name);
    let title = escape(&capitalize(&table.name)).into_owned();
    let keyfield = table
        .primary_key()
        .map(|c| c.name.as_str())
        .unwrap_or("id");
    let orderby = table
        .column(keyfield)
        .map(|c| format!(" orderby=\"{}\"", escape(&c.name)))
        .unwrap_or_default();

    xml.push_str(&format!(
        "{}<DESK name=\"{}\" key=\"{}\">\n",
        pad,
        title,
        escape(&desk_key(&table.name))
    ));
    xml.push_str(&format!(
        "{}  <GRID name=\"{}\" keyfield=\"{}\" table=\"{}\"{}>\n",
        pad,
        title,
        escape(keyfield),
        name,
        orderby
    ));
    for column in &table.columns {
        xml.push_str(&format!("{}    {}\n", pad, grid_field(column)));
    }

    xml.push_str(&format!(
        "{}    <FORM name=\"{}\" keyfield=\"{}\" table=\"{}\">\n",
        pad,
        title,
        escape(keyfield),
        name
    ));
    let mut y = 10;
    for column in &table.columns {
        let (field, step) = form_field(column, y);
        xml.push_str(&format!("{}      {}\n", pad, field));
        y += step;
    }
    xml.push_str(&format!("{}    </FORM>\n", pad));

    xml.push_str(&format!("{}    <ACTIONS>\n", pad));
    for (fnct, label, hook) in [
        ("INSERT", "Add New", "add"),
        ("UPDATE", "Update", "update"),
        ("DELETE", "Delete", "delete"),
    ] {
        xml.push_str(&format!(
            "{}      <ACTION fnct=\"{}\" title=\"{}\" phase=\"before\">{}_{}</ACTION>\n",
            pad, fnct, label, hook, name
        ));
    }
    xml.push_str(&format!("{}    </ACTIONS>\n", pad));
    xml.push_str(&format!("{}  </GRID>\n", pad));
    xml.push_str(&format!("{}</DESK>\n", pad));
}

fn grid_field(column: &ColumnInfo) -> String {
    let tag = field_type_for(&column.data_type).tag();
    format!(
        "<{tag} w=\"{}\" title=\"{}\">{}</{tag}>",
        default_width(column),
        escape(&capitalize(&column.name)),
        escape(&column.name),
    )
}

/// Form control for a column at height `y`, and how far the next one moves down.
fn form_field(column: &ColumnInfo, y: u32) -> (String, u32) {
    let name = escape(&column.name);
    let title = escape(&capitalize(&column.name)).into_owned();
    let required = if column.nullable { "false" } else { "true" };

    match field_type_for(&column.data_type) {
        FieldType::Checkbox => (
            format!(
                "<CHECKBOX w=\"{}\" h=\"{}\" x=\"{}\" y=\"{}\" title=\"{}\">{}</CHECKBOX>",
                FORM_FIELD_WIDTH, FORM_FIELD_HEIGHT, FORM_X, y, title, name
            ),
            40,
        ),
        FieldType::TextDate => (
            format!(
                "<TEXTDATE w=\"{}\" h=\"{}\" x=\"{}\" y=\"{}\" title=\"{}\" required=\"{}\">{}</TEXTDATE>",
                FORM_FIELD_WIDTH, FORM_FIELD_HEIGHT, FORM_X, y, title, required, name
            ),
            40,
        ),
        FieldType::TextArea => (
            format!(
                "<TEXTAREA w=\"{}\" h=\"{}\" x=\"{}\" y=\"{}\" title=\"{}\">{}</TEXTAREA>",
                FORM_FIELD_WIDTH, FORM_TEXTAREA_HEIGHT, FORM_X, y, title, name
            ),
            80,
        ),
        // Forms have no decimal control; those columns edit as text.
        FieldType::TextField
        | FieldType::TextDecimal
        | FieldType::ComboBox
        | FieldType::ComboList
        | FieldType::Browser => (
            format!(
                "<TEXTFIELD w=\"{}\" h=\"{}\" x=\"{}\" y=\"{}\" title=\"{}\" required=\"{}\">{}</TEXTFIELD>",
                FORM_FIELD_WIDTH, FORM_FIELD_HEIGHT, FORM_X, y, title, required, name
            ),
            40,
        ),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Generates documents from whatever an [`Introspect`] reports.
pub struct XmlGenerator<'a, I: Introspect + ?Sized> {
    inspector: &'a I,
}

impl<'a, I: Introspect + ?Sized> XmlGenerator<'a, I> {
    pub fn new(inspector: &'a I) -> Self {
        Self { inspector }
    }

    /// Full APP document for the named tables.
    pub async fn generate_full_app(&self, app_name: &str, tables: &[String]) -> DeskResult<String> {
        let schemas = self.inspector.table_schemas(tables).await?;
        info!(app = app_name, tables = schemas.len(), "generating app document");
        Ok(synthesize(app_name, &schemas))
    }

    /// Full APP document for every base table.
    pub async fn generate_auto(&self, app_name: &str) -> DeskResult<String> {
        let tables = self.inspector.list_tables().await?;
        self.generate_full_app(app_name, &tables).await
    }

    /// Standalone DESK document for one table.
    pub async fn generate_table_grid_xml(&self, table: &str) -> DeskResult<String> {
        let schema = self.inspector.table_schema(table).await?;
        if schema.columns.is_empty() {
            return Err(DeskError::UnknownIdentifier(format!(
                "table '{}' has no columns",
                table
            )));
        }
        Ok(synthesize_table_desk(&schema))
    }

    /// The grid a generated desk for `table` would show.
    pub async fn generate_table_grid(&self, table: &str) -> DeskResult<Grid> {
        let xml = self.generate_table_grid_xml(table).await?;
        let desk = parse_desk_document(&xml)?;
        desk.components
            .into_iter()
            .find_map(|c| match c {
                Component::Grid(g) => Some(g),
                _ => None,
            })
            .ok_or_else(|| DeskError::InvalidDescriptor(format!("no grid generated for '{}'", table)))
    }
}
