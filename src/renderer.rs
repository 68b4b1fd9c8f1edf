//! HTML rendering for desks and their components.
//!
//! Rendering is a pure function of a component and data that was already
//! fetched; [`render_desk`] and [`render_desk_view`] do the fetching through
//! a [`DataSource`] first. Every value taken from the document or the
//! database is escaped on the way out.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::ast::*;
use crate::engine::{execute_grid, execute_tile, DataSource, Row};
use crate::error::{DeskError, DeskResult};
use crate::markup::{escape, escape_js};

const DEFAULT_TILE_ICON: &str = "fa fa-info";

/// Data fetched for one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ComponentData {
    /// Components that show no query results.
    #[default]
    None,
    /// One value per dashboard tile, in tile order.
    Tiles(Vec<Value>),
    /// Grid rows in query order.
    Rows(Vec<Row>),
}

/// Render one component from already-fetched data.
pub fn render_component(component: &Component, data: &ComponentData) -> DeskResult<String> {
    match component {
        Component::Dashboard(dashboard) => {
            let values = match data {
                ComponentData::Tiles(values) => values.as_slice(),
                _ => &[],
            };
            Ok(render_dashboard(dashboard, values))
        }
        Component::Grid(grid) => {
            let rows = match data {
                ComponentData::Rows(rows) => rows.as_slice(),
                _ => &[],
            };
            render_grid(grid, rows)
        }
        Component::Form(form) => Ok(render_form(form)),
        Component::Jasper(jasper) => Ok(render_jasper(jasper)),
        Component::Filter(filter) => Ok(render_filter(filter)),
    }
}

/// Run the queries a component needs, one after another.
pub async fn fetch_component<D>(source: &D, component: &Component) -> DeskResult<ComponentData>
where
    D: DataSource + ?Sized,
{
    match component {
        Component::Dashboard(dashboard) => {
            let mut values = Vec::with_capacity(dashboard.tiles.len());
            for tile in &dashboard.tiles {
                values.push(execute_tile(source, tile).await?);
            }
            Ok(ComponentData::Tiles(values))
        }
        Component::Grid(grid) => Ok(ComponentData::Rows(execute_grid(source, grid).await?)),
        Component::Form(_) | Component::Jasper(_) | Component::Filter(_) => Ok(ComponentData::None),
    }
}

/// Page-level rendering of a desk.
///
/// A desk whose first component is a dashboard or a grid shows only that
/// component. Any other desk shows all of its components.
pub async fn render_desk<D>(desk: &Desk, source: &D) -> DeskResult<String>
where
    D: DataSource + ?Sized,
{
    match desk.components.first() {
        Some(primary @ (Component::Dashboard(_) | Component::Grid(_))) => {
            let data = fetch_component(source, primary).await?;
            render_component(primary, &data)
        }
        _ => render_desk_view(desk, source).await,
    }
}

/// Render every component of a desk, in document order, inside one container.
pub async fn render_desk_view<D>(desk: &Desk, source: &D) -> DeskResult<String>
where
    D: DataSource + ?Sized,
{
    let mut parts = Vec::with_capacity(desk.components.len());
    for component in &desk.components {
        let data = fetch_component(source, component).await?;
        parts.push(render_component(component, &data)?);
    }
    Ok(desk_container(desk, &parts))
}

fn desk_container(desk: &Desk, parts: &[String]) -> String {
    let mut html = format!(
        "<div class=\"desk-container\"{}>\n  <h2>{}</h2>\n",
        size_style(desk.width, desk.height),
        escape(&desk.name)
    );
    for part in parts {
        html.push_str(part);
    }
    html.push_str("</div>\n");
    html
}

pub fn render_dashboard(dashboard: &Dashboard, values: &[Value]) -> String {
    let mut html = format!(
        "<div class=\"dashboard\"{}>\n  <h3>{}</h3>\n  <div class=\"tiles-container\">\n",
        size_style(dashboard.width, None),
        escape(&dashboard.name)
    );
    for (i, tile) in dashboard.tiles.iter().enumerate() {
        let value = values.get(i).map(display_value).unwrap_or_else(|| "0".to_string());
        html.push_str(&render_tile(tile, &value));
    }
    html.push_str("  </div>\n</div>\n");
    html
}

fn render_tile(tile: &Tile, value: &str) -> String {
    let onclick = tile
        .jump_target
        .as_deref()
        .map(|key| format!(" onclick=\"jumpToView('{}')\"", escape_js(key)))
        .unwrap_or_default();
    let icon = tile.aggregate.icon.as_deref().unwrap_or(DEFAULT_TILE_ICON);

    format!(
        "    <div class=\"tile\"{}>\n      <div class=\"tile-header\">\n        <i class=\"{}\"></i>\n        <span class=\"tile-title\">{}</span>\n      </div>\n      <div class=\"tile-content\">\n        <span class=\"tile-number\">{}</span>\n      </div>\n    </div>\n",
        onclick,
        escape(icon),
        escape(&tile.title),
        escape(value)
    )
}

pub fn render_grid(grid: &Grid, rows: &[Row]) -> DeskResult<String> {
    let mut html = format!(
        "<div class=\"grid-container\">\n  <h3>{}</h3>\n  <table class=\"data-grid\">\n    <thead>\n      <tr>",
        escape(&grid.name)
    );
    for field in &grid.fields {
        match field.width {
            Some(w) => html.push_str(&format!(
                "<th style=\"width: {}px;\">{}</th>",
                w,
                escape(field.label())
            )),
            None => html.push_str(&format!("<th>{}</th>", escape(field.label()))),
        }
    }
    html.push_str("</tr>\n    </thead>\n    <tbody>\n");

    for row in rows {
        html.push_str("      <tr>");
        for field in &grid.fields {
            html.push_str(&render_cell(field, row.get(&field.name))?);
        }
        html.push_str("</tr>\n");
    }

    html.push_str("    </tbody>\n  </table>\n</div>\n");
    Ok(html)
}

/// Render one grid cell.
pub fn render_cell(field: &Field, value: Option<&Value>) -> DeskResult<String> {
    let cell = match &field.kind {
        FieldKind::Checkbox => {
            let checked = if value.is_some_and(truthy) { " checked" } else { "" };
            format!("<td><input type=\"checkbox\"{} disabled></td>", checked)
        }
        FieldKind::TextDate => format!("<td>{}</td>", format_date(field, value)?),
        FieldKind::Browser { action, .. } => {
            let shown = value.map(display_value).unwrap_or_default();
            format!(
                "<td><a href=\"#\" onclick=\"openBrowser('{}', '{}')\">{}</a></td>",
                escape_js(action.as_deref().unwrap_or_default()),
                escape_js(&shown),
                escape(field.label())
            )
        }
        FieldKind::TextField { .. }
        | FieldKind::TextArea
        | FieldKind::TextDecimal
        | FieldKind::ComboBox(_)
        | FieldKind::ComboList { .. } => {
            let shown = value.map(display_value).unwrap_or_default();
            format!("<td>{}</td>", escape(&shown))
        }
    };
    Ok(cell)
}

/// Reformat a textdate value as `YYYY-MM-DD`.
fn format_date(field: &Field, value: Option<&Value>) -> DeskResult<String> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(String::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(String::new()),
        Some(Value::String(s)) => s.trim(),
        Some(other) => {
            return Err(DeskError::DateFormat {
                field: field.name.clone(),
                value: other.to_string(),
            });
        }
    };

    parse_date(raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| DeskError::DateFormat {
            field: field.name.clone(),
            value: raw.to_string(),
        })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "t" | "true" | "1" | "y" | "yes" | "on"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render_form(form: &Form) -> String {
    let style = match (form.width, form.height) {
        (None, None) => " style=\"position: relative;\"".to_string(),
        (w, h) => {
            let mut s = String::from(" style=\"position: relative;");
            if let Some(w) = w {
                s.push_str(&format!(" width: {}px;", w));
            }
            if let Some(h) = h {
                s.push_str(&format!(" height: {}px;", h));
            }
            s.push('"');
            s
        }
    };
    let mut html = format!(
        "<div class=\"form-container\"{}>\n  <h4>{}</h4>\n  <form>\n",
        style,
        escape(&form.name)
    );
    for field in &form.fields {
        html.push_str(&render_form_field(field));
    }
    html.push_str("  </form>\n</div>\n");
    html
}

/// Render one absolutely positioned form control.
pub fn render_form_field(field: &Field) -> String {
    let placement = field.placement.unwrap_or_default();
    let mut style = format!(
        "position: absolute; left: {}px; top: {}px;",
        placement.x, placement.y
    );
    if let Some(w) = field.width {
        style.push_str(&format!(" width: {}px;", w));
    }
    if let Some(h) = placement.height {
        style.push_str(&format!(" height: {}px;", h));
    }

    let name = escape(&field.name);
    let title = escape(field.label());
    let required = if field.required { " required" } else { "" };

    let control = match &field.kind {
        FieldKind::TextField { .. } => format!(
            "<label>{}</label>\n      <input type=\"text\" name=\"{}\"{} />",
            title, name, required
        ),
        FieldKind::TextArea => format!(
            "<label>{}</label>\n      <textarea name=\"{}\"{}></textarea>",
            title, name, required
        ),
        FieldKind::ComboBox(lookup) => format!(
            "<label>{}</label>\n      <select name=\"{}\"{}>\n        <!-- Options loaded from {} -->\n      </select>",
            title,
            name,
            required,
            comment_text(lookup.table.as_deref().unwrap_or("lookup table"))
        ),
        FieldKind::ComboList { options } => {
            let opts: String = options
                .iter()
                .map(|o| format!("<option value=\"{}\">{}</option>", escape(o), escape(o)))
                .collect();
            format!(
                "<label>{}</label>\n      <select name=\"{}\"{}>{}</select>",
                title, name, required, opts
            )
        }
        FieldKind::Checkbox => format!(
            "<label>\n        <input type=\"checkbox\" name=\"{}\" />\n        {}\n      </label>",
            name, title
        ),
        FieldKind::TextDate => format!(
            "<label>{}</label>\n      <input type=\"date\" name=\"{}\"{} />",
            title, name, required
        ),
        FieldKind::TextDecimal | FieldKind::Browser { .. } => {
            return format!(
                "    <div style=\"{}\">Unknown field type: {}</div>\n",
                style,
                field.field_type()
            );
        }
    };

    format!("    <div style=\"{}\">\n      {}\n    </div>\n", style, control)
}

/// Text safe to place inside an HTML comment.
fn comment_text(s: &str) -> String {
    escape(s).replace("--", "- -")
}

pub fn render_jasper(jasper: &Jasper) -> String {
    format!(
        "<div class=\"jasper-report\">\n  <h4>{}</h4>\n  <button onclick=\"generateReport('{}')\">Generate Report</button>\n</div>\n",
        escape(&jasper.name),
        escape_js(&jasper.reportfile)
    )
}

pub fn render_filter(filter: &Filter) -> String {
    let location = filter
        .location
        .as_deref()
        .map(|l| format!(" data-location=\"{}\"", escape(l)))
        .unwrap_or_default();
    let mut html = format!(
        "<div class=\"filter\"{}>\n  <h4>{}</h4>\n",
        location,
        escape(&filter.name)
    );
    for step in &filter.drilldowns {
        html.push_str(&format!(
            "  <div class=\"drilldown\" data-table=\"{}\" data-key=\"{}\">\n    <label>{}</label>\n    <select name=\"{}\">\n      <!-- Options loaded from {}.{} -->\n    </select>\n  </div>\n",
            escape(&step.table),
            escape(&step.key_field),
            escape(&step.name),
            escape(&step.key_field),
            comment_text(&step.table),
            comment_text(&step.list_field)
        ));
    }
    for report in &filter.reports {
        html.push_str(&render_jasper(report));
    }
    html.push_str("</div>\n");
    html
}

fn size_style(width: Option<u32>, height: Option<u32>) -> String {
    match (width, height) {
        (None, None) => String::new(),
        (w, h) => {
            let mut s = String::from(" style=\"");
            if let Some(w) = w {
                s.push_str(&format!("width: {}px;", w));
            }
            if let Some(h) = h {
                if w.is_some() {
                    s.push(' ');
                }
                s.push_str(&format!("height: {}px;", h));
            }
            s.push('"');
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn field(kind: FieldKind) -> Field {
        Field {
            name: "col".to_string(),
            title: Some("Col".to_string()),
            width: Some(80),
            placement: None,
            required: false,
            kind,
        }
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn grid() -> Grid {
        let app = parse(r#"<APP><DESK key="1"><GRID name="Students" table="students">
            <TEXTFIELD w="80" title="ID">id</TEXTFIELD>
            <CHECKBOX w="50" title="Enrolled">enrolled</CHECKBOX>
            <TEXTDATE w="120">birth_date</TEXTDATE>
        </GRID></DESK></APP>"#)
        .unwrap();
        match app.desks()[0].components[0].clone() {
            Component::Grid(g) => g,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_grid_has_header_and_empty_body() {
        let html = render_grid(&grid(), &[]).unwrap();
        assert!(html.contains("<th style=\"width: 80px;\">ID</th>"));
        assert!(html.contains("<th style=\"width: 120px;\">birth_date</th>"));
        assert!(html.contains("<tbody>\n    </tbody>"));
        assert!(!html.contains("<td>"));
    }

    #[test]
    fn test_grid_rows_in_order() {
        let rows = vec![
            row(&[("id", Value::from(2)), ("enrolled", Value::Bool(true)), ("birth_date", Value::from("2001-03-04"))]),
            row(&[("id", Value::from(1)), ("enrolled", Value::Bool(false)), ("birth_date", Value::Null)]),
        ];
        let html = render_grid(&grid(), &rows).unwrap();
        let first = html.find("<td>2</td>").unwrap();
        let second = html.find("<td>1</td>").unwrap();
        assert!(first < second);
        assert!(html.contains("<td>2001-03-04</td>"));
    }

    #[test]
    fn test_checkbox_state() {
        let f = field(FieldKind::Checkbox);
        assert_eq!(
            render_cell(&f, Some(&Value::Bool(true))).unwrap(),
            "<td><input type=\"checkbox\" checked disabled></td>"
        );
        assert_eq!(
            render_cell(&f, Some(&Value::Bool(false))).unwrap(),
            "<td><input type=\"checkbox\" disabled></td>"
        );
        assert_eq!(
            render_cell(&f, Some(&Value::from("f"))).unwrap(),
            "<td><input type=\"checkbox\" disabled></td>"
        );
        assert!(render_cell(&f, Some(&Value::from("t"))).unwrap().contains("checked"));
    }

    #[test]
    fn test_textdate_formats() {
        let f = field(FieldKind::TextDate);
        let cell = |v: &str| render_cell(&f, Some(&Value::from(v)));
        assert_eq!(cell("2024-02-29").unwrap(), "<td>2024-02-29</td>");
        assert_eq!(cell("2024-02-29 13:45:00").unwrap(), "<td>2024-02-29</td>");
        assert_eq!(cell("2024-02-29T13:45:00+02:00").unwrap(), "<td>2024-02-29</td>");
        assert_eq!(render_cell(&f, None).unwrap(), "<td></td>");
    }

    #[test]
    fn test_textdate_garbage_is_an_error() {
        let f = field(FieldKind::TextDate);
        match render_cell(&f, Some(&Value::from("next tuesday"))).unwrap_err() {
            DeskError::DateFormat { field, value } => {
                assert_eq!(field, "col");
                assert_eq!(value, "next tuesday");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(render_cell(&f, Some(&Value::from(20240229))).is_err());
    }

    #[test]
    fn test_browser_cell() {
        let f = field(FieldKind::Browser {
            action: Some("open_cv".to_string()),
            link_field: None,
            blank_page: false,
        });
        assert_eq!(
            render_cell(&f, Some(&Value::from("cv/o'neil.pdf"))).unwrap(),
            "<td><a href=\"#\" onclick=\"openBrowser('open_cv', 'cv/o\\&#39;neil.pdf')\">Col</a></td>"
        );
    }

    #[test]
    fn test_text_cells_are_escaped() {
        let f = field(FieldKind::TextField { format: None });
        assert_eq!(
            render_cell(&f, Some(&Value::from("<script>"))).unwrap(),
            "<td>&lt;script&gt;</td>"
        );
    }

    #[test]
    fn test_dashboard_tiles() {
        let app = parse(r#"<APP><DESK key="1"><DASHBOARD name="Overview" w="900">
            <TILE title="Students" table="students" jumpview="students_desk"><TEXTFIELD icon="fas fa-user">n</TEXTFIELD></TILE>
            <TILE title="Courses" table="courses"><TEXTFIELD>n</TEXTFIELD></TILE>
        </DASHBOARD></DESK></APP>"#)
        .unwrap();
        let component = &app.desks()[0].components[0];
        let html = render_component(component, &ComponentData::Tiles(vec![Value::from(12)])).unwrap();
        assert!(html.contains("style=\"width: 900px;\""));
        assert!(html.contains("onclick=\"jumpToView('students_desk')\""));
        assert!(html.contains("<i class=\"fas fa-user\"></i>"));
        assert!(html.contains("<span class=\"tile-number\">12</span>"));
        // second tile has no value and no icon
        assert!(html.contains("<span class=\"tile-number\">0</span>"));
        assert!(html.contains("<i class=\"fa fa-info\"></i>"));
    }

    #[test]
    fn test_form_controls() {
        let app = parse(r#"<APP><DESK key="1"><FORM name="Edit" tw="400" th="300">
            <TEXTFIELD x="10" y="10" w="200" h="25" title="Name" required="true">name</TEXTFIELD>
            <COMBOBOX x="10" y="50" lptable="programs">program_id</COMBOBOX>
            <COMBOLIST x="10" y="90">level<DATA>BSc</DATA><DATA>MSc</DATA></COMBOLIST>
            <TEXTDATE x="10" y="130">born</TEXTDATE>
        </FORM></DESK></APP>"#)
        .unwrap();
        let html = render_component(&app.desks()[0].components[0], &ComponentData::None).unwrap();
        assert!(html.contains("width: 400px; height: 300px;"));
        assert!(html.contains("left: 10px; top: 10px; width: 200px; height: 25px;"));
        assert!(html.contains("<input type=\"text\" name=\"name\" required />"));
        assert!(html.contains("<!-- Options loaded from programs -->"));
        assert!(html.contains("<option value=\"BSc\">BSc</option><option value=\"MSc\">MSc</option>"));
        assert!(html.contains("<input type=\"date\" name=\"born\" />"));
    }

    #[test]
    fn test_form_unknown_kind_placeholder() {
        let mut f = field(FieldKind::TextDecimal);
        f.placement = Some(Placement { x: 5, y: 6, height: None });
        let html = render_form_field(&f);
        assert!(html.contains("Unknown field type: textdecimal"));
        assert!(html.contains("left: 5px; top: 6px;"));
    }

    #[test]
    fn test_jasper_button() {
        let j = Jasper {
            name: "Roster".to_string(),
            reportfile: "roster.jasper".to_string(),
            filtered: false,
        };
        assert!(render_jasper(&j).contains("<button onclick=\"generateReport('roster.jasper')\">Generate Report</button>"));
    }
}
