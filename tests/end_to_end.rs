use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use xmldesk::prelude::*;
use xmldesk::synthesizer::{desk_key, field_type_for, DASHBOARD_DESK};

const CAMPUS: &str = r#"<?xml version="1.0"?>
<APP name="campus" title="Campus">
  <MENU name="main">
    <MENU name="home">1</MENU>
    <MENU name="people">2</MENU>
  </MENU>
  <DESK name="Home" key="1">
    <DASHBOARD name="Overview">
      <TILE title="Students" table="students" jumpview="2"><TEXTFIELD>n</TEXTFIELD></TILE>
      <TILE title="Fees paid" table="fees" where="paid = true"><TEXTFIELD fnct="SUM(amount)">n</TEXTFIELD></TILE>
    </DASHBOARD>
    <JASPER name="Summary" reportfile="summary.jasper"/>
  </DESK>
  <DESK name="People" key="2" w="800" h="600">
    <JASPER name="Roster" reportfile="roster.jasper"/>
    <GRID name="Students" table="students" orderby="surname" limit="2">
      <TEXTFIELD title="Surname">surname</TEXTFIELD>
      <CHECKBOX>active</CHECKBOX>
      <TEXTDATE>born</TEXTDATE>
    </GRID>
  </DESK>
  <DESK name="Empty" key="3"/>
</APP>"#;

const GRID_SQL: &str = "SELECT surname, active, born FROM students ORDER BY surname LIMIT 2";

/// Answers known SQL text; anything else fails like a missing relation.
#[derive(Default)]
struct Canned {
    scalars: HashMap<String, Value>,
    rows: HashMap<String, Vec<Row>>,
    seen: Mutex<Vec<String>>,
}

impl Canned {
    fn campus() -> Self {
        let mut canned = Canned::default();
        canned.scalars.insert(
            "SELECT COUNT(*) FROM students WHERE 1=1".to_string(),
            Value::from(2),
        );
        canned.scalars.insert(
            "SELECT SUM(amount) FROM fees WHERE paid = true".to_string(),
            Value::Null,
        );
        canned.rows.insert(
            GRID_SQL.to_string(),
            vec![
                row(&[
                    ("surname", Value::from("Adeyemi")),
                    ("active", Value::Bool(true)),
                    ("born", Value::from("2002-07-14")),
                ]),
                row(&[
                    ("surname", Value::from("O'Hara & Sons")),
                    ("active", Value::Bool(false)),
                    ("born", Value::Null),
                ]),
            ],
        );
        canned
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for Canned {
    async fn fetch_rows(&self, sql: &str) -> DeskResult<Vec<Row>> {
        self.seen.lock().unwrap().push(sql.to_string());
        self.rows
            .get(sql)
            .cloned()
            .ok_or_else(|| DeskError::query(sql, "relation does not exist"))
    }

    async fn fetch_scalar(&self, sql: &str) -> DeskResult<Option<Value>> {
        self.seen.lock().unwrap().push(sql.to_string());
        match self.scalars.get(sql) {
            Some(v) => Ok(Some(v.clone())),
            None => Err(DeskError::query(sql, "relation does not exist")),
        }
    }
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_dashboard_desk_renders_dashboard_only() {
    let app = parse(CAMPUS).unwrap();
    let db = Canned::campus();

    let html = render_desk(app.find_desk("1").unwrap(), &db).await.unwrap();
    assert!(html.starts_with("<div class=\"dashboard\">"));
    assert!(!html.contains("desk-container"));
    assert!(!html.contains("generateReport"));
    assert!(html.contains("<span class=\"tile-number\">2</span>"));
    // NULL aggregate shows as zero
    assert!(html.contains("<span class=\"tile-number\">0</span>"));
    assert!(html.contains("jumpToView('2')"));
    assert_eq!(
        db.seen(),
        vec![
            "SELECT COUNT(*) FROM students WHERE 1=1",
            "SELECT SUM(amount) FROM fees WHERE paid = true",
        ]
    );
}

#[tokio::test]
async fn test_desk_view_renders_every_component() {
    let app = parse(CAMPUS).unwrap();
    let db = Canned::campus();

    let html = render_desk_view(app.find_desk("1").unwrap(), &db).await.unwrap();
    assert!(html.starts_with("<div class=\"desk-container\">"));
    let dashboard = html.find("class=\"dashboard\"").unwrap();
    let report = html.find("generateReport('summary.jasper')").unwrap();
    assert!(dashboard < report);
}

#[tokio::test]
async fn test_mixed_desk_renders_in_container() {
    let app = parse(CAMPUS).unwrap();
    let db = Canned::campus();

    let html = render_desk(app.find_desk("2").unwrap(), &db).await.unwrap();
    assert!(html.starts_with("<div class=\"desk-container\" style=\"width: 800px; height: 600px;\">"));
    assert!(html.contains("<h2>People</h2>"));
    assert!(html.contains("generateReport('roster.jasper')"));
    assert!(html.contains("<td>Adeyemi</td>"));
    assert!(html.contains("<td>O&#39;Hara &amp; Sons</td>"));
    assert!(html.contains("<td>2002-07-14</td>"));
    assert!(html.contains("<input type=\"checkbox\" checked disabled>"));
    assert!(html.find("Adeyemi").unwrap() < html.find("O&#39;Hara").unwrap());
    assert_eq!(db.seen(), vec![GRID_SQL]);
}

#[tokio::test]
async fn test_empty_desk_renders_empty_container() {
    let app = parse(CAMPUS).unwrap();
    let db = Canned::campus();

    let html = render_desk(app.find_desk("3").unwrap(), &db).await.unwrap();
    assert_eq!(html, "<div class=\"desk-container\">\n  <h2>Empty</h2>\n</div>\n");
    assert!(db.seen().is_empty());
}

#[tokio::test]
async fn test_query_failure_surfaces_with_sql() {
    let app = parse(CAMPUS).unwrap();
    let db = Canned::default();

    match render_desk(app.find_desk("2").unwrap(), &db).await.unwrap_err() {
        DeskError::QueryExecution { sql, .. } => assert_eq!(sql, GRID_SQL),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_menu_leaves_point_at_desks() {
    let app = parse(CAMPUS).unwrap();
    for leaf in &app.menus()[0].children {
        assert!(app.find_desk(&leaf.key).is_some(), "dangling menu {}", leaf.key);
    }
    assert_eq!(app.tables(), vec!["students", "fees"]);
}

/// Fixed schema for the generator.
struct Fixed(Vec<TableSchema>);

#[async_trait]
impl Introspect for Fixed {
    async fn list_tables(&self) -> DeskResult<Vec<String>> {
        Ok(self.0.iter().map(|t| t.name.clone()).collect())
    }

    async fn list_columns(&self, table: &str) -> DeskResult<Vec<ColumnInfo>> {
        Ok(self
            .0
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn try_count_rows(&self, _table: &str) -> DeskResult<i64> {
        Ok(0)
    }

    async fn try_sample_rows(&self, _table: &str, _limit: u32) -> DeskResult<Vec<Row>> {
        Ok(Vec::new())
    }
}

fn campus_schema() -> Fixed {
    Fixed(vec![
        TableSchema::new(
            "courses",
            vec![
                ColumnInfo::new("course_id", "integer").primary_key(),
                ColumnInfo::new("code", "character varying").max_length(10),
                ColumnInfo::new("credits", "numeric"),
            ],
        ),
        TableSchema::new(
            "students",
            vec![
                ColumnInfo::new("id", "bigint").primary_key(),
                ColumnInfo::new("surname", "text").not_null(),
                ColumnInfo::new("active", "boolean"),
                ColumnInfo::new("born", "date"),
            ],
        ),
    ])
}

#[tokio::test]
async fn test_generated_app_parses_back() {
    let schema = campus_schema();
    let xml = XmlGenerator::new(&schema).generate_auto("Campus").await.unwrap();
    let app = parse(&xml).unwrap();

    assert_eq!(app.name, "Campus");
    assert_eq!(app.desks().len(), 3);
    assert!(app.find_desk(DASHBOARD_DESK).is_some());

    let menu_keys: Vec<&str> = app.menus()[0].children.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(menu_keys, vec![DASHBOARD_DESK, "courses_desk", "students_desk"]);

    for table in &schema.0 {
        let desk = app.find_desk(&desk_key(&table.name)).unwrap();
        let Component::Grid(grid) = &desk.components[0] else {
            panic!("expected grid on {}", desk.key);
        };
        let kinds: Vec<FieldType> = grid.fields.iter().map(Field::field_type).collect();
        let expected: Vec<FieldType> = table
            .columns
            .iter()
            .map(|c| field_type_for(&c.data_type))
            .collect();
        assert_eq!(kinds, expected);
        assert_eq!(grid.keyfield.as_deref(), table.primary_key().map(|c| c.name.as_str()));
        assert_eq!(grid.actions.len(), 3);
        assert_eq!(grid.forms[0].fields.len(), table.columns.len());
    }
}

#[tokio::test]
async fn test_generated_desk_renders() {
    let schema = campus_schema();
    let xml = XmlGenerator::new(&schema).generate_auto("Campus").await.unwrap();
    let app = parse(&xml).unwrap();

    let mut db = Canned::default();
    db.rows.insert(
        "SELECT id, surname, active, born FROM students ORDER BY id".to_string(),
        vec![row(&[
            ("id", Value::from(7)),
            ("surname", Value::from("Nakamura")),
            ("active", Value::Bool(true)),
            ("born", Value::from("2001-01-31 00:00:00")),
        ])],
    );

    let html = render_desk(app.find_desk("students_desk").unwrap(), &db).await.unwrap();
    assert!(html.contains("<th style=\"width: 80px;\">Id</th>"));
    assert!(html.contains("<td>Nakamura</td>"));
    assert!(html.contains("<td>2001-01-31</td>"));
}

#[tokio::test]
async fn test_generated_table_grid() {
    let schema = campus_schema();
    let grid = XmlGenerator::new(&schema)
        .generate_table_grid("courses")
        .await
        .unwrap();
    assert_eq!(grid.table, "courses");
    assert_eq!(grid.orderby.as_deref(), Some("course_id"));
    let widths: Vec<Option<u32>> = grid.fields.iter().map(|f| f.width).collect();
    assert_eq!(widths, vec![Some(80), Some(80), Some(100)]);
    assert_eq!(grid.to_sql(), "SELECT course_id, code, credits FROM courses ORDER BY course_id");
}
