//! # xmldesk
//!
//! Declarative database desks described in XML.
//!
//! An APP document declares menus and desks. Each desk holds dashboards,
//! grids, forms, report buttons and filters bound to database tables.
//! xmldesk parses the document, compiles the SQL each component needs,
//! runs it, and renders HTML fragments. It can also go the other way and
//! write a starter document from a live schema.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use xmldesk::prelude::*;
//!
//! let app = xmldesk::parse(&std::fs::read_to_string("config/app.xml")?)?;
//! let db = DeskDB::connect("postgres://localhost/campus", 5).await?;
//!
//! let desk = app.find_desk("965").ok_or("no such desk")?;
//! let html = render_desk(desk, &db).await?;
//! ```
//!
//! ## Document Elements
//!
//! | Element     | Becomes                                   |
//! |-------------|-------------------------------------------|
//! | `APP`       | [`ast::AppDescriptor`]                    |
//! | `MENU`      | [`ast::MenuNode`], nestable               |
//! | `DESK`      | [`ast::Desk`], looked up by `key`         |
//! | `DASHBOARD` | tiles of `SELECT fn FROM t WHERE ...`     |
//! | `GRID`      | a table of rows with forms and subgrids   |
//! | `FORM`      | absolutely positioned edit controls       |
//! | `JASPER`    | a report button                           |
//! | `FILTER`    | drilldown selects and report buttons      |

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod markup;
pub mod parser;
pub mod renderer;
pub mod schema;
pub mod synthesizer;
pub mod transpiler;
pub mod validator;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::Config;
    pub use crate::engine::{execute_grid, execute_tile, DataSource, DeskDB, Row};
    pub use crate::error::*;
    pub use crate::parser::parse;
    pub use crate::renderer::{render_component, render_desk, render_desk_view, ComponentData};
    pub use crate::schema::{ColumnInfo, Introspect, PgInspector, TableSchema};
    pub use crate::synthesizer::{synthesize, XmlGenerator};
    pub use crate::transpiler::ToSql;
    pub use crate::validator::Validator;
}

/// Parse an APP document into its descriptor tree.
///
/// # Example
///
/// ```
/// use xmldesk::parse;
///
/// let app = parse(r#"<APP name="campus"><DESK key="1" name="Home"/></APP>"#).unwrap();
/// assert_eq!(app.find_desk("1").unwrap().name, "Home");
/// ```
pub fn parse(input: &str) -> Result<ast::AppDescriptor, error::DeskError> {
    parser::parse(input)
}
