//! SQL transpiler for descriptor nodes.
//!
//! Turns tiles and grids into SELECT statements. Identifiers and the
//! `where`/`orderby` expressions are written verbatim from the document;
//! run them through [`crate::validator::Validator`] before trusting them.

use crate::ast::*;

/// Aggregate used when a tile does not declare one.
pub const DEFAULT_AGGREGATE: &str = "COUNT(*)";

/// Condition used when a tile does not declare one.
pub const DEFAULT_CONDITION: &str = "1=1";

/// Trait for converting descriptor nodes to SQL.
pub trait ToSql {
    /// Convert this node to a SQL string.
    fn to_sql(&self) -> String;
}

impl ToSql for Tile {
    fn to_sql(&self) -> String {
        let function = self
            .aggregate
            .function
            .as_deref()
            .unwrap_or(DEFAULT_AGGREGATE);
        let condition = self.r#where.as_deref().unwrap_or(DEFAULT_CONDITION);

        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            function, self.table, condition
        );
        if let Some(group_by) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        sql
    }
}

impl ToSql for Grid {
    fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");

        // Columns
        if self.fields.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
            sql.push_str(&cols.join(", "));
        }

        // FROM
        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        // WHERE
        if let Some(condition) = &self.r#where {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }

        // ORDER BY
        if let Some(order) = &self.orderby {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }

        // LIMIT
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        sql
    }
}

/// Compile the scalar query behind a dashboard tile.
pub fn compile_tile_query(tile: &Tile) -> String {
    tile.to_sql()
}

/// Compile the row query behind a grid.
pub fn compile_grid_query(grid: &Grid) -> String {
    grid.to_sql()
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;

    fn first_component(xml: &str) -> Component {
        let app = parse(xml).unwrap();
        app.desks()[0].components[0].clone()
    }

    fn grid(xml: &str) -> Grid {
        match first_component(xml) {
            Component::Grid(g) => g,
            other => panic!("expected grid, got {:?}", other),
        }
    }

    fn tile(xml: &str) -> Tile {
        match first_component(xml) {
            Component::Dashboard(mut d) => d.tiles.remove(0),
            other => panic!("expected dashboard, got {:?}", other),
        }
    }

    #[test]
    fn test_grid_without_optional_clauses() {
        let g = grid(r#"<APP><DESK key="1"><GRID table="students">
            <TEXTFIELD>id</TEXTFIELD><TEXTFIELD>name</TEXTFIELD></GRID></DESK></APP>"#);
        assert_eq!(g.to_sql(), "SELECT id, name FROM students");
    }

    #[test]
    fn test_grid_with_all_clauses() {
        let g = grid(r#"<APP><DESK key="1"><GRID table="students" where="enrolled = true" orderby="name DESC" limit="25">
            <TEXTFIELD>id</TEXTFIELD><CHECKBOX>enrolled</CHECKBOX></GRID></DESK></APP>"#);
        assert_eq!(
            compile_grid_query(&g),
            "SELECT id, enrolled FROM students WHERE enrolled = true ORDER BY name DESC LIMIT 25"
        );
    }

    #[test]
    fn test_grid_clause_presence_tracks_attributes() {
        let g = grid(r#"<APP><DESK key="1"><GRID table="t" limit="5"><TEXTFIELD>a</TEXTFIELD></GRID></DESK></APP>"#);
        assert_eq!(g.to_sql(), "SELECT a FROM t LIMIT 5");

        let g = grid(r#"<APP><DESK key="1"><GRID table="t" where=" " orderby="a"><TEXTFIELD>a</TEXTFIELD></GRID></DESK></APP>"#);
        assert_eq!(g.to_sql(), "SELECT a FROM t ORDER BY a");
    }

    #[test]
    fn test_tile_defaults() {
        let t = tile(r#"<APP><DESK key="1"><DASHBOARD><TILE title="Students" table="students">
            <TEXTFIELD>total</TEXTFIELD></TILE></DASHBOARD></DESK></APP>"#);
        assert_eq!(t.to_sql(), "SELECT COUNT(*) FROM students WHERE 1=1");
    }

    #[test]
    fn test_tile_with_group_by() {
        let t = tile(r#"<APP><DESK key="1"><DASHBOARD><TILE title="Fees" table="payments" where="paid" groupby="term">
            <TEXTFIELD fnct="SUM(amount)">total</TEXTFIELD></TILE></DASHBOARD></DESK></APP>"#);
        assert_eq!(
            compile_tile_query(&t),
            "SELECT SUM(amount) FROM payments WHERE paid GROUP BY term"
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("students"), "\"students\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
