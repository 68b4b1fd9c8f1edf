//! Identifier allow-listing with did-you-mean suggestions.
//!
//! Compiled queries splice table and column names from the document into
//! SQL text. A [`Validator`] built from the live schema rejects any name the
//! database does not actually have before the query is sent.

use std::collections::HashMap;
use strsim::levenshtein;

use crate::ast::{Grid, Tile};
use crate::error::{DeskError, DeskResult};
use crate::schema::TableSchema;

/// Known tables and their columns.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    tables: Vec<String>,
    columns: HashMap<String, Vec<String>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validator from introspected tables.
    pub fn from_schemas(schemas: &[TableSchema]) -> Self {
        let mut v = Self::new();
        for schema in schemas {
            let cols: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
            v.add_table(&schema.name, &cols);
        }
        v
    }

    /// Register a table and its columns.
    pub fn add_table(&mut self, table: &str, cols: &[&str]) {
        if !self.tables.iter().any(|t| t == table) {
            self.tables.push(table.to_string());
        }
        self.columns.insert(
            table.to_string(),
            cols.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn validate_table(&self, table: &str) -> DeskResult<()> {
        if self.tables.iter().any(|t| t == table) {
            return Ok(());
        }
        Err(DeskError::UnknownIdentifier(
            match self.did_you_mean(table, &self.tables) {
                Some(sugg) => format!("table '{}' not found. Did you mean '{}'?", table, sugg),
                None => format!("table '{}' not found", table),
            },
        ))
    }

    pub fn validate_column(&self, table: &str, column: &str) -> DeskResult<()> {
        self.validate_table(table)?;
        let cols = self.columns.get(table).map(Vec::as_slice).unwrap_or(&[]);
        if cols.iter().any(|c| c == column) {
            return Ok(());
        }
        Err(DeskError::UnknownIdentifier(
            match self.did_you_mean(column, cols) {
                Some(sugg) => format!(
                    "column '{}' not found in table '{}'. Did you mean '{}'?",
                    column, table, sugg
                ),
                None => format!("column '{}' not found in table '{}'", column, table),
            },
        ))
    }

    /// Check a grid's table and every projected column.
    pub fn check_grid(&self, grid: &Grid) -> DeskResult<()> {
        self.validate_table(&grid.table)?;
        for field in &grid.fields {
            self.validate_column(&grid.table, &field.name)?;
        }
        Ok(())
    }

    /// Check the table a tile aggregates over.
    pub fn check_tile(&self, tile: &Tile) -> DeskResult<()> {
        self.validate_table(&tile.table)
    }

    /// Find the best match with Levenshtein distance <= 3.
    fn did_you_mean(&self, input: &str, candidates: &[impl AsRef<str>]) -> Option<String> {
        let mut best_match = None;
        let mut min_dist = usize::MAX;

        for cand in candidates {
            let cand_str = cand.as_ref();
            let dist = levenshtein(input, cand_str);

            let threshold = match input.len() {
                0..=2 => 0,
                3..=5 => 2,
                _ => 3,
            };

            if dist <= threshold && dist < min_dist {
                min_dist = dist;
                best_match = Some(cand_str.to_string());
            }
        }

        best_match
    }
}
