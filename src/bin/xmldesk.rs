//! xmldesk command line.
//!
//! # Usage
//!
//! ```bash
//! # Show the SQL every component of a desk would run
//! xmldesk explain config/app.xml --desk 965
//!
//! # Render a desk to HTML
//! xmldesk render config/app.xml --desk 965 --database-url postgres://localhost/campus
//!
//! # Write a starter document for every table
//! xmldesk generate --auto --output config/app.xml
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use colored::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xmldesk::prelude::*;

#[derive(Parser)]
#[command(name = "xmldesk")]
#[command(version)]
#[command(about = "Declarative XML desks over PostgreSQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    xmldesk desks config/app.xml
    xmldesk explain config/app.xml --desk 965
    xmldesk render config/app.xml --all --output site.html
    xmldesk generate --tables students,courses --app-name Campus")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true, env = "XMLDESK_DATABASE_URL")]
    database_url: Option<String>,

    /// Config file (defaults to ./xmldesk.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables, or the columns of one table
    Inspect {
        /// Table to describe
        #[arg(short, long)]
        table: Option<String>,

        /// Also print up to N rows of the table
        #[arg(long, requires = "table")]
        sample: Option<u32>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Write an APP document from the live schema
    #[command(group(ArgGroup::new("source").required(true).args(["auto", "table", "tables"])))]
    Generate {
        /// Cover every table in the schema
        #[arg(long, conflicts_with_all = ["table", "tables"])]
        auto: bool,

        /// Write a standalone DESK for one table
        #[arg(long, conflicts_with = "tables")]
        table: Option<String>,

        /// Tables to cover, comma separated
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// APP name (defaults to the configured app_name)
        #[arg(long)]
        app_name: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render desks to HTML
    Render {
        /// APP document (defaults to the configured document)
        document: Option<PathBuf>,

        /// Key of the desk to render
        #[arg(long, required_unless_present = "all")]
        desk: Option<String>,

        /// Render every desk
        #[arg(long, conflicts_with = "desk")]
        all: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the SQL each component would run, without connecting
    Explain {
        document: Option<PathBuf>,

        /// Only this desk
        #[arg(long)]
        desk: Option<String>,
    },
    /// List the desks and menus of a document
    Desks { document: Option<PathBuf> },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "xmldesk=debug" } else { "xmldesk=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    match &cli.command {
        Commands::Desks { document } => {
            let app = load_app(document.as_deref(), &config)?;
            list_desks(&app);
        }
        Commands::Explain { document, desk } => {
            let app = load_app(document.as_deref(), &config)?;
            explain(&app, desk.as_deref())?;
        }
        Commands::Render {
            document,
            desk,
            all,
            output,
        } => {
            let app = load_app(document.as_deref(), &config)?;
            let db = connect(&cli, &config).await?;
            let db = with_validator(db, &app).await?;
            let html = render(&app, &db, desk.as_deref(), *all).await?;
            write_output(output.as_deref(), &html)?;
        }
        Commands::Inspect {
            table,
            sample,
            format,
        } => {
            let db = connect(&cli, &config).await?;
            inspect(&db.inspector(), table.as_deref(), *sample, format).await?;
        }
        Commands::Generate {
            auto,
            table,
            tables,
            app_name,
            output,
        } => {
            let db = connect(&cli, &config).await?;
            let inspector = db.inspector();
            let generator = XmlGenerator::new(&inspector);
            let app_name = app_name.as_deref().unwrap_or(&config.app_name);

            let xml = match table {
                Some(table) => generator.generate_table_grid_xml(table).await?,
                None if *auto => generator.generate_auto(app_name).await?,
                None => generator.generate_full_app(app_name, tables).await?,
            };
            write_output(output.as_deref(), &xml)?;
        }
    }
    Ok(())
}

fn load_app(document: Option<&Path>, config: &Config) -> Result<AppDescriptor> {
    let path = document
        .or(config.document.as_deref())
        .ok_or_else(|| anyhow!("No document given. Pass a path or set `document` in xmldesk.toml"))?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let app = xmldesk::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::debug!(desks = app.desks().len(), menus = app.menus().len(), "document loaded");
    Ok(app)
}

async fn connect(cli: &Cli, config: &Config) -> Result<DeskDB> {
    let url = config.database_url(cli.database_url.as_deref()).ok_or_else(|| {
        anyhow!("No database URL. Use --database-url, set XMLDESK_DATABASE_URL or DATABASE_URL, or add [database] url to xmldesk.toml")
    })?;
    if cli.verbose {
        eprintln!("{} {}", "Connecting to:".dimmed(), url);
    }
    Ok(DeskDB::connect(&url, config.database.max_connections).await?)
}

/// Allow-list the tables the document mentions that actually exist.
async fn with_validator(db: DeskDB, app: &AppDescriptor) -> Result<DeskDB> {
    let inspector = db.inspector();
    let existing = inspector.list_tables().await?;
    let wanted: Vec<String> = app
        .tables()
        .into_iter()
        .filter(|t| existing.iter().any(|e| e == t))
        .map(str::to_string)
        .collect();

    let mut validator = Validator::new();
    for table in &existing {
        validator.add_table(table, &[]);
    }
    for schema in inspector.table_schemas(&wanted).await? {
        let cols: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        validator.add_table(&schema.name, &cols);
    }
    Ok(db.with_validator(validator))
}

async fn render(app: &AppDescriptor, db: &DeskDB, key: Option<&str>, all: bool) -> Result<String> {
    if all {
        let mut html = String::new();
        for desk in app.desks() {
            html.push_str(&render_desk_view(desk, db).await?);
        }
        return Ok(html);
    }
    let key = key.ok_or_else(|| anyhow!("Pass --desk KEY or --all"))?;
    let desk = app
        .find_desk(key)
        .ok_or_else(|| anyhow!("No desk with key '{}'", key))?;
    Ok(render_desk(desk, db).await?)
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", "✓".green(), path.display().to_string().cyan());
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn list_desks(app: &AppDescriptor) {
    println!("{} {}", app.title.cyan().bold(), format!("({})", app.name).dimmed());
    println!();

    if !app.menus().is_empty() {
        println!("{}", "Menus:".green().bold());
        for menu in app.menus() {
            print_menu(menu, 1);
        }
        println!();
    }

    println!("{}", "Desks:".green().bold());
    for desk in app.desks() {
        let tags: Vec<&str> = desk.components.iter().map(Component::tag).collect();
        println!(
            "  {:>8}  {}  {}",
            desk.key.yellow(),
            desk.name.white(),
            tags.join(", ").dimmed()
        );
    }
}

fn print_menu(menu: &MenuNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = menu.title.as_deref().unwrap_or(&menu.name);
    if menu.is_group() {
        println!("{}{}", indent, label.white().bold());
        for child in &menu.children {
            print_menu(child, depth + 1);
        }
    } else {
        println!("{}• {} {}", indent, label, format!("→ {}", menu.key).dimmed());
    }
}

fn explain(app: &AppDescriptor, key: Option<&str>) -> Result<()> {
    let desks: Vec<&Desk> = match key {
        Some(key) => vec![app
            .find_desk(key)
            .ok_or_else(|| anyhow!("No desk with key '{}'", key))?],
        None => app.desks().iter().collect(),
    };
    if desks.is_empty() {
        bail!("Document has no desks");
    }

    for desk in desks {
        println!("{} {} {}", "Desk".cyan().bold(), desk.key.yellow(), desk.name.white());
        for component in &desk.components {
            println!("  {} {}", component.tag().green(), component.name().white());
            match component {
                Component::Dashboard(d) => {
                    for tile in &d.tiles {
                        println!("    {} {}", format!("[{}]", tile.title).dimmed(), tile.to_sql().white());
                    }
                }
                Component::Grid(g) => explain_grid(g, 2),
                Component::Form(_) | Component::Jasper(_) | Component::Filter(_) => {
                    println!("    {}", "(no query)".dimmed());
                }
            }
        }
        println!();
    }
    Ok(())
}

fn explain_grid(grid: &Grid, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{}", indent, grid.to_sql().white());
    for sub in &grid.subgrids {
        println!("{}{} {}", indent, "GRID".green(), sub.name.white());
        explain_grid(sub, depth + 1);
    }
}

async fn inspect<I: Introspect + ?Sized>(
    inspector: &I,
    table: Option<&str>,
    sample: Option<u32>,
    format: &OutputFormat,
) -> Result<()> {
    let Some(table) = table else {
        let tables = inspector.list_tables().await?;
        if tables.is_empty() {
            println!("{}", "(no tables)".dimmed());
            return Ok(());
        }
        let mut rows = Vec::with_capacity(tables.len());
        for t in &tables {
            let mut row = Row::new();
            row.insert("table".to_string(), serde_json::Value::from(t.as_str()));
            row.insert("rows".to_string(), serde_json::Value::from(inspector.count_rows(t).await));
            rows.push(row);
        }
        format_output(&rows, &["table", "rows"], format);
        return Ok(());
    };

    let schema = inspector.table_schema(table).await?;
    if schema.columns.is_empty() {
        bail!("Table '{}' not found", table);
    }
    let rows: Vec<Row> = schema
        .columns
        .iter()
        .map(|c| {
            let mut row = Row::new();
            row.insert("column".to_string(), c.name.clone().into());
            row.insert("type".to_string(), c.data_type.clone().into());
            row.insert("nullable".to_string(), c.nullable.into());
            row.insert("pk".to_string(), c.primary_key.into());
            row.insert("default".to_string(), c.default.clone().into());
            row
        })
        .collect();
    format_output(&rows, &["column", "type", "nullable", "pk", "default"], format);

    if let Some(limit) = sample {
        println!();
        let rows = inspector.sample_rows(table, limit).await;
        let columns: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        format_output(&rows, &columns, format);
    }
    Ok(())
}

fn format_output(results: &[Row], columns: &[&str], format: &OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let known: BTreeSet<&str> = results.iter().flat_map(|r| r.keys().map(String::as_str)).collect();
            let columns: Vec<&str> = columns.iter().copied().filter(|c| known.contains(c)).collect();
            let widths: Vec<usize> = columns
                .iter()
                .map(|c| {
                    results
                        .iter()
                        .map(|r| r.get(*c).map(val_to_string).unwrap_or_default().chars().count())
                        .max()
                        .unwrap_or(0)
                        .max(c.len())
                })
                .collect();

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = *w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());
            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .zip(&widths)
                    .map(|(c, w)| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = *w)
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s)", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_args(args: &[&str]) -> Result<Commands, clap::Error> {
        let argv = ["xmldesk", "generate"].iter().chain(args);
        Cli::try_parse_from(argv).map(|cli| cli.command)
    }

    #[test]
    fn test_generate_needs_a_source() {
        let err = generate_args(&[]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_generate_sources() {
        assert!(matches!(
            generate_args(&["--auto"]).unwrap(),
            Commands::Generate { auto: true, table: None, .. }
        ));

        let Commands::Generate { tables, auto, .. } =
            generate_args(&["--tables", "students,courses"]).unwrap()
        else {
            panic!("expected generate");
        };
        assert!(!auto);
        assert_eq!(tables, vec!["students", "courses"]);

        assert!(matches!(
            generate_args(&["--table", "students"]).unwrap(),
            Commands::Generate { table: Some(t), .. } if t == "students"
        ));
    }

    #[test]
    fn test_generate_sources_are_exclusive() {
        assert!(generate_args(&["--auto", "--table", "students"]).is_err());
        assert!(generate_args(&["--table", "students", "--tables", "courses"]).is_err());
    }
}
