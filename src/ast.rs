//! Descriptor model for xmldesk documents.
//!
//! This module defines the tree a parsed APP document becomes: menus,
//! desks and the components living on them. Nodes are plain data and are
//! never mutated once the parser hands them out.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The root of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppDescriptor {
    pub name: String,
    pub title: String,
    /// Value of the `database` attribute, e.g. `postgresql`.
    pub database_kind: String,
    pub authentication_enabled: bool,
    menus: Vec<MenuNode>,
    desks: Vec<Desk>,
    #[serde(skip)]
    desk_index: HashMap<String, usize>,
}

impl AppDescriptor {
    /// Build an app and index its desks by key.
    ///
    /// When two desks share a key, the first one in document order wins.
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        database_kind: impl Into<String>,
        authentication_enabled: bool,
        menus: Vec<MenuNode>,
        desks: Vec<Desk>,
    ) -> Self {
        let mut desk_index = HashMap::with_capacity(desks.len());
        for (i, desk) in desks.iter().enumerate() {
            desk_index.entry(desk.key.clone()).or_insert(i);
        }
        Self {
            name: name.into(),
            title: title.into(),
            database_kind: database_kind.into(),
            authentication_enabled,
            menus,
            desks,
            desk_index,
        }
    }

    /// Top-level menus in document order.
    pub fn menus(&self) -> &[MenuNode] {
        &self.menus
    }

    /// Desks in document order. Read-only, so the key index stays valid.
    pub fn desks(&self) -> &[Desk] {
        &self.desks
    }

    /// Look up a desk by its key.
    pub fn find_desk(&self, key: &str) -> Option<&Desk> {
        self.desk_index.get(key).and_then(|&i| self.desks.get(i))
    }

    /// Every table referenced by a grid, form or tile, in first-seen order.
    pub fn tables(&self) -> Vec<&str> {
        fn visit_grid<'a>(grid: &'a Grid, seen: &mut Vec<&'a str>) {
            add(&grid.table, seen);
            for form in &grid.forms {
                add(&form.table, seen);
            }
            for sub in &grid.subgrids {
                visit_grid(sub, seen);
            }
        }
        fn add<'a>(table: &'a str, seen: &mut Vec<&'a str>) {
            if !table.is_empty() && !seen.contains(&table) {
                seen.push(table);
            }
        }

        let mut seen: Vec<&str> = Vec::new();
        for desk in &self.desks {
            for component in &desk.components {
                match component {
                    Component::Dashboard(d) => {
                        for tile in &d.tiles {
                            add(&tile.table, &mut seen);
                        }
                    }
                    Component::Grid(g) => visit_grid(g, &mut seen),
                    Component::Form(f) => add(&f.table, &mut seen),
                    Component::Filter(f) => {
                        for dd in &f.drilldowns {
                            add(&dd.table, &mut seen);
                        }
                    }
                    Component::Jasper(_) => {}
                }
            }
        }
        seen
    }
}

/// Find a desk by key. See [`AppDescriptor::find_desk`].
pub fn find_desk<'a>(app: &'a AppDescriptor, key: &str) -> Option<&'a Desk> {
    app.find_desk(key)
}

/// A menu entry. Entries with children are groups; leaves point at a desk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuNode {
    pub name: String,
    pub title: Option<String>,
    pub role: Option<String>,
    pub icon: Option<String>,
    /// Free text label; for leaves, the key of the desk to open.
    pub key: String,
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A keyed page holding one or more components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Desk {
    pub name: String,
    pub key: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub kind: Option<String>,
    pub access: Option<String>,
    pub components: Vec<Component>,
}

/// The renderable units of a desk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Component {
    Dashboard(Dashboard),
    Grid(Grid),
    Form(Form),
    Jasper(Jasper),
    Filter(Filter),
}

impl Component {
    pub fn name(&self) -> &str {
        match self {
            Component::Dashboard(c) => &c.name,
            Component::Grid(c) => &c.name,
            Component::Form(c) => &c.name,
            Component::Jasper(c) => &c.name,
            Component::Filter(c) => &c.name,
        }
    }

    /// The element tag this component is written as.
    pub fn tag(&self) -> &'static str {
        match self {
            Component::Dashboard(_) => "DASHBOARD",
            Component::Grid(_) => "GRID",
            Component::Form(_) => "FORM",
            Component::Jasper(_) => "JASPER",
            Component::Filter(_) => "FILTER",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub name: String,
    pub width: Option<u32>,
    pub refresh_seconds: Option<u32>,
    pub tiles: Vec<Tile>,
}

/// One aggregate metric on a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub name: Option<String>,
    pub title: String,
    pub table: String,
    /// Defaults to `1=1` when compiled.
    pub r#where: Option<String>,
    pub group_by: Option<String>,
    /// Key of the desk opened when the tile is clicked.
    pub jump_target: Option<String>,
    pub access: Option<String>,
    pub display: Option<String>,
    pub aggregate: Aggregate,
}

/// The single TEXTFIELD inside a TILE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub field_name: String,
    /// SQL expression such as `COUNT(*)`; `None` compiles to `COUNT(*)`.
    pub function: Option<String>,
    pub icon: Option<String>,
    pub title: Option<String>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub name: String,
    pub keyfield: Option<String>,
    pub table: String,
    pub r#where: Option<String>,
    pub orderby: Option<String>,
    pub limit: Option<u64>,
    pub linkfield: Option<String>,
    pub noorg: bool,
    pub fields: Vec<Field>,
    pub forms: Vec<Form>,
    pub actions: Vec<Action>,
    pub subgrids: Vec<Grid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub name: String,
    pub keyfield: Option<String>,
    pub table: String,
    pub linkfield: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub noorg: bool,
    pub fields: Vec<Field>,
}

/// Opaque reference to a report file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jasper {
    pub name: String,
    pub reportfile: String,
    pub filtered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub location: Option<String>,
    pub drilldowns: Vec<Drilldown>,
    pub reports: Vec<Jasper>,
}

/// One step of a filter's chain of linked tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drilldown {
    pub key_field: String,
    pub name: String,
    pub list_field: String,
    pub table: String,
    pub where_field: Option<String>,
    pub position: Option<String>,
    pub noorg: bool,
}

/// A hook fired around a grid mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub function: ActionFunction,
    pub title: Option<String>,
    pub phase: Phase,
    /// Name of the hook to call.
    pub hook: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionFunction {
    Insert,
    Update,
    Delete,
}

impl ActionFunction {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ActionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Before,
    After,
}

impl Phase {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => write!(f, "before"),
            Self::After => write!(f, "after"),
        }
    }
}

/// A typed column binding inside a grid or form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// The underlying column name.
    pub name: String,
    pub title: Option<String>,
    pub width: Option<u32>,
    /// Absolute position; only forms carry one.
    pub placement: Option<Placement>,
    pub required: bool,
    pub kind: FieldKind,
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    /// Header text: the title, or the column name when untitled.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub height: Option<u32>,
}

/// Field kinds with their kind-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    TextField { format: Option<String> },
    TextArea,
    Checkbox,
    TextDate,
    TextDecimal,
    ComboBox(Lookup),
    ComboList { options: Vec<String> },
    Browser {
        action: Option<String>,
        link_field: Option<String>,
        blank_page: bool,
    },
}

impl FieldKind {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKind::TextField { .. } => FieldType::TextField,
            FieldKind::TextArea => FieldType::TextArea,
            FieldKind::Checkbox => FieldType::Checkbox,
            FieldKind::TextDate => FieldType::TextDate,
            FieldKind::TextDecimal => FieldType::TextDecimal,
            FieldKind::ComboBox(_) => FieldType::ComboBox,
            FieldKind::ComboList { .. } => FieldType::ComboList,
            FieldKind::Browser { .. } => FieldType::Browser,
        }
    }
}

/// Deferred option source for a combobox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lookup {
    pub table: Option<String>,
    pub key: Option<String>,
    pub display_field: Option<String>,
    pub link_field: Option<String>,
    pub noorg: bool,
}

/// The closed set of field kinds, without their payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    TextField,
    TextArea,
    Checkbox,
    TextDate,
    TextDecimal,
    ComboBox,
    ComboList,
    Browser,
}

impl FieldType {
    pub const ALL: [FieldType; 8] = [
        FieldType::TextField,
        FieldType::TextArea,
        FieldType::Checkbox,
        FieldType::TextDate,
        FieldType::TextDecimal,
        FieldType::ComboBox,
        FieldType::ComboList,
        FieldType::Browser,
    ];

    /// Element tag in the document.
    pub fn tag(self) -> &'static str {
        match self {
            FieldType::TextField => "TEXTFIELD",
            FieldType::TextArea => "TEXTAREA",
            FieldType::Checkbox => "CHECKBOX",
            FieldType::TextDate => "TEXTDATE",
            FieldType::TextDecimal => "TEXTDECIMAL",
            FieldType::ComboBox => "COMBOBOX",
            FieldType::ComboList => "COMBOLIST",
            FieldType::Browser => "BROWSER",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::TextField => "textfield",
            FieldType::TextArea => "textarea",
            FieldType::Checkbox => "checkbox",
            FieldType::TextDate => "textdate",
            FieldType::TextDecimal => "textdecimal",
            FieldType::ComboBox => "combobox",
            FieldType::ComboList => "combolist",
            FieldType::Browser => "browser",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
