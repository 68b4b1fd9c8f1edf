//! xmldesk document parser using roxmltree.
//!
//! Parses an APP document into the descriptor tree.
//!
//! # Document Overview
//!
//! ```text
//! APP
//! ├── MENU*            (nestable)
//! └── DESK*
//!     ├── DASHBOARD ── TILE* ── TEXTFIELD
//!     ├── GRID ─┬── grid field tags, FORM*, ACTIONS, GRID* (nestable)
//!     ├── FORM ──── form field tags
//!     ├── FILTER ─┬─ DRILLDOWN*, JASPER*
//!     └── JASPER
//! ```
//!
//! | Parent | Field tags                                                      |
//! |--------|-----------------------------------------------------------------|
//! | GRID   | TEXTFIELD, CHECKBOX, TEXTDATE, TEXTDECIMAL, BROWSER, TEXTAREA    |
//! | FORM   | TEXTFIELD, COMBOBOX, COMBOLIST, TEXTAREA, CHECKBOX, TEXTDATE     |
//! | TILE   | exactly one TEXTFIELD                                           |
//!
//! GRID also takes TEXTAREA so that grids written for `text` columns by
//! [`crate::synthesizer`] load back with the same field kinds.
//!
//! MENU and GRID nest at most [`MAX_DEPTH`] levels.
//!
//! Unknown tags inside a component are skipped, so newer documents still
//! load. Field tags are matched per parent; a tag that a grid accepts may be
//! ignored inside a form and vice versa.

use roxmltree::{Document, Node};
use tracing::debug;

use crate::ast::*;
use crate::error::{DeskError, DeskResult};

/// Deepest menu or grid nesting accepted.
pub const MAX_DEPTH: usize = 32;

/// Field tags recognized directly under a GRID.
///
/// TEXTAREA is accepted so that grids written by the synthesizer for `text`
/// columns load back with the same kinds.
pub const GRID_FIELDS: &[FieldType] = &[
    FieldType::TextField,
    FieldType::Checkbox,
    FieldType::TextDate,
    FieldType::TextDecimal,
    FieldType::Browser,
    FieldType::TextArea,
];

/// Field tags recognized directly under a FORM.
pub const FORM_FIELDS: &[FieldType] = &[
    FieldType::TextField,
    FieldType::ComboBox,
    FieldType::ComboList,
    FieldType::TextArea,
    FieldType::Checkbox,
    FieldType::TextDate,
];

/// Parse a complete APP document.
pub fn parse(input: &str) -> DeskResult<AppDescriptor> {
    let doc = Document::parse(input)?;
    let app = doc
        .descendants()
        .find(|n| n.has_tag_name("APP"))
        .ok_or(DeskError::MissingRoot)?;

    let mut menus = Vec::new();
    let mut desks = Vec::new();
    for child in elements(app) {
        match child.tag_name().name() {
            "MENU" => menus.push(parse_menu(child, 0)?),
            "DESK" => desks.push(parse_desk(child)?),
            other => debug!(tag = other, "skipping unknown APP child"),
        }
    }

    let name = attr(app, "name").unwrap_or_default();
    let title = attr(app, "title").unwrap_or_else(|| name.clone());
    Ok(AppDescriptor::new(
        name,
        title,
        attr(app, "database").unwrap_or_default(),
        attr_bool(app, "authentication"),
        menus,
        desks,
    ))
}

/// Parse a document that holds a single DESK as its root, as written by
/// `generate_table_grid`.
pub fn parse_desk_document(input: &str) -> DeskResult<Desk> {
    let doc = Document::parse(input)?;
    let root = doc.root_element();
    if !root.has_tag_name("DESK") {
        return Err(DeskError::MissingRoot);
    }
    parse_desk(root)
}

fn parse_menu(node: Node, depth: usize) -> DeskResult<MenuNode> {
    if depth >= MAX_DEPTH {
        return Err(DeskError::NestingTooDeep { max: MAX_DEPTH });
    }
    let children = elements(node)
        .filter(|c| c.has_tag_name("MENU"))
        .map(|c| parse_menu(c, depth + 1))
        .collect::<DeskResult<Vec<_>>>()?;

    let text = own_text(node);
    let key = if text.is_empty() {
        attr(node, "desk").unwrap_or_default()
    } else {
        text
    };

    Ok(MenuNode {
        name: attr(node, "name").unwrap_or_default(),
        title: attr(node, "title"),
        role: attr(node, "role"),
        icon: attr(node, "icon"),
        key,
        children,
    })
}

fn parse_desk(node: Node) -> DeskResult<Desk> {
    let key = attr(node, "key").unwrap_or_default();
    let name = attr(node, "name").unwrap_or_default();
    if key.is_empty() {
        return Err(DeskError::InvalidDescriptor(format!(
            "desk '{}' has no key",
            name
        )));
    }

    let mut components = Vec::new();
    for child in elements(node) {
        let component = match child.tag_name().name() {
            "DASHBOARD" => Component::Dashboard(parse_dashboard(child)?),
            "GRID" => Component::Grid(parse_grid(child, 0)?),
            "FORM" => Component::Form(parse_form(child)?),
            "JASPER" => Component::Jasper(parse_jasper(child)),
            "FILTER" => Component::Filter(parse_filter(child)),
            other => {
                debug!(tag = other, desk = %key, "skipping unknown DESK child");
                continue;
            }
        };
        components.push(component);
    }

    Ok(Desk {
        name,
        key,
        width: attr_u32(node, "w"),
        height: attr_u32(node, "h"),
        kind: attr(node, "type"),
        access: attr(node, "access"),
        components,
    })
}

fn parse_dashboard(node: Node) -> DeskResult<Dashboard> {
    let tiles = elements(node)
        .filter(|c| c.has_tag_name("TILE"))
        .map(parse_tile)
        .collect::<DeskResult<Vec<_>>>()?;

    Ok(Dashboard {
        name: attr(node, "name").unwrap_or_default(),
        width: attr_u32(node, "w"),
        refresh_seconds: attr_u32(node, "refresh"),
        tiles,
    })
}

fn parse_tile(node: Node) -> DeskResult<Tile> {
    let title = attr(node, "title").unwrap_or_default();
    let label = attr(node, "name").unwrap_or_else(|| title.clone());

    let mut aggregates = elements(node).filter(|c| c.has_tag_name("TEXTFIELD"));
    let field = match aggregates.next() {
        Some(field) => field,
        None => {
            return Err(match elements(node).next() {
                Some(other) => DeskError::unsupported(other.tag_name().name(), "TILE"),
                None => DeskError::MissingAggregate { tile: label },
            });
        }
    };
    if aggregates.next().is_some() {
        return Err(DeskError::InvalidDescriptor(format!(
            "tile '{}' has more than one aggregate TEXTFIELD",
            label
        )));
    }

    let table = attr(node, "table").ok_or_else(|| {
        DeskError::InvalidDescriptor(format!("tile '{}' has no table", label))
    })?;

    Ok(Tile {
        name: attr(node, "name"),
        title,
        table,
        r#where: attr(node, "where"),
        group_by: attr(node, "groupby"),
        jump_target: attr(node, "jumpview"),
        access: attr(node, "access"),
        display: attr(node, "display"),
        aggregate: Aggregate {
            field_name: own_text(field),
            function: attr(field, "fnct"),
            icon: attr(field, "icon"),
            title: attr(field, "title"),
            width: attr_u32(field, "w"),
        },
    })
}

fn parse_grid(node: Node, depth: usize) -> DeskResult<Grid> {
    if depth >= MAX_DEPTH {
        return Err(DeskError::NestingTooDeep { max: MAX_DEPTH });
    }
    let name = attr(node, "name").unwrap_or_default();
    let table = attr(node, "table").ok_or_else(|| {
        DeskError::InvalidDescriptor(format!("grid '{}' has no table", name))
    })?;
    let limit = match attr(node, "limit") {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            DeskError::InvalidDescriptor(format!("grid '{}' has non-numeric limit '{}'", name, raw))
        })?),
        None => None,
    };

    let mut fields = Vec::new();
    let mut forms = Vec::new();
    let mut actions = Vec::new();
    let mut subgrids = Vec::new();

    for child in elements(node) {
        let tag = child.tag_name().name();
        if let Some(ft) = FieldType::from_tag(tag).filter(|ft| GRID_FIELDS.contains(ft)) {
            fields.push(parse_field(child, ft, false));
            continue;
        }
        match tag {
            "FORM" => forms.push(parse_form(child)?),
            "ACTIONS" => {
                for action in elements(child).filter(|c| c.has_tag_name("ACTION")) {
                    actions.push(parse_action(action)?);
                }
            }
            "GRID" => subgrids.push(parse_grid(child, depth + 1)?),
            other => debug!(tag = other, grid = %name, "skipping unknown GRID child"),
        }
    }
    check_fields(&name, &fields)?;

    Ok(Grid {
        name,
        keyfield: attr(node, "keyfield"),
        table,
        r#where: attr(node, "where"),
        orderby: attr(node, "orderby"),
        limit,
        linkfield: attr(node, "linkfield"),
        noorg: attr_bool(node, "noorg"),
        fields,
        forms,
        actions,
        subgrids,
    })
}

fn parse_form(node: Node) -> DeskResult<Form> {
    let name = attr(node, "name").unwrap_or_default();
    let mut fields = Vec::new();
    for child in elements(node) {
        let tag = child.tag_name().name();
        match FieldType::from_tag(tag).filter(|ft| FORM_FIELDS.contains(ft)) {
            Some(ft) => fields.push(parse_field(child, ft, true)),
            None => debug!(tag, form = %name, "skipping unknown FORM child"),
        }
    }
    check_fields(&name, &fields)?;

    Ok(Form {
        name,
        keyfield: attr(node, "keyfield"),
        table: attr(node, "table").unwrap_or_default(),
        linkfield: attr(node, "linkfield"),
        width: attr_u32(node, "tw"),
        height: attr_u32(node, "th"),
        noorg: attr_bool(node, "noorg"),
        fields,
    })
}

fn parse_field(node: Node, field_type: FieldType, placed: bool) -> Field {
    let kind = match field_type {
        FieldType::TextField => FieldKind::TextField {
            format: attr(node, "format"),
        },
        FieldType::TextArea => FieldKind::TextArea,
        FieldType::Checkbox => FieldKind::Checkbox,
        FieldType::TextDate => FieldKind::TextDate,
        FieldType::TextDecimal => FieldKind::TextDecimal,
        FieldType::ComboBox => FieldKind::ComboBox(Lookup {
            table: attr(node, "lptable"),
            key: attr(node, "lpkey"),
            display_field: attr(node, "lpfield"),
            link_field: attr(node, "linkfield"),
            noorg: attr_bool(node, "noorg"),
        }),
        FieldType::ComboList => FieldKind::ComboList {
            options: elements(node)
                .filter(|c| c.has_tag_name("DATA"))
                .map(own_text)
                .collect(),
        },
        FieldType::Browser => FieldKind::Browser {
            action: attr(node, "action"),
            link_field: attr(node, "linkfield"),
            blank_page: attr_bool(node, "blankpage"),
        },
    };

    let placement = placed.then(|| Placement {
        x: attr_u32(node, "x").unwrap_or(0),
        y: attr_u32(node, "y").unwrap_or(0),
        height: attr_u32(node, "h"),
    });

    Field {
        name: own_text(node),
        title: attr(node, "title"),
        width: attr_u32(node, "w"),
        placement,
        required: attr_bool(node, "required"),
        kind,
    }
}

fn parse_action(node: Node) -> DeskResult<Action> {
    let raw = attr(node, "fnct").unwrap_or_default();
    let function = ActionFunction::from_str(&raw).ok_or_else(|| {
        DeskError::InvalidAction(format!(
            "'{}' (expected INSERT, UPDATE or DELETE)",
            raw
        ))
    })?;
    let phase = match attr(node, "phase") {
        Some(p) => Phase::from_str(&p).ok_or_else(|| {
            DeskError::InvalidAction(format!("phase '{}' (expected before or after)", p))
        })?,
        None => Phase::default(),
    };

    Ok(Action {
        function,
        title: attr(node, "title"),
        phase,
        hook: own_text(node),
    })
}

fn parse_jasper(node: Node) -> Jasper {
    Jasper {
        name: attr(node, "name").unwrap_or_default(),
        reportfile: attr(node, "reportfile").unwrap_or_default(),
        filtered: attr_bool(node, "filtered"),
    }
}

fn parse_filter(node: Node) -> Filter {
    let mut drilldowns = Vec::new();
    let mut reports = Vec::new();
    for child in elements(node) {
        match child.tag_name().name() {
            "DRILLDOWN" => drilldowns.push(Drilldown {
                key_field: attr(child, "keyfield").unwrap_or_default(),
                name: attr(child, "name").unwrap_or_default(),
                list_field: attr(child, "listfield").unwrap_or_default(),
                table: attr(child, "table").unwrap_or_default(),
                where_field: attr(child, "wherefield"),
                position: attr(child, "pos"),
                noorg: attr_bool(child, "noorg"),
            }),
            "JASPER" => reports.push(parse_jasper(child)),
            other => debug!(tag = other, "skipping unknown FILTER child"),
        }
    }

    Filter {
        name: attr(node, "name").unwrap_or_default(),
        location: attr(node, "location"),
        drilldowns,
        reports,
    }
}

/// Field names must be non-empty and unique within one component.
fn check_fields(owner: &str, fields: &[Field]) -> DeskResult<()> {
    for (i, field) in fields.iter().enumerate() {
        if field.name.is_empty() {
            return Err(DeskError::InvalidDescriptor(format!(
                "{} field #{} in '{}' has no column name",
                field.field_type().tag(),
                i + 1,
                owner
            )));
        }
        if fields[..i].iter().any(|f| f.name == field.name) {
            return Err(DeskError::InvalidDescriptor(format!(
                "duplicate field '{}' in '{}'",
                field.name, owner
            )));
        }
    }
    Ok(())
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|c| c.is_element())
}

/// Trimmed text directly inside `node`, ignoring nested elements.
fn own_text(node: Node) -> String {
    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();
    text.trim().to_string()
}

/// Attribute value, trimmed; blank values count as absent.
fn attr(node: Node, name: &str) -> Option<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn attr_u32(node: Node, name: &str) -> Option<u32> {
    let raw = attr(node, name)?;
    match raw.parse::<u32>() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(attribute = name, value = %raw, "ignoring non-numeric attribute");
            None
        }
    }
}

fn attr_bool(node: Node, name: &str) -> bool {
    matches!(
        attr(node, name).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "yes" | "1")
    )
}
