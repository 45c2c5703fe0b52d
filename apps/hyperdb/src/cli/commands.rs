//! # CLI Command Implementations
//!
//! One `cmd_*` function per subcommand, plus the text parsing the
//! commands share. Every command prints text, or pretty JSON in
//! `--json-mode`.

use hyperdb_core::{
    Class, Database, Date, Designator, FilterSpec, HyperdbError, Interval, JournalEntry,
    JournalParams, SortKey, Value,
};
use serde_json::{Map, json};

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

/// Split `prop=value` at the first `=`.
pub fn parse_assignment(text: &str) -> Result<(String, String), HyperdbError> {
    let (name, value) = text.split_once('=').ok_or_else(|| {
        HyperdbError::Value(format!("'{}' is not of the form prop=value", text))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(HyperdbError::Value(format!(
            "'{}' has an empty property name",
            text
        )));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Parse assignments into validated values of `class`.
///
/// An empty value clears the property.
pub fn parse_props(
    class: &mut Class<'_>,
    assignments: &[String],
) -> Result<Vec<(String, Option<Value>)>, HyperdbError> {
    let mut props = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let (name, text) = parse_assignment(assignment)?;
        let value = class.parse_value(&name, &text)?;
        props.push((name, value));
    }
    Ok(props)
}

/// Parse `prop=a,b` constraints. Repeating a property adds alternatives.
pub fn parse_filters(filters: &[String]) -> Result<FilterSpec, HyperdbError> {
    let mut spec = FilterSpec::new();
    for filter in filters {
        let (name, terms) = parse_assignment(filter)?;
        spec.entry(name).or_default().extend(
            terms
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        );
    }
    Ok(spec)
}

/// A pack cutoff: a date, or an interval counted back from now.
pub fn parse_cutoff(text: &str) -> Result<Date, HyperdbError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(HyperdbError::Value("empty pack cutoff".to_string()));
    }
    match Date::parse(text) {
        Ok(date) => Ok(date),
        Err(date_err) => match Interval::parse(text) {
            Ok(interval) => Date::now().minus(&interval),
            Err(_) => Err(HyperdbError::Value(format!(
                "'{}' is neither a date nor an interval ({})",
                text, date_err
            ))),
        },
    }
}

// =============================================================================
// VALUE RENDERING
// =============================================================================

/// Plain text form of a property value; null renders as the empty string.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::Multilink(ids)) => ids.join(","),
        Some(other) => other.to_string(),
    }
}

/// JSON form of a property value.
pub fn value_json(value: Option<&Value>) -> serde_json::Value {
    match value {
        None => serde_json::Value::Null,
        Some(Value::String(s)) | Some(Value::Link(s)) => json!(s),
        Some(Value::Number(n)) => serde_json::Number::from_f64(*n)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Value::Boolean(b)) => json!(b),
        Some(Value::Multilink(ids)) => json!(ids),
        Some(other) => json!(other.to_string()),
    }
}

fn params_json(params: &JournalParams) -> serde_json::Value {
    match params {
        JournalParams::Properties(props) => {
            let map: Map<String, serde_json::Value> = props
                .iter()
                .map(|(name, value)| (name.clone(), value_json(value.as_ref())))
                .collect();
            serde_json::Value::Object(map)
        }
        JournalParams::Link {
            classname,
            nodeid,
            property,
        } => json!({
            "classname": classname,
            "nodeid": nodeid,
            "property": property,
        }),
        JournalParams::None => serde_json::Value::Null,
    }
}

fn params_text(params: &JournalParams) -> String {
    match params {
        JournalParams::Properties(props) => props
            .iter()
            .map(|(name, value)| format!("{}={}", name, value_text(value.as_ref())))
            .collect::<Vec<_>>()
            .join(" "),
        JournalParams::Link {
            classname,
            nodeid,
            property,
        } => format!("{}{} {}", classname, nodeid, property),
        JournalParams::None => String::new(),
    }
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// Show every class with its key and properties.
pub fn cmd_classes(db: &mut Database, json_mode: bool) -> Result<(), HyperdbError> {
    let mut classes = Vec::new();
    for name in db.getclasses() {
        let class = db.getclass(&name)?;
        let key = class.getkey()?;
        let props = class.getprops(false)?;
        classes.push((name, key, props));
    }

    if json_mode {
        let out: Vec<serde_json::Value> = classes
            .iter()
            .map(|(name, key, props)| {
                let props: Map<String, serde_json::Value> = props
                    .iter()
                    .map(|(p, ty)| (p.clone(), json!(ty.to_string())))
                    .collect();
                json!({ "name": name, "key": key, "properties": props })
            })
            .collect();
        print_json(&json!({ "classes": out }));
    } else {
        for (name, key, props) in &classes {
            match key {
                Some(key) => println!("{} (key: {})", name, key),
                None => println!("{}", name),
            }
            for (prop, ty) in props {
                println!("  {:<16} {}", prop, ty);
            }
        }
    }
    Ok(())
}

/// List the active nodes of a class with their labels.
pub fn cmd_list(db: &mut Database, json_mode: bool, classname: &str) -> Result<(), HyperdbError> {
    let mut class = db.getclass(classname)?;
    let labelprop = class.labelprop(true)?;
    let mut rows = Vec::new();
    for id in class.list()? {
        let label = class.get(&id, &labelprop)?;
        rows.push((id, label));
    }

    if json_mode {
        let out: Vec<serde_json::Value> = rows
            .iter()
            .map(|(id, label)| {
                let mut row = Map::new();
                row.insert("id".to_string(), json!(id));
                row.insert(labelprop.clone(), value_json(label.as_ref()));
                serde_json::Value::Object(row)
            })
            .collect();
        print_json(&json!({ "class": classname, "nodes": out }));
    } else {
        for (id, label) in &rows {
            println!("{:>6}: {}", id, value_text(label.as_ref()));
        }
    }
    Ok(())
}

/// Show every property of a node, or one of them.
pub fn cmd_get(
    db: &mut Database,
    json_mode: bool,
    designator: &str,
    property: Option<&str>,
) -> Result<(), HyperdbError> {
    let designator = Designator::parse(designator)?;
    let mut class = db.getclass(&designator.classname)?;

    if let Some(property) = property {
        let value = class.get(&designator.nodeid, property)?;
        if json_mode {
            let mut out = Map::new();
            out.insert("designator".to_string(), json!(designator.to_string()));
            out.insert(property.to_string(), value_json(value.as_ref()));
            print_json(&serde_json::Value::Object(out));
        } else {
            println!("{}", value_text(value.as_ref()));
        }
        return Ok(());
    }

    let node = class.getnode(&designator.nodeid)?;
    if json_mode {
        let values: Map<String, serde_json::Value> = node
            .values
            .iter()
            .map(|(name, value)| (name.clone(), value_json(value.as_ref())))
            .collect();
        print_json(&json!({
            "designator": designator.to_string(),
            "retired": node.retired,
            "values": values,
        }));
    } else {
        println!("{}{}", designator, if node.retired { " (retired)" } else { "" });
        for (name, value) in &node.values {
            println!("  {:<16} {}", name, value_text(value.as_ref()));
        }
    }
    Ok(())
}

/// Show a node's journal, oldest entry first.
pub fn cmd_history(
    db: &mut Database,
    json_mode: bool,
    designator: &str,
) -> Result<(), HyperdbError> {
    let designator = Designator::parse(designator)?;
    let entries: Vec<JournalEntry> = db.getclass(&designator.classname)?.history(&designator.nodeid)?;

    if json_mode {
        let out: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "date": e.date.to_string(),
                    "tag": e.tag,
                    "action": e.action.to_string(),
                    "params": params_json(&e.params),
                })
            })
            .collect();
        print_json(&json!({ "designator": designator.to_string(), "history": out }));
    } else {
        for e in &entries {
            println!(
                "{}  {:<10} {:<8} {}",
                e.date,
                e.tag,
                e.action.to_string(),
                params_text(&e.params)
            );
        }
    }
    Ok(())
}

/// Resolve a key value to a node id.
pub fn cmd_lookup(
    db: &mut Database,
    json_mode: bool,
    classname: &str,
    keyvalue: &str,
) -> Result<(), HyperdbError> {
    let id = db.getclass(classname)?.lookup(keyvalue)?;
    if json_mode {
        print_json(&json!({ "class": classname, "key": keyvalue, "id": id }));
    } else {
        println!("{}", id);
    }
    Ok(())
}

/// Filter a class and print the matching ids in order.
pub fn cmd_filter(
    db: &mut Database,
    json_mode: bool,
    classname: &str,
    filters: &[String],
    sort: &[String],
    group: &[String],
) -> Result<(), HyperdbError> {
    let spec = parse_filters(filters)?;
    let sort: Vec<SortKey> = sort.iter().map(|s| SortKey::parse(s)).collect();
    let group: Vec<SortKey> = group.iter().map(|s| SortKey::parse(s)).collect();
    let ids = db.getclass(classname)?.filter(&spec, &sort, &group)?;

    if json_mode {
        print_json(&json!({ "class": classname, "ids": ids }));
    } else {
        for id in &ids {
            println!("{}{}", classname, id);
        }
    }
    Ok(())
}

// =============================================================================
// WRITE COMMANDS
// =============================================================================

/// Create a node from `prop=value` assignments.
pub fn cmd_create(
    db: &mut Database,
    json_mode: bool,
    classname: &str,
    assignments: &[String],
) -> Result<(), HyperdbError> {
    let mut class = db.getclass(classname)?;
    let props = parse_props(&mut class, assignments)?;
    let id = class.create(props)?;
    let designator = Designator::new(classname, id.as_str());
    tracing::info!(%designator, "created");

    if json_mode {
        print_json(&json!({ "designator": designator.to_string(), "id": id }));
    } else {
        println!("{}", id);
    }
    Ok(())
}

/// Apply `prop=value` assignments to an existing node.
pub fn cmd_set(
    db: &mut Database,
    json_mode: bool,
    designator: &str,
    assignments: &[String],
) -> Result<(), HyperdbError> {
    let designator = Designator::parse(designator)?;
    let mut class = db.getclass(&designator.classname)?;
    let props = parse_props(&mut class, assignments)?;
    let names: Vec<String> = props.iter().map(|(name, _)| name.clone()).collect();
    class.set(&designator.nodeid, props)?;
    tracing::info!(%designator, properties = ?names, "set");

    if json_mode {
        print_json(&json!({ "designator": designator.to_string(), "set": names }));
    }
    Ok(())
}

/// Retire a node.
pub fn cmd_retire(db: &mut Database, json_mode: bool, designator: &str) -> Result<(), HyperdbError> {
    let designator = Designator::parse(designator)?;
    db.getclass(&designator.classname)?.retire(&designator.nodeid)?;
    tracing::info!(%designator, "retired");

    if json_mode {
        print_json(&json!({ "designator": designator.to_string(), "retired": true }));
    }
    Ok(())
}

/// Restore a retired node.
pub fn cmd_restore(
    db: &mut Database,
    json_mode: bool,
    designator: &str,
) -> Result<(), HyperdbError> {
    let designator = Designator::parse(designator)?;
    db.getclass(&designator.classname)?.restore(&designator.nodeid)?;
    tracing::info!(%designator, "restored");

    if json_mode {
        print_json(&json!({ "designator": designator.to_string(), "retired": false }));
    }
    Ok(())
}

/// Pack every journal against the cutoff.
pub fn cmd_pack(db: &mut Database, json_mode: bool, before: &str) -> Result<(), HyperdbError> {
    let cutoff = parse_cutoff(before)?;
    let removed = db.pack(&cutoff)?;
    tracing::info!(removed, cutoff = %cutoff, "packed journals");

    if json_mode {
        print_json(&json!({ "cutoff": cutoff.to_string(), "removed": removed }));
    } else {
        println!("Removed {} journal entries older than {}", removed, cutoff);
    }
    Ok(())
}
