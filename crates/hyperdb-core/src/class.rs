//! # Class Layer
//!
//! Typed records over the transaction layer.
//!
//! A `ClassDef` is the schema of one class: its declared properties, its
//! optional key property and whether it is a file class. A `Class` is a
//! short-lived handle borrowing the owning `Database`; every operation
//! validates against the `ClassDef`, stages through the database and
//! generates the matching journal entries.
//!
//! ## Implicit properties
//!
//! Every node carries `id`, `creation`, `activity`, `creator` and `actor`.
//! None of them can be declared or set. File classes also carry `content`,
//! held in the blob store instead of the node record.

use crate::database::Database;
use crate::filter::{FilterSpec, Matcher, SortKey, SortValue, sort_rows};
use crate::formats::NodeRecord;
use crate::journal::{JournalAction, JournalEntry, JournalParams};
use crate::primitives::{
    PROP_ACTIVITY, PROP_ACTOR, PROP_CONTENT, PROP_CREATION, PROP_CREATOR, PROP_ID,
    PROTECTED_PROPERTIES, is_protected,
};
use crate::property::{PropertyType, Value};
use crate::types::{Date, HyperdbError, is_numeric_id, sort_ids};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CLASS DEFINITIONS
// =============================================================================

/// Plain record class or file class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Plain,
    /// Nodes also own a `content` blob.
    File,
}

/// The schema of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    name: String,
    kind: ClassKind,
    properties: BTreeMap<String, PropertyType>,
    key: Option<String>,
}

impl ClassDef {
    /// A plain class with no properties yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Plain,
            properties: BTreeMap::new(),
            key: None,
        }
    }

    /// A file class with no properties yet.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            kind: ClassKind::File,
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.properties.insert(name.into(), ty);
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Declared properties.
    pub fn properties(&self) -> &BTreeMap<String, PropertyType> {
        &self.properties
    }

    /// A declared property.
    pub fn property(&self, name: &str) -> Option<&PropertyType> {
        self.properties.get(name)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Type of `name`, declared or implicit.
    ///
    /// `creator` and `actor` are plain Strings holding the journal tag of
    /// the writing handle, not Links into a user class: the tag is never
    /// looked up, so a database needs no user class at all.
    #[must_use]
    pub fn property_type(&self, name: &str) -> Option<PropertyType> {
        if let Some(ty) = self.properties.get(name) {
            return Some(ty.clone());
        }
        match name {
            PROP_ID | PROP_CREATOR | PROP_ACTOR => Some(PropertyType::String),
            PROP_CREATION | PROP_ACTIVITY => Some(PropertyType::Date),
            PROP_CONTENT if self.kind == ClassKind::File => Some(PropertyType::String),
            _ => None,
        }
    }

    fn is_content(&self, name: &str) -> bool {
        self.kind == ClassKind::File && name == PROP_CONTENT
    }

    /// Check the definition before registration.
    pub(crate) fn validate(&self) -> Result<(), HyperdbError> {
        let valid_name = self
            .name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.name.ends_with(|c: char| c.is_ascii_digit());
        if !valid_name {
            return Err(HyperdbError::Value(format!(
                "invalid class name '{}' (letters, digits and _; may not end in a digit)",
                self.name
            )));
        }
        for name in self.properties.keys() {
            if is_protected(name) || self.is_content(name) || name.is_empty() {
                return Err(HyperdbError::Value(format!(
                    "class '{}' may not declare property '{}'",
                    self.name, name
                )));
            }
        }
        if let Some(key) = &self.key {
            if self.properties.get(key) != Some(&PropertyType::String) {
                return Err(HyperdbError::Value(format!(
                    "key '{}' of class '{}' must be a declared string property",
                    key, self.name
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// NODE SNAPSHOT
// =============================================================================

/// Every property value of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub retired: bool,
    pub values: BTreeMap<String, Option<Value>>,
}

impl Node {
    /// Value of `name`, `None` when null or unknown.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(Option::as_ref)
    }
}

fn link_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Link(id)) => vec![id.clone()],
        Some(Value::Multilink(ids)) => ids.clone(),
        _ => Vec::new(),
    }
}

fn content_bytes(value: Option<&Value>) -> Vec<u8> {
    value
        .and_then(Value::as_str)
        .map(|s| s.as_bytes().to_vec())
        .unwrap_or_default()
}

// =============================================================================
// CLASS HANDLE
// =============================================================================

/// A handle on one class of an open database.
#[derive(Debug)]
pub struct Class<'db> {
    db: &'db mut Database,
    name: String,
}

impl<'db> Class<'db> {
    pub(crate) fn new(db: &'db mut Database, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn def(&self) -> Result<ClassDef, HyperdbError> {
        self.db.classdef(&self.name).cloned()
    }

    /// A handle on another class of the same database.
    fn other(&mut self, name: &str) -> Class<'_> {
        Class::new(&mut *self.db, name)
    }

    fn unknown_property(&self, prop: &str) -> HyperdbError {
        HyperdbError::Key(format!("class '{}' has no property '{}'", self.name, prop))
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Resolve a Link term (node id or key value) against `target`.
    fn resolve_link(&mut self, target: &str, term: &str) -> Result<String, HyperdbError> {
        let has_key = self
            .db
            .classdef(target)
            .map_err(|_| HyperdbError::Value(format!("link target class '{}' does not exist", target)))?
            .key()
            .is_some();
        if is_numeric_id(term) {
            return if self.db.hasnode(target, term)? {
                Ok(term.to_string())
            } else {
                Err(HyperdbError::Index(format!("{} has no node '{}'", target, term)))
            };
        }
        if !has_key {
            return Err(HyperdbError::Value(format!(
                "'{}' is not a {} id and {} has no key property",
                term, target, target
            )));
        }
        self.other(target).lookup(term).map_err(|e| match e {
            HyperdbError::Key(msg) | HyperdbError::Value(msg) => HyperdbError::Value(msg),
            other => other,
        })
    }

    /// Check shape and references of one supplied value.
    fn validate_value(
        &mut self,
        prop: &str,
        ty: &PropertyType,
        value: Option<Value>,
    ) -> Result<Option<Value>, HyperdbError> {
        let Some(value) = value else {
            return Ok(ty.default_value());
        };
        if !ty.accepts(&value) {
            return Err(HyperdbError::Type(format!(
                "property '{}' of {} is a {}, not a {}",
                prop,
                self.name,
                ty.name(),
                value.kind()
            )));
        }
        if let Value::Number(n) = &value {
            if !n.is_finite() {
                return Err(HyperdbError::Value(format!(
                    "property '{}' of {} must be a finite number, not {}",
                    prop, self.name, n
                )));
            }
        }
        Ok(Some(match (ty, value) {
            (PropertyType::Link { class, .. }, Value::Link(term)) => {
                Value::Link(self.resolve_link(class, &term)?)
            }
            (PropertyType::Multilink { class, .. }, Value::Multilink(terms)) => {
                let mut ids = Vec::with_capacity(terms.len());
                for term in &terms {
                    ids.push(self.resolve_link(class, term)?);
                }
                ids.sort();
                ids.dedup();
                sort_ids(&mut ids);
                Value::Multilink(ids)
            }
            (_, value) => value,
        }))
    }

    /// Validate supplied properties. Implicit properties and unknown
    /// names are `Key` errors.
    fn validate_props(
        &mut self,
        def: &ClassDef,
        props: Vec<(String, Option<Value>)>,
    ) -> Result<BTreeMap<String, Option<Value>>, HyperdbError> {
        let mut checked = BTreeMap::new();
        for (prop, value) in props {
            if is_protected(&prop) {
                return Err(HyperdbError::Key(format!(
                    "'{}' is set automatically and may not be supplied",
                    prop
                )));
            }
            let ty = def
                .property_type(&prop)
                .ok_or_else(|| self.unknown_property(&prop))?;
            let value = self.validate_value(&prop, &ty, value)?;
            checked.insert(prop, value);
        }
        Ok(checked)
    }

    /// Fail if another active node already holds key value `value`.
    fn check_key_unique(
        &self,
        def: &ClassDef,
        value: &str,
        except: Option<&str>,
    ) -> Result<(), HyperdbError> {
        let Some(key) = def.key() else {
            return Ok(());
        };
        for (id, record) in self.db.getnodes(&self.name)? {
            if Some(id.as_str()) == except || record.retired {
                continue;
            }
            if record.value(key)?.as_ref().and_then(Value::as_str) == Some(value) {
                return Err(HyperdbError::Value(format!(
                    "{} '{}' already used by {}{}",
                    key, value, self.name, id
                )));
            }
        }
        Ok(())
    }

    fn journal_links(
        &mut self,
        ty: &PropertyType,
        nodeid: &str,
        prop: &str,
        removed: &[String],
        added: &[String],
    ) -> Result<(), HyperdbError> {
        let Some(target) = ty.target_class().filter(|_| ty.journals_links()) else {
            return Ok(());
        };
        let target = target.to_string();
        for (action, ids) in [(JournalAction::Unlink, removed), (JournalAction::Link, added)] {
            for id in ids {
                let params = JournalParams::Link {
                    classname: self.name.clone(),
                    nodeid: nodeid.to_string(),
                    property: prop.to_string(),
                };
                self.db.addjournal(&target, id, action, params)?;
            }
        }
        Ok(())
    }

    fn value_of(
        &self,
        def: &ClassDef,
        nodeid: &str,
        record: &NodeRecord,
        prop: &str,
        ty: &PropertyType,
    ) -> Result<Option<Value>, HyperdbError> {
        if prop == PROP_ID {
            return Ok(Some(Value::String(nodeid.to_string())));
        }
        if def.is_content(prop) {
            let Some(bytes) = self.db.read_blob(&self.name, nodeid, prop)? else {
                return Ok(None);
            };
            return String::from_utf8(bytes).map(|s| Some(Value::String(s))).map_err(|e| {
                HyperdbError::Value(format!(
                    "{} of {}{} is not UTF-8 text: {}",
                    prop, self.name, nodeid, e
                ))
            });
        }
        Ok(record.value(prop)?.or_else(|| ty.default_value()))
    }

    // =========================================================================
    // CREATE / GET / SET
    // =========================================================================

    /// Create a node and return its id.
    ///
    /// Every value is validated before anything is staged. Unset
    /// properties take their defaults. The `create` journal entry holds
    /// every declared property; link journaling on the targets follows.
    pub fn create<I, K, V>(&mut self, props: I) -> Result<String, HyperdbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Option<Value>>,
    {
        let tag = self.db.require_writable("create")?;
        let def = self.def()?;
        let props: Vec<(String, Option<Value>)> = props
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let values = self.validate_props(&def, props)?;
        if let Some(key) = def.key() {
            if let Some(Some(Value::String(k))) = values.get(key) {
                self.check_key_unique(&def, k, None)?;
            }
        }

        let nodeid = self.db.allocate_id(&self.name)?;
        let now = Value::Date(Date::now());
        let mut record = NodeRecord::default();
        for (prop, value) in &values {
            if !def.is_content(prop) {
                record.put(prop, value.as_ref());
            }
        }
        record.put(PROP_CREATION, Some(&now));
        record.put(PROP_ACTIVITY, Some(&now));
        record.put(PROP_CREATOR, Some(&Value::String(tag.clone())));
        record.put(PROP_ACTOR, Some(&Value::String(tag)));
        self.db.addnode(&self.name, &nodeid, record);

        if let Some((prop, value)) = values.iter().find(|(p, _)| def.is_content(p)) {
            let content = content_bytes(value.as_ref());
            self.db.stage_blob(&self.name, &nodeid, prop, content);
        }

        let snapshot: BTreeMap<String, Option<Value>> = def
            .properties()
            .iter()
            .map(|(prop, ty)| {
                let value = values.get(prop).cloned().unwrap_or_else(|| ty.default_value());
                (prop.clone(), value)
            })
            .collect();
        self.db.addjournal(
            &self.name,
            &nodeid,
            JournalAction::Create,
            JournalParams::Properties(snapshot),
        )?;

        for (prop, ty) in def.properties() {
            let added = link_ids(values.get(prop).and_then(Option::as_ref));
            if !added.is_empty() {
                self.journal_links(ty, &nodeid, prop, &[], &added)?;
            }
        }
        Ok(nodeid)
    }

    /// Value of `prop` on node `nodeid`.
    ///
    /// An unknown property is a `Key` error (checked first), an unknown
    /// node an `Index` error.
    pub fn get(&mut self, nodeid: &str, prop: &str) -> Result<Option<Value>, HyperdbError> {
        let def = self.def()?;
        let ty = def
            .property_type(prop)
            .ok_or_else(|| self.unknown_property(prop))?;
        let record = self.db.getnode(&self.name, nodeid)?;
        self.value_of(&def, nodeid, &record, prop, &ty)
    }

    /// Every property of a node, implicit ones included.
    pub fn getnode(&mut self, nodeid: &str) -> Result<Node, HyperdbError> {
        let def = self.def()?;
        let record = self.db.getnode(&self.name, nodeid)?;
        let mut values = BTreeMap::new();
        for (prop, ty) in self.getprops(true)? {
            let value = self.value_of(&def, nodeid, &record, &prop, &ty)?;
            values.insert(prop, value);
        }
        Ok(Node {
            id: nodeid.to_string(),
            retired: record.retired,
            values,
        })
    }

    /// Modify properties of an existing node.
    ///
    /// Only properties whose value actually changes count. If none do,
    /// nothing is staged or journaled. Otherwise `activity`/`actor` are
    /// bumped and one `set` entry holding the old values is journaled,
    /// followed by link/unlink entries on affected target nodes.
    pub fn set<I, K, V>(&mut self, nodeid: &str, props: I) -> Result<(), HyperdbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Option<Value>>,
    {
        let tag = self.db.require_writable("set")?;
        let def = self.def()?;
        let props: Vec<(String, Option<Value>)> = props
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut record = self.db.getnode(&self.name, nodeid)?;
        if record.retired {
            return Err(HyperdbError::Index(format!(
                "{}{} is retired",
                self.name, nodeid
            )));
        }
        let values = self.validate_props(&def, props)?;
        if let Some(key) = def.key() {
            if let Some(Some(Value::String(k))) = values.get(key) {
                self.check_key_unique(&def, k, Some(nodeid))?;
            }
        }

        let mut old_values = BTreeMap::new();
        for (prop, new) in &values {
            let ty = def
                .property_type(prop)
                .ok_or_else(|| self.unknown_property(prop))?;
            let old = self.value_of(&def, nodeid, &record, prop, &ty)?;
            if old != *new {
                old_values.insert(prop.clone(), old);
            }
        }
        if old_values.is_empty() {
            op_trace!(self.db, class = %self.name, nodeid, "set: nothing changed");
            return Ok(());
        }

        for prop in old_values.keys() {
            let new = values.get(prop).cloned().flatten();
            if def.is_content(prop) {
                let content = content_bytes(new.as_ref());
                self.db.stage_blob(&self.name, nodeid, prop, content);
            } else {
                record.put(prop, new.as_ref());
            }
        }
        record.put(PROP_ACTIVITY, Some(&Value::Date(Date::now())));
        record.put(PROP_ACTOR, Some(&Value::String(tag)));
        self.db.setnode(&self.name, nodeid, record)?;

        let journaled: BTreeMap<String, Option<Value>> = old_values
            .iter()
            .filter(|(prop, _)| !def.is_content(prop))
            .map(|(p, v)| (p.clone(), v.clone()))
            .collect();
        self.db.addjournal(
            &self.name,
            nodeid,
            JournalAction::Set,
            JournalParams::Properties(journaled),
        )?;

        for (prop, old) in &old_values {
            let Some(ty) = def.properties().get(prop) else {
                continue;
            };
            let old_ids: BTreeSet<String> = link_ids(old.as_ref()).into_iter().collect();
            let new_ids: BTreeSet<String> =
                link_ids(values.get(prop).and_then(Option::as_ref)).into_iter().collect();
            let mut removed: Vec<String> = old_ids.difference(&new_ids).cloned().collect();
            let mut added: Vec<String> = new_ids.difference(&old_ids).cloned().collect();
            sort_ids(&mut removed);
            sort_ids(&mut added);
            self.journal_links(ty, nodeid, prop, &removed, &added)?;
        }
        Ok(())
    }

    // =========================================================================
    // RETIRE / RESTORE
    // =========================================================================

    /// Soft-delete a node. Retiring a retired node does nothing.
    pub fn retire(&mut self, nodeid: &str) -> Result<(), HyperdbError> {
        self.db.require_writable("retire")?;
        let mut record = self.db.getnode(&self.name, nodeid)?;
        if record.retired {
            return Ok(());
        }
        record.retired = true;
        self.db.setnode(&self.name, nodeid, record)?;
        self.db
            .addjournal(&self.name, nodeid, JournalAction::Retire, JournalParams::None)
    }

    /// Reverse `retire`. Fails with a `Value` error if another active node
    /// took the key value in the meantime.
    pub fn restore(&mut self, nodeid: &str) -> Result<(), HyperdbError> {
        self.db.require_writable("restore")?;
        let def = self.def()?;
        let mut record = self.db.getnode(&self.name, nodeid)?;
        if !record.retired {
            return Ok(());
        }
        if let Some(key) = def.key() {
            if let Some(Value::String(k)) = record.value(key)? {
                self.check_key_unique(&def, &k, Some(nodeid))?;
            }
        }
        record.retired = false;
        self.db.setnode(&self.name, nodeid, record)?;
        self.db
            .addjournal(&self.name, nodeid, JournalAction::Restore, JournalParams::None)
    }

    pub fn is_retired(&mut self, nodeid: &str) -> Result<bool, HyperdbError> {
        Ok(self.db.getnode(&self.name, nodeid)?.retired)
    }

    // =========================================================================
    // LISTING / LOOKUP
    // =========================================================================

    /// Ids of every active node, ascending.
    pub fn list(&self) -> Result<Vec<String>, HyperdbError> {
        Ok(self
            .db
            .getnodes(&self.name)?
            .into_iter()
            .filter(|(_, record)| !record.retired)
            .map(|(id, _)| id)
            .collect())
    }

    /// Ids of every node, retired included, ascending.
    pub fn getnodeids(&self) -> Result<Vec<String>, HyperdbError> {
        self.db.getnodeids(&self.name)
    }

    /// Number of nodes, retired included.
    pub fn count(&self) -> Result<usize, HyperdbError> {
        Ok(self.getnodeids()?.len())
    }

    /// True if node `nodeid` exists, retired or not.
    pub fn hasnode(&self, nodeid: &str) -> Result<bool, HyperdbError> {
        self.db.hasnode(&self.name, nodeid)
    }

    /// Id of the active node whose key property equals `keyvalue`.
    pub fn lookup(&self, keyvalue: &str) -> Result<String, HyperdbError> {
        let def = self.def()?;
        let key = def
            .key()
            .ok_or_else(|| HyperdbError::Key(format!("class '{}' has no key property", self.name)))?;
        for (id, record) in self.db.getnodes(&self.name)? {
            if record.retired {
                continue;
            }
            if record.value(key)?.as_ref().and_then(Value::as_str) == Some(keyvalue) {
                return Ok(id);
            }
        }
        Err(HyperdbError::Value(format!(
            "no {} with {} '{}'",
            self.name, key, keyvalue
        )))
    }

    /// Active nodes whose Link or Multilink `prop` references any of `ids`.
    pub fn find(&self, prop: &str, ids: &[&str]) -> Result<Vec<String>, HyperdbError> {
        let def = self.def()?;
        let ty = def
            .properties()
            .get(prop)
            .ok_or_else(|| self.unknown_property(prop))?;
        if ty.target_class().is_none() {
            return Err(HyperdbError::Type(format!(
                "property '{}' of {} is not a link",
                prop, self.name
            )));
        }
        let mut found = Vec::new();
        for (id, record) in self.db.getnodes(&self.name)? {
            if record.retired {
                continue;
            }
            let held = link_ids(record.value(prop)?.as_ref());
            if held.iter().any(|h| ids.contains(&h.as_str())) {
                found.push(id);
            }
        }
        Ok(found)
    }

    // =========================================================================
    // FILTER
    // =========================================================================

    fn resolve_term(&mut self, target: &str, term: &str) -> Result<String, HyperdbError> {
        if is_numeric_id(term) {
            return Ok(term.to_string());
        }
        self.other(target).lookup(term).map_err(|e| match e {
            HyperdbError::Key(msg) => HyperdbError::Value(msg),
            other => other,
        })
    }

    fn link_label(
        &mut self,
        labels: &mut BTreeMap<(String, String), String>,
        target: &str,
        id: &str,
    ) -> String {
        let cache_key = (target.to_string(), id.to_string());
        if let Some(label) = labels.get(&cache_key) {
            return label.clone();
        }
        let mut other = self.other(target);
        let label = other
            .labelprop(true)
            .and_then(|prop| other.get(id, &prop))
            .ok()
            .flatten()
            .map(|v| v.to_string())
            .unwrap_or_else(|| id.to_string());
        labels.insert(cache_key, label.clone());
        label
    }

    fn sort_value(
        &mut self,
        labels: &mut BTreeMap<(String, String), String>,
        ty: &PropertyType,
        value: Option<Value>,
    ) -> SortValue {
        match (ty.target_class(), value) {
            (_, None) => SortValue::Null,
            (Some(target), Some(Value::Link(id))) => {
                SortValue::Text(self.link_label(labels, target, &id))
            }
            (Some(target), Some(Value::Multilink(ids))) => {
                let mut names: Vec<String> = ids
                    .iter()
                    .map(|id| self.link_label(labels, target, id))
                    .collect();
                names.sort();
                SortValue::List(names)
            }
            (_, Some(Value::String(s))) => SortValue::Text(s),
            (_, Some(Value::Number(n))) => SortValue::Number(n),
            (_, Some(Value::Boolean(b))) => SortValue::Boolean(b),
            (_, Some(Value::Date(d))) => SortValue::Date(d),
            (_, Some(Value::Interval(i))) => SortValue::Interval(i),
            (_, Some(other)) => SortValue::Text(other.to_string()),
        }
    }

    /// Ids of active nodes matching every constraint of `spec`, ordered by
    /// `group` keys, then `sort` keys, then ascending id.
    ///
    /// Link sort keys order by the target node's label, not its id.
    pub fn filter(
        &mut self,
        spec: &FilterSpec,
        sort: &[SortKey],
        group: &[SortKey],
    ) -> Result<Vec<String>, HyperdbError> {
        let def = self.def()?;
        let mut matchers = Vec::with_capacity(spec.len());
        for (prop, terms) in spec {
            let ty = def
                .property_type(prop)
                .ok_or_else(|| self.unknown_property(prop))?;
            let target = ty.target_class().map(str::to_string);
            let mut resolve = |term: &str| -> Result<String, HyperdbError> {
                match &target {
                    Some(t) => self.resolve_term(t, term),
                    None => Ok(term.to_string()),
                }
            };
            let matcher = Matcher::compile(prop, &ty, terms, &mut resolve)?;
            matchers.push((prop.clone(), ty, matcher));
        }

        let keys: Vec<SortKey> = group.iter().chain(sort).cloned().collect();
        let mut key_types = Vec::with_capacity(keys.len());
        for key in &keys {
            key_types.push(
                def.property_type(&key.property)
                    .ok_or_else(|| self.unknown_property(&key.property))?,
            );
        }

        let mut rows = Vec::new();
        let mut labels = BTreeMap::new();
        for (id, record) in self.db.getnodes(&self.name)? {
            if record.retired {
                continue;
            }
            let mut matched = true;
            for (prop, ty, matcher) in &matchers {
                let value = self.value_of(&def, &id, &record, prop, ty)?;
                if !matcher.matches(value.as_ref()) {
                    matched = false;
                    break;
                }
            }
            if !matched {
                continue;
            }
            let mut sort_values = Vec::with_capacity(keys.len());
            for (key, ty) in keys.iter().zip(&key_types) {
                if key.property == PROP_ID {
                    sort_values.push(SortValue::Id(id.clone()));
                    continue;
                }
                let value = self.value_of(&def, &id, &record, &key.property, ty)?;
                sort_values.push(self.sort_value(&mut labels, ty, value));
            }
            rows.push((id, sort_values));
        }
        sort_rows(&mut rows, &keys);
        Ok(rows.into_iter().map(|(id, _)| id).collect())
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// Full journal of a node, oldest first.
    pub fn history(&self, nodeid: &str) -> Result<Vec<JournalEntry>, HyperdbError> {
        if !self.db.hasnode(&self.name, nodeid)? {
            return Err(HyperdbError::Index(format!(
                "no such {}: '{}'",
                self.name, nodeid
            )));
        }
        self.db.getjournal(&self.name, nodeid)
    }

    // =========================================================================
    // SCHEMA
    // =========================================================================

    /// Property types of this class; with `protected`, the implicit ones too.
    pub fn getprops(&self, protected: bool) -> Result<BTreeMap<String, PropertyType>, HyperdbError> {
        let def = self.def()?;
        let mut props = def.properties().clone();
        if def.kind() == ClassKind::File {
            props.insert(PROP_CONTENT.to_string(), PropertyType::String);
        }
        if protected {
            for name in PROTECTED_PROPERTIES {
                if let Some(ty) = def.property_type(name) {
                    props.insert(name.to_string(), ty);
                }
            }
        }
        Ok(props)
    }

    /// Name of the key property, if any.
    pub fn getkey(&self) -> Result<Option<String>, HyperdbError> {
        Ok(self.def()?.key().map(str::to_string))
    }

    /// Make `prop` the key property. It must be a declared String.
    pub fn setkey(&mut self, prop: &str) -> Result<(), HyperdbError> {
        let def = self.db.classdef_mut(&self.name)?;
        match def.properties.get(prop) {
            None => Err(HyperdbError::Key(format!(
                "class '{}' has no property '{}'",
                def.name, prop
            ))),
            Some(PropertyType::String) => {
                def.key = Some(prop.to_string());
                Ok(())
            }
            Some(other) => Err(HyperdbError::Type(format!(
                "key property '{}' must be a string, not a {}",
                prop,
                other.name()
            ))),
        }
    }

    /// Property used to label nodes for humans: the key, else `name`,
    /// else `title`, else `id` (when `default_to_id`) or the first property.
    pub fn labelprop(&self, default_to_id: bool) -> Result<String, HyperdbError> {
        let def = self.def()?;
        if let Some(key) = def.key() {
            return Ok(key.to_string());
        }
        for candidate in ["name", "title"] {
            if def.properties().contains_key(candidate) {
                return Ok(candidate.to_string());
            }
        }
        if default_to_id {
            return Ok(PROP_ID.to_string());
        }
        Ok(def
            .properties()
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| PROP_ID.to_string()))
    }

    /// Add properties to a live class. Stored nodes read them as their
    /// default until set.
    pub fn addprop<I, K>(&mut self, props: I) -> Result<(), HyperdbError>
    where
        I: IntoIterator<Item = (K, PropertyType)>,
        K: Into<String>,
    {
        let props: Vec<(String, PropertyType)> =
            props.into_iter().map(|(k, ty)| (k.into(), ty)).collect();
        let def = self.db.classdef_mut(&self.name)?;
        for (name, _) in &props {
            if def.property_type(name).is_some() || name.is_empty() {
                return Err(HyperdbError::Value(format!(
                    "class '{}' already has property '{}'",
                    def.name, name
                )));
            }
        }
        for (name, ty) in props {
            def.properties.insert(name, ty);
        }
        Ok(())
    }

    /// Coerce front-end text into a validated value of `prop`, resolving
    /// Link and Multilink key values to ids.
    pub fn parse_value(&mut self, prop: &str, text: &str) -> Result<Option<Value>, HyperdbError> {
        let def = self.def()?;
        let ty = def
            .property_type(prop)
            .ok_or_else(|| self.unknown_property(prop))?;
        let value = ty.parse_text(text)?;
        self.validate_value(prop, &ty, value)
    }
}

// =============================================================================
// TESTS
// =============================================================================
