//! # Filtering and Sorting
//!
//! Building blocks of `Class::filter`.
//!
//! A `FilterSpec` maps property names to lists of text terms. Each list is
//! compiled against the property's type into a `Matcher`; a node matches
//! when every matcher accepts its value. Terms of one property are
//! alternatives:
//! - String, Number, Boolean, Link: any term equal (`-1` is a null Link)
//! - Multilink: any listed id present (`-1` matches the empty set)
//! - Date: `from;to` inclusive (either side open) or a period like `2003-02`
//! - Interval: `from;to` inclusive or one exact interval
//!
//! Results are ordered by group keys, then sort keys, then ascending id.

use crate::primitives::NULL_LINK_TERM;
use crate::property::{PropertyType, Value};
use crate::types::{Date, HyperdbError, Interval};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Property name -> alternative text terms.
pub type FilterSpec = BTreeMap<String, Vec<String>>;

// =============================================================================
// SORT KEYS
// =============================================================================

/// One ordering key: a property and its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub property: String,
    pub descending: bool,
}

impl SortKey {
    #[must_use]
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            descending: false,
        }
    }

    #[must_use]
    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            descending: true,
        }
    }

    /// `-prop` sorts descending, `prop` or `+prop` ascending.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.strip_prefix('-') {
            Some(prop) => Self::descending(prop),
            None => Self::ascending(text.strip_prefix('+').unwrap_or(text)),
        }
    }
}

// =============================================================================
// MATCHERS
// =============================================================================

/// Compiled terms for one property.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Matcher {
    Text(BTreeSet<String>),
    Number(Vec<f64>),
    Boolean(BTreeSet<bool>),
    Link { ids: BTreeSet<String>, null: bool },
    Multilink { ids: BTreeSet<String>, empty: bool },
    Dates(Vec<(Option<Date>, Option<Date>)>),
    Intervals(Vec<(Option<Interval>, Option<Interval>)>),
}

fn split_range(term: &str) -> Option<(&str, &str)> {
    term.split_once(';').map(|(a, b)| (a.trim(), b.trim()))
}

fn present(text: &str) -> Option<&str> {
    if text.is_empty() { None } else { Some(text) }
}

impl Matcher {
    /// Compile `terms` for a property of type `ty`. `resolve` maps a Link
    /// or Multilink term (id or key value) to a node id.
    pub(crate) fn compile(
        property: &str,
        ty: &PropertyType,
        terms: &[String],
        resolve: &mut dyn FnMut(&str) -> Result<String, HyperdbError>,
    ) -> Result<Self, HyperdbError> {
        let terms: Vec<&str> = terms.iter().map(|t| t.trim()).collect();
        Ok(match ty {
            PropertyType::String => Self::Text(terms.iter().map(|t| (*t).to_string()).collect()),
            PropertyType::Number => {
                let mut numbers = Vec::new();
                for term in &terms {
                    if let Some(Value::Number(n)) = ty.parse_text(term)? {
                        numbers.push(n);
                    }
                }
                Self::Number(numbers)
            }
            PropertyType::Boolean => {
                let mut flags = BTreeSet::new();
                for term in &terms {
                    if let Some(Value::Boolean(b)) = ty.parse_text(term)? {
                        flags.insert(b);
                    }
                }
                Self::Boolean(flags)
            }
            PropertyType::Link { .. } | PropertyType::Multilink { .. } => {
                let mut ids = BTreeSet::new();
                let mut null = false;
                for term in terms.iter().filter(|t| !t.is_empty()) {
                    if *term == NULL_LINK_TERM {
                        null = true;
                    } else {
                        ids.insert(resolve(*term)?);
                    }
                }
                if matches!(ty, PropertyType::Link { .. }) {
                    Self::Link { ids, null }
                } else {
                    Self::Multilink { ids, empty: null }
                }
            }
            PropertyType::Date => {
                let mut ranges = Vec::new();
                for term in &terms {
                    ranges.push(match split_range(term) {
                        Some((from, to)) => (
                            present(from)
                                .map(|f| Date::parse_period(f).map(|p| p.0))
                                .transpose()?,
                            present(to)
                                .map(|t| Date::parse_period(t).map(|p| p.1))
                                .transpose()?,
                        ),
                        None => {
                            let (start, end) = Date::parse_period(term)?;
                            (Some(start), Some(end))
                        }
                    });
                }
                Self::Dates(ranges)
            }
            PropertyType::Interval => {
                let mut ranges = Vec::new();
                for term in &terms {
                    ranges.push(match split_range(term) {
                        Some((from, to)) => (
                            present(from).map(Interval::parse).transpose()?,
                            present(to).map(Interval::parse).transpose()?,
                        ),
                        None => {
                            let exact = Interval::parse(term)?;
                            (Some(exact), Some(exact))
                        }
                    });
                }
                Self::Intervals(ranges)
            }
            PropertyType::Password => {
                return Err(HyperdbError::Type(format!(
                    "can't filter on password property '{}'",
                    property
                )));
            }
        })
    }

    /// True if a node whose property holds `value` passes.
    pub(crate) fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Self::Text(set), Some(Value::String(s))) => set.contains(s),
            (Self::Number(ns), Some(Value::Number(n))) => {
                ns.iter().any(|x| x.total_cmp(n) == Ordering::Equal)
            }
            (Self::Boolean(set), Some(Value::Boolean(b))) => set.contains(b),
            (Self::Link { null, .. }, None) => *null,
            (Self::Link { ids, .. }, Some(Value::Link(id))) => ids.contains(id),
            (Self::Multilink { empty, .. }, None) => *empty,
            (Self::Multilink { ids, empty }, Some(Value::Multilink(held))) => {
                (*empty && held.is_empty()) || held.iter().any(|id| ids.contains(id))
            }
            (Self::Dates(ranges), Some(Value::Date(d))) => ranges.iter().any(|(from, to)| {
                from.is_none_or(|f| *d >= f) && to.is_none_or(|t| *d <= t)
            }),
            (Self::Intervals(ranges), Some(Value::Interval(i))) => {
                ranges.iter().any(|(from, to)| {
                    from.is_none_or(|f| *i >= f) && to.is_none_or(|t| *i <= t)
                })
            }
            _ => false,
        }
    }
}

// =============================================================================
// SORTING
// =============================================================================

/// A property value reduced to something orderable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SortValue {
    Null,
    /// A node id, ordered numerically.
    Id(String),
    Boolean(bool),
    Number(f64),
    Text(String),
    Date(Date),
    Interval(Interval),
    List(Vec<String>),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Id(_) => 1,
            Self::Boolean(_) => 2,
            Self::Number(_) => 3,
            Self::Text(_) => 4,
            Self::Date(_) => 5,
            Self::Interval(_) => 6,
            Self::List(_) => 7,
        }
    }

    /// Total order with nulls first.
    pub(crate) fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Id(a), Self::Id(b)) => id_order(a, b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Interval(a), Self::Interval(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Compare node ids numerically.
fn id_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Order `rows` of (id, one sort value per key) by `keys` in turn, ties
/// broken by ascending id.
pub(crate) fn sort_rows(rows: &mut [(String, Vec<SortValue>)], keys: &[SortKey]) {
    rows.sort_by(|(id_a, a), (id_b, b)| {
        for (i, key) in keys.iter().enumerate() {
            let (Some(va), Some(vb)) = (a.get(i), b.get(i)) else {
                continue;
            };
            let ord = va.compare(vb);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        id_order(id_a, id_b)
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn no_links(_: &str) -> Result<String, HyperdbError> {
        Err(HyperdbError::Value("no links".to_string()))
    }

    fn terms(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn sort_key_direction() {
        assert_eq!(SortKey::parse("-activity"), SortKey::descending("activity"));
        assert_eq!(SortKey::parse("+title"), SortKey::ascending("title"));
        assert_eq!(SortKey::parse("title"), SortKey::ascending("title"));
    }

    #[test]
    fn date_period_and_range() {
        let m = Matcher::compile("due", &PropertyType::Date, &terms(&["2003-02"]), &mut no_links)
            .expect("compile");
        let inside = Value::Date(Date::parse("2003-02-28.23:59").expect("date"));
        let outside = Value::Date(Date::parse("2003-03-01").expect("date"));
        assert!(m.matches(Some(&inside)));
        assert!(!m.matches(Some(&outside)));
        assert!(!m.matches(None));

        let m = Matcher::compile("due", &PropertyType::Date, &terms(&["2003-03-01;"]), &mut no_links)
            .expect("compile");
        assert!(m.matches(Some(&outside)));
        assert!(!m.matches(Some(&inside)));
    }

    #[test]
    fn interval_range() {
        let m = Matcher::compile(
            "estimate",
            &PropertyType::Interval,
            &terms(&["1d;1w"]),
            &mut no_links,
        )
        .expect("compile");
        assert!(m.matches(Some(&Value::Interval(Interval::parse("3d").expect("i")))));
        assert!(!m.matches(Some(&Value::Interval(Interval::parse("2w").expect("i")))));
    }

    #[test]
    fn null_link_term() {
        let mut resolve = |t: &str| -> Result<String, HyperdbError> { Ok(t.to_string()) };
        let m = Matcher::compile(
            "status",
            &PropertyType::link("status"),
            &terms(&["-1", "2"]),
            &mut resolve,
        )
        .expect("compile");
        assert!(m.matches(None));
        assert!(m.matches(Some(&Value::link("2"))));
        assert!(!m.matches(Some(&Value::link("1"))));
    }

    #[test]
    fn multilink_intersection() {
        let mut resolve = |t: &str| -> Result<String, HyperdbError> { Ok(t.to_string()) };
        let m = Matcher::compile(
            "nosy",
            &PropertyType::multilink("user"),
            &terms(&["2", "3"]),
            &mut resolve,
        )
        .expect("compile");
        assert!(m.matches(Some(&Value::multilink(["1", "3"]))));
        assert!(!m.matches(Some(&Value::multilink(["1"]))));
        assert!(!m.matches(Some(&Value::Multilink(Vec::new()))));
    }

    #[test]
    fn password_filter_is_type_error() {
        assert!(matches!(
            Matcher::compile("pw", &PropertyType::Password, &terms(&["x"]), &mut no_links),
            Err(HyperdbError::Type(_))
        ));
    }

    #[test]
    fn rows_sort_with_nulls_first_and_id_ties() {
        let mut rows = vec![
            ("10".to_string(), vec![SortValue::Text("b".to_string())]),
            ("2".to_string(), vec![SortValue::Text("b".to_string())]),
            ("3".to_string(), vec![SortValue::Null]),
            ("1".to_string(), vec![SortValue::Text("a".to_string())]),
        ];
        sort_rows(&mut rows, &[SortKey::ascending("title")]);
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2", "10"]);

        sort_rows(&mut rows, &[SortKey::descending("title")]);
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["2", "10", "1", "3"]);
    }
}
