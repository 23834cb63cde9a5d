use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Name of the property every output specification carries to identify the
/// function instance that produces it.
pub const FUNCTION: &str = "Function";

static ANY: PropertyValues = PropertyValues::Any;

/// The values a single property may take.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "camelCase")]
pub enum PropertyValues {
    /// Wildcard: any value is acceptable (or can be produced).
    Any,
    /// A finite set of acceptable values. Empty only as the result of
    /// intersecting disjoint sets, in which case nothing can satisfy it.
    Values(BTreeSet<String>),
}

impl PropertyValues {
    pub fn single(value: impl Into<String>) -> Self {
        PropertyValues::Values(BTreeSet::from([value.into()]))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, PropertyValues::Any)
    }

    /// Set intersection; the wildcard never narrows a concrete set.
    pub fn intersect(&self, other: &PropertyValues) -> PropertyValues {
        match (self, other) {
            (PropertyValues::Any, PropertyValues::Any) => PropertyValues::Any,
            (PropertyValues::Any, concrete) | (concrete, PropertyValues::Any) => concrete.clone(),
            (PropertyValues::Values(a), PropertyValues::Values(b)) => {
                PropertyValues::Values(a.intersection(b).cloned().collect())
            }
        }
    }

    /// True when at least one value is acceptable to both sides.
    pub fn overlaps(&self, other: &PropertyValues) -> bool {
        match (self, other) {
            (PropertyValues::Any, _) | (_, PropertyValues::Any) => true,
            (PropertyValues::Values(a), PropertyValues::Values(b)) => !a.is_disjoint(b),
        }
    }
}

impl fmt::Display for PropertyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValues::Any => f.write_str("*"),
            PropertyValues::Values(values) => {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                write!(f, "[{}]", values.join(","))
            }
        }
    }
}

/// One named property: its allowed values and whether it may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyConstraint {
    values: PropertyValues,
    #[serde(default)]
    optional: bool,
}

impl PropertyConstraint {
    pub fn values(&self) -> &PropertyValues {
        &self.values
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// A set of named value properties, used both as the constraints on a
/// [`ValueRequirement`](super::requirement::ValueRequirement) and as the
/// description of a [`ValueSpecification`](super::specification::ValueSpecification).
///
/// Property names are case-sensitive. The special [`ValueProperties::all`]
/// set defines every property with a wildcard value and is the identity of
/// [`compose`](ValueProperties::compose).
///
/// # Examples
///
/// ```
/// use depgraph_builder::core::properties::ValueProperties;
///
/// let concrete = ValueProperties::builder().with("Currency", "USD").build();
/// let wildcard = ValueProperties::builder().with_any("Currency").build();
///
/// assert_eq!(concrete.compose(&wildcard), concrete);
/// assert!(wildcard.is_satisfied_by(&concrete));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueProperties {
    #[serde(default)]
    properties: BTreeMap<String, PropertyConstraint>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    all: bool,
}

impl ValueProperties {
    /// The empty property set.
    pub fn none() -> Self {
        Self::default()
    }

    /// The set that defines every property with a wildcard value.
    pub fn all() -> Self {
        Self {
            properties: BTreeMap::new(),
            all: true,
        }
    }

    pub fn builder() -> ValuePropertiesBuilder {
        ValuePropertiesBuilder::default()
    }

    /// Start a builder from a copy of this set.
    pub fn copy(&self) -> ValuePropertiesBuilder {
        ValuePropertiesBuilder {
            properties: self.clone(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.properties.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&PropertyConstraint> {
        self.properties.get(name)
    }

    pub fn values(&self, name: &str) -> Option<&PropertyValues> {
        if self.all {
            return Some(&ANY);
        }
        self.properties.get(name).map(|c| &c.values)
    }

    /// The value of a property defined with exactly one concrete value.
    pub fn single_value(&self, name: &str) -> Option<&str> {
        match self.properties.get(name).map(|c| &c.values) {
            Some(PropertyValues::Values(values)) if values.len() == 1 => {
                values.iter().next().map(String::as_str)
            }
            _ => None,
        }
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.properties.get(name).map_or(false, |c| c.optional)
    }

    /// False if any property has been narrowed to an empty value set.
    pub fn is_satisfiable(&self) -> bool {
        self.properties.values().all(|c| match &c.values {
            PropertyValues::Any => true,
            PropertyValues::Values(values) => !values.is_empty(),
        })
    }

    /// Intersect two property sets.
    ///
    /// Properties present in both sets intersect their values (optional only
    /// if optional on both sides). A property present in only one set
    /// survives only when the other set is [`ValueProperties::all`].
    /// Commutative, associative and idempotent.
    pub fn compose(&self, other: &ValueProperties) -> ValueProperties {
        if self.all {
            return other.clone();
        }
        if other.all {
            return self.clone();
        }
        let properties = self
            .properties
            .iter()
            .filter_map(|(name, mine)| {
                other.properties.get(name).map(|theirs| {
                    (
                        name.clone(),
                        PropertyConstraint {
                            values: mine.values.intersect(&theirs.values),
                            optional: mine.optional && theirs.optional,
                        },
                    )
                })
            })
            .collect();
        ValueProperties {
            properties,
            all: false,
        }
    }

    /// Whether `properties` (typically a specification's) meets every
    /// constraint in this set. An absent optional constraint is compatible,
    /// and a wildcard on either side matches any value.
    pub fn is_satisfied_by(&self, properties: &ValueProperties) -> bool {
        if properties.all {
            return true;
        }
        if self.all {
            return false;
        }
        self.properties.iter().all(|(name, constraint)| {
            match properties.properties.get(name) {
                None => constraint.optional,
                Some(offered) => constraint.values.overlaps(&offered.values),
            }
        })
    }

    /// Whether this set is at least as specific as `other` on every property
    /// `other` defines, i.e. anything satisfying `self` also satisfies `other`.
    pub fn subsumes(&self, other: &ValueProperties) -> bool {
        if other.all {
            return true;
        }
        if self.all {
            return false;
        }
        other.properties.iter().all(|(name, theirs)| {
            match self.properties.get(name) {
                None => theirs.optional,
                Some(mine) => match (&mine.values, &theirs.values) {
                    (_, PropertyValues::Any) => true,
                    (PropertyValues::Any, PropertyValues::Values(_)) => false,
                    (PropertyValues::Values(a), PropertyValues::Values(b)) => a.is_subset(b),
                },
            }
        })
    }

    /// Restrict this (output) set by a requirement's constraints: wildcards
    /// and multi-valued properties the constraints also define are narrowed
    /// to the common values; everything else is kept as offered.
    pub fn narrow(&self, constraints: &ValueProperties) -> ValueProperties {
        if constraints.all || self.all {
            return self.clone();
        }
        let properties = self
            .properties
            .iter()
            .map(|(name, offered)| {
                let values = match constraints.properties.get(name) {
                    Some(wanted) => offered.values.intersect(&wanted.values),
                    None => offered.values.clone(),
                };
                (
                    name.clone(),
                    PropertyConstraint {
                        values,
                        optional: false,
                    },
                )
            })
            .collect();
        ValueProperties {
            properties,
            all: false,
        }
    }

    /// A copy with `name` set to the single `value`.
    pub fn with(&self, name: &str, value: impl Into<String>) -> ValueProperties {
        self.copy().with(name, value).build()
    }

    /// A copy with `name` removed.
    pub fn without(&self, name: &str) -> ValueProperties {
        self.copy().without(name).build()
    }
}

impl fmt::Display for ValueProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all {
            return f.write_str("INFINITE");
        }
        let parts: Vec<String> = self
            .properties
            .iter()
            .map(|(name, c)| {
                if c.optional {
                    format!("{}={}?", name, c.values)
                } else {
                    format!("{}={}", name, c.values)
                }
            })
            .collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}

/// Incremental constructor for [`ValueProperties`].
#[derive(Debug, Clone, Default)]
pub struct ValuePropertiesBuilder {
    properties: ValueProperties,
}

impl ValuePropertiesBuilder {
    /// Add a single value, widening an existing finite set.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.add_values(name, std::iter::once(value.into()));
        self
    }

    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_values(name, values.into_iter().map(Into::into));
        self
    }

    /// Define `name` with the wildcard value.
    pub fn with_any(mut self, name: &str) -> Self {
        let entry = self.entry(name);
        entry.values = PropertyValues::Any;
        self
    }

    /// Mark `name` as optional, defining it with the wildcard if absent.
    pub fn with_optional(mut self, name: &str) -> Self {
        self.entry(name).optional = true;
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.properties.properties.remove(name);
        self
    }

    pub fn build(self) -> ValueProperties {
        self.properties
    }

    fn entry(&mut self, name: &str) -> &mut PropertyConstraint {
        self.properties
            .properties
            .entry(name.to_string())
            .or_insert_with(|| PropertyConstraint {
                values: PropertyValues::Any,
                optional: false,
            })
    }

    fn add_values(&mut self, name: &str, values: impl Iterator<Item = String>) {
        let fresh = !self.properties.properties.contains_key(name);
        let entry = self.entry(name);
        if let PropertyValues::Values(existing) = &mut entry.values {
            existing.extend(values);
        } else if fresh {
            entry.values = PropertyValues::Values(values.collect());
        }
    }
}
