//! The copy projection: columns present in both origin and shadow.
//!
//! The intersection is computed once, after the migration callback has
//! given the shadow its final shape, and stays frozen for the rest of the
//! run. Both the mirror triggers and the back-fill copy rows through it:
//! columns only the origin has are dropped, columns only the shadow has
//! are left to their defaults.

use std::collections::HashSet;

use crate::core::identifier;
use crate::core::table::Column;

/// The ordered set of column names shared by origin and shadow.
///
/// Order follows the origin's declared column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intersection {
    columns: Vec<String>,
}

impl Intersection {
    /// Compute the intersection of two column lists, preserving the
    /// origin's order.
    pub fn of(origin: &[Column], shadow: &[Column]) -> Self {
        let shadow_names: HashSet<&str> = shadow.iter().map(|c| c.name.as_str()).collect();
        let columns = origin
            .iter()
            .filter(|c| shadow_names.contains(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        Self { columns }
    }

    /// The shared column names, in origin order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether origin and shadow share no columns at all.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Quoted, comma-separated column list: `` `id`, `name` ``.
    pub fn quoted_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| identifier::quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The trigger-side value list: `` NEW.`id`, NEW.`name` ``.
    pub fn new_value_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("NEW.{}", identifier::quote(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
