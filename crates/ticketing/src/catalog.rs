//! Static reference data and the category allow-list.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

/// An id/name pair from one of the reference tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub id: i64,
    pub name: &'static str,
}

const fn reference(id: i64, name: &'static str) -> Reference {
    Reference { id, name }
}

pub const TICKET_TYPES: &[Reference] = &[
    reference(1, "Incident"),
    reference(2, "Service Request"),
    reference(3, "Question"),
    reference(4, "Problem"),
    reference(5, "Change"),
    reference(6, "Major Incident"),
];

pub const PRIORITIES: &[Reference] = &[
    reference(1, "Low"),
    reference(2, "Medium"),
    reference(3, "High"),
    reference(4, "Urgent"),
    reference(5, "Critical"),
];

pub const STATUSES: &[Reference] = &[
    reference(1, "New"),
    reference(2, "Open"),
    reference(3, "Pending"),
    reference(4, "Waiting"),
    reference(5, "Resolved"),
    reference(6, "Closed"),
    reference(7, "Rejected"),
    reference(8, "Canceled"),
];

/// Ticket types and priorities, served together.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TicketMeta {
    pub types: &'static [Reference],
    pub priorities: &'static [Reference],
}

pub const TICKET_META: TicketMeta = TicketMeta {
    types: TICKET_TYPES,
    priorities: PRIORITIES,
};

/// Name of a numeric status id, or `None` for anything unrecognized.
pub fn status_name(status_id: &Value) -> Option<&'static str> {
    let id = status_id
        .as_i64()
        .or_else(|| status_id.as_f64().map(|f| f as i64))?;
    STATUSES.iter().find(|s| s.id == id).map(|s| s.name)
}

/// Category ids exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCategories(BTreeSet<i64>);

impl AllowedCategories {
    pub fn contains(&self, id: i64) -> bool {
        self.0.contains(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    /// Keeps the allowed categories from a service desk listing.
    ///
    /// The list is read from `data`, else `categories`, else the first array
    /// in the response. Entries whose `id` is not an integer, a float or a
    /// numeric string are dropped.
    pub fn filter(&self, response: &Value) -> Vec<Value> {
        let listing = match response.get("data") {
            Some(data) => data.as_array(),
            None => response
                .get("categories")
                .and_then(Value::as_array)
                .or_else(|| {
                    response
                        .as_object()
                        .and_then(|map| map.values().find_map(Value::as_array))
                }),
        };

        listing
            .into_iter()
            .flatten()
            .filter(|category| {
                category
                    .get("id")
                    .and_then(category_id)
                    .is_some_and(|id| self.contains(id))
            })
            .cloned()
            .collect()
    }
}

impl Default for AllowedCategories {
    fn default() -> Self {
        (115..=123).collect()
    }
}

impl FromIterator<i64> for AllowedCategories {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn category_id(id: &Value) -> Option<i64> {
    match id {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
