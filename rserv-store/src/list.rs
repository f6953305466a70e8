//! Listing: multi-field sort, pagination, and field search.

use rserv_core::error::{Error, Result};
use rserv_core::value::json_cmp;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Upper bound on `per_page`.
pub const MAX_PAGE_SIZE: usize = 100;

/// One sort criterion parsed from `field:asc` / `field:desc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field to compare
    pub field: String,
    /// Descending order
    pub desc: bool,
}

/// Parse a sort spec like `name:asc,age:desc`. A bare field name sorts
/// ascending; anything else is a validation error.
pub fn parse_sort_spec(spec: &str) -> Result<Vec<SortKey>> {
    let mut keys = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::validation(format!("Invalid sort spec: {spec}")));
        }
        let (field, desc) = match part.split_once(':') {
            None => (part, false),
            Some((field, "asc")) => (field, false),
            Some((field, "desc")) => (field, true),
            Some((_, other)) => {
                return Err(Error::validation(format!(
                    "Invalid sort direction: {other}"
                )))
            }
        };
        if field.is_empty() {
            return Err(Error::validation(format!("Invalid sort spec: {spec}")));
        }
        keys.push(SortKey {
            field: field.to_string(),
            desc,
        });
    }
    Ok(keys)
}

/// Sort documents by the given keys; missing fields sort as null.
pub fn sort_documents(docs: &mut [Value], keys: &[SortKey]) {
    docs.sort_by(|a, b| {
        for key in keys {
            let av = a.get(&key.field).unwrap_or(&Value::Null);
            let bv = b.get(&key.field).unwrap_or(&Value::Null);
            let ord = json_cmp(av, bv);
            if ord != Ordering::Equal {
                return if key.desc { ord.reverse() } else { ord };
            }
        }
        Ordering::Equal
    });
}

/// A page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// Documents on this page
    pub items: Vec<Value>,
    /// Total matching documents
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    /// Page size after clamping
    pub per_page: usize,
    /// Total pages (at least 1)
    pub total_pages: usize,
}

/// Slice a result set into one page. `page` clamps to 1.., `per_page` to
/// `1..=MAX_PAGE_SIZE`.
pub fn paginate(docs: Vec<Value>, page: usize, per_page: usize) -> Page {
    let page = page.max(1);
    let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
    let total = docs.len();
    let total_pages = total.div_ceil(per_page).max(1);
    let start = (page - 1).saturating_mul(per_page).min(total);
    let end = (start + per_page).min(total);
    Page {
        items: docs[start..end].to_vec(),
        total,
        page,
        per_page,
        total_pages,
    }
}

/// Case-insensitive substring match for the search endpoint.
///
/// With a named field the match runs against that field's value; without
/// one it runs against every string-valued field.
pub fn matches_query(doc: &Value, query: &str, field: Option<&str>) -> bool {
    let needle = query.to_lowercase();
    match field {
        Some(field) => doc
            .get(field)
            .is_some_and(|v| value_text(v).to_lowercase().contains(&needle)),
        None => doc.as_object().is_some_and(|obj| {
            obj.values()
                .filter_map(Value::as_str)
                .any(|s| s.to_lowercase().contains(&needle))
        }),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sort_spec() {
        assert_eq!(
            parse_sort_spec("name:asc,age:desc").unwrap(),
            vec![
                SortKey {
                    field: "name".into(),
                    desc: false
                },
                SortKey {
                    field: "age".into(),
                    desc: true
                },
            ]
        );
        assert_eq!(parse_sort_spec("id").unwrap().len(), 1);
        assert!(parse_sort_spec("age:sideways").is_err());
        assert!(parse_sort_spec("").is_err());
    }

    #[test]
    fn test_multi_field_sort() {
        let mut docs = vec![
            json!({"id": 1, "city": "Berlin", "age": 40}),
            json!({"id": 2, "city": "Berlin", "age": 30}),
            json!({"id": 3, "city": "Athens", "age": 50}),
        ];
        sort_documents(
            &mut docs,
            &parse_sort_spec("city:asc,age:asc").unwrap(),
        );
        let ids: Vec<i64> = docs.iter().map(|d| d["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_missing_field_sorts_first() {
        let mut docs = vec![json!({"id": 1, "age": 5}), json!({"id": 2})];
        sort_documents(&mut docs, &parse_sort_spec("age:asc").unwrap());
        assert_eq!(docs[0]["id"], 2);
    }

    #[test]
    fn test_pagination_bounds() {
        let docs: Vec<Value> = (1..=25).map(|i| json!({"id": i})).collect();
        let page = paginate(docs.clone(), 3, 10);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);

        // Past the end: empty items, bounds intact
        let page = paginate(docs.clone(), 9, 10);
        assert!(page.items.is_empty());

        // per_page clamps to the maximum
        let page = paginate(docs, 1, 100_000);
        assert_eq!(page.per_page, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_empty_set_has_one_page() {
        let page = paginate(Vec::new(), 1, 10);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_search_matching() {
        let doc = json!({"id": 1, "name": "Alice", "bio": "Rust engineer"});
        assert!(matches_query(&doc, "rust", None));
        assert!(matches_query(&doc, "ALICE", Some("name")));
        assert!(!matches_query(&doc, "alice", Some("bio")));
        assert!(matches_query(&doc, "1", Some("id")));
    }
}
