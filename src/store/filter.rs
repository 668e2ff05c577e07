//! SQL filter builder shared by the device and stats listings.
//!
//! Column names only ever come from `&'static str` arguments or the
//! per-table whitelist passed to [`ListFilter::order_by`]; user input is
//! always bound as a parameter.

use libsql::Value;
use tracing::debug;

use crate::store::models::{OrderBy, RowRange, SortDirection};

#[derive(Debug, Default, Clone)]
pub struct ListFilter {
    clauses: Vec<String>,
    params: Vec<Value>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl ListFilter {
    /// Filter scoped to one app.
    pub fn for_app(app_id: &str) -> Self {
        Self::default().eq("app_id", Value::Text(app_id.to_string()))
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(format!("{column} = ?"));
        self.params.push(value.into());
        self
    }

    pub fn gt(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(format!("{column} > ?"));
        self.params.push(value.into());
        self
    }

    pub fn lt(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.clauses.push(format!("{column} < ?"));
        self.params.push(value.into());
        self
    }

    /// `column IN (...)`. An empty list matches nothing.
    pub fn in_list(mut self, column: &'static str, values: &[String]) -> Self {
        if values.is_empty() {
            self.clauses.push("0 = 1".to_string());
            return self;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.clauses.push(format!("{column} IN ({placeholders})"));
        self.params
            .extend(values.iter().map(|v| Value::Text(v.clone())));
        self
    }

    /// Device-id filter: a single id is an equality match (optionally capped
    /// to one row), several ids an `IN` list.
    pub fn device_ids(self, ids: &[String], single_row: bool) -> Self {
        match ids {
            [] => self,
            [only] => {
                let filter = self.eq("device_id", Value::Text(only.clone()));
                if single_row { filter.limit(1) } else { filter }
            }
            many => self.in_list("device_id", many),
        }
    }

    /// Substring search. With explicit device ids only `secondary` is
    /// searched, otherwise `device_id` or `secondary`.
    pub fn search(mut self, term: Option<&str>, has_device_ids: bool, secondary: &'static str) -> Self {
        let Some(term) = term.filter(|t| !t.is_empty()) else {
            return self;
        };
        let pattern = format!("%{term}%");
        if has_device_ids {
            self.clauses.push(format!("{secondary} LIKE ?"));
            self.params.push(Value::Text(pattern));
        } else {
            self.clauses
                .push(format!("(device_id LIKE ? OR {secondary} LIKE ?)"));
            self.params.push(Value::Text(pattern.clone()));
            self.params.push(Value::Text(pattern));
        }
        self
    }

    /// Append sort columns. Keys outside `allowed` and columns without an
    /// explicit direction are skipped.
    pub fn order_by(mut self, columns: &[OrderBy], allowed: &[&'static str]) -> Self {
        for col in columns {
            let Some(direction) = col.direction() else {
                continue;
            };
            let Some(column) = allowed.iter().find(|c| **c == col.key) else {
                debug!(key = %col.key, "Ignoring sort on unknown column");
                continue;
            };
            let dir = match direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            self.order.push(format!("{column} {dir}"));
        }
        self
    }

    /// Inclusive row window.
    pub fn range(mut self, range: Option<RowRange>) -> Self {
        if let Some(r) = range {
            self.offset = Some(r.start);
            self.limit = Some(r.end.saturating_add(1).saturating_sub(r.start));
        }
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Render `SELECT <columns> FROM <table> ...` and its parameters.
    pub fn to_select(&self, columns: &str, table: &str) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {columns} FROM {table}");
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        (sql, self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn app_scope_only() {
        let (sql, params) = ListFilter::for_app("com.demo").to_select("*", "devices");
        assert_eq!(sql, "SELECT * FROM devices WHERE app_id = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn single_device_caps_rows() {
        let (sql, params) = ListFilter::for_app("a")
            .range(Some(RowRange { start: 10, end: 19 }))
            .device_ids(&ids(&["d1"]), true)
            .to_select("*", "devices");
        assert_eq!(
            sql,
            "SELECT * FROM devices WHERE app_id = ? AND device_id = ? LIMIT 1 OFFSET 10"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn several_devices_use_in_list() {
        let (sql, params) = ListFilter::for_app("a")
            .device_ids(&ids(&["d1", "d2", "d3"]), true)
            .to_select("*", "devices");
        assert!(sql.ends_with("device_id IN (?, ?, ?)"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn search_columns_depend_on_device_ids() {
        let (with_ids, _) = ListFilter::for_app("a")
            .search(Some("abc"), true, "custom_id")
            .to_select("*", "devices");
        assert!(with_ids.ends_with("custom_id LIKE ?"));

        let (without, params) = ListFilter::for_app("a")
            .search(Some("abc"), false, "action")
            .to_select("*", "stats");
        assert!(without.ends_with("(device_id LIKE ? OR action LIKE ?)"));
        assert!(matches!(&params[1], Value::Text(p) if p == "%abc%"));
    }

    #[test]
    fn empty_search_is_ignored() {
        let (sql, _) = ListFilter::for_app("a")
            .search(Some(""), false, "action")
            .to_select("*", "stats");
        assert!(!sql.contains("LIKE"));
    }

    #[test]
    fn order_skips_flags_and_unknown_columns() {
        let cols = vec![
            OrderBy {
                key: "action".into(),
                sortable: Some(crate::store::models::Sortable::Flag(true)),
            },
            OrderBy::new("created_at", SortDirection::Desc),
            OrderBy::new("1; DROP TABLE stats", SortDirection::Asc),
            OrderBy::new("device_id", SortDirection::Asc),
        ];
        let (sql, _) = ListFilter::for_app("a")
            .order_by(&cols, &["action", "created_at", "device_id"])
            .to_select("*", "stats");
        assert!(sql.ends_with("ORDER BY created_at DESC, device_id ASC"));
    }

    #[test]
    fn range_is_inclusive() {
        let (sql, _) = ListFilter::for_app("a")
            .range(Some(RowRange { start: 0, end: 9 }))
            .to_select("*", "stats");
        assert!(sql.ends_with("LIMIT 10 OFFSET 0"));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let (sql, params) = ListFilter::default()
            .in_list("app_id", &[])
            .to_select("*", "app_usage");
        assert_eq!(sql, "SELECT * FROM app_usage WHERE 0 = 1");
        assert!(params.is_empty());
    }
}
