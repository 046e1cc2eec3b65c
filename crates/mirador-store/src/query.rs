//! Structured queries compiled to the store's GraphQL dialect.
//!
//! Engines build a [`QuerySpec`] and hand it to the backend; the HTTP
//! backend compiles it to a `Get { ... }` query, the in-memory backend
//! evaluates it directly. Compilation is the only place query text is
//! assembled, and every interpolated string goes through [`escape`].

use std::fmt::Write as _;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn as_str(&self) -> &'static str {
        match self {
            Order::Asc => "asc",
            Order::Desc => "desc",
        }
    }
}

/// A single where-clause operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Equality on a text property.
    TextEq { path: String, value: String },
    /// Equality on an int property.
    IntEq { path: String, value: i64 },
    /// Equality on a boolean property.
    BoolEq { path: String, value: bool },
    /// OR of text equalities over one path; used for tag-sequence
    /// membership filters.
    AnyTextEq { path: String, values: Vec<String> },
}

/// A structured query against one class.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub class: String,
    /// Properties to fetch.
    pub fields: Vec<String>,
    pub filters: Vec<Filter>,
    pub sort: Option<(String, Order)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QuerySpec {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: Vec::new(),
            filters: Vec::new(),
            sort: None,
            limit: None,
            offset: None,
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn where_text(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter::TextEq {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_int(mut self, path: impl Into<String>, value: i64) -> Self {
        self.filters.push(Filter::IntEq {
            path: path.into(),
            value,
        });
        self
    }

    pub fn where_bool(mut self, path: impl Into<String>, value: bool) -> Self {
        self.filters.push(Filter::BoolEq {
            path: path.into(),
            value,
        });
        self
    }

    pub fn where_any_text<I, S>(mut self, path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(Filter::AnyTextEq {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn sort_desc(mut self, path: impl Into<String>) -> Self {
        self.sort = Some((path.into(), Order::Desc));
        self
    }

    pub fn sort_asc(mut self, path: impl Into<String>) -> Self {
        self.sort = Some((path.into(), Order::Asc));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Compile to a `Get` query.
    pub fn compile(&self) -> String {
        let mut q = String::with_capacity(256);
        q.push_str("{ Get { ");
        q.push_str(&self.class);
        let args = self.compile_args();
        if !args.is_empty() {
            let _ = write!(q, "({args})");
        }
        q.push_str(" { ");
        q.push_str(&self.fields.join(" "));
        q.push_str(" } } }");
        q
    }

    /// Compile to an `Aggregate` query returning `meta { count }`.
    pub fn compile_count(&self) -> String {
        let mut q = String::with_capacity(128);
        q.push_str("{ Aggregate { ");
        q.push_str(&self.class);
        if let Some(where_clause) = self.compile_where() {
            let _ = write!(q, "(where: {where_clause})");
        }
        q.push_str(" { meta { count } } } }");
        q
    }

    fn compile_args(&self) -> String {
        let mut args: Vec<String> = Vec::new();
        if let Some(where_clause) = self.compile_where() {
            args.push(format!("where: {where_clause}"));
        }
        if let Some((path, order)) = &self.sort {
            args.push(format!(
                "sort: [{{path: [\"{}\"], order: {}}}]",
                escape(path),
                order.as_str()
            ));
        }
        if let Some(limit) = self.limit {
            args.push(format!("limit: {limit}"));
        }
        if let Some(offset) = self.offset {
            args.push(format!("offset: {offset}"));
        }
        args.join(", ")
    }

    fn compile_where(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        let operands: Vec<String> = self.filters.iter().map(compile_filter).collect();
        Some(format!(
            "{{operator: And, operands: [{}]}}",
            operands.join(", ")
        ))
    }
}

fn compile_filter(filter: &Filter) -> String {
    match filter {
        Filter::TextEq { path, value } => format!(
            "{{path: [\"{}\"], operator: Equal, valueString: \"{}\"}}",
            escape(path),
            escape(value)
        ),
        Filter::IntEq { path, value } => format!(
            "{{path: [\"{}\"], operator: Equal, valueInt: {value}}}",
            escape(path)
        ),
        Filter::BoolEq { path, value } => format!(
            "{{path: [\"{}\"], operator: Equal, valueBoolean: {value}}}",
            escape(path)
        ),
        Filter::AnyTextEq { path, values } => {
            let operands: Vec<String> = values
                .iter()
                .map(|v| {
                    format!(
                        "{{path: [\"{}\"], operator: Equal, valueString: \"{}\"}}",
                        escape(path),
                        escape(v)
                    )
                })
                .collect();
            format!("{{operator: Or, operands: [{}]}}", operands.join(", "))
        }
    }
}

/// Escape a string for interpolation into a GraphQL string literal:
/// backslash first, then double quote.
pub fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escape_backslash_before_quote() {
        assert_eq!(escape(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape(r"a\b"), r"a\\b");
        // a backslash followed by a quote must not double-escape
        assert_eq!(escape(r#"\""#), r#"\\\""#);
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn compiles_single_equality() {
        let q = QuerySpec::new("Metric")
            .fields(["tenantId", "name"])
            .where_text("tenantId", "t1")
            .compile();
        assert_eq!(
            q,
            "{ Get { Metric(where: {operator: And, operands: [{path: [\"tenantId\"], operator: Equal, valueString: \"t1\"}]}) { tenantId name } } }"
        );
    }

    #[test]
    fn compiles_sort_limit_offset() {
        let q = QuerySpec::new("MetricVersion")
            .fields(["version", "author", "createdAt"])
            .where_text("tenantId", "t1")
            .where_text("key", "cpu_usage")
            .sort_desc("version")
            .limit(1000)
            .offset(0)
            .compile();
        assert!(q.contains("sort: [{path: [\"version\"], order: desc}]"));
        assert!(q.contains("limit: 1000"));
        assert!(q.contains("offset: 0"));
        assert!(q.contains("operator: And"));
    }

    #[test]
    fn compiles_int_and_bool_values() {
        let q = QuerySpec::new("MetricVersion")
            .fields(["payload"])
            .where_int("version", 3)
            .compile();
        assert!(q.contains("valueInt: 3"));

        let q = QuerySpec::new("Dashboard")
            .fields(["dashboardId"])
            .where_bool("isDefault", true)
            .compile();
        assert!(q.contains("valueBoolean: true"));
    }

    #[test]
    fn compiles_tag_filter_as_or_of_equalities() {
        let q = QuerySpec::new("KpiDefinition")
            .fields(["kpiId"])
            .where_text("tenantId", "t1")
            .where_any_text("tags", ["slo", "checkout"])
            .compile();
        assert!(q.contains(
            "{operator: Or, operands: [{path: [\"tags\"], operator: Equal, valueString: \"slo\"}, {path: [\"tags\"], operator: Equal, valueString: \"checkout\"}]}"
        ));
    }

    #[test]
    fn escapes_interpolated_values() {
        let q = QuerySpec::new("Metric")
            .fields(["name"])
            .where_text("name", r#"cpu"usage\total"#)
            .compile();
        assert!(q.contains(r#"valueString: "cpu\"usage\\total""#));
    }

    #[test]
    fn no_filters_means_no_where() {
        let q = QuerySpec::new("RbacTenant").fields(["name"]).compile();
        assert_eq!(q, "{ Get { RbacTenant { name } } }");
    }

    #[test]
    fn count_query_shape() {
        let q = QuerySpec::new("KpiDefinition")
            .where_text("tenantId", "t1")
            .compile_count();
        assert_eq!(
            q,
            "{ Aggregate { KpiDefinition(where: {operator: And, operands: [{path: [\"tenantId\"], operator: Equal, valueString: \"t1\"}]}) { meta { count } } } }"
        );
    }
}
