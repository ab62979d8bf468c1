//! AST to SQL compilation
//!
//! Every operand is bound as a positional parameter (`$1`, `$2`, ...); only
//! identifiers taken from the [`SqlSchema`] and the validated `LIMIT` and
//! `OFFSET` integers are spliced into the statement text.

use crmq_dsl::{
    Control, ErrorCode, Node, OpClause, Operator, OrderItem, ParsedQuery, Result, SearchDslError,
    DEFAULT_MAX_DEPTH,
};
use crmq_shared::JsonPath;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{quote_ident, ColumnTarget, SqlSchema};

/// Page size used when a query has no `LIMIT`
pub const DEFAULT_LIMIT: u64 = 10;

/// Largest integer PostgreSQL accepts for `LIMIT` and `OFFSET`
#[allow(clippy::cast_sign_loss)]
const MAX_BIGINT: u64 = i64::MAX as u64;

/// Largest page size a query may request
pub const MAX_LIMIT: u64 = 100;

/// A compiled filter expression and its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledFilter {
    /// Boolean SQL expression; `None` when every predicate was pruned
    pub sql: Option<String>,
    /// Values for `$1..$n`
    pub params: Vec<Value>,
}

/// A compiled listing query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// Base table, quoted
    pub table: String,
    /// Combined `WHERE` expression
    pub where_clause: Option<String>,
    /// `ORDER BY` terms in priority order
    pub order_by: Vec<String>,
    /// Effective page size
    pub limit: u64,
    /// Rows to skip
    pub offset: u64,
    /// Values for `$1..$n`
    pub params: Vec<Value>,
}

impl CompiledQuery {
    /// `SELECT <projection> FROM ... WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
    pub fn select_sql(&self, projection: &str) -> String {
        let mut sql = format!("SELECT {} FROM {}", projection, self.table);
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", self.limit, self.offset));
        sql
    }

    /// `SELECT count(*)` over the same filter, ignoring pagination
    pub fn count_sql(&self) -> String {
        match &self.where_clause {
            Some(where_clause) => {
                format!("SELECT count(*) FROM {} WHERE {}", self.table, where_clause)
            }
            None => format!("SELECT count(*) FROM {}", self.table),
        }
    }
}

#[derive(Debug, Default)]
struct Params(Vec<Value>);

impl Params {
    fn bind(&mut self, value: &Value, cast: Option<&str>) -> String {
        self.0.push(value.clone());
        match cast {
            Some(cast) => format!("${}::{}", self.0.len(), cast),
            None => format!("${}", self.0.len()),
        }
    }

    fn bind_array(&mut self, value: &Value, cast: Option<&str>) -> String {
        self.0.push(value.clone());
        match cast {
            Some(cast) => format!("${}::{}[]", self.0.len(), cast),
            None => format!("${}", self.0.len()),
        }
    }
}

/// Compiles parsed search queries against one [`SqlSchema`]
#[derive(Debug, Clone)]
pub struct SqlCompiler<'s> {
    schema: &'s SqlSchema,
    scope: Option<(String, Value)>,
    gated: Vec<String>,
    default_limit: u64,
    max_limit: u64,
    max_depth: usize,
}

impl<'s> SqlCompiler<'s> {
    /// Compiler with the default pagination and no scope
    pub fn new(schema: &'s SqlSchema) -> Self {
        Self {
            schema,
            scope: None,
            gated: Vec::new(),
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            // a field-local combinator sits one level below its fragment
            max_depth: DEFAULT_MAX_DEPTH + 1,
        }
    }

    /// Restrict every query to rows whose `column` equals `value`
    #[must_use]
    pub fn scope(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope = Some((column.into(), value.into()));
        self
    }

    /// Drop predicates on `field` instead of compiling them
    #[must_use]
    pub fn gate(mut self, field: impl Into<String>) -> Self {
        self.gated.push(field.into());
        self
    }

    /// Page size used without `LIMIT`, and the cap applied to `LIMIT`
    #[must_use]
    pub fn pagination(mut self, default_limit: u64, max_limit: u64) -> Self {
        self.max_limit = max_limit.max(1);
        self.default_limit = default_limit.clamp(1, self.max_limit);
        self
    }

    /// Deepest node accepted by [`SqlCompiler::compile_node_value`]
    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Schema this compiler targets
    pub fn schema(&self) -> &'s SqlSchema {
        self.schema
    }

    /// Compile a parsed query into a listing query
    pub fn compile(&self, parsed: &ParsedQuery) -> Result<CompiledQuery> {
        self.compile_parts(&[&parsed.root], &parsed.control)
    }

    /// Listing query for a request that carried no search document
    pub fn compile_unfiltered(&self) -> Result<CompiledQuery> {
        self.compile_parts(&[], &Control::default())
    }

    /// Compile filter trees, ANDed after the scope, with explicit control values
    pub fn compile_parts(&self, filters: &[&Node], control: &Control) -> Result<CompiledQuery> {
        let mut params = Params::default();
        let mut conditions = Vec::new();

        if let Some((column, value)) = &self.scope {
            let placeholder = params.bind(value, None);
            conditions.push(format!("{} = {}", self.schema.qualified(column), placeholder));
        }
        for node in filters {
            if let Some(filter) = self.compile_node(node, &mut params)? {
                conditions.push(filter);
            }
        }

        let where_clause = match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(conditions.join(" AND ")),
        };
        let order_by = self.compile_order(&control.order)?;
        let limit = control
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.min(MAX_BIGINT));
        let offset = control.offset.unwrap_or(0);
        if offset > MAX_BIGINT {
            return Err(SearchDslError::new(
                ErrorCode::InvalidControlKeys,
                "Invalid control keys in search DSL",
            )
            .at(JsonPath::root().child("OFFSET"))
            .detail(format!("Number must be less than or equal to {}", MAX_BIGINT)));
        }

        let compiled = CompiledQuery {
            table: quote_ident(&self.schema.table),
            where_clause,
            order_by,
            limit,
            offset,
            params: params.0,
        };
        log::debug!(
            "compiled query on {}: where {:?} with {} parameter(s)",
            self.schema.table,
            compiled.where_clause,
            compiled.params.len()
        );
        Ok(compiled)
    }

    /// Compile a filter tree on its own, numbering parameters from `$1`
    pub fn compile_filter(&self, node: &Node) -> Result<CompiledFilter> {
        let mut params = Params::default();
        let sql = self.compile_node(node, &mut params)?;
        Ok(CompiledFilter {
            sql,
            params: params.0,
        })
    }

    /// Compile a filter tree received in its serialised form
    ///
    /// Nodes whose `kind` is not `field`, `and`, `or` or `not` fail with
    /// `DSL_UNKNOWN_NODE_KIND`.
    pub fn compile_node_value(&self, value: &Value) -> Result<CompiledFilter> {
        check_node_kinds(value, &JsonPath::root(), 1, self.max_depth)?;
        let node: Node = serde_json::from_value(value.clone()).map_err(|e| {
            SearchDslError::new(ErrorCode::InvalidFragment, "Invalid search DSL node")
                .detail(e.to_string())
        })?;
        self.compile_filter(&node)
    }

    fn compile_node(&self, node: &Node, params: &mut Params) -> Result<Option<String>> {
        match node {
            Node::Field(field) => {
                if self.is_gated(&field.field) {
                    log::debug!("pruning predicate on gated field '{}'", field.field);
                    return Ok(None);
                }
                let predicates = field
                    .ops
                    .iter()
                    .map(|clause| self.predicate(&field.field, clause, params))
                    .collect::<Result<Vec<_>>>()?;
                Ok(combine(predicates, "AND"))
            }
            Node::And { items } => Ok(combine(self.compile_items(items, params)?, "AND")),
            Node::Or { items } => Ok(combine(self.compile_items(items, params)?, "OR")),
            Node::Not { item } => Ok(self
                .compile_node(item, params)?
                .map(|inner| format!("NOT ({})", inner))),
        }
    }

    fn compile_items(&self, items: &[Node], params: &mut Params) -> Result<Vec<String>> {
        let mut compiled = Vec::with_capacity(items.len());
        for item in items {
            if let Some(sql) = self.compile_node(item, params)? {
                compiled.push(sql);
            }
        }
        Ok(compiled)
    }

    fn is_gated(&self, field: &str) -> bool {
        self.gated.iter().any(|gated| gated == field)
    }

    fn predicate(&self, field: &str, clause: &OpClause, params: &mut Params) -> Result<String> {
        let target = self.schema.target(field).ok_or_else(|| {
            SearchDslError::new(
                ErrorCode::UnknownField,
                format!("Unknown field '{}'", field),
            )
            .detail(format!("Field '{}' has no column in '{}'", field, self.schema.table))
            .field(field)
            .allowed_fields(self.schema.columns.keys().cloned().collect())
        })?;

        match target {
            ColumnTarget::Column { name, cast } => {
                let column = self.schema.qualified(name);
                scalar_predicate(&column, cast.as_deref(), field, clause, params)
            }
            ColumnTarget::Related {
                table,
                column,
                foreign_key,
            } => {
                let child = quote_ident(table);
                let value_column = format!("{}.{}", child, quote_ident(column));
                let negated = matches!(clause.op, Operator::Neq | Operator::Nlike | Operator::Nin);
                let condition = match &clause.op {
                    Operator::Eq | Operator::Neq => {
                        format!("{} = {}", value_column, params.bind(&clause.value, None))
                    }
                    Operator::Like | Operator::Nlike => {
                        format!("{} ILIKE {}", value_column, params.bind(&clause.value, None))
                    }
                    Operator::In | Operator::Nin => format!(
                        "{} = ANY({})",
                        value_column,
                        params.bind_array(&clause.value, None)
                    ),
                    op => return Err(not_supported(field, op)),
                };
                let exists = format!(
                    "EXISTS (SELECT 1 FROM {} WHERE {}.{} = {} AND {})",
                    child,
                    child,
                    quote_ident(foreign_key),
                    self.schema.qualified(&self.schema.primary_key),
                    condition
                );
                Ok(if negated {
                    format!("NOT ({})", exists)
                } else {
                    exists
                })
            }
        }
    }

    fn compile_order(&self, order: &[OrderItem]) -> Result<Vec<String>> {
        let items = if order.is_empty() {
            &self.schema.default_order
        } else {
            order
        };

        items
            .iter()
            .map(|item| match self.schema.target(&item.field) {
                Some(ColumnTarget::Column { name, .. }) => {
                    Ok(format!("{} {}", self.schema.qualified(name), item.direction))
                }
                _ => Err(SearchDslError::new(
                    ErrorCode::OrderFieldUnknown,
                    format!("Unknown ORDER field '{}'", item.field),
                )
                .field(item.field.as_str())
                .allowed_fields(self.schema.sortable_fields())),
            })
            .collect()
    }
}

fn scalar_predicate(
    column: &str,
    cast: Option<&str>,
    field: &str,
    clause: &OpClause,
    params: &mut Params,
) -> Result<String> {
    let value = &clause.value;
    let sql = match &clause.op {
        Operator::Eq => format!("{} = {}", column, params.bind(value, cast)),
        Operator::Neq => format!("NOT ({} = {})", column, params.bind(value, cast)),
        Operator::Lt | Operator::Before => format!("{} < {}", column, params.bind(value, cast)),
        Operator::Lte => format!("{} <= {}", column, params.bind(value, cast)),
        Operator::Gt | Operator::After => format!("{} > {}", column, params.bind(value, cast)),
        Operator::Gte => format!("{} >= {}", column, params.bind(value, cast)),
        Operator::In => format!("{} = ANY({})", column, params.bind_array(value, cast)),
        Operator::Nin => format!("NOT ({} = ANY({}))", column, params.bind_array(value, cast)),
        Operator::Like => format!("{} ILIKE {}", column, params.bind(value, None)),
        Operator::Nlike => format!("NOT ({} ILIKE {})", column, params.bind(value, None)),
        op @ Operator::Custom(_) => return Err(not_supported(field, op)),
    };
    Ok(sql)
}

fn not_supported(field: &str, op: &Operator) -> SearchDslError {
    SearchDslError::new(
        ErrorCode::OperatorNotSupported,
        format!("Unsupported operator '{}'", op),
    )
    .field(field)
    .operator(op.clone())
}

fn combine(mut clauses: Vec<String>, connective: &str) -> Option<String> {
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(format!("({})", clauses.join(&format!(" {} ", connective)))),
    }
}

fn check_node_kinds(value: &Value, path: &JsonPath, depth: usize, max_depth: usize) -> Result<()> {
    if depth > max_depth {
        return Err(SearchDslError::new(
            ErrorCode::MaxDepthExceeded,
            format!("Search DSL nesting exceeds the maximum depth of {}", max_depth),
        )
        .at(path.clone())
        .max_depth(max_depth));
    }

    // shape problems are left to deserialisation
    let Value::Object(node) = value else {
        return Ok(());
    };
    let kind = node.get("kind");
    match kind.and_then(Value::as_str) {
        Some("field") => Ok(()),
        Some("and" | "or") => {
            if let Some(Value::Array(items)) = node.get("items") {
                let items_path = path.child("items");
                for (i, item) in items.iter().enumerate() {
                    check_node_kinds(item, &items_path.child(i), depth + 1, max_depth)?;
                }
            }
            Ok(())
        }
        Some("not") => match node.get("item") {
            Some(item) => check_node_kinds(item, &path.child("item"), depth + 1, max_depth),
            None => Ok(()),
        },
        _ => {
            let mut err = SearchDslError::new(ErrorCode::UnknownNodeKind, "Unknown search DSL node")
                .at(path.clone());
            if let Some(kind) = kind {
                err = err.kind(kind.as_str().map_or_else(|| kind.to_string(), str::to_string));
            }
            Err(err)
        }
    }
}
