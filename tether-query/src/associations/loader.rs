//! Eager-load machinery: child-query construction, result maps, and the
//! row injector.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use tether_core::{Row, Value};

use crate::clause::SortOrder;
use crate::conditions::Conditions;
use crate::error::{QueryError, QueryResult};
use crate::query::Query;
use crate::traits::Endpoint;

use super::{AssociationCore, Strategy};

/// Delimiter joining the fragments of a composite result-map key.
pub(crate) const KEY_DELIMITER: &str = ";";

/// A caller-supplied callback customizing an eager-load child query.
pub type QueryBuilderFn = Arc<dyn Fn(Query) -> QueryResult<Query> + Send + Sync>;

/// Per-association options for a `contain` call.
#[derive(Clone, Default)]
pub struct ContainOptions {
    /// Finder used to build the child query, overriding the association's.
    pub finder: Option<String>,
    /// Extra conditions merged into the child query.
    pub conditions: Conditions,
    /// Sort applied to the child query.
    pub sort: Vec<(String, SortOrder)>,
    /// Strategy override.
    pub strategy: Option<Strategy>,
    /// Property to nest results under, overriding the association's.
    pub nest_key: Option<String>,
    /// Foreign key override.
    pub foreign_key: Option<Vec<String>>,
    /// Child-query customization callback.
    pub query_builder: Option<QueryBuilderFn>,
}

impl ContainOptions {
    /// Options with extra conditions only.
    pub fn conditions(conditions: Conditions) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for ContainOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainOptions")
            .field("finder", &self.finder)
            .field("strategy", &self.strategy)
            .field("nest_key", &self.nest_key)
            .field("has_query_builder", &self.query_builder.is_some())
            .finish()
    }
}

/// Options handed to [`super::Association::eager_loader`].
///
/// `keys` carries the batch of parent key values already collected by the
/// parent query, one deduplicated list per source-key field, in
/// source-field order.
#[derive(Clone, Default)]
pub struct EagerLoadOptions {
    /// Collected parent key values, one list per link field.
    pub keys: Vec<Vec<Value>>,
    /// Nested containments to forward onto the child query.
    pub contain: IndexMap<String, ContainOptions>,
    /// Finder override.
    pub finder: Option<String>,
    /// Extra conditions merged into the child query.
    pub conditions: Conditions,
    /// Sort applied to the child query.
    pub sort: Vec<(String, SortOrder)>,
    /// Strategy override.
    pub strategy: Option<Strategy>,
    /// Nest key override, defaulting to the association's property name.
    pub nest_key: Option<String>,
    /// Foreign key override.
    pub foreign_key: Option<Vec<String>>,
    /// Child-query customization callback.
    pub query_builder: Option<QueryBuilderFn>,
}

impl EagerLoadOptions {
    /// Lift `contain` options into eager-load options.
    pub fn from_contain(options: ContainOptions) -> Self {
        Self {
            keys: Vec::new(),
            contain: IndexMap::new(),
            finder: options.finder,
            conditions: options.conditions,
            sort: options.sort,
            strategy: options.strategy,
            nest_key: options.nest_key,
            foreign_key: options.foreign_key,
            query_builder: options.query_builder,
        }
    }
}

impl std::fmt::Debug for EagerLoadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EagerLoadOptions")
            .field("keys", &self.keys)
            .field("contain", &self.contain.keys().collect::<Vec<_>>())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Options for [`super::Association::attach_to`].
#[derive(Clone, Default)]
pub struct AttachOptions {
    /// Extra conditions merged into the parent query.
    pub conditions: Conditions,
    /// Child-query customization callback.
    pub query_builder: Option<QueryBuilderFn>,
}

impl std::fmt::Debug for AttachOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachOptions")
            .field("has_query_builder", &self.query_builder.is_some())
            .finish()
    }
}

/// Matched child value(s) for one result-map key.
#[derive(Debug, Clone, PartialEq)]
pub enum Injected {
    /// A single matched record (to-one direction).
    One(Row),
    /// Accumulated matched records (to-many direction).
    Many(Vec<Row>),
}

impl Injected {
    fn into_value(self) -> Value {
        match self {
            Self::One(row) => Value::Map(row),
            Self::Many(rows) => Value::List(rows.into_iter().map(Value::Map).collect()),
        }
    }
}

/// Attaches matched child results to parent rows.
///
/// A named value type rather than a closure: it captures only the
/// immutable result map and the parent-side key fields, built once per
/// eager-load batch and read-only afterward.
#[derive(Debug, Clone)]
pub struct RowInjector {
    nest_key: String,
    source_keys: Vec<String>,
    map: IndexMap<String, Injected>,
}

impl RowInjector {
    /// Create an injector over a finished result map.
    pub fn new(
        nest_key: impl Into<String>,
        source_keys: Vec<String>,
        map: IndexMap<String, Injected>,
    ) -> Self {
        Self {
            nest_key: nest_key.into(),
            source_keys,
            map,
        }
    }

    /// The property matched children are attached under.
    pub fn nest_key(&self) -> &str {
        &self.nest_key
    }

    /// Number of distinct keys in the result map.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check whether the result map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Attach the matched child value(s) to one parent row.
    ///
    /// A row participates in injection iff every source-key field is
    /// present and non-null; `0` and `""` are legitimate key values.
    /// Rows with no match are returned unchanged: the property stays
    /// absent rather than being set to null.
    pub fn apply(&self, mut row: Row) -> Row {
        let Some(key) = composite_key(&row, &self.source_keys) else {
            return row;
        };
        if let Some(matched) = self.map.get(&key) {
            row.insert(self.nest_key.clone(), matched.clone().into_value());
        }
        row
    }
}

/// Join a row's key-field values into a composite lookup key.
///
/// Returns `None` when any field is absent or null, which excludes the
/// row from both key collection and injection.
pub(crate) fn composite_key(row: &Row, fields: &[String]) -> Option<String> {
    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        match row.get(field) {
            Some(value) if !value.is_null() => parts.push(value.key_fragment()),
            _ => return None,
        }
    }
    Some(parts.join(KEY_DELIMITER))
}

/// Collect the distinct link-field values of a batch of parent rows, one
/// deduplicated, order-preserving list per field. Rows missing any link
/// field (or carrying null) contribute nothing.
pub fn collect_keys(rows: &[Row], fields: &[String]) -> Vec<Vec<Value>> {
    let mut per_field: Vec<Vec<Value>> = vec![Vec::new(); fields.len()];
    for row in rows {
        let participates = fields
            .iter()
            .all(|f| row.get(f).is_some_and(|v| !v.is_null()));
        if !participates {
            continue;
        }
        for (i, field) in fields.iter().enumerate() {
            let value = row.get(field).cloned().unwrap_or_default();
            if !per_field[i].contains(&value) {
                per_field[i].push(value);
            }
        }
    }
    per_field
}

/// Build the keyed result map over fetched child rows.
///
/// For the to-one direction the first record observed for a key wins and
/// later ones are dropped; callers rely on that "closest/first"
/// behavior. For the to-many direction every record accumulates under
/// its key.
pub(crate) fn build_result_map(
    rows: Vec<Row>,
    fields: &[String],
    many: bool,
) -> IndexMap<String, Injected> {
    let mut map: IndexMap<String, Injected> = IndexMap::new();
    for row in rows {
        let Some(key) = composite_key(&row, fields) else {
            continue;
        };
        if many {
            match map.entry(key).or_insert_with(|| Injected::Many(Vec::new())) {
                Injected::Many(bucket) => bucket.push(row),
                Injected::One(_) => unreachable!("to-many map holds Many buckets"),
            }
        } else {
            map.entry(key).or_insert(Injected::One(row));
        }
    }
    map
}

/// The per-kind parameters of one eager-load run.
pub(crate) struct LoadPlan {
    pub core: AssociationCore,
    pub target: Arc<dyn Endpoint>,
    /// Fields on the fetched child rows used for the key filter.
    pub filter_fields: Vec<String>,
    /// Fields on the fetched child rows keyed into the result map.
    pub map_fields: Vec<String>,
    /// Fields on the parent rows the injector reads.
    pub source_fields: Vec<String>,
    pub many: bool,
}

/// Execute the strategy-Query/SingleQuery eager load: build the child
/// query, run it, and produce the row injector.
pub(crate) async fn run_eager_load(
    plan: LoadPlan,
    options: EagerLoadOptions,
) -> QueryResult<RowInjector> {
    let strategy = options.strategy.unwrap_or(plan.core.strategy);
    if matches!(strategy, Strategy::Include | Strategy::Included) {
        return Err(QueryError::unimplemented(format!(
            "association `{}` resolves in the parent fetch; it has no eager loader",
            plan.core.name
        )));
    }

    let finder = options.finder.as_deref().unwrap_or(&plan.core.finder);
    let mut child = Query::new(plan.target)
        .find(finder, Row::new())?
        .where_clause(plan.core.conditions.clone(), false)
        .where_clause(options.conditions.clone(), false)
        .set_eager_loaded(true);

    if strategy == Strategy::Query {
        for (field, values) in plan.filter_fields.iter().zip(options.keys.iter()) {
            child = child.where_clause(
                Conditions::in_list(field.clone(), values.iter().cloned()),
                false,
            );
        }
    }
    if !options.sort.is_empty() {
        child = child.order_by(options.sort.clone(), false);
    }
    for (path, contain) in &options.contain {
        child = child.contain(path.clone(), contain.clone());
    }
    if let Some(builder) = &options.query_builder {
        child = builder(child)?;
    }

    debug!(
        association = %plan.core.name,
        strategy = ?strategy,
        keys = options.keys.iter().map(Vec::len).sum::<usize>(),
        "running eager load"
    );
    let result = child.all().await?;
    let (rows, _) = result.into_parts();
    let map = build_result_map(rows, &plan.map_fields, plan.many);

    let nest_key = options
        .nest_key
        .clone()
        .unwrap_or_else(|| default_nest_key(&plan.core, plan.many));
    Ok(RowInjector::new(nest_key, plan.source_fields, map))
}

fn default_nest_key(core: &AssociationCore, many: bool) -> String {
    match &core.property_name {
        Some(name) => name.clone(),
        None => super::default_property(&core.name, many),
    }
}
