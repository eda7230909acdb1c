//! The lazily-executed query.
//!
//! A [`Query`] is a mutable, fluent builder over a [`ClauseSet`], bound to
//! exactly one endpoint and one webservice. Execution is lazy and cached:
//! `all()`, `first()`, and `count()` reuse the cached result until a
//! clause mutation marks the query dirty again. Fetched rows run through
//! the query's map-reduce stages, then association injection, then the
//! result formatters.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use tether_core::{Row, Value};

use crate::associations::{collect_keys, AttachOptions, ContainOptions, EagerLoadOptions, Strategy};
use crate::clause::{Action, ClauseSet, SortOrder};
use crate::conditions::{Conditions, AND, OR};
use crate::error::{QueryError, QueryResult};
use crate::result::ResultSet;
use crate::traits::{Endpoint, ExecuteResult, Webservice};

/// A map stage: filter-map applied to each fetched row in order.
pub type Mapper = Arc<dyn Fn(Row) -> Option<Row> + Send + Sync>;
/// A reduce stage: folds the mapped rows of one map-reduce stage.
pub type Reducer = Arc<dyn Fn(Vec<Row>) -> Vec<Row> + Send + Sync>;
/// A post-processing stage over the whole result set.
pub type ResultFormatter = Arc<dyn Fn(ResultSet) -> ResultSet + Send + Sync>;

/// One registered map-reduce stage.
#[derive(Clone)]
struct MapReduce {
    mapper: Mapper,
    reducer: Option<Reducer>,
}

impl MapReduce {
    fn apply(&self, rows: Vec<Row>) -> Vec<Row> {
        let mapped: Vec<Row> = rows.into_iter().filter_map(|r| (self.mapper)(r)).collect();
        match &self.reducer {
            Some(reduce) => reduce(mapped),
            None => mapped,
        }
    }
}

/// Where a new result formatter is placed relative to existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatMode {
    /// Run after existing formatters.
    #[default]
    Append,
    /// Run before existing formatters.
    Prepend,
    /// Drop existing formatters first.
    Overwrite,
}

/// A declarative, lazily-executed query against one endpoint.
pub struct Query {
    endpoint: Arc<dyn Endpoint>,
    webservice: Arc<dyn Webservice>,
    clauses: ClauseSet,
    options: Row,
    contain: IndexMap<String, ContainOptions>,
    map_reduce: Vec<MapReduce>,
    formatters: Vec<ResultFormatter>,
    cache: Option<ResultSet>,
    dirty: bool,
    eager_loaded: bool,
    before_find_fired: bool,
}

impl Query {
    /// Create a read query bound to an endpoint and its webservice.
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        let webservice = endpoint.webservice();
        Self {
            endpoint,
            webservice,
            clauses: ClauseSet::new(),
            options: Row::new(),
            contain: IndexMap::new(),
            map_reduce: Vec::new(),
            formatters: Vec::new(),
            cache: None,
            dirty: false,
            eager_loaded: false,
            before_find_fired: false,
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.cache = None;
    }

    /// The endpoint this query is bound to.
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// The query's clauses. Webservice implementations read these to
    /// build their backend request.
    pub fn clauses(&self) -> &ClauseSet {
        &self.clauses
    }

    /// Whether any clause changed since the last execution.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ------------------------------------------------------------------
    // Clause setters
    // ------------------------------------------------------------------

    /// Set the action.
    pub fn action(mut self, action: Action) -> Self {
        self.clauses.action = action;
        self.mark_dirty();
        self
    }

    /// Mark this query as a create.
    pub fn create(self) -> Self {
        self.action(Action::Create)
    }

    /// Mark this query as a read.
    pub fn read(self) -> Self {
        self.action(Action::Read)
    }

    /// Mark this query as an update.
    pub fn update(self) -> Self {
        self.action(Action::Update)
    }

    /// Mark this query as a delete.
    pub fn delete(self) -> Self {
        self.action(Action::Delete)
    }

    /// Add filter conditions. With `overwrite` false the new conditions
    /// deep-merge into the existing ones; with `overwrite` true they
    /// replace the clause wholesale.
    pub fn where_clause(mut self, conditions: Conditions, overwrite: bool) -> Self {
        self.clauses.apply_where(conditions, overwrite);
        self.mark_dirty();
        self
    }

    /// Add ordering.
    pub fn order_by<F, I>(mut self, order: I, overwrite: bool) -> Self
    where
        F: Into<String>,
        I: IntoIterator<Item = (F, SortOrder)>,
    {
        self.clauses
            .apply_order(order.into_iter().map(|(f, d)| (f.into(), d)), overwrite);
        self.mark_dirty();
        self
    }

    /// Add selected field expressions.
    pub fn select<F, I>(mut self, fields: I, overwrite: bool) -> Self
    where
        F: Into<String>,
        I: IntoIterator<Item = F>,
    {
        self.clauses
            .apply_select(fields.into_iter().map(Into::into), overwrite);
        self.mark_dirty();
        self
    }

    /// Set field values for a create or update. Fails fast with
    /// [`QueryError::InvalidQueryState`] for any other action.
    pub fn set(mut self, fields: Row, overwrite: bool) -> QueryResult<Self> {
        if !self.clauses.action.allows_set() {
            return Err(QueryError::invalid_state(
                "the set clause is only valid for create and update queries",
            ));
        }
        self.clauses.apply_set(fields, overwrite);
        self.mark_dirty();
        Ok(self)
    }

    /// Limit the number of fetched records.
    pub fn limit(mut self, limit: u64) -> Self {
        self.clauses.limit = Some(limit);
        self.mark_dirty();
        self
    }

    /// Skip a number of records.
    pub fn offset(mut self, offset: u64) -> Self {
        self.clauses.offset = Some(offset);
        self.mark_dirty();
        self
    }

    /// Set the 1-indexed page, optionally changing the page size.
    pub fn page(mut self, page: u64, limit: Option<u64>) -> QueryResult<Self> {
        if page < 1 {
            return Err(QueryError::invalid_argument("pages must start at 1"));
        }
        self.clauses.page = Some(page);
        if let Some(limit) = limit {
            self.clauses.limit = Some(limit);
        }
        self.mark_dirty();
        Ok(self)
    }

    /// Bulk-apply finder options.
    ///
    /// `page`, `limit`, `order`, and `conditions` map onto their clauses;
    /// every other key is retained verbatim and retrievable through
    /// [`Query::option`], which is how custom finders receive their
    /// arguments.
    pub fn apply_options(mut self, options: Row) -> QueryResult<Self> {
        for (key, value) in options {
            match key.as_str() {
                "page" => {
                    let page = value
                        .as_i64()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| QueryError::invalid_argument("pages must start at 1"))?;
                    self.clauses.page = Some(page as u64);
                }
                "limit" => {
                    let limit = value.as_i64().filter(|l| *l >= 0).ok_or_else(|| {
                        QueryError::invalid_argument("limit must be a non-negative integer")
                    })?;
                    self.clauses.limit = Some(limit as u64);
                }
                "order" => {
                    let order = order_from_value(&value)?;
                    self.clauses.apply_order(order, false);
                }
                "conditions" => {
                    let conditions = conditions_from_value(value)?;
                    self.clauses.apply_where(conditions, false);
                }
                _ => {
                    self.options.insert(key, value);
                }
            }
        }
        self.mark_dirty();
        Ok(self)
    }

    /// Read back an opaque extra option set through [`Query::apply_options`].
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Eager-load an association, by name or dotted path (`"Comments.Author"`).
    pub fn contain(mut self, path: impl Into<String>, options: ContainOptions) -> Self {
        self.contain.insert(path.into(), options);
        self.mark_dirty();
        self
    }

    /// Contained association paths and their options.
    pub fn contained(&self) -> &IndexMap<String, ContainOptions> {
        &self.contain
    }

    /// Mark this query as a child fetch inside another query's
    /// association resolution.
    pub fn set_eager_loaded(mut self, eager_loaded: bool) -> Self {
        self.eager_loaded = eager_loaded;
        self
    }

    /// Whether this query is an eager-load child fetch.
    pub fn is_eager_loaded(&self) -> bool {
        self.eager_loaded
    }

    /// Inject a result directly, bypassing the backend. Used for testing
    /// and for streaming associations; the injected collection is treated
    /// as final and is re-wrapped without re-invoking the backend.
    pub fn set_result(&mut self, result: ResultSet) {
        self.cache = Some(result);
        self.dirty = false;
    }

    // ------------------------------------------------------------------
    // Transform pipeline
    // ------------------------------------------------------------------

    /// Register a map-reduce stage, applied to fetched rows before the
    /// result formatters. A `None` mapper is only legal with `overwrite`
    /// set, and clears all registered stages.
    pub fn map_reduce(
        mut self,
        mapper: Option<Mapper>,
        reducer: Option<Reducer>,
        overwrite: bool,
    ) -> QueryResult<Self> {
        if overwrite {
            self.map_reduce.clear();
        }
        match mapper {
            Some(mapper) => self.map_reduce.push(MapReduce { mapper, reducer }),
            None if overwrite => {}
            None => {
                return Err(QueryError::invalid_argument(
                    "map_reduce requires a mapper unless overwriting",
                ));
            }
        }
        self.mark_dirty();
        Ok(self)
    }

    /// Register a result formatter. A `None` formatter is only legal with
    /// [`FormatMode::Overwrite`], and clears all registered formatters.
    pub fn format_results(
        mut self,
        formatter: Option<ResultFormatter>,
        mode: FormatMode,
    ) -> QueryResult<Self> {
        if mode == FormatMode::Overwrite {
            self.formatters.clear();
        }
        match formatter {
            Some(f) => match mode {
                FormatMode::Prepend => self.formatters.insert(0, f),
                FormatMode::Append | FormatMode::Overwrite => self.formatters.push(f),
            },
            None if mode == FormatMode::Overwrite => {}
            None => {
                return Err(QueryError::invalid_argument(
                    "format_results requires a formatter unless overwriting",
                ));
            }
        }
        self.mark_dirty();
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Fire the endpoint's before-find hook.
    ///
    /// Fires only for read actions and at most once per query instance,
    /// even across repeated `all()`/`first()` calls: listeners may mutate
    /// this query's own clauses and must not run twice.
    pub fn trigger_before_find(&mut self) {
        if self.before_find_fired || self.clauses.action != Action::Read {
            return;
        }
        self.before_find_fired = true;
        let endpoint = Arc::clone(&self.endpoint);
        endpoint.dispatch_before_find(self);
    }

    /// Dispatch a named finder on the bound endpoint, passing this query
    /// to customize. Finders stack: `find("all")?.find("recent")?`.
    pub fn find(self, finder: &str, options: Row) -> QueryResult<Query> {
        let endpoint = Arc::clone(&self.endpoint);
        let query = self.read().apply_options(options.clone())?;
        endpoint.call_finder(finder, query, &options)
    }

    /// Fetch all records, executing at most once per dirty cycle.
    pub async fn all(&mut self) -> QueryResult<ResultSet> {
        if self.clauses.action != Action::Read {
            return Err(QueryError::invalid_state(
                "all() is only valid for read queries",
            ));
        }
        if self.cache.is_none() || self.dirty {
            let result = self.fetch().await?;
            self.cache = Some(result);
            self.dirty = false;
        }
        Ok(self.cache.clone().expect("result cached above"))
    }

    /// Fetch the first record.
    ///
    /// If the query has never executed this permanently narrows the limit
    /// clause to 1 before executing.
    pub async fn first(&mut self) -> QueryResult<Option<Row>> {
        if self.cache.is_none() {
            self.clauses.limit = Some(1);
            self.mark_dirty();
        }
        let result = self.all().await?;
        Ok(result.into_iter().next())
    }

    /// As [`Query::first`], but requires a record.
    pub async fn first_or_fail(&mut self) -> QueryResult<Row> {
        let alias = self.endpoint.alias().to_string();
        self.first().await?.ok_or(QueryError::RecordNotFound { endpoint: alias })
    }

    /// Count the records matching this query.
    ///
    /// Returns 0 without executing for non-read actions. Prefers the
    /// backend-reported total over the materialized page size.
    pub async fn count(&mut self) -> QueryResult<u64> {
        if self.clauses.action != Action::Read {
            return Ok(0);
        }
        let result = self.all().await?;
        Ok(result.total().unwrap_or(result.len() as u64))
    }

    /// Execute the query and return the raw backend value.
    ///
    /// For read actions this fires the before-find hook and performs the
    /// backend call without the transform pipeline; a returned collection
    /// is cached so a later `all()` on the unchanged query re-wraps it.
    /// Non-read actions always delegate straight to the backend; no
    /// caching and no pipeline, since mutations are not safe to replay.
    pub async fn execute(&mut self) -> QueryResult<ExecuteResult> {
        match self.clauses.action {
            Action::Read => {
                self.trigger_before_find();
                let webservice = Arc::clone(&self.webservice);
                let raw = webservice.execute(self).await?;
                if let ExecuteResult::Collection(collection) = &raw {
                    self.cache = Some(collection.clone());
                    self.dirty = false;
                }
                Ok(raw)
            }
            _ => {
                let webservice = Arc::clone(&self.webservice);
                webservice.execute(self).await
            }
        }
    }

    /// Attach Include-strategy associations before the backend call:
    /// their conditions and nested containments must ride along on the
    /// parent's own fetch.
    async fn attach_includes(&mut self) -> QueryResult<()> {
        if self.contain.is_empty() {
            return Ok(());
        }
        let associations = self.endpoint.associations();
        for (name, options, _) in group_contained(&self.contain) {
            let Some(association) = associations.get(&name) else {
                // unknown names are reported when results are attached
                continue;
            };
            let strategy = options.strategy.unwrap_or_else(|| association.strategy());
            if strategy != Strategy::Include {
                continue;
            }
            let attach = AttachOptions {
                conditions: options.conditions.clone(),
                query_builder: options.query_builder.clone(),
            };
            let placeholder = Query::new(Arc::clone(&self.endpoint));
            let parent = std::mem::replace(self, placeholder);
            *self = association.attach_to(parent, attach).await?;
        }
        Ok(())
    }

    async fn fetch(&mut self) -> QueryResult<ResultSet> {
        self.attach_includes().await?;
        self.trigger_before_find();
        debug!(
            endpoint = self.endpoint.alias(),
            eager_loaded = self.eager_loaded,
            "executing read query"
        );
        let webservice = Arc::clone(&self.webservice);
        let raw = webservice.execute(self).await?;
        let (mut rows, total) = raw.into_rows();

        for stage in &self.map_reduce {
            rows = stage.apply(rows);
        }

        rows = self.attach_associations(rows).await?;

        let mut result = ResultSet::from_parts(rows, total);
        for formatter in &self.formatters {
            result = formatter(result);
        }
        Ok(result)
    }

    /// Resolve the contained associations and inject their results into
    /// the fetched parent rows.
    async fn attach_associations(&self, rows: Vec<Row>) -> QueryResult<Vec<Row>> {
        if self.contain.is_empty() || rows.is_empty() {
            return Ok(rows);
        }
        let associations = self.endpoint.associations();
        let mut rows = rows;

        for (name, options, nested) in group_contained(&self.contain) {
            let association = associations.get(&name).ok_or_else(|| {
                QueryError::configuration(format!(
                    "`{}` is not associated with `{}`",
                    name,
                    self.endpoint.alias()
                ))
            })?;
            let strategy = options.strategy.unwrap_or_else(|| association.strategy());

            match strategy {
                Strategy::Query | Strategy::SingleQuery => {
                    let source_fields = association.source_fields()?;
                    let load = EagerLoadOptions {
                        keys: collect_keys(&rows, &source_fields),
                        contain: nested,
                        ..EagerLoadOptions::from_contain(options)
                    };
                    if association.requires_keys(&load) && load.keys.iter().all(Vec::is_empty) {
                        // No parent carried a usable key; nothing to fetch.
                        continue;
                    }
                    let injector = association.eager_loader(load).await?;
                    rows = rows.into_iter().map(|row| injector.apply(row)).collect();
                }
                Strategy::Include | Strategy::Included => {
                    rows = rows
                        .into_iter()
                        .map(|row| association.default_row_value(association.transform_row(row)))
                        .collect();
                }
            }
        }
        Ok(rows)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("endpoint", &self.endpoint.alias())
            .field("clauses", &self.clauses)
            .field("contain", &self.contain.keys().collect::<Vec<_>>())
            .field("dirty", &self.dirty)
            .field("eager_loaded", &self.eager_loaded)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

/// Group dotted containment paths by their first segment.
fn group_contained(
    contain: &IndexMap<String, ContainOptions>,
) -> Vec<(String, ContainOptions, IndexMap<String, ContainOptions>)> {
    let mut grouped: IndexMap<String, (ContainOptions, IndexMap<String, ContainOptions>)> =
        IndexMap::new();
    for (path, options) in contain {
        match path.split_once('.') {
            None => {
                grouped
                    .entry(path.clone())
                    .and_modify(|(o, _)| *o = options.clone())
                    .or_insert_with(|| (options.clone(), IndexMap::new()));
            }
            Some((head, rest)) => {
                grouped
                    .entry(head.to_string())
                    .or_default()
                    .1
                    .insert(rest.to_string(), options.clone());
            }
        }
    }
    grouped
        .into_iter()
        .map(|(name, (options, nested))| (name, options, nested))
        .collect()
}

/// Convert an option value into an order clause.
fn order_from_value(value: &Value) -> QueryResult<Vec<(String, SortOrder)>> {
    let map = value
        .as_map()
        .ok_or_else(|| QueryError::invalid_argument("order must be a map of field to direction"))?;
    let mut order = Vec::with_capacity(map.len());
    for (field, dir) in map.iter() {
        let dir = match dir.as_str().map(str::to_ascii_uppercase).as_deref() {
            Some("ASC") | None => SortOrder::Asc,
            Some("DESC") => SortOrder::Desc,
            Some(other) => {
                return Err(QueryError::invalid_argument(format!(
                    "unknown sort direction `{}`",
                    other
                )));
            }
        };
        order.push((field.clone(), dir));
    }
    Ok(order)
}

/// Convert an option value into a condition tree, honoring AND/OR keys.
pub(crate) fn conditions_from_value(value: Value) -> QueryResult<Conditions> {
    let map = match value {
        Value::Map(row) => row,
        _ => {
            return Err(QueryError::invalid_argument(
                "conditions must be a map of field expression to value",
            ));
        }
    };
    let mut conditions = Conditions::new();
    for (field, value) in map {
        match value {
            Value::Map(_) if field == AND || field == OR => {
                let group = conditions_from_value(value)?;
                let wrapped = if field == AND {
                    Conditions::and(group)
                } else {
                    Conditions::or(group)
                };
                conditions.merge(wrapped);
            }
            other => conditions.set(field, other),
        }
    }
    Ok(conditions)
}
