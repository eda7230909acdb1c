//! Relationship modeling and eager loading between endpoints.
//!
//! An association describes a named relationship from a source endpoint
//! to a target endpoint, and knows how to resolve it: either as part of
//! the same physical fetch ([`Strategy::Include`]/[`Strategy::Included`])
//! or through a secondary fetch whose results are injected into the
//! parent rows ([`Strategy::Query`]/[`Strategy::SingleQuery`]).

mod belongs_to;
mod belongs_to_many;
mod has_many;
mod has_one;
mod loader;

pub use belongs_to::BelongsTo;
pub use belongs_to_many::BelongsToMany;
pub use has_many::HasMany;
pub use has_one::HasOne;
pub use loader::{
    collect_keys, AttachOptions, ContainOptions, EagerLoadOptions, Injected, QueryBuilderFn,
    RowInjector,
};

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tether_core::{Entity, Row, Value};

use crate::conditions::Conditions;
use crate::error::{QueryError, QueryResult};
use crate::query::Query;
use crate::registry::EndpointRegistry;
use crate::traits::Endpoint;

/// The shape of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationType {
    /// One-to-one (e.g. a User has one Profile).
    OneToOne,
    /// Many-to-one (e.g. an Article belongs to an Author).
    ManyToOne,
    /// One-to-many (e.g. an Article has many Comments).
    OneToMany,
    /// Many-to-many through a junction endpoint.
    ManyToMany,
}

impl AssociationType {
    /// Check whether this relationship resolves to multiple records.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// Check whether this relationship resolves to a single record.
    pub fn is_one(&self) -> bool {
        !self.is_many()
    }
}

/// How an association is resolved during a parent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// A secondary query filtered by the batch of collected parent keys.
    #[default]
    Query,
    /// A single secondary query with no key filter; the whole matching
    /// set is fetched and mapped.
    SingleQuery,
    /// Resolved as part of the parent's own fetch, attached at build time.
    Include,
    /// Already embedded in the parent payload by the backend.
    Included,
}

/// Relationship metadata shared by every association kind.
///
/// Immutable once the association is constructed. Source and target
/// endpoints are not owned: they are resolved lazily through the registry
/// by alias, so associations can be declared before every endpoint
/// exists.
#[derive(Clone)]
pub struct AssociationCore {
    /// Association name; doubles as the default target alias.
    pub name: String,
    /// Alias of the endpoint declaring this association.
    pub source_alias: String,
    /// Alias of the target endpoint, when it differs from the name.
    pub target_alias: Option<String>,
    /// Explicit foreign key field(s) on the owning/child side.
    pub foreign_key: Option<Vec<String>>,
    /// Explicit binding key field(s) on the owned/parent side.
    pub binding_key: Option<Vec<String>>,
    /// Extra always-applied filter on the target.
    pub conditions: Conditions,
    /// Whether child records are deleted when the parent is.
    pub dependent: bool,
    /// Whether cascaded deletes run full per-record callbacks.
    pub cascade_callbacks: bool,
    /// Resolution strategy.
    pub strategy: Strategy,
    /// Property under which resolved children attach to a parent row.
    pub property_name: Option<String>,
    /// Finder used to build child queries.
    pub finder: String,
    registry: Arc<EndpointRegistry>,
}

impl AssociationCore {
    /// Create association metadata with defaults.
    pub fn new(
        name: impl Into<String>,
        source_alias: impl Into<String>,
        registry: Arc<EndpointRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            source_alias: source_alias.into(),
            target_alias: None,
            foreign_key: None,
            binding_key: None,
            conditions: Conditions::new(),
            dependent: false,
            cascade_callbacks: false,
            strategy: Strategy::default(),
            property_name: None,
            finder: "all".to_string(),
            registry,
        }
    }

    /// Set the target alias when it differs from the association name.
    pub fn with_target_alias(mut self, alias: impl Into<String>) -> Self {
        self.target_alias = Some(alias.into());
        self
    }

    /// Set explicit foreign key field(s).
    pub fn with_foreign_key(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.foreign_key = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set explicit binding key field(s).
    pub fn with_binding_key(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.binding_key = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set extra always-applied conditions.
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Mark child records as dependent on the parent's lifetime.
    pub fn with_dependent(mut self, dependent: bool, cascade_callbacks: bool) -> Self {
        self.dependent = dependent;
        self.cascade_callbacks = cascade_callbacks;
        self
    }

    /// Set the resolution strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the property under which children are attached.
    pub fn with_property_name(mut self, name: impl Into<String>) -> Self {
        self.property_name = Some(name.into());
        self
    }

    /// Set the finder used for child queries.
    pub fn with_finder(mut self, finder: impl Into<String>) -> Self {
        self.finder = finder.into();
        self
    }

    /// The alias the target endpoint is registered under.
    pub fn target_alias(&self) -> &str {
        self.target_alias.as_deref().unwrap_or(&self.name)
    }

    /// Resolve an endpoint through the registry.
    pub fn endpoint(&self, alias: &str) -> QueryResult<Arc<dyn Endpoint>> {
        self.registry.get(alias).ok_or_else(|| {
            QueryError::configuration(format!("endpoint `{}` is not registered", alias))
        })
    }
}

impl std::fmt::Debug for AssociationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationCore")
            .field("name", &self.name)
            .field("source", &self.source_alias)
            .field("target", &self.target_alias())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// A declared relationship between two endpoints.
#[async_trait]
pub trait Association: Send + Sync {
    /// The shared relationship metadata.
    fn core(&self) -> &AssociationCore;

    /// The relationship shape.
    fn kind(&self) -> AssociationType;

    /// The association name.
    fn name(&self) -> &str {
        &self.core().name
    }

    /// The configured resolution strategy.
    fn strategy(&self) -> Strategy {
        self.core().strategy
    }

    /// The property under which resolved children attach to a parent row.
    fn property_name(&self) -> String {
        match &self.core().property_name {
            Some(name) => name.clone(),
            None => default_property(&self.core().name, self.kind().is_many()),
        }
    }

    /// The source endpoint, resolved through the registry.
    fn source(&self) -> QueryResult<Arc<dyn Endpoint>> {
        let core = self.core();
        core.endpoint(&core.source_alias)
    }

    /// The target endpoint, resolved through the registry. Callers dot
    /// through this accessor explicitly; nothing is proxied magically.
    fn target(&self) -> QueryResult<Arc<dyn Endpoint>> {
        let core = self.core();
        core.endpoint(core.target_alias())
    }

    /// The foreign key field(s) on the owning/child side, defaulting to a
    /// name derived from the opposite side's alias. The derivation
    /// direction is relationship-kind specific.
    fn foreign_key(&self) -> QueryResult<Vec<String>>;

    /// The binding key field(s) on the owned/parent side, defaulting to
    /// the parent endpoint's primary key.
    fn binding_key(&self) -> QueryResult<Vec<String>>;

    /// The parent-row fields whose values link into this association:
    /// what the eager loader collects and what the injector reads.
    fn source_fields(&self) -> QueryResult<Vec<String>>;

    /// Which endpoint would lose referential meaning if the other were
    /// deleted.
    fn is_owning_side(&self, alias: &str) -> bool;

    /// Whether resolving this association needs the caller to have
    /// collected the batch of parent key values first.
    fn requires_keys(&self, options: &EagerLoadOptions) -> bool {
        options.strategy.unwrap_or_else(|| self.strategy()) == Strategy::Query
    }

    /// Build a query against the target endpoint through its finder.
    fn find(&self, options: Row) -> QueryResult<Query> {
        let target = self.target()?;
        Query::new(target).find(&self.core().finder, options)
    }

    /// Attach this association to a parent query resolved as part of the
    /// same physical fetch. Builds a representative child query, applies
    /// the caller's query-builder callback, merges conditions onto the
    /// parent, fires the child's before-find hook, and re-parents any
    /// nested containments under a dotted alias path so N-level eager
    /// loading composes.
    async fn attach_to(&self, parent: Query, options: AttachOptions) -> QueryResult<Query> {
        let mut child = self.find(Row::new())?;
        if let Some(builder) = &options.query_builder {
            child = builder(child)?;
        }
        let mut child = child
            .where_clause(self.core().conditions.clone(), false)
            .where_clause(options.conditions, false)
            .set_eager_loaded(true);
        child.trigger_before_find();

        let mut parent = parent.where_clause(child.clauses().where_.clone(), false);
        for (path, contain) in child.contained().clone() {
            let aliased = format!("{}.{}", self.name(), path);
            if !parent.contained().contains_key(&aliased) {
                parent = parent.contain(aliased, contain);
            }
        }
        Ok(parent)
    }

    /// Resolve this association through a secondary fetch and return the
    /// injector that attaches matched children to each parent row.
    async fn eager_loader(&self, options: EagerLoadOptions) -> QueryResult<RowInjector>;

    /// Move a directly-joined payload from the raw alias key into the
    /// association's property slot, so consumers see a stable name.
    fn transform_row(&self, mut row: Row) -> Row {
        if let Some(payload) = row.remove(self.name()) {
            row.insert(self.property_name(), payload);
        }
        row
    }

    /// Seed an explicit empty value when no joined payload exists.
    fn default_row_value(&self, mut row: Row) -> Row {
        let property = self.property_name();
        if !row.contains(&property) {
            let empty = if self.kind().is_many() {
                Value::List(Vec::new())
            } else {
                Value::Null
            };
            row.insert(property, empty);
        }
        row
    }

    /// Persistence cascade for to-one kinds. Other kinds return the
    /// parent untouched.
    async fn save_associated(&self, parent: Entity) -> QueryResult<Entity> {
        Ok(parent)
    }

    /// Delete-cascade for dependent to-many kinds. To-one kinds never
    /// cascade: the child outlives the parent by definition.
    async fn cascade_delete(&self, _parent: &Entity) -> QueryResult<bool> {
        Ok(true)
    }
}

/// The associations declared on one endpoint, keyed by name.
#[derive(Default)]
pub struct AssociationMap {
    map: IndexMap<String, Arc<dyn Association>>,
}

impl AssociationMap {
    /// Create an empty association map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an association. Mismatched foreign/binding key cardinality
    /// is a configuration error caught here, at attach time, not at use
    /// time.
    pub fn add(&mut self, association: Arc<dyn Association>) -> QueryResult<()> {
        let core = association.core();
        if let (Some(foreign), Some(binding)) = (&core.foreign_key, &core.binding_key) {
            if foreign.len() != binding.len() {
                return Err(QueryError::invalid_argument(format!(
                    "association `{}`: foreign key has {} field(s) but binding key has {}",
                    core.name,
                    foreign.len(),
                    binding.len()
                )));
            }
        }
        self.map
            .insert(association.name().to_string(), association);
        Ok(())
    }

    /// Look up an association by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Association>> {
        self.map.get(name).cloned()
    }

    /// Number of declared associations.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check whether no associations are declared.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over associations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Association>> {
        self.map.values()
    }
}

impl std::fmt::Debug for AssociationMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationMap")
            .field("names", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Convert a CamelCase alias to snake_case.
pub(crate) fn underscore(alias: &str) -> String {
    let mut out = String::with_capacity(alias.len() + 4);
    for (i, ch) in alias.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Naive singular form, good enough for conventional alias names.
pub(crate) fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if let Some(stem) = word.strip_suffix('s') {
        return stem.to_string();
    }
    word.to_string()
}

/// The conventional foreign key name derived from an alias:
/// `"Authors"` becomes `"author_id"`.
pub(crate) fn default_key(alias: &str) -> String {
    format!("{}_id", singularize(&underscore(alias)))
}

/// The conventional property name an association nests under.
pub(crate) fn default_property(name: &str, many: bool) -> String {
    let snake = underscore(name);
    if many {
        snake
    } else {
        singularize(&snake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_type() {
        assert!(AssociationType::OneToMany.is_many());
        assert!(AssociationType::ManyToMany.is_many());
        assert!(AssociationType::ManyToOne.is_one());
        assert!(AssociationType::OneToOne.is_one());
    }

    #[test]
    fn test_inflection() {
        assert_eq!(underscore("BlogPosts"), "blog_posts");
        assert_eq!(singularize("Categories"), "Category");
        assert_eq!(default_key("Authors"), "author_id");
        assert_eq!(default_property("Comments", true), "comments");
        assert_eq!(default_property("Authors", false), "author");
    }

    #[test]
    fn test_map_rejects_mismatched_key_cardinality() {
        let registry = Arc::new(EndpointRegistry::new());
        let core = AssociationCore::new("Authors", "Articles", registry)
            .with_foreign_key(["a", "b"])
            .with_binding_key(["x"]);
        let mut map = AssociationMap::new();
        let err = map.add(Arc::new(BelongsTo::new(core))).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
        assert!(map.is_empty());
    }

    #[test]
    fn test_requires_keys_only_for_keyed_strategy() {
        let registry = Arc::new(EndpointRegistry::new());
        let keyed = BelongsTo::new(AssociationCore::new(
            "Authors",
            "Articles",
            Arc::clone(&registry),
        ));
        assert!(keyed.requires_keys(&EagerLoadOptions::default()));

        let unkeyed = BelongsTo::new(
            AssociationCore::new("Authors", "Articles", Arc::clone(&registry))
                .with_strategy(Strategy::SingleQuery),
        );
        assert!(!unkeyed.requires_keys(&EagerLoadOptions::default()));

        // the per-call strategy override wins over the configured one
        let options = EagerLoadOptions {
            strategy: Some(Strategy::SingleQuery),
            ..EagerLoadOptions::default()
        };
        assert!(!keyed.requires_keys(&options));
        let options = EagerLoadOptions {
            strategy: Some(Strategy::Query),
            ..EagerLoadOptions::default()
        };
        assert!(unkeyed.requires_keys(&options));
    }

    #[test]
    fn test_default_row_value_seeds_empty_placeholders() {
        let registry = Arc::new(EndpointRegistry::new());
        let to_one = BelongsTo::new(AssociationCore::new(
            "Authors",
            "Articles",
            Arc::clone(&registry),
        ));
        let to_many = HasMany::new(AssociationCore::new(
            "Comments",
            "Articles",
            Arc::clone(&registry),
        ));

        let mut bare = Row::new();
        bare.insert("id", 1);
        let seeded = to_one.default_row_value(bare.clone());
        assert_eq!(seeded.get("author"), Some(&Value::Null));
        let seeded = to_many.default_row_value(bare);
        assert_eq!(seeded.get("comments"), Some(&Value::List(Vec::new())));

        // an existing payload is never clobbered
        let mut filled = Row::new();
        filled.insert("author", Value::from("present"));
        let kept = to_one.default_row_value(filled);
        assert_eq!(kept.get("author"), Some(&Value::from("present")));
    }

    #[test]
    fn test_map_add_and_get() {
        let registry = Arc::new(EndpointRegistry::new());
        let core = AssociationCore::new("Authors", "Articles", registry);
        let mut map = AssociationMap::new();
        map.add(Arc::new(BelongsTo::new(core))).unwrap();
        assert!(map.get("Authors").is_some());
        assert!(map.get("Tags").is_none());
    }
}
