use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use tether_core::{Entity, Row, Value};

use crate::conditions::Conditions;
use crate::error::{QueryError, QueryResult};
use crate::query::Query;

use super::loader::{collect_keys, composite_key, EagerLoadOptions, Injected, RowInjector};
use super::{default_key, Association, AssociationCore, AssociationType, Strategy};

/// A many-to-many relationship resolved through a junction endpoint.
///
/// The junction carries one foreign key per side; eager loading is two
/// fetches, links first then targets, stitched into per-parent lists.
#[derive(Debug, Clone)]
pub struct BelongsToMany {
    core: AssociationCore,
    through: String,
    target_foreign_key: Option<Vec<String>>,
}

impl BelongsToMany {
    /// Wrap relationship metadata as a belongs-to-many association
    /// resolved through the named junction endpoint.
    pub fn new(core: AssociationCore, through: impl Into<String>) -> Self {
        Self {
            core,
            through: through.into(),
            target_foreign_key: None,
        }
    }

    /// Override the junction field(s) pointing at the target side.
    pub fn with_target_foreign_key(
        mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.target_foreign_key = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// The alias of the junction endpoint.
    pub fn through(&self) -> &str {
        &self.through
    }

    /// The junction field(s) pointing at the target side.
    pub fn target_foreign_key(&self) -> Vec<String> {
        match &self.target_foreign_key {
            Some(fields) => fields.clone(),
            None => vec![default_key(self.core.target_alias())],
        }
    }

    fn junction_conditions(&self, parent: &Entity) -> QueryResult<Conditions> {
        let mut conditions = Conditions::new();
        for (fk, bk) in self.foreign_key()?.iter().zip(self.binding_key()?.iter()) {
            let value = parent.get(bk).cloned().unwrap_or(Value::Null);
            conditions.set(fk.clone(), value);
        }
        Ok(conditions)
    }
}

#[async_trait]
impl Association for BelongsToMany {
    fn core(&self) -> &AssociationCore {
        &self.core
    }

    fn kind(&self) -> AssociationType {
        AssociationType::ManyToMany
    }

    /// The junction field(s) pointing back at the source; defaults to
    /// the key derived from the source alias.
    fn foreign_key(&self) -> QueryResult<Vec<String>> {
        match &self.core.foreign_key {
            Some(fields) => Ok(fields.clone()),
            None => Ok(vec![default_key(&self.core.source_alias)]),
        }
    }

    /// Defaults to the source endpoint's primary key.
    fn binding_key(&self) -> QueryResult<Vec<String>> {
        match &self.core.binding_key {
            Some(fields) => Ok(fields.clone()),
            None => Ok(self.source()?.primary_key()),
        }
    }

    fn source_fields(&self) -> QueryResult<Vec<String>> {
        self.binding_key()
    }

    /// Both sides survive the other's deletion; only the link rows go.
    fn is_owning_side(&self, _alias: &str) -> bool {
        true
    }

    async fn eager_loader(&self, options: EagerLoadOptions) -> QueryResult<RowInjector> {
        let strategy = options.strategy.unwrap_or(self.core.strategy);
        if matches!(strategy, Strategy::Include | Strategy::Included) {
            return Err(QueryError::unimplemented(format!(
                "association `{}` resolves in the parent fetch; it has no eager loader",
                self.core.name
            )));
        }

        let junction = self.core.endpoint(&self.through)?;
        let source_foreign = self.foreign_key()?;
        let target_foreign = self.target_foreign_key();

        let mut link_query = Query::new(junction)
            .find(&self.core.finder, Row::new())?
            .set_eager_loaded(true);
        if strategy == Strategy::Query {
            for (field, values) in source_foreign.iter().zip(options.keys.iter()) {
                link_query = link_query.where_clause(
                    Conditions::in_list(field.clone(), values.iter().cloned()),
                    false,
                );
            }
        }
        let links = link_query.all().await?;
        let (link_rows, _) = links.into_parts();
        debug!(
            association = %self.core.name,
            links = link_rows.len(),
            "fetched junction rows"
        );

        let target = self.target()?;
        let target_pk = target.primary_key();
        let target_keys = collect_keys(&link_rows, &target_foreign);

        let mut targets_by_key: IndexMap<String, Row> = IndexMap::new();
        if target_keys.iter().any(|list| !list.is_empty()) {
            let finder = options.finder.as_deref().unwrap_or(&self.core.finder);
            let mut target_query = Query::new(target)
                .find(finder, Row::new())?
                .where_clause(self.core.conditions.clone(), false)
                .where_clause(options.conditions.clone(), false)
                .set_eager_loaded(true);
            for (field, values) in target_pk.iter().zip(target_keys.iter()) {
                target_query = target_query.where_clause(
                    Conditions::in_list(field.clone(), values.iter().cloned()),
                    false,
                );
            }
            if !options.sort.is_empty() {
                target_query = target_query.order_by(options.sort.clone(), false);
            }
            for (path, contain) in &options.contain {
                target_query = target_query.contain(path.clone(), contain.clone());
            }
            if let Some(builder) = &options.query_builder {
                target_query = builder(target_query)?;
            }
            let fetched = target_query.all().await?;
            let (rows, _) = fetched.into_parts();
            for row in rows {
                if let Some(key) = composite_key(&row, &target_pk) {
                    targets_by_key.entry(key).or_insert(row);
                }
            }
        }

        // Stitch: each link row pairs one parent key with one target key.
        let mut map: IndexMap<String, Injected> = IndexMap::new();
        for link in &link_rows {
            let Some(parent_key) = composite_key(link, &source_foreign) else {
                continue;
            };
            let Some(target_key) = composite_key(link, &target_foreign) else {
                continue;
            };
            let Some(matched) = targets_by_key.get(&target_key) else {
                continue;
            };
            match map
                .entry(parent_key)
                .or_insert_with(|| Injected::Many(Vec::new()))
            {
                Injected::Many(bucket) => bucket.push(matched.clone()),
                Injected::One(_) => unreachable!("many-to-many map holds Many buckets"),
            }
        }

        let nest_key = options.nest_key.clone().unwrap_or_else(|| self.property_name());
        Ok(RowInjector::new(nest_key, self.binding_key()?, map))
    }

    /// Deleting a parent removes its junction links, never the targets.
    async fn cascade_delete(&self, parent: &Entity) -> QueryResult<bool> {
        let junction = self.core.endpoint(&self.through)?;
        let conditions = self.junction_conditions(parent)?;
        if self.core.cascade_callbacks {
            let mut finder = Query::new(Arc::clone(&junction))
                .find(&self.core.finder, Row::new())?
                .where_clause(conditions, false);
            let links = finder.all().await?;
            let mut ok = true;
            for row in links {
                ok &= junction.delete(Entity::from_row(row)).await?;
            }
            Ok(ok)
        } else {
            let mut bulk = Query::new(junction).delete().where_clause(conditions, false);
            bulk.execute().await?;
            Ok(true)
        }
    }
}
