use async_trait::async_trait;
use tracing::debug;

use tether_core::{Entity, Row, Value};

use crate::conditions::Conditions;
use crate::error::QueryResult;
use crate::query::Query;

use super::loader::{run_eager_load, EagerLoadOptions, LoadPlan, RowInjector};
use super::{default_key, Association, AssociationCore, AssociationType};

/// A one-to-many relationship: every matching target record carries the
/// foreign key pointing back at the source.
#[derive(Debug, Clone)]
pub struct HasMany {
    core: AssociationCore,
}

impl HasMany {
    /// Wrap relationship metadata as a has-many association.
    pub fn new(core: AssociationCore) -> Self {
        Self { core }
    }

    /// The filter selecting this parent's children: the association's
    /// standing conditions plus the foreign key pinned to the parent's
    /// binding key values.
    fn dependent_conditions(&self, parent: &Entity) -> QueryResult<Conditions> {
        let mut conditions = self.core.conditions.clone();
        for (fk, bk) in self.foreign_key()?.iter().zip(self.binding_key()?.iter()) {
            let value = parent.get(bk).cloned().unwrap_or(Value::Null);
            conditions.set(fk.clone(), value);
        }
        Ok(conditions)
    }
}

#[async_trait]
impl Association for HasMany {
    fn core(&self) -> &AssociationCore {
        &self.core
    }

    fn kind(&self) -> AssociationType {
        AssociationType::OneToMany
    }

    /// Defaults to the key derived from the source alias, on the target
    /// side: `Articles hasMany Comments` reads `article_id` off the
    /// comments.
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

    fn is_owning_side(&self, alias: &str) -> bool {
        alias == self.core.source_alias
    }

    async fn eager_loader(&self, mut options: EagerLoadOptions) -> QueryResult<RowInjector> {
        let foreign = match options.foreign_key.take() {
            Some(fields) => fields,
            None => self.foreign_key()?,
        };
        run_eager_load(
            LoadPlan {
                core: self.core.clone(),
                target: self.target()?,
                filter_fields: foreign.clone(),
                map_fields: foreign,
                source_fields: self.binding_key()?,
                many: true,
            },
            options,
        )
        .await
    }

    /// Remove dependent children when the parent is deleted. With
    /// cascading callbacks each child is fetched and deleted through its
    /// endpoint so per-record hooks run; otherwise a single bulk delete
    /// goes straight to the backend.
    async fn cascade_delete(&self, parent: &Entity) -> QueryResult<bool> {
        if !self.core.dependent {
            return Ok(true);
        }
        let conditions = self.dependent_conditions(parent)?;
        let target = self.target()?;
        debug!(
            association = %self.core.name,
            callbacks = self.core.cascade_callbacks,
            "cascading delete to dependent records"
        );
        if self.core.cascade_callbacks {
            let mut finder = self
                .find(Row::new())?
                .where_clause(conditions, false);
            let children = finder.all().await?;
            let mut ok = true;
            for row in children {
                ok &= target.delete(Entity::from_row(row)).await?;
            }
            Ok(ok)
        } else {
            let mut bulk = Query::new(target).delete().where_clause(conditions, false);
            bulk.execute().await?;
            Ok(true)
        }
    }
}
