use async_trait::async_trait;
use tether_core::{Entity, Value};

use crate::error::QueryResult;

use super::loader::{run_eager_load, EagerLoadOptions, LoadPlan, RowInjector};
use super::{default_key, Association, AssociationCore, AssociationType};

/// A one-to-one relationship: a single target record carries the foreign
/// key pointing back at the source.
#[derive(Debug, Clone)]
pub struct HasOne {
    core: AssociationCore,
}

impl HasOne {
    /// Wrap relationship metadata as a has-one association.
    pub fn new(core: AssociationCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Association for HasOne {
    fn core(&self) -> &AssociationCore {
        &self.core
    }

    fn kind(&self) -> AssociationType {
        AssociationType::OneToOne
    }

    /// Defaults to the key derived from the source alias, on the target
    /// side: `Users hasOne Profiles` reads `user_id` off the profiles.
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

    /// The parent rows carry the binding key; the child rows carry the
    /// foreign key.
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
                many: false,
            },
            options,
        )
        .await
    }

    /// Save the child after the parent: the parent's binding key values
    /// are copied into the child's foreign key fields first, so the
    /// child always points at a persisted parent.
    async fn save_associated(&self, mut parent: Entity) -> QueryResult<Entity> {
        let property = self.property_name();
        let Some(Value::Entity(child)) = parent.get(&property).cloned() else {
            return Ok(parent);
        };
        let mut child = *child;
        let foreign = self.foreign_key()?;
        let binding = self.binding_key()?;
        for (fk, bk) in foreign.iter().zip(binding.iter()) {
            if let Some(value) = parent.get(bk).cloned() {
                child.set(fk.clone(), value);
            }
        }
        let saved = self.target()?.save(child).await?;
        parent.set(property, Value::Entity(Box::new(saved)));
        Ok(parent)
    }
}
