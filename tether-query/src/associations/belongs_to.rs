use async_trait::async_trait;
use tether_core::{Entity, Value};

use crate::error::QueryResult;

use super::loader::{run_eager_load, EagerLoadOptions, LoadPlan, RowInjector};
use super::{default_key, Association, AssociationCore, AssociationType};

/// A many-to-one relationship: the source endpoint carries the foreign
/// key pointing at a single target record.
#[derive(Debug, Clone)]
pub struct BelongsTo {
    core: AssociationCore,
}

impl BelongsTo {
    /// Wrap relationship metadata as a belongs-to association.
    pub fn new(core: AssociationCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl Association for BelongsTo {
    fn core(&self) -> &AssociationCore {
        &self.core
    }

    fn kind(&self) -> AssociationType {
        AssociationType::ManyToOne
    }

    /// Defaults to the key derived from the association name, on the
    /// source side: `BelongsTo("Authors")` reads `author_id` off the
    /// parent rows.
    fn foreign_key(&self) -> QueryResult<Vec<String>> {
        match &self.core.foreign_key {
            Some(fields) => Ok(fields.clone()),
            None => Ok(vec![default_key(&self.core.name)]),
        }
    }

    /// Defaults to the target endpoint's primary key.
    fn binding_key(&self) -> QueryResult<Vec<String>> {
        match &self.core.binding_key {
            Some(fields) => Ok(fields.clone()),
            None => Ok(self.target()?.primary_key()),
        }
    }

    /// The parent rows carry the foreign key.
    fn source_fields(&self) -> QueryResult<Vec<String>> {
        self.foreign_key()
    }

    fn is_owning_side(&self, alias: &str) -> bool {
        alias == self.core.target_alias()
    }

    async fn eager_loader(&self, mut options: EagerLoadOptions) -> QueryResult<RowInjector> {
        let binding = self.binding_key()?;
        let source = match options.foreign_key.take() {
            Some(fields) => fields,
            None => self.foreign_key()?,
        };
        run_eager_load(
            LoadPlan {
                core: self.core.clone(),
                target: self.target()?,
                filter_fields: binding.clone(),
                map_fields: binding,
                source_fields: source,
                many: false,
            },
            options,
        )
        .await
    }

    /// Save the associated target entity first, then copy its binding
    /// key values into the parent's foreign key fields. The reverse
    /// direction never happens here: the parent save is the caller's
    /// job.
    async fn save_associated(&self, mut parent: Entity) -> QueryResult<Entity> {
        let property = self.property_name();
        let Some(Value::Entity(child)) = parent.get(&property).cloned() else {
            return Ok(parent);
        };
        let saved = self.target()?.save(*child).await?;
        let foreign = self.foreign_key()?;
        let binding = self.binding_key()?;
        for (fk, bk) in foreign.iter().zip(binding.iter()) {
            if let Some(value) = saved.get(bk).cloned() {
                parent.set(fk.clone(), value);
            }
        }
        parent.set(property, Value::Entity(Box::new(saved)));
        Ok(parent)
    }
}
