//! One-shot update builders.
//!
//! A [`Builder`] owns a loaded row and a working copy of it. Mutations edit
//! the working copy; [`Builder::finish`] turns the difference into an
//! active model that only sets the changed columns. A builder can be finished
//! once: afterwards it is tainted and every further edit or finish fails with
//! [`AppError::TaintedObject`].

use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Iterable, ModelTrait};
use seventv_common::{AppError, AppResult};

/// Accumulates a pending update for a single row.
#[derive(Debug, Clone)]
pub struct Builder<M> {
    initial: M,
    current: M,
    tainted: bool,
}

impl<M> Builder<M>
where
    M: ModelTrait + Clone,
{
    /// Wrap a freshly loaded row.
    #[must_use]
    pub fn new(model: M) -> Self {
        Self {
            initial: model.clone(),
            current: model,
            tainted: false,
        }
    }

    /// The row as it was loaded.
    #[must_use]
    pub const fn initial(&self) -> &M {
        &self.initial
    }

    /// The row with pending edits applied.
    #[must_use]
    pub const fn current(&self) -> &M {
        &self.current
    }

    /// Whether the builder was already written.
    #[must_use]
    pub const fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Edit the working copy.
    pub fn update<F>(&mut self, f: F) -> AppResult<&mut Self>
    where
        F: FnOnce(&mut M),
    {
        if self.tainted {
            return Err(AppError::TaintedObject);
        }
        f(&mut self.current);
        Ok(self)
    }

    /// Columns whose value differs between the loaded row and the working copy.
    pub fn changed_columns(&self) -> Vec<<M::Entity as EntityTrait>::Column> {
        <M::Entity as EntityTrait>::Column::iter()
            .filter(|col| self.initial.get(*col) != self.current.get(*col))
            .collect()
    }

    /// Whether any column changed.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !self.changed_columns().is_empty()
    }

    /// Discard pending edits of one column.
    pub fn revert(&mut self, col: <M::Entity as EntityTrait>::Column) -> AppResult<()> {
        if self.tainted {
            return Err(AppError::TaintedObject);
        }
        self.current.set(col, self.initial.get(col));
        Ok(())
    }

    /// Build the update and taint the builder.
    ///
    /// Returns `Ok(None)` when nothing changed. The primary key is left
    /// unchanged so the update is filtered by it.
    pub fn finish<A>(&mut self) -> AppResult<Option<A>>
    where
        M: IntoActiveModel<A>,
        A: ActiveModelTrait<Entity = M::Entity>,
    {
        if self.tainted {
            return Err(AppError::TaintedObject);
        }
        self.tainted = true;

        let changed = self.changed_columns();
        if changed.is_empty() {
            return Ok(None);
        }

        let mut active = self.initial.clone().into_active_model();
        for col in changed {
            active.set(col, self.current.get(col));
        }
        Ok(Some(active))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::ActiveValue;
    use seventv_db::entities::{embedded::StringList, emote};

    fn emote() -> emote::Model {
        emote::Model {
            id: "01".to_string(),
            name: "PepeLaugh".to_string(),
            owner_id: "owner".to_string(),
            tags: StringList::default(),
            flags: 0,
            claimants: StringList::default(),
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_finish_sets_only_changed_columns() {
        let mut builder = Builder::new(emote());
        builder
            .update(|e| e.name = "PepeLaughing".to_string())
            .unwrap();

        let active: emote::ActiveModel = builder.finish().unwrap().unwrap();
        assert!(matches!(&active.name, ActiveValue::Set(name) if name == "PepeLaughing"));
        assert!(matches!(active.owner_id, ActiveValue::Unchanged(_)));
        assert!(matches!(active.id, ActiveValue::Unchanged(_)));
    }

    #[test]
    fn test_finish_without_changes_returns_none() {
        let mut builder = Builder::new(emote());
        let active: Option<emote::ActiveModel> = builder.finish().unwrap();
        assert!(active.is_none());
    }

    #[test]
    fn test_tainted_builder_rejects_reuse() {
        let mut builder = Builder::new(emote());
        builder.update(|e| e.flags = 1).unwrap();
        let _: Option<emote::ActiveModel> = builder.finish().unwrap();

        assert!(builder.is_tainted());
        assert!(matches!(
            builder.update(|e| e.flags = 2),
            Err(AppError::TaintedObject)
        ));
        assert!(matches!(
            builder.finish::<emote::ActiveModel>(),
            Err(AppError::TaintedObject)
        ));
    }

    #[test]
    fn test_revert_discards_column() {
        let mut builder = Builder::new(emote());
        builder
            .update(|e| {
                e.owner_id = "other".to_string();
                e.flags = 4;
            })
            .unwrap();
        builder.revert(emote::Column::OwnerId).unwrap();

        let changed = builder.changed_columns();
        assert_eq!(changed.len(), 1);
        assert!(matches!(changed[0], emote::Column::Flags));
    }
}
