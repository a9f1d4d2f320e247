use crate::errors::CloneError;
use crate::models::{Category, CategoryId, NewCategory, NewChildCategory};
use crate::store::CourseStore;
use tracing::{debug, info, instrument};

/// Resolves the source and destination categories of a clone, creating the
/// destination sub-category when one is requested.
#[derive(Debug, Clone)]
pub struct CategoryPreparer<S> {
    store: S,
}

impl<S: CourseStore> CategoryPreparer<S> {
    /// Create a preparer reading and creating categories in `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns `(source, destination)`.
    ///
    /// Fails with [`CloneError::MissingTag`] when the source has no tag, or
    /// when the destination (or the requested child) would have none.
    ///
    /// With a `new_child`, the category already holding its tag is reused if
    /// it sits directly under `destination_id`; a holder anywhere else is a
    /// [`CloneError::TagConflict`]. Otherwise the child is created. Concurrent
    /// submissions are tolerated through the reuse rule, not prevented.
    #[instrument(
        name = "cloner.prepare",
        skip(self, new_child),
        fields(new_child.tag = tracing::field::Empty)
    )]
    pub async fn prepare(
        &self,
        source_id: CategoryId,
        destination_id: CategoryId,
        new_child: Option<&NewChildCategory>,
    ) -> Result<(Category, Category), CloneError> {
        let source = self.resolve(source_id).await?;
        let destination = self.resolve(destination_id).await?;

        if source.tag.trim().is_empty() {
            return Err(CloneError::MissingTag(source.id));
        }

        let Some(child) = new_child.map(NewChildCategory::trimmed) else {
            if destination.tag.trim().is_empty() {
                return Err(CloneError::MissingTag(destination.id));
            }
            return Ok((source, destination));
        };
        // An empty tag would match every untagged category.
        if child.tag.is_empty() {
            return Err(CloneError::MissingTag(destination.id));
        }
        tracing::Span::current().record("new_child.tag", child.tag.as_str());

        let existing = self
            .store
            .find_category_by_tag(&child.tag)
            .await
            .map_err(CloneError::Store)?;

        let destination = match existing {
            Some(existing) if existing.parent_id == destination.id => {
                debug!(category.id = %existing.id, "Reusing existing destination sub-category");
                existing
            }
            Some(existing) => {
                return Err(CloneError::TagConflict {
                    tag: child.tag,
                    existing: existing.id,
                    existing_parent: existing.parent_id,
                    requested_parent: destination.id,
                });
            }
            None => self.create_child(child, destination.id).await?,
        };

        Ok((source, destination))
    }

    async fn create_child(
        &self,
        child: NewChildCategory,
        parent_id: CategoryId,
    ) -> Result<Category, CloneError> {
        let tag = child.tag.clone();
        let request = NewCategory {
            name: child.name,
            tag: child.tag,
            parent_id,
        };
        let error = match self.store.create_category(request).await {
            Ok(created) => {
                info!(
                    category.id = %created.id,
                    parent.id = %parent_id,
                    "Created destination sub-category"
                );
                return Ok(created);
            }
            Err(error) => error,
        };

        // A concurrent submission may have created the same child first.
        match self.store.find_category_by_tag(&tag).await {
            Ok(Some(existing)) if existing.parent_id == parent_id => {
                debug!(
                    category.id = %existing.id,
                    "Destination sub-category was created concurrently"
                );
                Ok(existing)
            }
            Ok(Some(existing)) => Err(CloneError::TagConflict {
                tag,
                existing: existing.id,
                existing_parent: existing.parent_id,
                requested_parent: parent_id,
            }),
            _ => Err(CloneError::Store(error)),
        }
    }

    async fn resolve(&self, id: CategoryId) -> Result<Category, CloneError> {
        if id.is_top() {
            return Ok(Category::top());
        }
        self.store
            .get_category(id)
            .await
            .map_err(CloneError::Store)?
            .ok_or(CloneError::CategoryNotFound(id))
    }
}
