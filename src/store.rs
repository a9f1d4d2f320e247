use crate::models::{
    Category, CategoryId, Course, CourseId, CourseUpdate, DuplicateRequest, NewCategory,
};
use std::future::Future;

/// Failure of the duplication collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DuplicateError {
    /// A course with the requested short identifier already exists.
    ///
    /// Stores should enforce short identifier uniqueness so that two clone
    /// jobs racing past the executor's existence check cannot both succeed.
    #[error("course short identifier {0:?} is already taken")]
    ShortIdentifierTaken(String),

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The external category/course store, including course duplication.
///
/// Implementations are handed to every component explicitly; nothing in this
/// crate reaches for a global database handle.
pub trait CourseStore: Clone + Send + Sync + 'static {
    /// Look up a category by id.
    fn get_category(
        &self,
        id: CategoryId,
    ) -> impl Future<Output = anyhow::Result<Option<Category>>> + Send;

    /// Look up the category holding `tag`, anywhere in the tree.
    fn find_category_by_tag(
        &self,
        tag: &str,
    ) -> impl Future<Output = anyhow::Result<Option<Category>>> + Send;

    /// Create a category.
    fn create_category(
        &self,
        category: NewCategory,
    ) -> impl Future<Output = anyhow::Result<Category>> + Send;

    /// List the courses of a category, optionally including sub-categories.
    fn list_courses(
        &self,
        category_id: CategoryId,
        recursive: bool,
    ) -> impl Future<Output = anyhow::Result<Vec<Course>>> + Send;

    /// Look up a course by id.
    fn get_course(&self, id: CourseId)
    -> impl Future<Output = anyhow::Result<Option<Course>>> + Send;

    /// Look up the course with `short_identifier` inside `category_id`.
    fn find_course(
        &self,
        short_identifier: &str,
        category_id: CategoryId,
    ) -> impl Future<Output = anyhow::Result<Option<Course>>> + Send;

    /// Deep-copy a course according to the request's options.
    fn duplicate_course(
        &self,
        request: DuplicateRequest,
    ) -> impl Future<Output = Result<Course, DuplicateError>> + Send;

    /// Overwrite name and dates of a course.
    fn update_course(
        &self,
        id: CourseId,
        update: CourseUpdate,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}
