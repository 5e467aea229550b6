//! Context library operations: listing, manual authoring, stars, publishing
//! and importing. Every mutation goes through [`authz::can_mutate`].

use db::models::context::{Context, CreateContext};
use db::models::context_star::ContextStar;
use db::models::public_context::PublicContext;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::services::authz;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Not the owner of this resource")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum ContextScope {
    All,
    Mine,
    Starred,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct ContextFilter {
    pub query: Option<String>,
    pub tag: Option<String>,
    pub scope: Option<ContextScope>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct ContextWithMeta {
    #[serde(flatten)]
    pub context: Context,
    pub starred: bool,
    pub mine: bool,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateContextInput {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: Option<String>,
}

/// A public listing joined with its context row for display.
#[derive(Debug, Clone, Serialize, TS)]
pub struct PublicContextListing {
    pub public_id: Uuid,
    pub context: Context,
    pub created_by: Uuid,
}

fn matches_filter(context: &Context, filter: &ContextFilter) -> bool {
    if let Some(query) = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let needle = query.to_lowercase();
        let name_hit = context.name.to_lowercase().contains(&needle);
        let description_hit = context
            .description
            .as_deref()
            .map(|d| d.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if !name_hit && !description_hit {
            return false;
        }
    }
    if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let tag = tag.to_lowercase();
        if !context.tags.0.iter().any(|t| t == &tag) {
            return false;
        }
    }
    true
}

pub async fn list_contexts(
    pool: &SqlitePool,
    user_id: Uuid,
    filter: &ContextFilter,
) -> Result<Vec<Context>, LibraryError> {
    let rows = match filter.scope.unwrap_or(ContextScope::All) {
        ContextScope::All => Context::find_all(pool).await?,
        ContextScope::Mine => Context::find_by_creator(pool, user_id).await?,
        ContextScope::Starred => Context::find_starred_by(pool, user_id).await?,
    };
    Ok(rows.into_iter().filter(|c| matches_filter(c, filter)).collect())
}

pub async fn list_contexts_with_meta(
    pool: &SqlitePool,
    user_id: Uuid,
    filter: &ContextFilter,
) -> Result<Vec<ContextWithMeta>, LibraryError> {
    let contexts = list_contexts(pool, user_id, filter).await?;
    let starred = ContextStar::context_ids_for_user(pool, user_id).await?;
    Ok(contexts
        .into_iter()
        .map(|context| ContextWithMeta {
            starred: starred.contains(&context.id),
            mine: context.created_by == user_id,
            context,
        })
        .collect())
}

/// Manual authoring path, bypassing the generator.
pub async fn create_context(
    pool: &SqlitePool,
    user_id: Uuid,
    input: CreateContextInput,
) -> Result<Context, LibraryError> {
    if input.name.trim().is_empty() {
        return Err(LibraryError::Validation("name must not be empty".to_string()));
    }
    if input.content.trim().is_empty() {
        return Err(LibraryError::Validation("content must not be empty".to_string()));
    }

    let tags = input
        .tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    Ok(Context::create(
        pool,
        &CreateContext {
            name: input.name.trim().to_string(),
            content: input.content,
            tags,
            description: input.description,
            created_by: user_id,
        },
        Uuid::new_v4(),
    )
    .await?)
}

/// Flip the caller's star; returns the resulting liked state. Calling twice
/// returns to the original state.
pub async fn toggle_star(
    pool: &SqlitePool,
    user_id: Uuid,
    context_id: Uuid,
) -> Result<bool, LibraryError> {
    if Context::find_by_id(pool, context_id).await?.is_none() {
        return Err(LibraryError::NotFound("context"));
    }

    if ContextStar::exists(pool, user_id, context_id).await? {
        ContextStar::unstar(pool, user_id, context_id).await?;
        Ok(false)
    } else {
        ContextStar::star(pool, user_id, context_id).await?;
        Ok(true)
    }
}

/// Owner-only delete. Returns whether a row was actually removed; an
/// already-deleted context is not an error.
pub async fn delete_context(
    pool: &SqlitePool,
    user_id: Uuid,
    context_id: Uuid,
) -> Result<bool, LibraryError> {
    let Some(context) = Context::find_by_id(pool, context_id).await? else {
        return Ok(false);
    };
    if !authz::can_mutate(context.created_by, user_id) {
        return Err(LibraryError::Forbidden);
    }
    Ok(Context::delete(pool, context_id).await? > 0)
}

/// Idempotent publish: re-publishing returns the existing listing.
pub async fn publish_context(
    pool: &SqlitePool,
    user_id: Uuid,
    context_id: Uuid,
) -> Result<PublicContext, LibraryError> {
    let Some(context) = Context::find_by_id(pool, context_id).await? else {
        return Err(LibraryError::NotFound("context"));
    };
    if !authz::can_mutate(context.created_by, user_id) {
        return Err(LibraryError::Forbidden);
    }

    if let Some(existing) = PublicContext::find_by_context_id(pool, context_id).await? {
        return Ok(existing);
    }
    Ok(PublicContext::create(pool, context_id, user_id, Uuid::new_v4()).await?)
}

/// Permitted for the original publisher or the context's current owner.
pub async fn unpublish_context(
    pool: &SqlitePool,
    user_id: Uuid,
    public_id: Uuid,
) -> Result<(), LibraryError> {
    let Some(listing) = PublicContext::find_by_id(pool, public_id).await? else {
        return Err(LibraryError::NotFound("public context"));
    };

    let owner_allowed = match Context::find_by_id(pool, listing.context_id).await? {
        Some(context) => authz::can_mutate(context.created_by, user_id),
        None => false,
    };
    if !authz::can_mutate(listing.created_by, user_id) && !owner_allowed {
        return Err(LibraryError::Forbidden);
    }

    PublicContext::delete(pool, public_id).await?;
    Ok(())
}

/// Copy a public listing into a new context owned by the importer. The
/// original and its listing are untouched.
pub async fn import_public_context(
    pool: &SqlitePool,
    user_id: Uuid,
    public_id: Uuid,
) -> Result<Context, LibraryError> {
    let Some(listing) = PublicContext::find_by_id(pool, public_id).await? else {
        return Err(LibraryError::NotFound("public context"));
    };
    let Some(source) = Context::find_by_id(pool, listing.context_id).await? else {
        return Err(LibraryError::NotFound("context"));
    };

    Ok(Context::create(
        pool,
        &CreateContext {
            name: source.name.clone(),
            content: source.content.clone(),
            tags: source.tags.0.clone(),
            description: source.description.clone(),
            created_by: user_id,
        },
        Uuid::new_v4(),
    )
    .await?)
}

pub async fn list_public_contexts(
    pool: &SqlitePool,
) -> Result<Vec<PublicContextListing>, LibraryError> {
    let listings = PublicContext::find_all(pool).await?;
    let mut out = Vec::with_capacity(listings.len());
    for listing in listings {
        // Orphaned rows cannot occur under cascade delete, but a missing
        // context still reads as "listing absent" rather than an error.
        if let Some(context) = Context::find_by_id(pool, listing.context_id).await? {
            out.push(PublicContextListing {
                public_id: listing.id,
                context,
                created_by: listing.created_by,
            });
        }
    }
    Ok(out)
}
