use std::collections::BTreeSet;

use afscheid_auth::new_public_id;
use sqlx::{FromRow, SqlitePool};
use tracing::info;

use super::error::{is_unique_violation, ServiceError};
use super::users::require_by_public_id;
use crate::routes::models::{ClientListQuery, CreateClientRequest, DirectorClient, UpdateClientRequest};
use crate::util::{clean_optional, now_rfc3339, Page, PageRequest};

pub const CLIENT_STATUSES: &[&str] = &["lead", "active", "completed", "archived"];
pub const MAX_TAGS: usize = 20;

const CLIENT_SELECT: &str = r#"
    SELECT c.public_id AS id, f.public_id AS family_id, f.full_name AS family_name,
           f.email AS family_email, f.phone AS family_phone, c.status, c.tags, c.notes,
           c.created_at, c.updated_at
    FROM director_clients c
    JOIN users f ON f.id = c.family_id
"#;

#[derive(Debug, FromRow)]
struct ClientRow {
    id: String,
    family_id: String,
    family_name: String,
    family_email: String,
    family_phone: Option<String>,
    status: String,
    tags: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ClientRow {
    fn into_client(self) -> Result<DirectorClient, ServiceError> {
        Ok(DirectorClient {
            tags: serde_json::from_str(&self.tags)?,
            id: self.id,
            family_id: self.family_id,
            family_name: self.family_name,
            family_email: self.family_email,
            family_phone: self.family_phone,
            status: self.status,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Trim, lower-case and de-duplicate tags, keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, ServiceError> {
    let mut seen = BTreeSet::new();
    let normalized: Vec<String> = tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect();

    if normalized.len() > MAX_TAGS {
        return Err(ServiceError::bad_request(format!(
            "at most {MAX_TAGS} tags are allowed"
        )));
    }
    Ok(normalized)
}

fn validate_status(status: Option<String>) -> Result<Option<String>, ServiceError> {
    let status = clean_optional(status).map(|value| value.to_lowercase());
    if let Some(value) = &status {
        if !CLIENT_STATUSES.contains(&value.as_str()) {
            return Err(ServiceError::bad_request(format!(
                "status must be one of {}",
                CLIENT_STATUSES.join(", ")
            )));
        }
    }
    Ok(status)
}

async fn get_client(pool: &SqlitePool, director_id: i64, public_id: &str) -> Result<DirectorClient, ServiceError> {
    sqlx::query_as::<_, ClientRow>(&format!(
        "{CLIENT_SELECT} WHERE c.public_id = ? AND c.director_id = ?"
    ))
    .bind(public_id)
    .bind(director_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("client not found"))?
    .into_client()
}

pub async fn list_clients(
    pool: &SqlitePool,
    director_id: i64,
    query: &ClientListQuery,
) -> Result<Page<DirectorClient>, ServiceError> {
    let page = PageRequest::new(query.page, query.limit);
    let status = validate_status(query.status.clone())?;
    let tag = clean_optional(query.tag.clone()).map(|value| value.to_lowercase());

    let filter = "c.director_id = ?
        AND (? IS NULL OR c.status = ?)
        AND (? IS NULL OR EXISTS (SELECT 1 FROM json_each(c.tags) t WHERE t.value = ?))";

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM director_clients c WHERE {filter}"))
        .bind(director_id)
        .bind(&status)
        .bind(&status)
        .bind(&tag)
        .bind(&tag)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, ClientRow>(&format!(
        "{CLIENT_SELECT} WHERE {filter} ORDER BY c.updated_at DESC, c.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(director_id)
    .bind(&status)
    .bind(&status)
    .bind(&tag)
    .bind(&tag)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let items = rows
        .into_iter()
        .map(ClientRow::into_client)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        items,
        pagination: page.with_total(total),
    })
}

pub async fn create_client(
    pool: &SqlitePool,
    director_id: i64,
    req: CreateClientRequest,
) -> Result<DirectorClient, ServiceError> {
    let family = require_by_public_id(pool, req.family_id.trim(), "family").await?;
    if family.role != "family" {
        return Err(ServiceError::bad_request("clients must be family accounts"));
    }

    let status = validate_status(req.status)?.unwrap_or_else(|| "lead".to_string());
    let tags = normalize_tags(&req.tags.unwrap_or_default())?;
    let public_id = new_public_id();
    let now = now_rfc3339();

    let inserted = sqlx::query(
        r#"
        INSERT INTO director_clients (public_id, director_id, family_id, status, tags, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(director_id)
    .bind(family.id)
    .bind(&status)
    .bind(serde_json::to_string(&tags)?)
    .bind(clean_optional(req.notes))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await;

    match inserted {
        Err(err) if is_unique_violation(&err) => {
            return Err(ServiceError::conflict("family is already a client"))
        }
        other => {
            other?;
        }
    }

    info!(client = %public_id, director_id, "director client added");
    get_client(pool, director_id, &public_id).await
}

pub async fn update_client(
    pool: &SqlitePool,
    director_id: i64,
    public_id: &str,
    req: UpdateClientRequest,
) -> Result<DirectorClient, ServiceError> {
    let current = get_client(pool, director_id, public_id).await?;

    let status = validate_status(req.status)?.unwrap_or(current.status);
    let tags = match req.tags {
        Some(tags) => normalize_tags(&tags)?,
        None => current.tags,
    };
    let notes = match req.notes {
        Some(notes) => clean_optional(Some(notes)),
        None => current.notes,
    };

    sqlx::query(
        "UPDATE director_clients SET status = ?, tags = ?, notes = ?, updated_at = ?
         WHERE public_id = ? AND director_id = ?",
    )
    .bind(&status)
    .bind(serde_json::to_string(&tags)?)
    .bind(&notes)
    .bind(now_rfc3339())
    .bind(public_id)
    .bind(director_id)
    .execute(pool)
    .await?;

    get_client(pool, director_id, public_id).await
}

/// Record (or reactivate) the relationship created by a booking.
pub async fn ensure_active_relationship(
    pool: &SqlitePool,
    director_id: i64,
    family_id: i64,
) -> Result<(), ServiceError> {
    let now = now_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO director_clients (public_id, director_id, family_id, status, tags, created_at, updated_at)
        VALUES (?, ?, ?, 'active', '[]', ?, ?)
        ON CONFLICT (director_id, family_id) DO UPDATE SET status = 'active', updated_at = excluded.updated_at
        "#,
    )
    .bind(new_public_id())
    .bind(director_id)
    .bind(family_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_utils::{create_director, create_test_db, create_test_user};

    #[test]
    fn tags_are_normalized() {
        let tags = normalize_tags(&[
            " Crematie ".into(),
            "crematie".into(),
            "".into(),
            "Spoed".into(),
        ])
        .unwrap();
        assert_eq!(tags, vec!["crematie", "spoed"]);

        let many: Vec<String> = (0..=MAX_TAGS).map(|i| format!("tag{i}")).collect();
        assert!(normalize_tags(&many).is_err());
    }

    #[tokio::test]
    async fn clients_are_unique_filtered_and_owned() {
        let (pool, _dir) = create_test_db().await;
        let director = create_director(&pool, "dir@example.com", 5_000, true).await;
        let rival = create_director(&pool, "rival@example.com", 5_000, true).await;
        let family = create_test_user(&pool, "familie@example.com", "family").await;

        let err = create_client(
            &pool,
            director.id,
            CreateClientRequest {
                family_id: rival.public_id.clone(),
                status: None,
                tags: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));

        let client = create_client(
            &pool,
            director.id,
            CreateClientRequest {
                family_id: family.public_id.clone(),
                status: None,
                tags: Some(vec!["Begrafenis".into()]),
                notes: Some("Belt dinsdag terug".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(client.status, "lead");
        assert_eq!(client.tags, vec!["begrafenis"]);

        let err = create_client(
            &pool,
            director.id,
            CreateClientRequest {
                family_id: family.public_id.clone(),
                status: None,
                tags: None,
                notes: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let tagged = list_clients(
            &pool,
            director.id,
            &ClientListQuery {
                tag: Some("BEGRAFENIS".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(tagged.pagination.total, 1);

        let untagged = list_clients(
            &pool,
            director.id,
            &ClientListQuery {
                tag: Some("crematie".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(untagged.pagination.total, 0);

        let err = update_client(&pool, rival.id, &client.id, UpdateClientRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let updated = update_client(
            &pool,
            director.id,
            &client.id,
            UpdateClientRequest {
                status: Some("completed".into()),
                tags: Some(vec!["Nazorg".into(), " nazorg".into()]),
                notes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, "completed");
        assert_eq!(updated.tags, vec!["nazorg"]);
        assert_eq!(updated.notes.as_deref(), Some("Belt dinsdag terug"));

        ensure_active_relationship(&pool, director.id, family.id).await.unwrap();
        let reactivated = get_client(&pool, director.id, &client.id).await.unwrap();
        assert_eq!(reactivated.status, "active");
    }
}
