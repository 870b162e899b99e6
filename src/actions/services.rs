use chrono::Utc;

use super::{delete_by_id, exists, optional_text, or_empty, required, ActionError, ActionResult};
use crate::db::Db;
use crate::models::{new_id, Service, ServiceInput};

const SELECT_SERVICE: &str = "SELECT id, name, duration, price, description FROM services";

pub async fn get_all(db: &Db) -> Vec<Service> {
    or_empty(
        db.fetch_all(&format!("{SELECT_SERVICE} ORDER BY name"), &[])
            .await,
        "services",
    )
}

pub async fn get_by_id(db: &Db, id: &str) -> Option<Service> {
    or_empty(
        db.fetch_optional(&format!("{SELECT_SERVICE} WHERE id = ?"), &[id.into()])
            .await,
        "service",
    )
}

fn validate(input: &ServiceInput) -> ActionResult<String> {
    let name = required(&input.name, "Name")?;
    if input.duration <= 0 {
        return Err(ActionError::validation("Duration must be a positive number of minutes"));
    }
    if !input.price.is_finite() || input.price < 0.0 {
        return Err(ActionError::validation("Price must not be negative"));
    }
    Ok(name)
}

pub async fn create(db: &Db, input: ServiceInput) -> ActionResult<Service> {
    let name = validate(&input)?;
    let id = new_id();
    db.execute(
        "INSERT INTO services (id, name, duration, price, description, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        &[
            id.as_str().into(),
            name.into(),
            input.duration.into(),
            input.price.into(),
            optional_text(input.description),
            Utc::now().to_rfc3339().into(),
        ],
    )
    .await?;
    log::info!("Created service {id}");

    get_by_id(db, &id)
        .await
        .ok_or_else(|| ActionError::not_found("Service", &id))
}

pub async fn update(db: &Db, id: &str, input: ServiceInput) -> ActionResult<Service> {
    if !exists(db, "services", id).await? {
        return Err(ActionError::not_found("Service", id));
    }
    let name = validate(&input)?;
    db.execute(
        "UPDATE services SET name = ?, duration = ?, price = ?, description = ? WHERE id = ?",
        &[
            name.into(),
            input.duration.into(),
            input.price.into(),
            optional_text(input.description),
            id.into(),
        ],
    )
    .await?;

    get_by_id(db, id)
        .await
        .ok_or_else(|| ActionError::not_found("Service", id))
}

pub async fn delete(db: &Db, id: &str) -> ActionResult<()> {
    delete_by_id(db, "services", "Service", id).await
}

pub(crate) async fn first(db: &Db) -> ActionResult<Option<Service>> {
    Ok(db
        .fetch_optional(&format!("{SELECT_SERVICE} ORDER BY rowid LIMIT 1"), &[])
        .await?)
}
