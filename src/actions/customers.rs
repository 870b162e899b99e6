use chrono::Utc;

use super::{delete_by_id, exists, or_empty, optional_text, required, ActionError, ActionResult};
use crate::db::Db;
use crate::models::{new_id, Customer, CustomerInput};

const SELECT_CUSTOMER: &str =
    "SELECT id, name, phone, email, visit_count, last_visit FROM customers";

pub const RECORD_VISIT: &str =
    "UPDATE customers SET visit_count = visit_count + 1, last_visit = ? WHERE id = ?";

pub async fn get_all(db: &Db) -> Vec<Customer> {
    or_empty(
        db.fetch_all(&format!("{SELECT_CUSTOMER} ORDER BY name"), &[])
            .await,
        "customers",
    )
}

pub async fn get_by_id(db: &Db, id: &str) -> Option<Customer> {
    or_empty(
        db.fetch_optional(&format!("{SELECT_CUSTOMER} WHERE id = ?"), &[id.into()])
            .await,
        "customer",
    )
}

/// Customer signup.
pub async fn create(db: &Db, input: CustomerInput) -> ActionResult<Customer> {
    let name = required(&input.name, "Name")?;
    let id = new_id();
    db.execute(
        "INSERT INTO customers (id, name, phone, email, visit_count, created_at) VALUES (?, ?, ?, ?, 0, ?)",
        &[
            id.as_str().into(),
            name.into(),
            optional_text(input.phone),
            optional_text(input.email),
            Utc::now().to_rfc3339().into(),
        ],
    )
    .await?;
    log::info!("Created customer {id}");

    get_by_id(db, &id)
        .await
        .ok_or_else(|| ActionError::not_found("Customer", &id))
}

pub async fn update(db: &Db, id: &str, input: CustomerInput) -> ActionResult<Customer> {
    if !exists(db, "customers", id).await? {
        return Err(ActionError::not_found("Customer", id));
    }
    let name = required(&input.name, "Name")?;
    db.execute(
        "UPDATE customers SET name = ?, phone = ?, email = ? WHERE id = ?",
        &[
            name.into(),
            optional_text(input.phone),
            optional_text(input.email),
            id.into(),
        ],
    )
    .await?;

    get_by_id(db, id)
        .await
        .ok_or_else(|| ActionError::not_found("Customer", id))
}

/// Deleting a customer also removes their appointments.
pub async fn delete(db: &Db, id: &str) -> ActionResult<()> {
    delete_by_id(db, "customers", "Customer", id).await
}

/// The earliest-created customer, used when a booking names an unknown one.
pub(crate) async fn first(db: &Db) -> ActionResult<Option<Customer>> {
    Ok(db
        .fetch_optional(&format!("{SELECT_CUSTOMER} ORDER BY rowid LIMIT 1"), &[])
        .await?)
}
