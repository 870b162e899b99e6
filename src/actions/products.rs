use chrono::Utc;

use super::{delete_by_id, exists, optional_text, or_empty, required, ActionError, ActionResult};
use crate::db::Db;
use crate::models::{new_id, Product, ProductInput, LOW_STOCK_THRESHOLD};

pub(crate) const SELECT_PRODUCT: &str =
    "SELECT id, name, category, price, stock, description FROM products";

pub async fn get_all(db: &Db) -> Vec<Product> {
    or_empty(
        db.fetch_all(&format!("{SELECT_PRODUCT} ORDER BY name"), &[])
            .await,
        "products",
    )
}

pub async fn get_by_id(db: &Db, id: &str) -> Option<Product> {
    or_empty(
        db.fetch_optional(&format!("{SELECT_PRODUCT} WHERE id = ?"), &[id.into()])
            .await,
        "product",
    )
}

pub async fn low_stock(db: &Db) -> Vec<Product> {
    or_empty(
        db.fetch_all(
            &format!("{SELECT_PRODUCT} WHERE stock < ? ORDER BY stock, name"),
            &[LOW_STOCK_THRESHOLD.into()],
        )
        .await,
        "low-stock products",
    )
}

fn validate(input: &ProductInput) -> ActionResult<String> {
    let name = required(&input.name, "Name")?;
    if !input.price.is_finite() || input.price < 0.0 {
        return Err(ActionError::validation("Price must not be negative"));
    }
    if input.stock < 0 {
        return Err(ActionError::validation("Stock must not be negative"));
    }
    Ok(name)
}

pub async fn create(db: &Db, input: ProductInput) -> ActionResult<Product> {
    let name = validate(&input)?;
    let id = new_id();
    db.execute(
        "INSERT INTO products (id, name, category, price, stock, description, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        &[
            id.as_str().into(),
            name.into(),
            optional_text(input.category),
            input.price.into(),
            input.stock.into(),
            optional_text(input.description),
            Utc::now().to_rfc3339().into(),
        ],
    )
    .await?;
    log::info!("Created product {id}");

    get_by_id(db, &id)
        .await
        .ok_or_else(|| ActionError::not_found("Product", &id))
}

pub async fn update(db: &Db, id: &str, input: ProductInput) -> ActionResult<Product> {
    if !exists(db, "products", id).await? {
        return Err(ActionError::not_found("Product", id));
    }
    let name = validate(&input)?;
    db.execute(
        "UPDATE products SET name = ?, category = ?, price = ?, stock = ?, description = ? WHERE id = ?",
        &[
            name.into(),
            optional_text(input.category),
            input.price.into(),
            input.stock.into(),
            optional_text(input.description),
            id.into(),
        ],
    )
    .await?;

    get_by_id(db, id)
        .await
        .ok_or_else(|| ActionError::not_found("Product", id))
}

pub async fn delete(db: &Db, id: &str) -> ActionResult<()> {
    delete_by_id(db, "products", "Product", id).await
}

/// Adds `delta` (which may be negative) to the stock count; never goes below zero.
pub async fn adjust_stock(db: &Db, id: &str, delta: i64) -> ActionResult<Product> {
    let affected = db
        .execute(
            "UPDATE products SET stock = stock + ? WHERE id = ? AND stock + ? >= 0",
            &[delta.into(), id.into(), delta.into()],
        )
        .await?;

    if affected == 0 {
        return match get_by_id(db, id).await {
            Some(product) => Err(ActionError::validation(format!(
                "Insufficient stock for {}: {} available",
                product.name, product.stock
            ))),
            None => Err(ActionError::not_found("Product", id)),
        };
    }

    get_by_id(db, id)
        .await
        .ok_or_else(|| ActionError::not_found("Product", id))
}
