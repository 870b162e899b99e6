use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Sqlite, SqliteConnection, Transaction};

use super::customers::RECORD_VISIT;
use super::products::SELECT_PRODUCT;
use super::{
    clean, exists, format_date, or_empty, parse_date, required, today, ActionError, ActionResult,
};
use crate::db::executor::{arguments, is_schema_mismatch, log_success, SqlValue};
use crate::db::Db;
use crate::models::{
    new_id, round_cents, CartItem, CheckoutRequest, NewSale, NewSaleItem, Product, Sale, SaleItem,
    SaleUpdate, SALE_TYPE_PRODUCT, SALE_TYPE_SERVICE,
};

const SELECT_SALE: &str = r#"SELECT s.id, s.customer_id, c.name AS customer_name, s.date, s.total,
       s.payment_method, s.type
FROM sales s
LEFT JOIN customers c ON c.id = s.customer_id"#;

const SELECT_ITEM: &str =
    "SELECT id, sale_id, item_id, item_type, name, price, quantity FROM sale_items";

const INSERT_ITEM: &str = "INSERT INTO sale_items (id, sale_id, item_id, item_type, name, price, quantity) VALUES (?, ?, ?, ?, ?, ?, ?)";

/// Column set of `sale_items` before item typing was introduced.
const INSERT_LEGACY_ITEM: &str =
    "INSERT INTO sale_items (id, sale_id, product_id, price, qty) VALUES (?, ?, ?, ?, ?)";

pub async fn get_all(db: &Db) -> Vec<Sale> {
    let mut sales: Vec<Sale> = or_empty(
        db.fetch_all(
            &format!("{SELECT_SALE} ORDER BY s.date DESC, s.created_at DESC"),
            &[],
        )
        .await,
        "sales",
    );
    if sales.is_empty() {
        return sales;
    }

    let items: Vec<SaleItem> = or_empty(
        db.fetch_all(&format!("{SELECT_ITEM} ORDER BY rowid"), &[]).await,
        "sale items",
    );
    let mut by_sale: HashMap<String, Vec<SaleItem>> = HashMap::new();
    for item in items {
        by_sale.entry(item.sale_id.clone()).or_default().push(item);
    }
    for sale in &mut sales {
        sale.items = by_sale.remove(&sale.id).unwrap_or_default();
    }
    sales
}

pub async fn get_by_id(db: &Db, id: &str) -> Option<Sale> {
    let mut sale: Sale = or_empty(
        db.fetch_optional(&format!("{SELECT_SALE} WHERE s.id = ?"), &[id.into()])
            .await,
        "sale",
    )?;
    sale.items = or_empty(
        db.fetch_all(
            &format!("{SELECT_ITEM} WHERE sale_id = ? ORDER BY rowid"),
            &[id.into()],
        )
        .await,
        "sale items",
    );
    Some(sale)
}

/// Records a sale and its items in one transaction.
pub async fn create(db: &Db, sale: NewSale) -> ActionResult<Sale> {
    validate_new_sale(&sale)?;

    let mut tx = db.pool().begin().await?;
    let result = create_in(&mut tx, &sale).await;
    let id = finish(tx, result).await?;
    log::info!("Recorded {} sale {id}", sale.sale_type);

    get_by_id(db, &id)
        .await
        .ok_or_else(|| ActionError::not_found("Sale", &id))
}

async fn create_in(conn: &mut SqliteConnection, sale: &NewSale) -> ActionResult<String> {
    if let Some(customer_id) = sale.customer_id.as_deref() {
        let known: Option<(String,)> =
            fetch_optional(conn, "SELECT id FROM customers WHERE id = ?", &[customer_id.into()])
                .await?;
        if known.is_none() {
            return Err(ActionError::validation(format!("Unknown customer {customer_id}")));
        }
    }
    insert_sale(conn, sale).await
}

pub async fn update(db: &Db, id: &str, update: SaleUpdate) -> ActionResult<Sale> {
    if !exists(db, "sales", id).await? {
        return Err(ActionError::not_found("Sale", id));
    }
    let date = match update.date.as_deref() {
        Some(date) => Some(format_date(parse_date(date)?)),
        None => None,
    };
    db.execute(
        "UPDATE sales SET payment_method = COALESCE(?, payment_method), date = COALESCE(?, date) WHERE id = ?",
        &[clean(update.payment_method).into(), date.into(), id.into()],
    )
    .await?;

    get_by_id(db, id)
        .await
        .ok_or_else(|| ActionError::not_found("Sale", id))
}

pub async fn delete(db: &Db, id: &str) -> ActionResult<()> {
    if !exists(db, "sales", id).await? {
        return Err(ActionError::not_found("Sale", id));
    }
    db.execute("DELETE FROM sale_items WHERE sale_id = ?", &[id.into()])
        .await?;
    db.execute("DELETE FROM sales WHERE id = ?", &[id.into()])
        .await?;
    log::info!("Deleted sale {id}");
    Ok(())
}

/// Sells products to a customer: checks stock, records the sale and its items,
/// decrements stock and bumps the customer's visit stats, all or nothing.
pub async fn checkout_products(db: &Db, request: CheckoutRequest) -> ActionResult<Sale> {
    let payment_method = required(&request.payment_method, "Payment method")?;
    let customer_id = required(&request.customer_id, "Customer")?;
    if request.items.is_empty() {
        return Err(ActionError::validation("Cart is empty"));
    }
    if let Some(item) = request.items.iter().find(|item| item.quantity <= 0) {
        return Err(ActionError::validation(format!(
            "Quantity for product {} must be positive",
            item.product_id
        )));
    }
    let lines = merge_lines(&request.items)?;

    let mut tx = db.pool().begin().await?;
    let result = checkout_in(&mut tx, &customer_id, &lines, &payment_method).await;
    let id = finish(tx, result).await.map_err(|err| {
        log::warn!("Checkout for customer {customer_id} rolled back: {err}");
        err
    })?;
    log::info!("Checkout completed: sale {id}");

    get_by_id(db, &id)
        .await
        .ok_or_else(|| ActionError::not_found("Sale", &id))
}

async fn checkout_in(
    conn: &mut SqliteConnection,
    customer_id: &str,
    lines: &[(String, i64)],
    payment_method: &str,
) -> ActionResult<String> {
    let customer: Option<(String,)> =
        fetch_optional(conn, "SELECT id FROM customers WHERE id = ?", &[customer_id.into()])
            .await?;
    if customer.is_none() {
        return Err(ActionError::validation(format!("Unknown customer {customer_id}")));
    }

    let mut items = Vec::with_capacity(lines.len());
    for (product_id, quantity) in lines {
        let product: Option<Product> = fetch_optional(
            conn,
            &format!("{SELECT_PRODUCT} WHERE id = ?"),
            &[product_id.into()],
        )
        .await?;
        let product = product
            .ok_or_else(|| ActionError::validation(format!("Unknown product {product_id}")))?;
        if product.stock < *quantity {
            return Err(ActionError::validation(format!(
                "Insufficient stock for {}: {} available, {} requested",
                product.name, product.stock, quantity
            )));
        }
        items.push(NewSaleItem {
            item_id: Some(product.id),
            item_type: SALE_TYPE_PRODUCT.to_string(),
            name: Some(product.name),
            price: product.price,
            quantity: *quantity,
        });
    }

    let date = format_date(today());
    let sale = NewSale {
        customer_id: Some(customer_id.to_string()),
        date: date.clone(),
        payment_method: Some(payment_method.to_string()),
        sale_type: SALE_TYPE_PRODUCT.to_string(),
        items,
    };
    let sale_id = insert_sale(conn, &sale).await?;

    for item in &sale.items {
        let affected = run(
            conn,
            "UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?",
            &[item.quantity.into(), item.item_id.clone().into(), item.quantity.into()],
        )
        .await?;
        if affected == 0 {
            return Err(ActionError::validation(format!(
                "Insufficient stock for {}",
                item.name.as_deref().unwrap_or("product")
            )));
        }
    }

    run(conn, RECORD_VISIT, &[date.into(), customer_id.into()]).await?;
    Ok(sale_id)
}

/// Sums quantities of repeated products, keeping first-seen order.
fn merge_lines(items: &[CartItem]) -> ActionResult<Vec<(String, i64)>> {
    let mut lines: Vec<(String, i64)> = Vec::new();
    for item in items {
        let id = item.product_id.trim();
        match lines.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, quantity)) => {
                *quantity = quantity.checked_add(item.quantity).ok_or_else(|| {
                    ActionError::validation(format!("Quantity too large for product {id}"))
                })?;
            }
            None => lines.push((id.to_string(), item.quantity)),
        }
    }
    Ok(lines)
}

fn validate_new_sale(sale: &NewSale) -> ActionResult<()> {
    if sale.sale_type != SALE_TYPE_SERVICE && sale.sale_type != SALE_TYPE_PRODUCT {
        return Err(ActionError::validation(format!(
            "Unknown sale type '{}'",
            sale.sale_type
        )));
    }
    parse_date(&sale.date)?;
    if sale.items.is_empty() {
        return Err(ActionError::validation("A sale needs at least one item"));
    }
    for item in &sale.items {
        if item.quantity <= 0 {
            return Err(ActionError::validation("Item quantity must be positive"));
        }
        if !item.price.is_finite() || item.price < 0.0 {
            return Err(ActionError::validation("Item price must not be negative"));
        }
    }
    Ok(())
}

async fn insert_sale(conn: &mut SqliteConnection, sale: &NewSale) -> ActionResult<String> {
    let id = new_id();
    let total = round_cents(sale.items.iter().map(NewSaleItem::line_total).sum());
    run(
        conn,
        "INSERT INTO sales (id, customer_id, date, total, payment_method, type, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        &[
            id.as_str().into(),
            sale.customer_id.clone().into(),
            sale.date.as_str().into(),
            total.into(),
            sale.payment_method.clone().into(),
            sale.sale_type.as_str().into(),
            Utc::now().to_rfc3339().into(),
        ],
    )
    .await?;

    for item in &sale.items {
        insert_item(conn, &id, item).await?;
    }
    Ok(id)
}

async fn insert_item(
    conn: &mut SqliteConnection,
    sale_id: &str,
    item: &NewSaleItem,
) -> ActionResult<()> {
    let id = new_id();
    let current = run(
        conn,
        INSERT_ITEM,
        &[
            id.as_str().into(),
            sale_id.into(),
            item.item_id.clone().into(),
            item.item_type.as_str().into(),
            item.name.clone().into(),
            item.price.into(),
            item.quantity.into(),
        ],
    )
    .await;

    match current {
        Ok(_) => Ok(()),
        Err(err) if is_schema_mismatch(&err) => {
            log::warn!("sale_items uses the legacy layout ({err}); retrying with legacy columns");
            run(
                conn,
                INSERT_LEGACY_ITEM,
                &[
                    id.as_str().into(),
                    sale_id.into(),
                    item.item_id.clone().into(),
                    item.price.into(),
                    item.quantity.into(),
                ],
            )
            .await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn finish<T>(tx: Transaction<'_, Sqlite>, result: ActionResult<T>) -> ActionResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                log::error!("Rollback failed: {rollback}");
            }
            Err(err)
        }
    }
}

async fn run(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<u64, sqlx::Error> {
    let started = Instant::now();
    let done = sqlx::query_with::<Sqlite, _>(sql, arguments(params)?)
        .execute(&mut *conn)
        .await?;
    log_success(sql, started, done.rows_affected());
    Ok(done.rows_affected())
}

async fn fetch_optional<T>(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[SqlValue],
) -> Result<Option<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let started = Instant::now();
    let row = sqlx::query_as_with::<Sqlite, T, _>(sql, arguments(params)?)
        .fetch_optional(&mut *conn)
        .await?;
    log_success(sql, started, u64::from(row.is_some()));
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{customers, products, testing};
    use crate::config::RetryPolicy;
    use crate::db::schema;
    use crate::models::{CustomerInput, ProductInput};

    struct Shop {
        db: Db,
        customer_id: String,
        product_id: String,
    }

    async fn shop_with_stock(db: Db, stock: i64) -> Shop {
        let customer = customers::create(
            &db,
            CustomerInput {
                name: "Lena Park".to_string(),
                ..CustomerInput::default()
            },
        )
        .await
        .unwrap();
        let product = products::create(
            &db,
            ProductInput {
                name: "Matte Clay Pomade".to_string(),
                category: Some("styling".to_string()),
                price: 18.5,
                stock,
                description: None,
            },
        )
        .await
        .unwrap();
        Shop {
            db,
            customer_id: customer.id,
            product_id: product.id,
        }
    }

    fn cart(shop: &Shop, quantity: i64) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: shop.customer_id.clone(),
            items: vec![CartItem {
                product_id: shop.product_id.clone(),
                quantity,
            }],
            payment_method: "card".to_string(),
        }
    }

    async fn stock_of(shop: &Shop) -> i64 {
        products::get_by_id(&shop.db, &shop.product_id)
            .await
            .unwrap()
            .stock
    }

    async fn sale_count(db: &Db) -> i64 {
        db.count("SELECT COUNT(*) FROM sales", &[]).await
    }

    #[tokio::test]
    async fn checkout_decrements_stock_and_records_one_sale() {
        let shop = shop_with_stock(testing::db().await, 5).await;

        let sale = checkout_products(&shop.db, cart(&shop, 3)).await.unwrap();

        assert_eq!(stock_of(&shop).await, 2);
        assert_eq!(sale.total, 55.5);
        assert_eq!(sale.sale_type, SALE_TYPE_PRODUCT);
        assert_eq!(sale.customer_name.as_deref(), Some("Lena Park"));
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.items[0].sale_id, sale.id);
        assert_eq!(sale.items[0].item_id.as_deref(), Some(shop.product_id.as_str()));
        assert_eq!(sale.items[0].quantity, 3);
        assert_eq!(sale_count(&shop.db).await, 1);
        let items = shop
            .db
            .count(
                "SELECT COUNT(*) FROM sale_items WHERE sale_id = ?",
                &[sale.id.as_str().into()],
            )
            .await;
        assert_eq!(items, 1);

        let customer = customers::get_by_id(&shop.db, &shop.customer_id).await.unwrap();
        assert_eq!(customer.visit_count, 1);
        assert_eq!(customer.last_visit, Some(sale.date));
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back() {
        let shop = shop_with_stock(testing::db().await, 5).await;

        let err = checkout_products(&shop.db, cart(&shop, 6)).await.unwrap_err();

        assert!(matches!(err, ActionError::Validation(_)));
        assert_eq!(stock_of(&shop).await, 5);
        assert_eq!(sale_count(&shop.db).await, 0);
        assert_eq!(shop.db.count("SELECT COUNT(*) FROM sale_items", &[]).await, 0);
        let customer = customers::get_by_id(&shop.db, &shop.customer_id).await.unwrap();
        assert_eq!(customer.visit_count, 0);
    }

    #[tokio::test]
    async fn repeated_lines_are_checked_against_stock_together() {
        let shop = shop_with_stock(testing::db().await, 5).await;
        let mut request = cart(&shop, 3);
        request.items.push(CartItem {
            product_id: shop.product_id.clone(),
            quantity: 3,
        });

        assert!(checkout_products(&shop.db, request).await.is_err());
        assert_eq!(stock_of(&shop).await, 5);
    }

    #[tokio::test]
    async fn unknown_product_later_in_cart_rolls_back_everything() {
        let shop = shop_with_stock(testing::db().await, 5).await;
        let mut request = cart(&shop, 1);
        request.items.push(CartItem {
            product_id: "missing".to_string(),
            quantity: 1,
        });

        let err = checkout_products(&shop.db, request).await.unwrap_err();
        assert!(err.to_string().contains("Unknown product"));
        assert_eq!(stock_of(&shop).await, 5);
        assert_eq!(sale_count(&shop.db).await, 0);
    }

    #[tokio::test]
    async fn unknown_customer_and_empty_cart_are_rejected() {
        let shop = shop_with_stock(testing::db().await, 5).await;

        let mut request = cart(&shop, 1);
        request.customer_id = "missing".to_string();
        let err = checkout_products(&shop.db, request).await.unwrap_err();
        assert!(err.to_string().contains("Unknown customer"));

        let mut request = cart(&shop, 1);
        request.items.clear();
        assert!(matches!(
            checkout_products(&shop.db, request).await,
            Err(ActionError::Validation(_))
        ));

        assert!(matches!(
            checkout_products(&shop.db, cart(&shop, 0)).await,
            Err(ActionError::Validation(_))
        ));
        assert_eq!(sale_count(&shop.db).await, 0);
        assert_eq!(stock_of(&shop).await, 5);
    }

    #[tokio::test]
    async fn legacy_sale_items_layout_still_accepts_checkout() {
        let db = Db::in_memory(RetryPolicy::none()).await.unwrap();
        assert!(schema::initialize(&db).await);
        db.execute("DROP TABLE sale_items", &[]).await.unwrap();
        db.execute(
            "CREATE TABLE sale_items (id TEXT PRIMARY KEY, sale_id TEXT NOT NULL, product_id TEXT, price REAL NOT NULL DEFAULT 0, qty INTEGER NOT NULL DEFAULT 1)",
            &[],
        )
        .await
        .unwrap();
        let shop = shop_with_stock(db, 5).await;

        checkout_products(&shop.db, cart(&shop, 2)).await.unwrap();

        let row: Option<(String, i64)> = shop
            .db
            .fetch_optional("SELECT product_id, qty FROM sale_items", &[])
            .await
            .unwrap();
        assert_eq!(row, Some((shop.product_id.clone(), 2)));
        assert_eq!(stock_of(&shop).await, 3);
    }

    #[tokio::test]
    async fn direct_sale_update_and_delete() {
        let shop = shop_with_stock(testing::db().await, 5).await;
        let sale = create(
            &shop.db,
            NewSale {
                customer_id: Some(shop.customer_id.clone()),
                date: "2030-03-01".to_string(),
                payment_method: Some("cash".to_string()),
                sale_type: SALE_TYPE_SERVICE.to_string(),
                items: vec![NewSaleItem {
                    item_id: None,
                    item_type: SALE_TYPE_SERVICE.to_string(),
                    name: Some("Signature Cut".to_string()),
                    price: 35.0,
                    quantity: 1,
                }],
            },
        )
        .await
        .unwrap();
        assert_eq!(sale.total, 35.0);
        assert_eq!(get_all(&shop.db).await[0].items.len(), 1);

        let updated = update(
            &shop.db,
            &sale.id,
            SaleUpdate {
                payment_method: Some("card".to_string()),
                date: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.payment_method.as_deref(), Some("card"));
        assert_eq!(updated.date, "2030-03-01");

        delete(&shop.db, &sale.id).await.unwrap();
        assert!(get_by_id(&shop.db, &sale.id).await.is_none());
        assert_eq!(shop.db.count("SELECT COUNT(*) FROM sale_items", &[]).await, 0);
    }

    #[tokio::test]
    async fn direct_sale_for_unknown_customer_is_rejected() {
        let db = testing::db().await;
        let result = create(
            &db,
            NewSale {
                customer_id: Some("missing".to_string()),
                date: "2030-03-01".to_string(),
                payment_method: None,
                sale_type: SALE_TYPE_PRODUCT.to_string(),
                items: vec![NewSaleItem {
                    item_id: None,
                    item_type: SALE_TYPE_PRODUCT.to_string(),
                    name: None,
                    price: 1.0,
                    quantity: 1,
                }],
            },
        )
        .await;
        assert!(matches!(result, Err(ActionError::Validation(_))));
        assert_eq!(sale_count(&db).await, 0);
    }

    #[tokio::test]
    async fn missing_sale_fails_softly() {
        let db = testing::db().await;
        assert!(matches!(
            delete(&db, "missing").await,
            Err(ActionError::NotFound { .. })
        ));
        assert!(matches!(
            update(&db, "missing", SaleUpdate::default()).await,
            Err(ActionError::NotFound { .. })
        ));
    }

    fn line(product_id: &str, quantity: i64) -> CartItem {
        CartItem {
            product_id: product_id.to_string(),
            quantity,
        }
    }

    #[test]
    fn merges_repeated_products() {
        let items = vec![line("b", 1), line("a", 2), line(" b ", 3)];
        assert_eq!(
            merge_lines(&items).unwrap(),
            vec![("b".to_string(), 4), ("a".to_string(), 2)]
        );
    }

    #[test]
    fn merging_huge_quantities_is_rejected() {
        let items = vec![line("b", i64::MAX), line("b", i64::MAX)];
        assert!(matches!(merge_lines(&items), Err(ActionError::Validation(_))));
    }

    #[tokio::test]
    async fn overflowing_cart_leaves_stock_untouched() {
        let shop = shop_with_stock(testing::db().await, 5).await;
        let mut request = cart(&shop, i64::MAX);
        request.items.push(CartItem {
            product_id: shop.product_id.clone(),
            quantity: i64::MAX,
        });

        let err = checkout_products(&shop.db, request).await.unwrap_err();
        assert!(err.to_string().contains("Quantity too large"));
        assert_eq!(stock_of(&shop).await, 5);
        assert_eq!(sale_count(&shop.db).await, 0);
    }
}
