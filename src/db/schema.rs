use super::connection::Db;

pub const CREATE_CUSTOMERS: &str = r#"CREATE TABLE IF NOT EXISTS customers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT,
    email TEXT,
    visit_count INTEGER NOT NULL DEFAULT 0,
    last_visit TEXT,
    created_at TEXT NOT NULL
)"#;

pub const CREATE_SERVICES: &str = r#"CREATE TABLE IF NOT EXISTS services (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    duration INTEGER NOT NULL DEFAULT 30,
    price REAL NOT NULL DEFAULT 0,
    description TEXT,
    created_at TEXT NOT NULL
)"#;

pub const CREATE_APPOINTMENTS: &str = r#"CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    service_id TEXT REFERENCES services(id) ON DELETE SET NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    duration INTEGER NOT NULL DEFAULT 30,
    status TEXT NOT NULL DEFAULT 'confirmed',
    notes TEXT,
    payment_status TEXT NOT NULL DEFAULT 'pending',
    payment_method TEXT,
    created_at TEXT NOT NULL
)"#;

pub const CREATE_PRODUCTS: &str = r#"CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    price REAL NOT NULL DEFAULT 0,
    stock INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    created_at TEXT NOT NULL
)"#;

pub const CREATE_SALES: &str = r#"CREATE TABLE IF NOT EXISTS sales (
    id TEXT PRIMARY KEY,
    customer_id TEXT REFERENCES customers(id) ON DELETE SET NULL,
    date TEXT NOT NULL,
    total REAL NOT NULL DEFAULT 0,
    payment_method TEXT,
    type TEXT NOT NULL DEFAULT 'service',
    created_at TEXT NOT NULL
)"#;

pub const CREATE_SALE_ITEMS: &str = r#"CREATE TABLE IF NOT EXISTS sale_items (
    id TEXT PRIMARY KEY,
    sale_id TEXT NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
    item_id TEXT,
    item_type TEXT NOT NULL DEFAULT 'product',
    name TEXT,
    price REAL NOT NULL DEFAULT 0,
    quantity INTEGER NOT NULL DEFAULT 1
)"#;

/// Parents before children.
const BASE_TABLES: [(&str, &str); 6] = [
    ("customers", CREATE_CUSTOMERS),
    ("services", CREATE_SERVICES),
    ("appointments", CREATE_APPOINTMENTS),
    ("products", CREATE_PRODUCTS),
    ("sales", CREATE_SALES),
    ("sale_items", CREATE_SALE_ITEMS),
];

pub async fn initialize(db: &Db) -> bool {
    for (table, statement) in BASE_TABLES {
        if let Err(err) = db.execute(statement, &[]).await {
            log::error!("Failed to create table {table}: {err}");
            return false;
        }
    }
    log::info!("Schema initialized ({} tables).", BASE_TABLES.len());
    true
}

/// Drops the helper view and every table, children first.
pub async fn drop_all(db: &Db) -> bool {
    if let Err(err) = db.execute("DROP VIEW IF EXISTS appointment_details", &[]).await {
        log::error!("Failed to drop view appointment_details: {err}");
        return false;
    }
    for (table, _) in BASE_TABLES.iter().rev() {
        let statement = format!("DROP TABLE IF EXISTS {table}");
        if let Err(err) = db.execute(&statement, &[]).await {
            log::error!("Failed to drop table {table}: {err}");
            return false;
        }
    }
    log::warn!("All tables dropped.");
    true
}
