use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_CANCELLED: &str = "cancelled";

pub const APPOINTMENT_STATUSES: [&str; 4] = [
    STATUS_PENDING,
    STATUS_CONFIRMED,
    STATUS_COMPLETED,
    STATUS_CANCELLED,
];

pub const PAYMENT_PENDING: &str = "pending";
pub const PAYMENT_PAID: &str = "paid";

pub const SALE_TYPE_SERVICE: &str = "service";
pub const SALE_TYPE_PRODUCT: &str = "product";

pub const LOW_STOCK_THRESHOLD: i64 = 5;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub visit_count: i64,
    pub last_visit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub duration: i64,
    pub price: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    pub duration: i64,
    pub price: f64,
    pub description: Option<String>,
}

/// An appointment as read through the `appointment_details` view.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub service_price: Option<f64>,
    pub date: String,
    pub time: String,
    pub duration: i64,
    pub status: String,
    pub notes: Option<String>,
    pub payment_status: String,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentInput {
    pub customer_id: Option<String>,
    pub service_id: Option<String>,
    pub date: String,
    pub time: String,
    pub duration: Option<i64>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentUpdate {
    pub service_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub duration: Option<i64>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub category: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Sale {
    pub id: String,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub date: String,
    pub total: f64,
    pub payment_method: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub sale_type: String,
    #[sqlx(skip)]
    pub items: Vec<SaleItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub item_id: Option<String>,
    pub item_type: String,
    pub name: Option<String>,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSale {
    pub customer_id: Option<String>,
    pub date: String,
    pub payment_method: Option<String>,
    pub sale_type: String,
    pub items: Vec<NewSaleItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSaleItem {
    pub item_id: Option<String>,
    pub item_type: String,
    pub name: Option<String>,
    pub price: f64,
    pub quantity: i64,
}

impl NewSaleItem {
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub items: Vec<CartItem>,
    pub payment_method: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleUpdate {
    pub payment_method: Option<String>,
    pub date: Option<String>,
}
