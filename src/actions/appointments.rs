use chrono::Utc;

use super::{
    clean, customers, delete_by_id, exists, format_date, optional_text, or_empty, parse_date,
    parse_time, required, sales, services, today, ActionError, ActionResult,
};
use crate::db::Db;
use crate::models::{
    new_id, Appointment, AppointmentInput, AppointmentUpdate, NewSale, NewSaleItem, Sale,
    APPOINTMENT_STATUSES, PAYMENT_PAID, SALE_TYPE_SERVICE, STATUS_CONFIRMED,
};

const SELECT_APPOINTMENT: &str = r#"SELECT id, customer_id, customer_name, customer_phone, service_id,
       service_name, service_price, date, time, duration, status, notes,
       payment_status, payment_method
FROM appointment_details"#;

pub async fn get_all(db: &Db) -> Vec<Appointment> {
    or_empty(
        db.fetch_all(&format!("{SELECT_APPOINTMENT} ORDER BY date, time"), &[])
            .await,
        "appointments",
    )
}

pub async fn get_by_id(db: &Db, id: &str) -> Option<Appointment> {
    or_empty(
        db.fetch_optional(&format!("{SELECT_APPOINTMENT} WHERE id = ?"), &[id.into()])
            .await,
        "appointment",
    )
}

pub async fn get_by_date(db: &Db, date: &str) -> Vec<Appointment> {
    or_empty(
        db.fetch_all(
            &format!("{SELECT_APPOINTMENT} WHERE date = ? ORDER BY time"),
            &[date.into()],
        )
        .await,
        "appointments for date",
    )
}

fn validate_status(status: Option<String>) -> ActionResult<Option<String>> {
    match clean(status) {
        Some(status) if !APPOINTMENT_STATUSES.contains(&status.as_str()) => Err(
            ActionError::validation(format!("Unknown appointment status '{status}'")),
        ),
        other => Ok(other),
    }
}

fn validate_duration(duration: Option<i64>) -> ActionResult<Option<i64>> {
    match duration {
        Some(minutes) if minutes <= 0 => Err(ActionError::validation(
            "Duration must be a positive number of minutes",
        )),
        other => Ok(other),
    }
}

/// Books an appointment. An unknown customer or service is replaced by the
/// first one on file; the customer's visit stats are bumped afterwards.
pub async fn create(db: &Db, input: AppointmentInput) -> ActionResult<Appointment> {
    let date = format_date(parse_date(&input.date)?);
    let time = parse_time(&input.time)?.format("%H:%M").to_string();
    let status = validate_status(input.status)?.unwrap_or_else(|| STATUS_CONFIRMED.to_string());
    let duration = validate_duration(input.duration)?;

    let requested = clean(input.customer_id);
    let customer = match requested.as_deref() {
        Some(id) => customers::get_by_id(db, id).await,
        None => None,
    };
    let customer = match customer {
        Some(customer) => customer,
        None => {
            let fallback = customers::first(db)
                .await?
                .ok_or_else(|| ActionError::validation("No customers on file to book for"))?;
            log::warn!(
                "Customer {} not found; booking for {} instead",
                requested.as_deref().unwrap_or("(none)"),
                fallback.id
            );
            fallback
        }
    };

    let requested = clean(input.service_id);
    let service = match requested.as_deref() {
        Some(id) => services::get_by_id(db, id).await,
        None => None,
    };
    let service = match service {
        Some(service) => service,
        None => {
            let fallback = services::first(db)
                .await?
                .ok_or_else(|| ActionError::validation("No services on file to book"))?;
            log::warn!(
                "Service {} not found; booking {} instead",
                requested.as_deref().unwrap_or("(none)"),
                fallback.id
            );
            fallback
        }
    };

    let id = new_id();
    db.execute(
        "INSERT INTO appointments (id, customer_id, service_id, date, time, duration, status, notes, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        &[
            id.as_str().into(),
            customer.id.as_str().into(),
            service.id.as_str().into(),
            date.as_str().into(),
            time.into(),
            duration.unwrap_or(service.duration).into(),
            status.into(),
            optional_text(input.notes),
            Utc::now().to_rfc3339().into(),
        ],
    )
    .await?;
    log::info!("Booked appointment {id} for customer {}", customer.id);

    // Separate statement: a failure here leaves the booking in place.
    if let Err(err) = db
        .execute(
            customers::RECORD_VISIT,
            &[date.into(), customer.id.as_str().into()],
        )
        .await
    {
        log::error!("Failed to record visit for customer {}: {err}", customer.id);
    }

    get_by_id(db, &id)
        .await
        .ok_or_else(|| ActionError::not_found("Appointment", &id))
}

pub async fn update(db: &Db, id: &str, update: AppointmentUpdate) -> ActionResult<Appointment> {
    if !exists(db, "appointments", id).await? {
        return Err(ActionError::not_found("Appointment", id));
    }

    let service_id = clean(update.service_id);
    if let Some(service_id) = service_id.as_deref() {
        if !exists(db, "services", service_id).await? {
            return Err(ActionError::validation(format!("Unknown service {service_id}")));
        }
    }
    let date = match update.date.as_deref() {
        Some(date) => Some(format_date(parse_date(date)?)),
        None => None,
    };
    let time = match update.time.as_deref() {
        Some(time) => Some(parse_time(time)?.format("%H:%M").to_string()),
        None => None,
    };
    let status = validate_status(update.status)?;
    let duration = validate_duration(update.duration)?;

    db.execute(
        r#"UPDATE appointments SET
            service_id = COALESCE(?, service_id),
            date = COALESCE(?, date),
            time = COALESCE(?, time),
            duration = COALESCE(?, duration),
            status = COALESCE(?, status),
            notes = COALESCE(?, notes)
        WHERE id = ?"#,
        &[
            service_id.into(),
            date.into(),
            time.into(),
            duration.into(),
            status.into(),
            optional_text(update.notes),
            id.into(),
        ],
    )
    .await?;

    get_by_id(db, id)
        .await
        .ok_or_else(|| ActionError::not_found("Appointment", id))
}

pub async fn delete(db: &Db, id: &str) -> ActionResult<()> {
    delete_by_id(db, "appointments", "Appointment", id).await
}

/// Marks the appointment paid and records a service sale for it.
pub async fn process_payment(db: &Db, id: &str, method: &str) -> ActionResult<Sale> {
    let method = required(method, "Payment method")?;
    let appointment = get_by_id(db, id)
        .await
        .ok_or_else(|| ActionError::not_found("Appointment", id))?;
    if appointment.payment_status == PAYMENT_PAID {
        return Err(ActionError::validation(format!(
            "Appointment {id} is already paid"
        )));
    }

    db.execute(
        "UPDATE appointments SET payment_status = ?, payment_method = ? WHERE id = ?",
        &[PAYMENT_PAID.into(), method.as_str().into(), id.into()],
    )
    .await?;

    // TODO: run the status change and the sale in one transaction; a failed
    // sale currently leaves the appointment marked paid.
    let sale = sales::create(
        db,
        NewSale {
            customer_id: Some(appointment.customer_id.clone()),
            date: format_date(today()),
            payment_method: Some(method),
            sale_type: SALE_TYPE_SERVICE.to_string(),
            items: vec![NewSaleItem {
                item_id: appointment.service_id.clone(),
                item_type: SALE_TYPE_SERVICE.to_string(),
                name: appointment.service_name.clone(),
                price: appointment.service_price.unwrap_or(0.0),
                quantity: 1,
            }],
        },
    )
    .await?;
    log::info!("Appointment {id} paid; sale {}", sale.id);
    Ok(sale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing;
    use crate::models::{CustomerInput, ServiceInput, PAYMENT_PENDING, STATUS_PENDING};

    async fn shop() -> (Db, String, String) {
        let db = testing::db().await;
        let customer = customers::create(
            &db,
            CustomerInput {
                name: "Marcus Reed".to_string(),
                phone: Some("555-0101".to_string()),
                email: None,
            },
        )
        .await
        .unwrap();
        let service = services::create(
            &db,
            ServiceInput {
                name: "Signature Cut".to_string(),
                duration: 45,
                price: 35.0,
                description: None,
            },
        )
        .await
        .unwrap();
        (db, customer.id, service.id)
    }

    fn booking(customer_id: Option<&str>, service_id: Option<&str>) -> AppointmentInput {
        AppointmentInput {
            customer_id: customer_id.map(str::to_string),
            service_id: service_id.map(str::to_string),
            date: "2030-05-04".to_string(),
            time: "10:30".to_string(),
            ..AppointmentInput::default()
        }
    }

    #[tokio::test]
    async fn create_fills_defaults_and_records_visit() {
        let (db, customer_id, service_id) = shop().await;
        let created = create(&db, booking(Some(&customer_id), Some(&service_id)))
            .await
            .unwrap();

        assert_eq!(created.status, STATUS_CONFIRMED);
        assert_eq!(created.duration, 45);
        assert_eq!(created.payment_status, PAYMENT_PENDING);
        assert_eq!(created.service_name.as_deref(), Some("Signature Cut"));
        assert_eq!(get_by_id(&db, &created.id).await, Some(created.clone()));

        let customer = customers::get_by_id(&db, &customer_id).await.unwrap();
        assert_eq!(customer.visit_count, 1);
        assert_eq!(customer.last_visit.as_deref(), Some("2030-05-04"));
    }

    #[tokio::test]
    async fn unknown_references_fall_back_to_first_rows() {
        let (db, customer_id, service_id) = shop().await;
        let created = create(&db, booking(Some("ghost"), None)).await.unwrap();

        assert_eq!(created.customer_id, customer_id);
        assert_eq!(created.customer_name.as_deref(), Some("Marcus Reed"));
        assert_eq!(created.service_id.as_deref(), Some(service_id.as_str()));
    }

    #[tokio::test]
    async fn booking_without_any_customer_is_rejected() {
        let db = testing::db().await;
        let err = create(&db, booking(None, None)).await.unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
        assert!(get_all(&db).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_time_and_status_are_rejected() {
        let (db, customer_id, service_id) = shop().await;
        let mut input = booking(Some(&customer_id), Some(&service_id));
        input.time = "9am".to_string();
        assert!(matches!(create(&db, input).await, Err(ActionError::Validation(_))));

        let mut input = booking(Some(&customer_id), Some(&service_id));
        input.status = Some("maybe".to_string());
        assert!(matches!(create(&db, input).await, Err(ActionError::Validation(_))));
    }

    #[tokio::test]
    async fn update_keeps_unset_fields() {
        let (db, customer_id, service_id) = shop().await;
        let created = create(&db, booking(Some(&customer_id), Some(&service_id)))
            .await
            .unwrap();

        let updated = update(
            &db,
            &created.id,
            AppointmentUpdate {
                status: Some(STATUS_PENDING.to_string()),
                notes: Some("Running late".to_string()),
                ..AppointmentUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, STATUS_PENDING);
        assert_eq!(updated.notes.as_deref(), Some("Running late"));
        assert_eq!(updated.time, "10:30");
        assert_eq!(updated.date, "2030-05-04");

        let err = update(
            &db,
            &created.id,
            AppointmentUpdate {
                service_id: Some("ghost".to_string()),
                ..AppointmentUpdate::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    #[tokio::test]
    async fn get_by_date_filters_and_orders_by_time() {
        let (db, customer_id, service_id) = shop().await;
        let mut late = booking(Some(&customer_id), Some(&service_id));
        late.time = "16:00".to_string();
        create(&db, late).await.unwrap();
        create(&db, booking(Some(&customer_id), Some(&service_id)))
            .await
            .unwrap();
        let mut other_day = booking(Some(&customer_id), Some(&service_id));
        other_day.date = "2030-05-05".to_string();
        create(&db, other_day).await.unwrap();

        let times: Vec<String> = get_by_date(&db, "2030-05-04")
            .await
            .into_iter()
            .map(|a| a.time)
            .collect();
        assert_eq!(times, vec!["10:30", "16:00"]);
    }

    #[tokio::test]
    async fn payment_marks_paid_and_creates_a_service_sale() {
        let (db, customer_id, service_id) = shop().await;
        let created = create(&db, booking(Some(&customer_id), Some(&service_id)))
            .await
            .unwrap();

        let sale = process_payment(&db, &created.id, "card").await.unwrap();
        assert_eq!(sale.sale_type, SALE_TYPE_SERVICE);
        assert_eq!(sale.total, 35.0);
        assert_eq!(sale.customer_id.as_deref(), Some(customer_id.as_str()));
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.items[0].name.as_deref(), Some("Signature Cut"));

        let paid = get_by_id(&db, &created.id).await.unwrap();
        assert_eq!(paid.payment_status, PAYMENT_PAID);
        assert_eq!(paid.payment_method.as_deref(), Some("card"));

        let err = process_payment(&db, &created.id, "cash").await.unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
        assert_eq!(db.count("SELECT COUNT(*) FROM sales", &[]).await, 1);
    }

    #[tokio::test]
    async fn missing_appointment_fails_softly() {
        let db = testing::db().await;
        assert!(matches!(
            delete(&db, "missing").await,
            Err(ActionError::NotFound { .. })
        ));
        assert!(matches!(
            process_payment(&db, "missing", "card").await,
            Err(ActionError::NotFound { .. })
        ));
        assert!(matches!(
            update(&db, "missing", AppointmentUpdate::default()).await,
            Err(ActionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn deleting_customer_removes_their_appointments() {
        let (db, customer_id, service_id) = shop().await;
        create(&db, booking(Some(&customer_id), Some(&service_id)))
            .await
            .unwrap();
        customers::delete(&db, &customer_id).await.unwrap();
        assert!(get_all(&db).await.is_empty());
    }
}
