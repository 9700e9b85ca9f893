use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::attendance::STATUS_VISITOR;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Visitor {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub source: Option<String>,
    pub purpose: Option<String>,
    pub visit_count: i32,
    pub last_visit_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// A visitor's check-in for one service and date
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VisitorCheckIn {
    pub attendance_id: Uuid,
    pub visitor_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub source: Option<String>,
    pub purpose: Option<String>,
    pub visit_count: i32,
    pub service_id: String,
    pub check_in_date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VisitorData {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub source: Option<String>,
    pub purpose: Option<String>,
}

impl Visitor {
    /// Matches a returning visitor by name (case-insensitive) and phone
    pub async fn find_returning(
        pool: &PgPool,
        name: &str,
        phone: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM visitors
            WHERE LOWER(name) = LOWER($1) AND phone = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(name.trim())
        .bind(phone.trim())
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &PgPool,
        data: &VisitorData,
        visit_date: NaiveDate,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO visitors (name, phone, email, source, purpose, visit_count, last_visit_date)
            VALUES ($1, $2, $3, $4, $5, 1, $6)
            RETURNING *
            "#,
        )
        .bind(data.name.trim())
        .bind(data.phone.trim())
        .bind(&data.email)
        .bind(&data.source)
        .bind(&data.purpose)
        .bind(visit_date)
        .fetch_one(pool)
        .await
    }

    /// Bumps the visit count and refreshes the contact details
    pub async fn record_return(
        pool: &PgPool,
        id: Uuid,
        data: &VisitorData,
        visit_date: NaiveDate,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE visitors SET
                visit_count = visit_count + 1,
                last_visit_date = $2,
                email = COALESCE($3, email),
                source = COALESCE($4, source),
                purpose = COALESCE($5, purpose)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(visit_date)
        .bind(&data.email)
        .bind(&data.source)
        .bind(&data.purpose)
        .fetch_one(pool)
        .await
    }

    /// Visitors checked in on a date, newest first. `service_id` of `None`
    /// means any service.
    pub async fn checked_in(
        pool: &PgPool,
        service_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<Vec<VisitorCheckIn>, sqlx::Error> {
        sqlx::query_as::<_, VisitorCheckIn>(
            r#"
            SELECT
                a.id AS attendance_id, v.id AS visitor_id, v.name, v.phone, v.email,
                v.source, v.purpose, v.visit_count,
                a.service_id, a.check_in_date, a.check_in_time
            FROM attendance a
            JOIN visitors v ON v.id = a.visitor_id
            WHERE a.check_in_date = $1
              AND a.status = $3
              AND ($2::TEXT IS NULL OR a.service_id = $2)
            ORDER BY a.check_in_time DESC
            "#,
        )
        .bind(date)
        .bind(service_id)
        .bind(STATUS_VISITOR)
        .fetch_all(pool)
        .await
    }
}
