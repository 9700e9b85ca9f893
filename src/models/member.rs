use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::attendance::STATUS_PRESENT;

pub const STATUS_ACTIVE: &str = "Active";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub status: String,
    pub church_group: Option<String>,
    pub leadership_role: Option<String>,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMemberData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub status: Option<String>,
    pub church_group: Option<String>,
    pub leadership_role: Option<String>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    /// Creates a new member record
    pub async fn create(
        pool: &PgPool,
        data: &CreateMemberData,
        photo_path: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO members (
                first_name, last_name, email, phone, gender, date_of_birth,
                status, church_group, leadership_role, photo_path
            )
            VALUES ($1, $2, LOWER($3), $4, $5, $6, COALESCE($7, 'Active'), $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(data.first_name.trim())
        .bind(data.last_name.trim())
        .bind(data.email.trim())
        .bind(data.phone.trim())
        .bind(&data.gender)
        .bind(data.date_of_birth)
        .bind(&data.status)
        .bind(&data.church_group)
        .bind(&data.leadership_role)
        .bind(photo_path)
        .fetch_one(pool)
        .await?;

        Ok(member)
    }

    /// Replaces a member's details. The photo only changes when a new path
    /// is given. Returns `None` for an unknown member.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: &CreateMemberData,
        photo_path: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE members SET
                first_name = $2, last_name = $3, email = LOWER($4), phone = $5,
                gender = $6, date_of_birth = $7, status = COALESCE($8, status),
                church_group = $9, leadership_role = $10,
                photo_path = COALESCE($11, photo_path)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.first_name.trim())
        .bind(data.last_name.trim())
        .bind(data.email.trim())
        .bind(data.phone.trim())
        .bind(&data.gender)
        .bind(data.date_of_birth)
        .bind(&data.status)
        .bind(&data.church_group)
        .bind(&data.leadership_role)
        .bind(photo_path)
        .fetch_optional(pool)
        .await
    }

    /// Members without a `present` check-in for the date, by last name.
    /// `service_id` of `None` means any service.
    pub async fn absent(
        pool: &PgPool,
        service_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT m.* FROM members m
            WHERE NOT EXISTS (
                SELECT 1 FROM attendance a
                WHERE a.member_id = m.id
                  AND a.check_in_date = $1
                  AND a.status = $3
                  AND ($2::TEXT IS NULL OR a.service_id = $2)
            )
            ORDER BY m.last_name, m.first_name
            "#,
        )
        .bind(date)
        .bind(service_id)
        .bind(STATUS_PRESENT)
        .fetch_all(pool)
        .await
    }

    /// Finds a member by their internal ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    /// Finds a member whose email and phone both match
    pub async fn find_by_contact(
        pool: &PgPool,
        email: &str,
        phone: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let member = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members
            WHERE LOWER(email) = LOWER($1) AND phone = $2
            "#,
        )
        .bind(email.trim())
        .bind(phone.trim())
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn search(pool: &PgPool, search: Option<&str>) -> Result<Vec<Self>, sqlx::Error> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM members
            WHERE $1::TEXT IS NULL
               OR first_name ILIKE $1
               OR last_name ILIKE $1
               OR email ILIKE $1
               OR phone ILIKE $1
            ORDER BY last_name, first_name
            "#,
        )
        .bind(pattern)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
