use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const STATUS_DRAFT: &str = "Draft";
pub const STATUS_PUBLISHED: &str = "Published";
pub const STATUS_CANCELLED: &str = "Cancelled";

/// Categories grouped under the "ministry" filter
const MINISTRY_CATEGORIES: [&str; 4] = ["Youth", "Women", "Men", "Choir"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub event_type: String,
    pub type_other: Option<String>,
    pub category: String,
    pub category_other: Option<String>,
    pub description: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
    pub is_recurring: bool,
    pub location: String,
    pub room_building: Option<String>,
    pub full_address: Option<String>,
    pub is_virtual: bool,
    pub virtual_link: Option<String>,
    pub max_capacity: i32,
    pub registration_deadline: Option<NaiveDate>,
    pub require_registration: bool,
    pub open_to_public: bool,
    pub volunteers_needed: i32,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub special_notes: Option<String>,
    pub status: String,
    pub image_path: Option<String>,
    pub contact_person_image: Option<String>,
    pub ad_image_1: Option<String>,
    pub ad_image_2: Option<String>,
    pub ad_video_1: Option<String>,
    pub ad_video_2: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventTag {
    pub id: Uuid,
    pub event_id: Uuid,
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventVolunteerRole {
    pub id: Uuid,
    pub event_id: Uuid,
    pub role_name: String,
    pub quantity_needed: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolunteerRoleData {
    pub name: String,
    #[serde(default = "default_quantity", deserialize_with = "quantity_from_any")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Forms send the quantity either as a number or as a numeric string
fn quantity_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Number(i32),
        Text(String),
    }

    match Quantity::deserialize(deserializer)? {
        Quantity::Number(n) => Ok(n),
        Quantity::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Media columns of an event, in storage order
#[derive(Debug, Clone, Default)]
pub struct EventMedia {
    pub image_path: Option<String>,
    pub contact_person_image: Option<String>,
    pub ad_image_1: Option<String>,
    pub ad_image_2: Option<String>,
    pub ad_video_1: Option<String>,
    pub ad_video_2: Option<String>,
}

impl EventMedia {
    pub fn paths(&self) -> [Option<&str>; 6] {
        [
            self.image_path.as_deref(),
            self.contact_person_image.as_deref(),
            self.ad_image_1.as_deref(),
            self.ad_image_2.as_deref(),
            self.ad_video_1.as_deref(),
            self.ad_video_2.as_deref(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct EventData {
    pub name: String,
    pub event_type: String,
    pub type_other: Option<String>,
    pub category: String,
    pub category_other: Option<String>,
    pub description: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
    pub is_recurring: bool,
    pub location: String,
    pub room_building: Option<String>,
    pub full_address: Option<String>,
    pub is_virtual: bool,
    pub virtual_link: Option<String>,
    pub max_capacity: i32,
    pub registration_deadline: Option<NaiveDate>,
    pub require_registration: bool,
    pub open_to_public: bool,
    pub volunteers_needed: i32,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub special_notes: Option<String>,
    pub status: String,
    pub tags: Vec<String>,
    pub volunteer_roles: Vec<VolunteerRoleData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub filter: Option<String>,
    pub search: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMetrics {
    pub total_events: i64,
    pub upcoming_events: i64,
    pub today_events: i64,
    pub past_events: i64,
}

/// Maps a form slug ("bible-study") to the stored event type.
pub fn event_type_from_form(slug: &str) -> &'static str {
    match slug {
        "service" => "Service",
        "bible-study" => "Bible_study",
        "prayer" => "Prayer",
        "conference" => "Conference",
        "retreat" => "Retreat",
        "outreach" => "Outreach",
        "training" => "Training",
        "fundraiser" => "Fundraiser",
        "celebration" => "Celebration",
        "meeting" => "Meeting",
        "social" => "Social",
        _ => "Other",
    }
}

/// Maps a form slug ("youth") to the stored event category.
pub fn event_category_from_form(slug: &str) -> &'static str {
    match slug {
        "worship" => "Worship",
        "youth" => "Youth",
        "women" => "Women",
        "men" => "Men",
        "education" => "Education",
        "missions" => "Missions",
        "choir" => "Choir",
        "fellowship" => "Fellowship",
        "admin" => "Admin",
        "media" => "Media",
        "community" => "Community",
        _ => "Other",
    }
}

impl Event {
    pub fn media(&self) -> EventMedia {
        EventMedia {
            image_path: self.image_path.clone(),
            contact_person_image: self.contact_person_image.clone(),
            ad_image_1: self.ad_image_1.clone(),
            ad_image_2: self.ad_image_2.clone(),
            ad_video_1: self.ad_video_1.clone(),
            ad_video_2: self.ad_video_2.clone(),
        }
    }

    /// Creates an event together with its tags and volunteer roles
    pub async fn create(
        pool: &PgPool,
        data: EventData,
        media: EventMedia,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                name, event_type, type_other, category, category_other, description,
                start_date, start_time, end_date, end_time, is_recurring,
                location, room_building, full_address, is_virtual, virtual_link,
                max_capacity, registration_deadline, require_registration, open_to_public,
                volunteers_needed, contact_person, contact_email, contact_phone,
                special_notes, status,
                image_path, contact_person_image, ad_image_1, ad_image_2, ad_video_1, ad_video_2
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32
            )
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.event_type)
        .bind(&data.type_other)
        .bind(&data.category)
        .bind(&data.category_other)
        .bind(&data.description)
        .bind(data.start_date)
        .bind(data.start_time)
        .bind(data.end_date)
        .bind(data.end_time)
        .bind(data.is_recurring)
        .bind(&data.location)
        .bind(&data.room_building)
        .bind(&data.full_address)
        .bind(data.is_virtual)
        .bind(&data.virtual_link)
        .bind(data.max_capacity)
        .bind(data.registration_deadline)
        .bind(data.require_registration)
        .bind(data.open_to_public)
        .bind(data.volunteers_needed)
        .bind(&data.contact_person)
        .bind(&data.contact_email)
        .bind(&data.contact_phone)
        .bind(&data.special_notes)
        .bind(&data.status)
        .bind(&media.image_path)
        .bind(&media.contact_person_image)
        .bind(&media.ad_image_1)
        .bind(&media.ad_image_2)
        .bind(&media.ad_video_1)
        .bind(&media.ad_video_2)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_children(&mut tx, event.id, &data).await?;

        tx.commit().await?;

        Ok(event)
    }

    /// Updates an event. Media columns are only replaced when a new path is
    /// given; tags and volunteer roles are deleted and re-inserted.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: EventData,
        media: EventMedia,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let event = sqlx::query_as::<_, Event>(
            r#"
            UPDATE events SET
                name = $2, event_type = $3, type_other = $4, category = $5, category_other = $6,
                description = $7, start_date = $8, start_time = $9, end_date = $10, end_time = $11,
                is_recurring = $12, location = $13, room_building = $14, full_address = $15,
                is_virtual = $16, virtual_link = $17, max_capacity = $18,
                registration_deadline = $19, require_registration = $20, open_to_public = $21,
                volunteers_needed = $22, contact_person = $23, contact_email = $24,
                contact_phone = $25, special_notes = $26, status = $27,
                image_path = COALESCE($28, image_path),
                contact_person_image = COALESCE($29, contact_person_image),
                ad_image_1 = COALESCE($30, ad_image_1),
                ad_image_2 = COALESCE($31, ad_image_2),
                ad_video_1 = COALESCE($32, ad_video_1),
                ad_video_2 = COALESCE($33, ad_video_2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.event_type)
        .bind(&data.type_other)
        .bind(&data.category)
        .bind(&data.category_other)
        .bind(&data.description)
        .bind(data.start_date)
        .bind(data.start_time)
        .bind(data.end_date)
        .bind(data.end_time)
        .bind(data.is_recurring)
        .bind(&data.location)
        .bind(&data.room_building)
        .bind(&data.full_address)
        .bind(data.is_virtual)
        .bind(&data.virtual_link)
        .bind(data.max_capacity)
        .bind(data.registration_deadline)
        .bind(data.require_registration)
        .bind(data.open_to_public)
        .bind(data.volunteers_needed)
        .bind(&data.contact_person)
        .bind(&data.contact_email)
        .bind(&data.contact_phone)
        .bind(&data.special_notes)
        .bind(&data.status)
        .bind(&media.image_path)
        .bind(&media.contact_person_image)
        .bind(&media.ad_image_1)
        .bind(&media.ad_image_2)
        .bind(&media.ad_video_1)
        .bind(&media.ad_video_2)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM event_tags WHERE event_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM event_volunteer_roles WHERE event_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        Self::insert_children(&mut tx, id, &data).await?;

        tx.commit().await?;

        Ok(event)
    }

    async fn insert_children(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        event_id: Uuid,
        data: &EventData,
    ) -> Result<(), sqlx::Error> {
        for tag in data.tags.iter().filter(|t| !t.trim().is_empty()) {
            sqlx::query("INSERT INTO event_tags (event_id, tag) VALUES ($1, $2)")
                .bind(event_id)
                .bind(tag.trim())
                .execute(&mut **tx)
                .await?;
        }

        for role in data.volunteer_roles.iter().filter(|r| !r.name.trim().is_empty()) {
            sqlx::query(
                "INSERT INTO event_volunteer_roles (event_id, role_name, quantity_needed) VALUES ($1, $2, $3)",
            )
            .bind(event_id)
            .bind(role.name.trim())
            .bind(role.quantity)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Find event by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn tags(pool: &PgPool, event_id: Uuid) -> Result<Vec<EventTag>, sqlx::Error> {
        sqlx::query_as::<_, EventTag>("SELECT * FROM event_tags WHERE event_id = $1 ORDER BY tag")
            .bind(event_id)
            .fetch_all(pool)
            .await
    }

    pub async fn volunteer_roles(
        pool: &PgPool,
        event_id: Uuid,
    ) -> Result<Vec<EventVolunteerRole>, sqlx::Error> {
        sqlx::query_as::<_, EventVolunteerRole>(
            "SELECT * FROM event_volunteer_roles WHERE event_id = $1 ORDER BY role_name",
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    /// Lists non-cancelled events ordered by start
    pub async fn list(pool: &PgPool, filter: &EventFilter) -> Result<Vec<Self>, sqlx::Error> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM events WHERE status <> ");
        query.push_bind(STATUS_CANCELLED);

        if let Some(date) = filter.date {
            query.push(" AND start_date = ").push_bind(date);
        }

        match filter.filter.as_deref().map(str::trim) {
            None | Some("") | Some("all") => {}
            Some("upcoming") => {
                query.push(" AND start_date >= CURRENT_DATE");
            }
            Some("service") => {
                query.push(" AND event_type = 'Service'");
            }
            Some("ministry") => {
                query.push(" AND category IN (");
                let mut separated = query.separated(", ");
                for category in MINISTRY_CATEGORIES {
                    separated.push_bind(category);
                }
                separated.push_unseparated(")");
            }
            Some(other) => {
                query
                    .push(" AND (LOWER(event_type) = LOWER(")
                    .push_bind(other.to_string())
                    .push(") OR LOWER(category) = LOWER(")
                    .push_bind(other.to_string())
                    .push("))");
            }
        }

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR location ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query.push(" ORDER BY start_date ASC, start_time ASC");

        if let Some(limit) = filter.limit.filter(|l| *l > 0) {
            query.push(" LIMIT ").push_bind(limit);
        }

        query.build_query_as::<Event>().fetch_all(pool).await
    }

    /// Counts for the dashboard cards
    pub async fn metrics(pool: &PgPool) -> Result<EventMetrics, sqlx::Error> {
        let (total_events, upcoming_events, today_events, past_events): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (
                        WHERE start_date > CURRENT_DATE
                           OR (start_date = CURRENT_DATE AND start_time > LOCALTIME)
                    ),
                    COUNT(*) FILTER (WHERE start_date = CURRENT_DATE),
                    COUNT(*) FILTER (
                        WHERE end_date < CURRENT_DATE
                           OR (end_date = CURRENT_DATE AND end_time < LOCALTIME)
                    )
                FROM events
                WHERE status <> $1
                "#,
            )
            .bind(STATUS_CANCELLED)
            .fetch_one(pool)
            .await?;

        Ok(EventMetrics {
            total_events,
            upcoming_events,
            today_events,
            past_events,
        })
    }

    /// Hard delete; tags and roles cascade
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_slugs_map_to_stored_values() {
        assert_eq!(event_type_from_form("bible-study"), "Bible_study");
        assert_eq!(event_type_from_form("unknown"), "Other");
        assert_eq!(event_category_from_form("choir"), "Choir");
        assert_eq!(event_category_from_form(""), "Other");
    }

    #[test]
    fn test_volunteer_role_quantity_defaults_to_one() {
        let roles: Vec<VolunteerRoleData> =
            serde_json::from_str(r#"[{"name":"Ushers","quantity":4},{"name":"Greeters"},{"name":"Choir","quantity":"6"}]"#)
                .unwrap();

        assert_eq!(roles[0].quantity, 4);
        assert_eq!(roles[1].quantity, 1);
        assert_eq!(roles[2].quantity, 6);
    }
}
