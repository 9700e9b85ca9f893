use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::services::attendance_sync::SyncSignal;

pub const STATUS_PRESENT: &str = "present";
pub const STATUS_VISITOR: &str = "visitor";

pub const TOKEN_ACTIVE: &str = "active";
pub const TOKEN_EXPIRED: &str = "expired";

/// Services members can check in to, as `(id, display name)`
pub const SERVICES: [(&str, &str); 6] = [
    ("sunday-1st-service", "Sunday 1st Service"),
    ("sunday-2nd-service", "Sunday 2nd Service"),
    ("midweek-service", "Midweek Service"),
    ("friday-prayer", "Friday Prayer"),
    ("special-service", "Special Service"),
    ("others", "Others"),
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServiceOption {
    pub id: &'static str,
    pub name: &'static str,
}

pub fn services() -> Vec<ServiceOption> {
    SERVICES
        .iter()
        .map(|&(id, name)| ServiceOption { id, name })
        .collect()
}

pub fn service_name(service_id: &str) -> Option<&'static str> {
    SERVICES
        .iter()
        .find(|(id, _)| *id == service_id)
        .map(|&(_, name)| name)
}

/// `None`, empty and `"0"` all mean every service
pub fn service_scope(service_id: Option<&str>) -> Option<&str> {
    service_id
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "0")
}

// Conflict targets match the partial unique indexes on `attendance`, so
// concurrent duplicate submits insert at most one row.
const MEMBER_CHECK_IN: &str = r#"
    INSERT INTO attendance (member_id, service_id, check_in_date, status)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (member_id, service_id, check_in_date) WHERE member_id IS NOT NULL
    DO NOTHING
    RETURNING *
"#;

const VISITOR_CHECK_IN: &str = r#"
    INSERT INTO attendance (visitor_id, service_id, check_in_date, status)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (visitor_id, service_id, check_in_date) WHERE visitor_id IS NOT NULL
    DO NOTHING
    RETURNING *
"#;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub member_id: Option<Uuid>,
    pub visitor_id: Option<Uuid>,
    pub service_id: String,
    pub check_in_date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub status: String,
}

/// Check-in row joined with the person's name and contact details
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttendanceEntry {
    pub id: Uuid,
    pub service_id: String,
    pub check_in_date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub status: String,
    pub member_id: Option<Uuid>,
    pub visitor_id: Option<Uuid>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AttendanceToken {
    pub id: Uuid,
    pub service_id: String,
    pub token: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, FromRow)]
pub struct AttendanceCounts {
    pub total_members: i64,
    pub members_present: i64,
    pub visitors: i64,
    pub male_present: i64,
    pub female_present: i64,
    pub children_present: i64,
    /// Mean seconds since midnight of the check-in times
    pub average_arrival_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub total_members: i64,
    pub members_present: i64,
    pub visitors: i64,
    pub total_present: i64,
    pub absent: i64,
    pub male_present: i64,
    pub female_present: i64,
    pub children_present: i64,
    pub average_arrival: String,
}

impl From<AttendanceCounts> for AttendanceStats {
    fn from(counts: AttendanceCounts) -> Self {
        Self {
            total_members: counts.total_members,
            members_present: counts.members_present,
            visitors: counts.visitors,
            total_present: counts.members_present + counts.visitors,
            absent: (counts.total_members - counts.members_present).max(0),
            male_present: counts.male_present,
            female_present: counts.female_present,
            children_present: counts.children_present,
            average_arrival: format_arrival(counts.average_arrival_secs),
        }
    }
}

/// `HH:MM`, or `N/A` when nobody checked in
pub fn format_arrival(seconds: Option<f64>) -> String {
    match seconds.filter(|s| s.is_finite() && *s >= 0.0) {
        Some(seconds) => {
            let minutes = (seconds / 60.0).round() as i64;
            format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
        }
        None => "N/A".to_string(),
    }
}

/// `$1` date, `$2` optional service, `$3` IANA time zone.
const STATS: &str = r#"
    WITH scoped AS (
        SELECT * FROM attendance
        WHERE check_in_date = $1 AND ($2::TEXT IS NULL OR service_id = $2)
    ),
    present AS (
        SELECT DISTINCT m.* FROM scoped s JOIN members m ON m.id = s.member_id
    )
    SELECT
        (SELECT COUNT(*) FROM members) AS total_members,
        (SELECT COUNT(*) FROM present) AS members_present,
        (SELECT COUNT(DISTINCT visitor_id) FROM scoped) AS visitors,
        (SELECT COUNT(*) FROM present WHERE LOWER(gender) = 'male') AS male_present,
        (SELECT COUNT(*) FROM present WHERE LOWER(gender) = 'female') AS female_present,
        (SELECT COUNT(*) FROM present
            WHERE date_of_birth > $1 - INTERVAL '18 years') AS children_present,
        (SELECT AVG(EXTRACT(EPOCH FROM (check_in_time AT TIME ZONE $3)::TIME))::FLOAT8
            FROM scoped) AS average_arrival_secs
"#;

impl AttendanceRecord {
    /// Head counts for a date. Arrival times are averaged as wall-clock
    /// times in `timezone`.
    pub async fn stats(
        pool: &PgPool,
        service_id: Option<&str>,
        date: NaiveDate,
        timezone: &str,
    ) -> Result<AttendanceStats, sqlx::Error> {
        let counts = sqlx::query_as::<_, AttendanceCounts>(STATS)
            .bind(date)
            .bind(service_id)
            .bind(timezone)
            .fetch_one(pool)
            .await?;

        Ok(counts.into())
    }

    /// Check-ins for a date, newest first
    pub async fn list(
        pool: &PgPool,
        service_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEntry>, sqlx::Error> {
        sqlx::query_as::<_, AttendanceEntry>(
            r#"
            SELECT
                a.id, a.service_id, a.check_in_date, a.check_in_time, a.status,
                a.member_id, a.visitor_id,
                COALESCE(m.first_name || ' ' || m.last_name, v.name, 'Unknown') AS name,
                COALESCE(m.phone, v.phone) AS phone,
                COALESCE(m.email, v.email) AS email
            FROM attendance a
            LEFT JOIN members m ON m.id = a.member_id
            LEFT JOIN visitors v ON v.id = a.visitor_id
            WHERE a.check_in_date = $1 AND ($2::TEXT IS NULL OR a.service_id = $2)
            ORDER BY a.check_in_time DESC
            "#,
        )
        .bind(date)
        .bind(service_id)
        .fetch_all(pool)
        .await
    }

    /// Row count and latest check-in time for a service/date
    pub async fn sync_signal(
        pool: &PgPool,
        service_id: Option<&str>,
        date: NaiveDate,
    ) -> Result<SyncSignal, sqlx::Error> {
        let (last_count, last_timestamp): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), MAX(check_in_time)
            FROM attendance
            WHERE check_in_date = $1 AND ($2::TEXT IS NULL OR service_id = $2)
            "#,
        )
        .bind(date)
        .bind(service_id)
        .fetch_one(pool)
        .await?;

        Ok(SyncSignal {
            last_count,
            last_timestamp,
        })
    }

    /// Records a member check-in. Returns `None` when the member already
    /// checked in to this service on this date.
    pub async fn check_in_member(
        pool: &PgPool,
        member_id: Uuid,
        service_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(MEMBER_CHECK_IN)
            .bind(member_id)
            .bind(service_id)
            .bind(date)
            .bind(STATUS_PRESENT)
            .fetch_optional(pool)
            .await
    }

    /// Same as [`Self::check_in_member`] for visitors
    pub async fn check_in_visitor(
        pool: &PgPool,
        visitor_id: Uuid,
        service_id: &str,
        date: NaiveDate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(VISITOR_CHECK_IN)
            .bind(visitor_id)
            .bind(service_id)
            .bind(date)
            .bind(STATUS_VISITOR)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM attendance WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl AttendanceToken {
    /// Stores a freshly issued token after expiring the service's active ones
    /// and purging tokens older than `retention_days`
    pub async fn replace_active(
        pool: &PgPool,
        service_id: &str,
        token: &str,
        retention_days: i64,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE attendance_tokens SET status = $2 WHERE service_id = $1 AND status = $3")
            .bind(service_id)
            .bind(TOKEN_EXPIRED)
            .bind(TOKEN_ACTIVE)
            .execute(&mut *tx)
            .await?;

        Self::purge_older_than(&mut *tx, retention_days).await?;

        let stored = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO attendance_tokens (service_id, token, status)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(service_id)
        .bind(token)
        .bind(TOKEN_ACTIVE)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(stored)
    }

    pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM attendance_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(pool)
            .await
    }

    pub async fn latest_active(
        pool: &PgPool,
        service_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM attendance_tokens
            WHERE service_id = $1 AND status = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(service_id)
        .bind(TOKEN_ACTIVE)
        .fetch_optional(pool)
        .await
    }

    pub async fn expire(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE attendance_tokens SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(TOKEN_EXPIRED)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Expires active tokens older than `ttl_hours`, returning how many changed
    pub async fn expire_stale(pool: &PgPool, ttl_hours: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_tokens SET status = $1
            WHERE status = $2 AND created_at < NOW() - make_interval(hours => $3::INT)
            "#,
        )
        .bind(TOKEN_EXPIRED)
        .bind(TOKEN_ACTIVE)
        .bind(ttl_hours as i32)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn purge_older_than<'e>(
        executor: impl PgExecutor<'e>,
        retention_days: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM attendance_tokens WHERE created_at < NOW() - make_interval(days => $1::INT)",
        )
        .bind(retention_days as i32)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_check_in_conflict_targets_have_unique_indexes() {
        let schema = squash(include_str!("../../migrations/20250101000000_initial.sql"));

        for (column, insert) in [("member_id", MEMBER_CHECK_IN), ("visitor_id", VISITOR_CHECK_IN)] {
            let target = format!(
                "({}, service_id, check_in_date) WHERE {} IS NOT NULL",
                column, column
            );

            let index = format!(
                "UNIQUE INDEX uq_attendance_{}_checkin ON attendance {}",
                column.trim_end_matches("_id"),
                target
            );

            assert!(schema.contains(&index), "missing unique index for {}", column);
            assert!(squash(insert).contains(&format!("ON CONFLICT {} DO NOTHING", target)));
            assert!(!insert.contains("NOT EXISTS"));
        }
    }

    #[test]
    fn test_stats_count_every_member_and_read_local_time() {
        let sql = squash(STATS);

        assert!(sql.contains("(SELECT COUNT(*) FROM members) AS total_members"));
        assert!(sql.contains("(check_in_time AT TIME ZONE $3)::TIME"));
        assert!(!sql.contains("check_in_time::TIME"));
    }

    #[test]
    fn test_service_catalogue() {
        let ids: Vec<&str> = services().iter().map(|s| s.id).collect();

        assert_eq!(ids.len(), 6);
        assert_eq!(ids[0], "sunday-1st-service");
        assert_eq!(service_name("friday-prayer"), Some("Friday Prayer"));
        assert_eq!(service_name("saturday"), None);
    }

    #[test]
    fn test_service_scope() {
        assert_eq!(service_scope(None), None);
        assert_eq!(service_scope(Some("0")), None);
        assert_eq!(service_scope(Some(" ")), None);
        assert_eq!(service_scope(Some("others")), Some("others"));
    }

    #[test]
    fn test_format_arrival() {
        assert_eq!(format_arrival(None), "N/A");
        assert_eq!(format_arrival(Some(9.0 * 3600.0 + 5.0 * 60.0)), "09:05");
        assert_eq!(format_arrival(Some(8.0 * 3600.0 + 59.0 * 60.0 + 40.0)), "09:00");
        assert_eq!(format_arrival(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn test_stats_from_counts() {
        let stats = AttendanceStats::from(AttendanceCounts {
            total_members: 40,
            members_present: 25,
            visitors: 3,
            male_present: 10,
            female_present: 15,
            children_present: 4,
            average_arrival_secs: None,
        });

        assert_eq!(stats.total_present, 28);
        assert_eq!(stats.absent, 15);
        assert_eq!(stats.average_arrival, "N/A");
    }

    #[test]
    fn test_absent_never_negative() {
        let stats = AttendanceStats::from(AttendanceCounts {
            total_members: 2,
            members_present: 3,
            ..Default::default()
        });

        assert_eq!(stats.absent, 0);
    }
}
