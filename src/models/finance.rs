use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::activity::ActivityLog;
use crate::services::finance::{format_cents, AccountBalance, RecordKind};

const RECORD_LIST_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FinanceRecord {
    pub id: Uuid,
    pub transaction_id: String,
    pub kind: String,
    pub record_date: NaiveDate,
    pub amount_cents: i64,
    pub payment_method: String,
    pub service_type: Option<String>,
    pub project_name: Option<String>,
    pub member_id: Option<Uuid>,
    pub receipt_number: Option<String>,
    pub payment_period: Option<String>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub counted_by: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub transaction_id: String,
    pub account_type: String,
    pub amount_cents: i64,
    pub recipient: String,
    pub purpose: String,
    pub authorized_by: String,
    pub withdrawal_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FinanceRecordData {
    pub transaction_id: String,
    pub kind: RecordKind,
    pub record_date: NaiveDate,
    pub amount_cents: i64,
    pub payment_method: String,
    pub service_type: Option<String>,
    pub project_name: Option<String>,
    pub member_id: Option<Uuid>,
    pub receipt_number: Option<String>,
    pub payment_period: Option<String>,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub description: Option<String>,
    pub counted_by: Option<String>,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FinanceRecordUpdate {
    pub record_date: Option<NaiveDate>,
    pub amount_cents: Option<i64>,
    pub payment_method: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalData {
    pub transaction_id: String,
    pub account: RecordKind,
    pub amount_cents: i64,
    pub recipient: String,
    pub purpose: String,
    pub authorized_by: String,
    pub withdrawal_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub search: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted(usize),
    /// Nothing was deleted because this transaction id does not exist
    Missing(String),
}

#[derive(Debug)]
pub enum WithdrawalOutcome {
    Created {
        withdrawal: Withdrawal,
        remaining_cents: i64,
    },
    InsufficientFunds(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    pub account: RecordKind,
    #[serde(flatten)]
    pub balance: AccountBalance,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinanceOverview {
    pub accounts: Vec<AccountOverview>,
    pub total_income_cents: i64,
    pub total_expenses_cents: i64,
}

impl FinanceRecord {
    pub async fn create(pool: &PgPool, data: FinanceRecordData) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let record = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO finance_records (
                transaction_id, kind, record_date, amount_cents, payment_method,
                service_type, project_name, member_id, receipt_number, payment_period,
                category, vendor, description, counted_by, status, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(&data.transaction_id)
        .bind(data.kind.as_str())
        .bind(data.record_date)
        .bind(data.amount_cents)
        .bind(&data.payment_method)
        .bind(&data.service_type)
        .bind(&data.project_name)
        .bind(data.member_id)
        .bind(&data.receipt_number)
        .bind(&data.payment_period)
        .bind(&data.category)
        .bind(&data.vendor)
        .bind(&data.description)
        .bind(&data.counted_by)
        .bind(&data.status)
        .bind(&data.notes)
        .fetch_one(&mut *tx)
        .await?;

        ActivityLog::record(
            &mut *tx,
            data.kind.as_str(),
            &format!("{} recorded", data.kind.label()),
            &format!(
                "{} of ₵{} recorded ({})",
                data.kind.label(),
                format_cents(data.amount_cents),
                data.transaction_id
            ),
        )
        .await?;

        tx.commit().await?;

        Ok(record)
    }

    /// Newest records of one kind
    pub async fn list(
        pool: &PgPool,
        kind: RecordKind,
        filter: &RecordFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM finance_records WHERE kind = ");
        query.push_bind(kind.as_str());

        if let Some(date) = filter.date {
            query.push(" AND record_date = ").push_bind(date);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (transaction_id ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR COALESCE(description, '') ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR COALESCE(project_name, '') ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR COALESCE(vendor, '') ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        query
            .push(" ORDER BY record_date DESC, created_at DESC LIMIT ")
            .push_bind(RECORD_LIST_LIMIT);

        query.build_query_as::<Self>().fetch_all(pool).await
    }

    /// Edits the mutable fields of a record; unset fields keep their value
    pub async fn update(
        pool: &PgPool,
        transaction_id: &str,
        update: FinanceRecordUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE finance_records SET
                record_date = COALESCE($2, record_date),
                amount_cents = COALESCE($3, amount_cents),
                payment_method = COALESCE($4, payment_method),
                status = COALESCE($5, status),
                notes = COALESCE($6, notes)
            WHERE transaction_id = $1
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(update.record_date)
        .bind(update.amount_cents)
        .bind(&update.payment_method)
        .bind(&update.status)
        .bind(&update.notes)
        .fetch_optional(pool)
        .await
    }

    /// Deletes every listed record or none of them
    pub async fn delete_many(
        pool: &PgPool,
        records: &[(String, RecordKind)],
    ) -> Result<DeleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        for (transaction_id, kind) in records {
            let result =
                sqlx::query("DELETE FROM finance_records WHERE transaction_id = $1 AND kind = $2")
                    .bind(transaction_id)
                    .bind(kind.as_str())
                    .execute(&mut *tx)
                    .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(DeleteOutcome::Missing(transaction_id.clone()));
            }
        }

        tx.commit().await?;

        Ok(DeleteOutcome::Deleted(records.len()))
    }

    pub async fn total_cents<'e>(
        executor: impl PgExecutor<'e>,
        kind: RecordKind,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM finance_records WHERE kind = $1",
        )
        .bind(kind.as_str())
        .fetch_one(executor)
        .await
    }
}

impl Withdrawal {
    pub async fn total_cents<'e>(
        executor: impl PgExecutor<'e>,
        account: RecordKind,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM withdrawals WHERE account_type = $1",
        )
        .bind(account.as_str())
        .fetch_one(executor)
        .await
    }

    pub async fn balance(pool: &PgPool, account: RecordKind) -> Result<AccountBalance, sqlx::Error> {
        let income = FinanceRecord::total_cents(pool, account).await?;
        let withdrawn = Self::total_cents(pool, account).await?;

        Ok(AccountBalance::new(income, withdrawn))
    }

    /// Checks the balance and records the withdrawal in one transaction.
    /// Withdrawals against the same account are serialized with an advisory lock.
    pub async fn create_checked(
        pool: &PgPool,
        data: WithdrawalData,
    ) -> Result<WithdrawalOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("withdrawal:{}", data.account.as_str()))
            .execute(&mut *tx)
            .await?;

        let income = FinanceRecord::total_cents(&mut *tx, data.account).await?;
        let withdrawn = Self::total_cents(&mut *tx, data.account).await?;
        let balance = AccountBalance::new(income, withdrawn);

        let remaining_cents = match balance.withdraw(data.amount_cents) {
            Ok(remaining) => remaining,
            Err(message) => {
                tx.rollback().await?;
                return Ok(WithdrawalOutcome::InsufficientFunds(message));
            }
        };

        let withdrawal = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO withdrawals (
                transaction_id, account_type, amount_cents, recipient, purpose,
                authorized_by, withdrawal_date, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&data.transaction_id)
        .bind(data.account.as_str())
        .bind(data.amount_cents)
        .bind(&data.recipient)
        .bind(&data.purpose)
        .bind(&data.authorized_by)
        .bind(data.withdrawal_date)
        .bind(&data.notes)
        .fetch_one(&mut *tx)
        .await?;

        ActivityLog::record(
            &mut *tx,
            "withdrawal",
            "Funds withdrawn",
            &format!(
                "₵{} withdrawn from {} for {} ({})",
                format_cents(data.amount_cents),
                data.account.label(),
                data.purpose,
                data.transaction_id
            ),
        )
        .await?;

        tx.commit().await?;

        Ok(WithdrawalOutcome::Created {
            withdrawal,
            remaining_cents,
        })
    }

    pub async fn list(
        pool: &PgPool,
        account: Option<RecordKind>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM withdrawals
            WHERE $1::TEXT IS NULL OR account_type = $1
            ORDER BY withdrawal_date DESC, created_at DESC
            "#,
        )
        .bind(account.map(|a| a.as_str()))
        .fetch_all(pool)
        .await
    }
}

impl FinanceOverview {
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let mut accounts = Vec::with_capacity(RecordKind::INCOME_ACCOUNTS.len());
        for account in RecordKind::INCOME_ACCOUNTS {
            accounts.push(AccountOverview {
                account,
                balance: Withdrawal::balance(pool, account).await?,
            });
        }

        let total_expenses_cents = FinanceRecord::total_cents(pool, RecordKind::Expense).await?;

        Ok(Self::from_parts(accounts, total_expenses_cents))
    }

    fn from_parts(accounts: Vec<AccountOverview>, total_expenses_cents: i64) -> Self {
        let total_income_cents = accounts.iter().map(|a| a.balance.income_cents).sum();

        Self {
            accounts,
            total_income_cents,
            total_expenses_cents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_totals() {
        let overview = FinanceOverview::from_parts(
            vec![
                AccountOverview {
                    account: RecordKind::Offering,
                    balance: AccountBalance::new(10_000, 2_500),
                },
                AccountOverview {
                    account: RecordKind::Tithe,
                    balance: AccountBalance::new(40_000, 0),
                },
            ],
            7_000,
        );

        assert_eq!(overview.total_income_cents, 50_000);
        assert_eq!(overview.total_expenses_cents, 7_000);
    }

    #[test]
    fn test_account_overview_serializes_flat() {
        let account = AccountOverview {
            account: RecordKind::ProjectOffering,
            balance: AccountBalance::new(900, 100),
        };
        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["account"], "projectoffering");
        assert_eq!(json["balance_cents"], 800);
    }
}
