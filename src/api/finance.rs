use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::forms::with_other;
use crate::api::middleware::session::AppState;
use crate::error::{ActionResponse, AppError, Result};
use crate::models::finance::{
    DeleteOutcome, FinanceOverview, FinanceRecord, FinanceRecordData, FinanceRecordUpdate,
    RecordFilter, Withdrawal, WithdrawalData, WithdrawalOutcome,
};
use crate::services::finance::{
    amount_to_cents, normalize_payment_method, normalize_payment_period, normalize_service_type,
    transaction_id, AccountBalance, RecordKind,
};

/// Amounts arrive either as JSON numbers or as the raw input string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    fn cents(&self) -> Option<i64> {
        match self {
            AmountInput::Number(n) => amount_to_cents(*n),
            AmountInput::Text(s) => s.trim().parse::<f64>().ok().and_then(amount_to_cents),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub date: Option<String>,
    pub payment_method: Option<String>,
    pub amount: Option<AmountInput>,
    pub service_type: Option<String>,
    pub project_name: Option<String>,
    pub member_id: Option<Uuid>,
    pub receipt_number: Option<String>,
    pub payment_period: Option<String>,
    pub category: Option<String>,
    pub custom_category: Option<String>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub counted_by: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordRequest {
    pub date: Option<String>,
    pub amount: Option<AmountInput>,
    pub payment_method: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListRecordsQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub search: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RecordRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRecordsRequest {
    #[serde(default)]
    pub records: Vec<RecordRef>,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub account_type: Option<String>,
    pub amount: Option<AmountInput>,
    pub recipient: Option<String>,
    pub purpose: Option<String>,
    pub authorized_by: Option<String>,
    pub date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountBalanceResponse {
    pub account: RecordKind,
    #[serde(flatten)]
    pub balance: AccountBalance,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub withdrawal: Withdrawal,
    pub remaining_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct DeletedRecords {
    pub deleted: usize,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_kind(value: Option<&str>) -> Result<RecordKind> {
    value
        .ok_or_else(|| AppError::validation("Transaction type is required"))?
        .parse::<RecordKind>()
        .map_err(AppError::Validation)
}

fn parse_account(value: Option<&str>) -> Result<RecordKind> {
    match value.map(str::parse::<RecordKind>) {
        Some(Ok(kind)) if kind.is_income_account() => Ok(kind),
        _ => Err(AppError::validation("Invalid account type")),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date: {}", value)))
}

impl CreateRecordRequest {
    fn into_data(self, transaction_id: String) -> Result<FinanceRecordData> {
        let (Some(kind), Some(date), Some(payment_method)) = (
            present(&self.kind),
            present(&self.date),
            present(&self.payment_method),
        ) else {
            return Err(AppError::validation("Missing required fields"));
        };

        let kind = parse_kind(Some(kind))?;
        let record_date = parse_date(date)?;
        let payment_method = normalize_payment_method(payment_method).to_string();
        let amount_cents = self
            .amount
            .as_ref()
            .and_then(AmountInput::cents)
            .ok_or_else(|| AppError::validation("Invalid amount"))?;

        let collected_at_service = matches!(kind, RecordKind::Offering | RecordKind::ProjectOffering);
        let service_type = collected_at_service.then(|| {
            normalize_service_type(self.service_type.as_deref().unwrap_or_default()).to_string()
        });
        let payment_period = (kind == RecordKind::Welfare).then(|| {
            normalize_payment_period(self.payment_period.as_deref().unwrap_or_default()).to_string()
        });
        let category = match kind {
            RecordKind::Expense => with_other(present(&self.category), present(&self.custom_category)),
            _ => None,
        };

        // Offerings are counted first and confirmed later
        let status = match kind {
            RecordKind::Offering | RecordKind::ProjectOffering => kind.default_status().to_string(),
            _ => present(&self.status)
                .map(str::to_string)
                .unwrap_or_else(|| kind.default_status().to_string()),
        };

        Ok(FinanceRecordData {
            transaction_id,
            kind,
            record_date,
            amount_cents,
            payment_method,
            service_type,
            project_name: self.project_name.filter(|_| kind == RecordKind::ProjectOffering),
            member_id: self
                .member_id
                .filter(|_| matches!(kind, RecordKind::Tithe | RecordKind::Welfare)),
            receipt_number: self.receipt_number.filter(|_| kind == RecordKind::Tithe),
            payment_period,
            category,
            vendor: self.vendor.filter(|_| kind == RecordKind::Expense),
            description: self.description.filter(|_| kind == RecordKind::Expense),
            counted_by: self.counted_by.filter(|_| collected_at_service),
            status,
            notes: self.notes,
        })
    }
}

impl UpdateRecordRequest {
    fn into_update(self) -> Result<FinanceRecordUpdate> {
        let record_date = present(&self.date).map(parse_date).transpose()?;
        let amount_cents = match &self.amount {
            Some(amount) => Some(
                amount
                    .cents()
                    .ok_or_else(|| AppError::validation("Invalid amount"))?,
            ),
            None => None,
        };

        Ok(FinanceRecordUpdate {
            record_date,
            amount_cents,
            payment_method: present(&self.payment_method)
                .map(|m| normalize_payment_method(m).to_string()),
            status: present(&self.status).map(str::to_string),
            notes: self.notes,
        })
    }
}

impl WithdrawRequest {
    fn into_data(self, transaction_id: String) -> Result<WithdrawalData> {
        let (Some(account), Some(recipient), Some(purpose), Some(authorized_by), Some(date)) = (
            present(&self.account_type),
            present(&self.recipient),
            present(&self.purpose),
            present(&self.authorized_by),
            present(&self.date),
        ) else {
            return Err(AppError::validation("Missing required fields"));
        };
        let Some(amount) = self.amount.as_ref() else {
            return Err(AppError::validation("Missing required fields"));
        };

        let account = parse_account(Some(account))?;
        let amount_cents = amount
            .cents()
            .ok_or_else(|| AppError::validation("Invalid amount"))?;

        Ok(WithdrawalData {
            transaction_id,
            account,
            amount_cents,
            recipient: recipient.to_string(),
            purpose: purpose.to_string(),
            authorized_by: authorized_by.to_string(),
            withdrawal_date: parse_date(date)?,
            notes: self.notes,
        })
    }
}

async fn create_record(
    State(state): State<AppState>,
    Json(req): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<ActionResponse<FinanceRecord>>)> {
    let data = req.into_data(transaction_id("TRX", Utc::now()))?;
    let label = data.kind.label();

    let record = FinanceRecord::create(&state.pool, data).await?;

    tracing::info!(
        transaction_id = %record.transaction_id,
        kind = %record.kind,
        amount_cents = record.amount_cents,
        "Finance record created"
    );

    Ok((
        StatusCode::CREATED,
        ActionResponse::with_message(format!("{} recorded successfully", label), record),
    ))
}

async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<ActionResponse<Vec<FinanceRecord>>>> {
    let kind = parse_kind(present(&query.kind))?;
    let filter = RecordFilter {
        search: query.search,
        date: query.date,
    };

    let records = FinanceRecord::list(&state.pool, kind, &filter).await?;

    Ok(ActionResponse::data(records))
}

async fn update_record(
    State(state): State<AppState>,
    Path(txid): Path<String>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<Json<ActionResponse<FinanceRecord>>> {
    let update = req.into_update()?;

    let record = FinanceRecord::update(&state.pool, &txid, update)
        .await?
        .ok_or_else(|| AppError::not_found("Record not found"))?;

    tracing::info!(transaction_id = %txid, "Finance record updated");

    Ok(ActionResponse::with_message("Record updated successfully", record))
}

async fn delete_records(
    State(state): State<AppState>,
    Json(req): Json<DeleteRecordsRequest>,
) -> Result<Json<ActionResponse<DeletedRecords>>> {
    if req.records.is_empty() {
        return Err(AppError::validation("No records selected"));
    }

    let records = req
        .records
        .into_iter()
        .map(|r| -> Result<(String, RecordKind)> { Ok((r.id, parse_kind(Some(r.kind.as_str()))?)) })
        .collect::<Result<Vec<_>>>()?;

    match FinanceRecord::delete_many(&state.pool, &records).await? {
        DeleteOutcome::Deleted(deleted) => {
            tracing::info!(deleted, "Finance records deleted");
            Ok(ActionResponse::with_message(
                "Records deleted successfully",
                DeletedRecords { deleted },
            ))
        }
        DeleteOutcome::Missing(txid) => {
            Err(AppError::not_found(format!("Record not found: {}", txid)))
        }
    }
}

async fn account_balance(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<ActionResponse<AccountBalanceResponse>>> {
    let account = parse_account(present(&query.account))?;
    let balance = Withdrawal::balance(&state.pool, account).await?;

    Ok(ActionResponse::data(AccountBalanceResponse { account, balance }))
}

async fn withdraw(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<ActionResponse<WithdrawalResponse>>)> {
    let data = req.into_data(transaction_id("WD", Utc::now()))?;

    match Withdrawal::create_checked(&state.pool, data).await? {
        WithdrawalOutcome::Created {
            withdrawal,
            remaining_cents,
        } => {
            tracing::info!(
                transaction_id = %withdrawal.transaction_id,
                account = %withdrawal.account_type,
                amount_cents = withdrawal.amount_cents,
                remaining_cents,
                "Withdrawal recorded"
            );

            Ok((
                StatusCode::CREATED,
                ActionResponse::with_message(
                    "Withdrawal successful",
                    WithdrawalResponse {
                        withdrawal,
                        remaining_cents,
                    },
                ),
            ))
        }
        WithdrawalOutcome::InsufficientFunds(message) => Err(AppError::Validation(message)),
    }
}

async fn list_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<ActionResponse<Vec<Withdrawal>>>> {
    let account = match present(&query.account) {
        None | Some("all") => None,
        Some(account) => Some(parse_account(Some(account))?),
    };

    let withdrawals = Withdrawal::list(&state.pool, account).await?;

    Ok(ActionResponse::data(withdrawals))
}

async fn overview(State(state): State<AppState>) -> Result<Json<ActionResponse<FinanceOverview>>> {
    let overview = FinanceOverview::load(&state.pool).await?;

    Ok(ActionResponse::data(overview))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/finance/records", post(create_record).get(list_records))
        .route("/finance/records/delete", post(delete_records))
        .route("/finance/records/:transaction_id", put(update_record))
        .route("/finance/balance", get(account_balance))
        .route("/finance/withdraw", post(withdraw))
        .route("/finance/withdrawals", get(list_withdrawals))
        .route("/finance/overview", get(overview))
}
