use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One ledger entry in a student's ticket history. Awards are positive,
/// redemptions negative; the server maintains the running balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketTransaction {
    pub id: Uuid,
    pub student_id: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    TaskAward,
    Redemption,
    ManualAdjustment,
    StreakBonus,
}

/// Practice-streak summary computed server-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreakStats {
    pub student_id: Uuid,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub last_practice_date: Option<NaiveDate>,
}
