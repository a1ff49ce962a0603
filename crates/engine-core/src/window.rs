//! Incremental-sync window policy: where the next request's lower bound
//! comes from.

use chrono::{DateTime, Duration, Utc};
use connectors::{
    error::ServiceError,
    warehouse::{TableRef, Warehouse},
};
use model::window::{
    lookback::{Lookback, LookbackHours},
    range::SyncWindow,
};
use tracing::{debug, info};

/// `[now - hours, now)`.
pub fn hourly(now: DateTime<Utc>, hours: LookbackHours) -> SyncWindow {
    SyncWindow::bounded(now - Duration::hours(i64::from(hours.hours())), now)
}

/// `[watermark - overlap_days, now)`, or an unbounded window when the sink
/// holds nothing yet.
pub fn from_watermark(
    now: DateTime<Utc>,
    watermark: Option<DateTime<Utc>>,
    overlap_days: u32,
) -> SyncWindow {
    match watermark {
        Some(mark) => SyncWindow::bounded(mark - Duration::days(i64::from(overlap_days)), now),
        None => SyncWindow::unbounded(now),
    }
}

pub fn for_lookback(
    now: DateTime<Utc>,
    lookback: &Lookback,
    watermark: Option<DateTime<Utc>>,
) -> SyncWindow {
    match lookback {
        Lookback::Hours { hours } => hourly(now, *hours),
        Lookback::Watermark { overlap_days } => from_watermark(now, watermark, *overlap_days),
    }
}

/// Largest value of `column` already in `table`, read fresh on every run.
/// A missing table or an empty one yields `None`.
pub async fn read_watermark(
    warehouse: &dyn Warehouse,
    table: &TableRef,
    column: &str,
) -> Result<Option<DateTime<Utc>>, ServiceError> {
    if !warehouse.table_exists(table).await? {
        info!(table = %table, "Table does not exist yet; syncing full history");
        return Ok(None);
    }
    let sql = format!("SELECT MAX(`{column}`) AS watermark FROM `{table}`");
    let rows = warehouse.query(&sql).await?;
    let watermark = rows.first().and_then(|row| row.timestamp("watermark"));
    debug!(table = %table, column, ?watermark, "Read watermark");
    Ok(watermark)
}
