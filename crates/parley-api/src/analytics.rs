use axum::{Json, extract::State, response::IntoResponse};

use parley_types::api::AnalyticsOverview;

use crate::error::ApiResult;
use crate::state::{AppState, with_db};

/// Trailing window of the daily series.
const OVERVIEW_DAYS: u32 = 14;
const OVERVIEW_TOP_CONTACTS: u32 = 5;

pub async fn overview(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let overview = with_db(&state, |db| {
        Ok(AnalyticsOverview {
            totals: db.get_totals()?,
            by_day: db.get_counts_by_day(OVERVIEW_DAYS)?,
            top_contacts: db.get_top_contacts(OVERVIEW_TOP_CONTACTS)?,
        })
    })
    .await?;

    Ok(Json(overview))
}
