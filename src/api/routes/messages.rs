use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::api::AppState;
use crate::api::types::{ApiError, PageParams, paginated};
use crate::core::constants::SEARCH_MAX_QUERY_LEN;
use crate::data::types::{
    ListMessagesParams, MessageSearchResult, MessageView, PaginatedResponse, SearchFilters,
    SearchMessagesParams,
};

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub q: Option<String>,
    pub channel_id: Option<i64>,
    pub user_id: Option<i64>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

/// A bare `YYYY-MM-DD` date range boundary is expanded to midnight (start)
/// or the last instant of that day (end, inclusive); a full RFC 3339
/// timestamp is used as-is either way.
fn parse_range_bound(s: &Option<String>, field: &str, end_of_day: bool) -> Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = s else { return Ok(None) };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap()
        } else {
            NaiveTime::MIN
        };
        return Ok(Some(DateTime::from_naive_utc_and_offset(date.and_time(time), Utc)));
    }
    Err(ApiError::bad_request(
        "INVALID_TIMESTAMP",
        format!("{} must be an RFC 3339 timestamp or YYYY-MM-DD date", field),
    ))
}

/// `GET /messages?q&channel_id?&user_id?&start?&end?&page?&page_size?` —
/// full-text search when `q` is set, plain filtered listing otherwise.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = query.page.resolve()?;
    let start_time = parse_range_bound(&query.start, "start", false)?;
    let end_time = parse_range_bound(&query.end, "end", true)?;
    if let (Some(start), Some(end)) = (start_time, end_time) {
        if end < start {
            return Err(ApiError::bad_request("INVALID_RANGE", "end must not be before start"));
        }
    }

    let filters = SearchFilters {
        channel_id: query.channel_id,
        user_id: query.user_id,
        start_time,
        end_time,
    };

    if let Some(q) = query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()) {
        if q.chars().count() < 2 {
            return Err(ApiError::bad_request(
                "QUERY_TOO_SHORT",
                "query must be at least 2 characters",
            ));
        }
        if q.len() > SEARCH_MAX_QUERY_LEN {
            return Err(ApiError::bad_request(
                "QUERY_TOO_LONG",
                format!("query must be at most {} characters", SEARCH_MAX_QUERY_LEN),
            ));
        }
        let (results, total) = state
            .repo
            .search_messages(&SearchMessagesParams {
                query: q,
                filters,
                page,
            })
            .await?;
        let response: PaginatedResponse<MessageSearchResult> = paginated(results, page, total);
        Ok(Json(serde_json::to_value(response).unwrap_or_default()))
    } else {
        let (results, total) = state
            .repo
            .list_messages(&ListMessagesParams { filters, page })
            .await?;
        let response: PaginatedResponse<MessageView> = paginated(results, page, total);
        Ok(Json(serde_json::to_value(response).unwrap_or_default()))
    }
}
