use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db};
use scout_domain::{HistoricalQuery, query::normalize_query};

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
	query: String,
	search_count: i64,
	click_rate: f32,
	success_rate: f32,
	last_used: OffsetDateTime,
}

/// Aggregates a user's searches since `since`, one row per normalized query.
///
/// Success rate is the share of searches that returned at least one expert.
pub async fn fetch_history(
	db: &Db,
	user_id: &str,
	since: OffsetDateTime,
) -> Result<Vec<HistoricalQuery>> {
	let rows = sqlx::query_as::<_, HistoryRow>(
		"\
SELECT
	normalized_query AS query,
	COUNT(*)::BIGINT AS search_count,
	AVG(CASE WHEN clicked THEN 1.0 ELSE 0.0 END)::REAL AS click_rate,
	AVG(CASE WHEN result_count > 0 THEN 1.0 ELSE 0.0 END)::REAL AS success_rate,
	MAX(created_at) AS last_used
FROM search_queries
WHERE user_id = $1
	AND created_at >= $2
	AND normalized_query <> ''
GROUP BY normalized_query
ORDER BY normalized_query",
	)
	.bind(user_id)
	.bind(since)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows
		.into_iter()
		.map(|row| HistoricalQuery {
			query: row.query,
			search_count: row.search_count.max(0) as u64,
			click_rate: row.click_rate,
			success_rate: row.success_rate,
			last_used: row.last_used,
		})
		.collect())
}

pub async fn record_search(
	db: &Db,
	user_id: &str,
	query: &str,
	result_count: u32,
) -> Result<Uuid> {
	let search_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO search_queries (search_id, user_id, query, normalized_query, result_count, created_at)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(search_id)
	.bind(user_id)
	.bind(query)
	.bind(normalize_query(query))
	.bind(i32::try_from(result_count).unwrap_or(i32::MAX))
	.bind(OffsetDateTime::now_utc())
	.execute(&db.pool)
	.await?;

	Ok(search_id)
}

/// Marks a recorded search as clicked. Returns false when the search id is unknown.
pub async fn record_click(db: &Db, search_id: Uuid, expert_id: &str) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE search_queries
SET clicked = true, clicked_expert_id = $2
WHERE search_id = $1",
	)
	.bind(search_id)
	.bind(expert_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}
