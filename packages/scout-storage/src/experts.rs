use serde_json::Value;

use crate::{Result, db::Db};
use scout_domain::{ExpertRecord, Specialties};

#[derive(Debug, sqlx::FromRow)]
pub struct ExpertRow {
	pub id: i64,
	pub first_name: Option<String>,
	pub last_name: Option<String>,
	pub designation: Option<String>,
	pub theme: Option<String>,
	pub unit: Option<String>,
	pub contact_details: Option<String>,
	pub bio: Option<String>,
	pub knowledge_expertise: Option<Value>,
	pub domains: Option<Vec<Option<String>>>,
	pub fields: Option<Vec<Option<String>>>,
	pub subfields: Option<Vec<Option<String>>>,
	pub is_active: Option<bool>,
}
impl From<ExpertRow> for ExpertRecord {
	fn from(row: ExpertRow) -> Self {
		Self {
			id: row.id.to_string(),
			first_name: row.first_name,
			last_name: row.last_name,
			designation: row.designation,
			theme: row.theme,
			unit: row.unit,
			contact: row.contact_details,
			bio: row.bio,
			specialties: Specialties {
				expertise: json_string_list(row.knowledge_expertise.as_ref()),
				domains: text_list(row.domains),
				fields: text_list(row.fields),
				subfields: text_list(row.subfields),
			},
			active: row.is_active.unwrap_or(true),
		}
	}
}

/// Every expert row, active or not. The active flag travels with the record so filtering can
/// happen at query time.
pub async fn fetch_experts(db: &Db) -> Result<Vec<ExpertRecord>> {
	let rows = sqlx::query_as::<_, ExpertRow>(
		"\
SELECT
	id,
	first_name,
	last_name,
	designation,
	theme,
	unit,
	contact_details,
	bio,
	knowledge_expertise,
	domains,
	fields,
	subfields,
	is_active
FROM experts_expert
WHERE id IS NOT NULL
ORDER BY id",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(ExpertRecord::from).collect())
}

/// Inserts a record and returns the generated id. `record.id` is ignored.
pub async fn insert_expert(db: &Db, record: &ExpertRecord) -> Result<i64> {
	let specialties = &record.specialties;
	let id: i64 = sqlx::query_scalar(
		"\
INSERT INTO experts_expert (
	first_name,
	last_name,
	designation,
	theme,
	unit,
	contact_details,
	bio,
	knowledge_expertise,
	domains,
	fields,
	subfields,
	is_active
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
RETURNING id",
	)
	.bind(record.first_name.as_deref())
	.bind(record.last_name.as_deref())
	.bind(record.designation.as_deref())
	.bind(record.theme.as_deref())
	.bind(record.unit.as_deref())
	.bind(record.contact.as_deref())
	.bind(record.bio.as_deref())
	.bind(Value::from(specialties.expertise.clone()))
	.bind(&specialties.domains)
	.bind(&specialties.fields)
	.bind(&specialties.subfields)
	.bind(record.active)
	.fetch_one(&db.pool)
	.await?;

	Ok(id)
}

pub async fn set_active(db: &Db, id: i64, active: bool) -> Result<bool> {
	let result = sqlx::query(
		"UPDATE experts_expert SET is_active = $1, updated_at = now() WHERE id = $2",
	)
	.bind(active)
	.bind(id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

fn json_string_list(value: Option<&Value>) -> Vec<String> {
	match value {
		Some(Value::Array(items)) => items
			.iter()
			.filter_map(Value::as_str)
			.map(str::trim)
			.filter(|item| !item.is_empty())
			.map(str::to_string)
			.collect(),
		// Some rows carry the list as an encoded JSON string.
		Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
			Ok(inner @ Value::Array(_)) => json_string_list(Some(&inner)),
			_ => Vec::new(),
		},
		_ => Vec::new(),
	}
}

fn text_list(values: Option<Vec<Option<String>>>) -> Vec<String> {
	values
		.unwrap_or_default()
		.into_iter()
		.flatten()
		.map(|item| item.trim().to_string())
		.filter(|item| !item.is_empty())
		.collect()
}
