use serde::{Deserialize, Serialize};

/// Ordered specialty lists. Order is preserved from the record source and drives corpus text.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Specialties {
	pub expertise: Vec<String>,
	pub domains: Vec<String>,
	pub fields: Vec<String>,
	pub subfields: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExpertRecord {
	pub id: String,
	pub first_name: Option<String>,
	pub last_name: Option<String>,
	pub designation: Option<String>,
	pub theme: Option<String>,
	pub unit: Option<String>,
	pub contact: Option<String>,
	pub bio: Option<String>,
	pub specialties: Specialties,
	pub active: bool,
}
impl ExpertRecord {
	pub fn full_name(&self) -> String {
		join_name(
			self.first_name.as_deref().unwrap_or_default(),
			self.last_name.as_deref().unwrap_or_default(),
		)
	}
}

/// Display payload cached next to each expert vector.
///
/// Every field is present and non-null. Payloads with missing or unknown fields are rejected at
/// decode time instead of being silently defaulted.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExpertMetadata {
	pub id: String,
	pub first_name: String,
	pub last_name: String,
	pub designation: String,
	pub theme: String,
	pub unit: String,
	pub contact: String,
	pub bio: String,
	pub specialties: Specialties,
	pub is_active: bool,
}
impl ExpertMetadata {
	pub fn name(&self) -> String {
		join_name(&self.first_name, &self.last_name)
	}
}
impl From<&ExpertRecord> for ExpertMetadata {
	fn from(record: &ExpertRecord) -> Self {
		let text = |value: &Option<String>| value.as_deref().map(str::trim).unwrap_or_default().to_string();

		Self {
			id: record.id.clone(),
			first_name: text(&record.first_name),
			last_name: text(&record.last_name),
			designation: text(&record.designation),
			theme: text(&record.theme),
			unit: text(&record.unit),
			contact: text(&record.contact),
			bio: text(&record.bio),
			specialties: record.specialties.clone(),
			is_active: record.active,
		}
	}
}

fn join_name(first: &str, last: &str) -> String {
	match (first.trim(), last.trim()) {
		("", "") => String::new(),
		(first, "") => first.to_string(),
		("", last) => last.to_string(),
		(first, last) => format!("{first} {last}"),
	}
}
