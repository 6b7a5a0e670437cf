//! Searchable text for expert records.
//!
//! Every field renders as its own labelled line in a fixed order, even when empty, so the text
//! shape is identical across complete and partial records.

use crate::expert::ExpertRecord;

const LIST_SEPARATOR: &str = " | ";

pub fn build_text(record: &ExpertRecord) -> String {
	let specialties = &record.specialties;
	let lines = [
		format!("Name: {}", record.full_name()),
		format!("Designation: {}", field(&record.designation)),
		format!("Theme: {}", field(&record.theme)),
		format!("Unit: {}", field(&record.unit)),
		format!("Contact: {}", field(&record.contact)),
		format!("Bio: {}", field(&record.bio)),
		format!("Expertise: {}", join_list(&specialties.expertise)),
		format!("Domains: {}", join_list(&specialties.domains)),
		format!("Fields: {}", join_list(&specialties.fields)),
		format!("Subfields: {}", join_list(&specialties.subfields)),
	];

	lines.join("\n")
}

fn field(value: &Option<String>) -> &str {
	value.as_deref().map(str::trim).unwrap_or_default()
}

fn join_list(items: &[String]) -> String {
	items
		.iter()
		.map(|item| item.trim())
		.filter(|item| !item.is_empty())
		.collect::<Vec<_>>()
		.join(LIST_SEPARATOR)
}
