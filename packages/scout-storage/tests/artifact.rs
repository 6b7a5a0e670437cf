use std::fs;

use scout_storage::{
	Error,
	artifact::{self, IndexArtifact},
};

fn artifact_with(ids: &[&str], dimension: usize) -> IndexArtifact {
	let vectors = ids
		.iter()
		.enumerate()
		.flat_map(|(row, _)| (0..dimension).map(move |col| (row * dimension + col) as f32))
		.collect();

	IndexArtifact::new(
		"test:hash:4",
		dimension,
		ids.iter().map(|id| id.to_string()).collect(),
		vectors,
	)
	.expect("Failed to build artifact.")
}

#[test]
fn publish_then_load_returns_same_generation() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = dir.path().join("experts.scix");
	let published =
		artifact::publish(&path, artifact_with(&["1", "2", "3"], 4)).expect("Failed to publish.");
	let loaded = artifact::load(&path).expect("Failed to load artifact.");

	assert_eq!(loaded.artifact, published.artifact);
	assert_eq!(loaded.checksum, published.checksum);
	assert_eq!(loaded.stamp, published.stamp);
	assert_eq!(loaded.artifact.ids(), ["1", "2", "3"]);
}

#[test]
fn publish_replaces_previous_generation_without_leftovers() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = dir.path().join("experts.scix");
	let first = artifact::publish(&path, artifact_with(&["1", "2"], 4)).expect("Failed to publish.");
	let second =
		artifact::publish(&path, artifact_with(&["9"], 4)).expect("Failed to publish again.");
	let loaded = artifact::load(&path).expect("Failed to load artifact.");
	let entries: Vec<_> = fs::read_dir(dir.path())
		.expect("Failed to list temp dir.")
		.filter_map(|entry| entry.ok())
		.map(|entry| entry.file_name())
		.collect();

	assert_ne!(first.checksum, second.checksum);
	assert_eq!(loaded.artifact.ids(), ["9"]);
	assert_eq!(entries.len(), 1, "Unexpected files: {entries:?}");
}

#[test]
fn republishing_identical_rows_changes_the_checksum() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = dir.path().join("experts.scix");
	let first = artifact::publish(&path, artifact_with(&["1", "2"], 4)).expect("Failed to publish.");
	let second =
		artifact::publish(&path, artifact_with(&["1", "2"], 4)).expect("Failed to publish again.");
	let loaded = artifact::load(&path).expect("Failed to load artifact.");

	assert_ne!(first.checksum, second.checksum);
	assert_eq!(loaded.checksum, second.checksum);
	assert_eq!(loaded.artifact.generation(), second.artifact.generation());
}

#[test]
fn publish_creates_missing_directory() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = dir.path().join("nested").join("index").join("experts.scix");

	artifact::publish(&path, artifact_with(&["1"], 2)).expect("Failed to publish.");

	assert!(path.exists());
}

#[test]
fn load_missing_file_is_io_error() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let err = artifact::load(&dir.path().join("absent.scix")).expect_err("Expected load error.");

	assert!(matches!(err, Error::Io(_)), "Unexpected error: {err}");
}

#[test]
fn load_rejects_tampered_file() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = dir.path().join("experts.scix");

	artifact::publish(&path, artifact_with(&["1", "2"], 4)).expect("Failed to publish.");

	let mut bytes = fs::read(&path).expect("Failed to read artifact.");
	let last_vector_byte = bytes.len() - 33;

	bytes[last_vector_byte] ^= 0x40;

	fs::write(&path, bytes).expect("Failed to write tampered artifact.");

	let err = artifact::load(&path).expect_err("Expected corrupt artifact.");

	assert!(matches!(err, Error::Corrupt(_)), "Unexpected error: {err}");
}

#[test]
fn load_rejects_garbage() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = dir.path().join("experts.scix");

	fs::write(&path, b"not an index").expect("Failed to write garbage.");

	assert!(matches!(artifact::load(&path), Err(Error::Corrupt(_))));
}
