//! On-disk index artifact.
//!
//! Vectors and the ordinal-to-id map share one file so they can only be published together:
//!
//! ```text
//! "SCIX" | version u16 | dimension u32 | count u32 | generation (16 bytes)
//! | embedder id (u16 len + utf8) | count x (u16 len + utf8 expert id) | count x dimension f32
//! | blake3 of everything before
//! ```
//!
//! All integers and floats are little-endian. Every built artifact carries a fresh generation id,
//! so two publishes of identical vectors still have distinct checksums.

use std::{
	collections::HashSet,
	fs::{self, File},
	io::{Read, Write},
	path::{Path, PathBuf},
	time::SystemTime,
};

use uuid::Uuid;

use crate::{Error, Result};

pub const MAGIC: [u8; 4] = *b"SCIX";
pub const VERSION: u16 = 2;

const CHECKSUM_LEN: usize = blake3::OUT_LEN;
const FIXED_HEADER_LEN: usize = 4 + 2 + 4 + 4 + 16;

#[derive(Clone, Debug, PartialEq)]
pub struct IndexArtifact {
	generation: Uuid,
	embedder_id: String,
	dimension: usize,
	ids: Vec<String>,
	vectors: Vec<f32>,
}
impl IndexArtifact {
	/// `vectors` is row-major: row `i` belongs to `ids[i]`.
	pub fn new(
		embedder_id: impl Into<String>,
		dimension: usize,
		ids: Vec<String>,
		vectors: Vec<f32>,
	) -> Result<Self> {
		let artifact = Self {
			generation: Uuid::new_v4(),
			embedder_id: embedder_id.into(),
			dimension,
			ids,
			vectors,
		};

		artifact.validate().map_err(Error::InvalidArgument)?;

		Ok(artifact)
	}

	pub fn generation(&self) -> Uuid {
		self.generation
	}

	pub fn embedder_id(&self) -> &str {
		&self.embedder_id
	}

	pub fn dimension(&self) -> usize {
		self.dimension
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	pub fn ids(&self) -> &[String] {
		&self.ids
	}

	pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
		let start = ordinal.checked_mul(self.dimension)?;

		self.vectors.get(start..start.checked_add(self.dimension)?)
	}

	pub fn rows(&self) -> impl Iterator<Item = (&str, &[f32])> {
		self.ids.iter().map(String::as_str).zip(self.vectors.chunks_exact(self.dimension))
	}

	pub fn encode(&self) -> Result<Vec<u8>> {
		let dimension = u32::try_from(self.dimension)
			.map_err(|_| Error::InvalidArgument("Dimension does not fit in u32.".to_string()))?;
		let count = u32::try_from(self.ids.len())
			.map_err(|_| Error::InvalidArgument("Row count does not fit in u32.".to_string()))?;
		let mut buf = Vec::with_capacity(
			FIXED_HEADER_LEN + self.vectors.len() * 4 + self.ids.len() * 8 + CHECKSUM_LEN,
		);

		buf.extend_from_slice(&MAGIC);
		buf.extend_from_slice(&VERSION.to_le_bytes());
		buf.extend_from_slice(&dimension.to_le_bytes());
		buf.extend_from_slice(&count.to_le_bytes());
		buf.extend_from_slice(self.generation.as_bytes());

		write_str(&mut buf, &self.embedder_id)?;

		for id in &self.ids {
			write_str(&mut buf, id)?;
		}
		for value in &self.vectors {
			buf.extend_from_slice(&value.to_le_bytes());
		}

		let checksum = blake3::hash(&buf);

		buf.extend_from_slice(checksum.as_bytes());

		Ok(buf)
	}

	/// Decodes and verifies an encoded artifact. Returns it with its hex checksum.
	pub fn decode(bytes: &[u8]) -> Result<(Self, String)> {
		if bytes.len() < FIXED_HEADER_LEN + CHECKSUM_LEN {
			return Err(corrupt("Artifact is truncated."));
		}

		let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
		let checksum = blake3::hash(body);

		if checksum.as_bytes().as_slice() != trailer {
			return Err(corrupt("Artifact checksum mismatch."));
		}

		let mut reader = ByteReader { bytes: body, pos: 0 };

		if reader.take(4)? != MAGIC {
			return Err(corrupt("Artifact magic mismatch."));
		}

		let version = reader.u16()?;

		if version != VERSION {
			return Err(corrupt(format!("Unsupported artifact version {version}.")));
		}

		let dimension = reader.u32()? as usize;
		let count = reader.u32()? as usize;
		let generation = Uuid::from_slice(reader.take(16)?)
			.map_err(|_| corrupt("Artifact generation is malformed."))?;
		let embedder_id = reader.string()?;
		let mut ids = Vec::with_capacity(count.min(body.len()));

		for _ in 0..count {
			ids.push(reader.string()?);
		}

		let slab_len = count
			.checked_mul(dimension)
			.and_then(|n| n.checked_mul(4))
			.ok_or_else(|| corrupt("Vector slab size overflows."))?;
		let vectors = reader
			.take(slab_len)?
			.chunks_exact(4)
			.map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
			.collect::<Vec<_>>();

		if reader.pos != body.len() {
			return Err(corrupt("Artifact has trailing bytes."));
		}

		let artifact = Self { generation, embedder_id, dimension, ids, vectors };

		artifact.validate().map_err(Error::Corrupt)?;

		Ok((artifact, checksum.to_hex().to_string()))
	}

	fn validate(&self) -> std::result::Result<(), String> {
		if self.dimension == 0 {
			return Err("Dimension must be greater than zero.".to_string());
		}
		if self.ids.len().checked_mul(self.dimension) != Some(self.vectors.len()) {
			return Err(format!(
				"Expected {} vector values for {} ids of dimension {}; found {}.",
				self.ids.len().saturating_mul(self.dimension),
				self.ids.len(),
				self.dimension,
				self.vectors.len()
			));
		}
		if self.vectors.iter().any(|value| !value.is_finite()) {
			return Err("Vectors must contain only finite values.".to_string());
		}

		let mut seen = HashSet::with_capacity(self.ids.len());

		for id in &self.ids {
			if id.is_empty() {
				return Err("Expert ids must be non-empty.".to_string());
			}
			if !seen.insert(id.as_str()) {
				return Err(format!("Duplicate expert id {id:?}."));
			}
		}

		Ok(())
	}
}

/// Identity of the file generation a snapshot was loaded from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileStamp {
	pub modified: Option<SystemTime>,
	pub len: u64,
}

#[derive(Debug)]
pub struct StoredArtifact {
	pub artifact: IndexArtifact,
	pub checksum: String,
	pub stamp: FileStamp,
}

pub fn stamp(path: &Path) -> Result<FileStamp> {
	let metadata = fs::metadata(path)?;

	Ok(FileStamp { modified: metadata.modified().ok(), len: metadata.len() })
}

pub fn load(path: &Path) -> Result<StoredArtifact> {
	let mut file = File::open(path)?;
	let metadata = file.metadata()?;
	let stamp = FileStamp { modified: metadata.modified().ok(), len: metadata.len() };
	let mut bytes = Vec::with_capacity(metadata.len() as usize);

	file.read_to_end(&mut bytes)?;

	let (artifact, checksum) = IndexArtifact::decode(&bytes)?;

	Ok(StoredArtifact { artifact, checksum, stamp })
}

/// Writes the artifact next to `path` and renames it into place.
///
/// Readers see either the previous file or the new one, never a partial write.
pub fn publish(path: &Path, artifact: IndexArtifact) -> Result<StoredArtifact> {
	let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));

	fs::create_dir_all(parent)?;

	let bytes = artifact.encode()?;
	let temp_path = temp_path_for(path);
	let written = write_synced(&temp_path, &bytes).and_then(|()| {
		fs::rename(&temp_path, path)?;

		sync_dir(parent)
	});

	if let Err(err) = written {
		let _ = fs::remove_file(&temp_path);

		return Err(err);
	}

	let checksum = blake3::hash(&bytes[..bytes.len() - CHECKSUM_LEN]).to_hex().to_string();

	Ok(StoredArtifact { artifact, checksum, stamp: stamp(path)? })
}

fn temp_path_for(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();

	name.push(format!(".tmp-{}", Uuid::new_v4().simple()));

	path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
	let mut file = File::create(path)?;

	file.write_all(bytes)?;
	file.sync_all()?;

	Ok(())
}

fn sync_dir(path: &Path) -> Result<()> {
	#[cfg(unix)]
	File::open(path)?.sync_all()?;
	#[cfg(not(unix))]
	let _ = path;

	Ok(())
}

fn write_str(buf: &mut Vec<u8>, value: &str) -> Result<()> {
	let len = u16::try_from(value.len()).map_err(|_| {
		Error::InvalidArgument(format!("String of {} bytes exceeds the u16 limit.", value.len()))
	})?;

	buf.extend_from_slice(&len.to_le_bytes());
	buf.extend_from_slice(value.as_bytes());

	Ok(())
}

fn corrupt(message: impl Into<String>) -> Error {
	Error::Corrupt(message.into())
}

struct ByteReader<'a> {
	bytes: &'a [u8],
	pos: usize,
}
impl<'a> ByteReader<'a> {
	fn take(&mut self, len: usize) -> Result<&'a [u8]> {
		let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len());
		let Some(end) = end else {
			return Err(corrupt("Artifact is truncated."));
		};
		let slice = &self.bytes[self.pos..end];

		self.pos = end;

		Ok(slice)
	}

	fn u16(&mut self) -> Result<u16> {
		let raw = self.take(2)?;

		Ok(u16::from_le_bytes([raw[0], raw[1]]))
	}

	fn u32(&mut self) -> Result<u32> {
		let raw = self.take(4)?;

		Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
	}

	fn string(&mut self) -> Result<String> {
		let len = self.u16()? as usize;
		let raw = self.take(len)?;

		String::from_utf8(raw.to_vec()).map_err(|_| corrupt("Artifact string is not UTF-8."))
	}
}
