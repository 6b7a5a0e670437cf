/// Deterministic bag-of-tokens embedding.
///
/// Each lowercase alphanumeric token lands in a blake3-chosen bucket with a blake3-chosen sign,
/// and the result is L2-normalized. Texts sharing tokens end up close together, and identical
/// texts map to identical vectors, which is all the search tests need from a real model.
pub fn hash_embed(texts: &[String], dimensions: usize) -> Vec<Vec<f32>> {
	texts.iter().map(|text| embed_one(text, dimensions)).collect()
}

fn embed_one(text: &str, dimensions: usize) -> Vec<f32> {
	let mut vector = vec![0.0_f32; dimensions];

	if dimensions == 0 {
		return vector;
	}

	for token in text
		.split(|ch: char| !ch.is_alphanumeric())
		.filter(|token| !token.is_empty())
		.map(str::to_lowercase)
	{
		let digest = blake3::hash(token.as_bytes());
		let bytes = digest.as_bytes();
		let bucket = u64::from_le_bytes([
			bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
		]) as usize % dimensions;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[bucket] += sign;
	}

	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_texts_share_vectors() {
		let texts = vec!["Health research".to_string(), "health RESEARCH".to_string()];
		let vectors = hash_embed(&texts, 16);

		assert_eq!(vectors[0], vectors[1]);
	}

	#[test]
	fn vectors_are_unit_length() {
		let vectors = hash_embed(&["alpha beta gamma".to_string()], 32);
		let norm = vectors[0].iter().map(|value| value * value).sum::<f32>().sqrt();

		assert!((norm - 1.0).abs() < 1e-5);
	}

	#[test]
	fn empty_text_is_zero_vector() {
		let vectors = hash_embed(&["  ".to_string()], 4);

		assert_eq!(vectors[0], vec![0.0; 4]);
	}
}
