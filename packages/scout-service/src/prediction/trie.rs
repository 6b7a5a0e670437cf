use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Node {
	children: BTreeMap<char, Node>,
	terminal: bool,
}

/// Character trie over a user's normalized queries.
///
/// Purely in memory. This is the structure predictions fall back to when the remote cache is
/// unreachable, so it must never depend on I/O.
#[derive(Debug, Default)]
pub struct PrefixTrie {
	root: Node,
	len: usize,
}
impl PrefixTrie {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of distinct queries stored.
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Returns true when `query` was not stored before. Empty queries are ignored.
	pub fn insert(&mut self, query: &str) -> bool {
		if query.is_empty() {
			return false;
		}

		let mut node = &mut self.root;

		for ch in query.chars() {
			node = node.children.entry(ch).or_default();
		}

		if node.terminal {
			return false;
		}

		node.terminal = true;
		self.len += 1;

		true
	}

	pub fn contains(&self, query: &str) -> bool {
		self.find(query).is_some_and(|node| node.terminal)
	}

	/// Depth-first collection of stored queries under `prefix`, in character order, capped at
	/// `limit`.
	pub fn queries_with_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
		let mut out = Vec::new();
		let Some(start) = self.find(prefix) else {
			return out;
		};
		let mut stack = vec![(start, prefix.to_string())];

		while let Some((node, text)) = stack.pop() {
			if out.len() >= limit {
				break;
			}
			if node.terminal {
				out.push(text.clone());
			}

			// Reversed so the smallest character is popped first.
			for (ch, child) in node.children.iter().rev() {
				let mut next = text.clone();

				next.push(*ch);
				stack.push((child, next));
			}
		}

		out
	}

	pub fn clear(&mut self) {
		*self = Self::default();
	}

	fn find(&self, prefix: &str) -> Option<&Node> {
		let mut node = &self.root;

		for ch in prefix.chars() {
			node = node.children.get(&ch)?;
		}

		Some(node)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn collects_queries_under_prefix_in_order() {
		let mut trie = PrefixTrie::new();

		for query in ["machine learning", "machine vision", "malaria", "mach"] {
			trie.insert(query);
		}

		assert_eq!(
			trie.queries_with_prefix("mach", 10),
			vec!["mach", "machine learning", "machine vision"]
		);
		assert_eq!(trie.queries_with_prefix("ma", 2).len(), 2);
		assert!(trie.queries_with_prefix("x", 10).is_empty());
	}

	#[test]
	fn insert_is_idempotent() {
		let mut trie = PrefixTrie::new();

		assert!(trie.insert("policy"));
		assert!(!trie.insert("policy"));
		assert!(!trie.insert(""));
		assert_eq!(trie.len(), 1);
		assert!(trie.contains("policy"));
		assert!(!trie.contains("pol"));
	}

	#[test]
	fn handles_multibyte_characters() {
		let mut trie = PrefixTrie::new();

		trie.insert("café culture");
		trie.insert("cafés");

		assert_eq!(trie.queries_with_prefix("café", 5), vec!["café culture", "cafés"]);
	}

	#[test]
	fn clear_resets_everything() {
		let mut trie = PrefixTrie::new();

		trie.insert("health");
		trie.clear();

		assert!(trie.is_empty());
		assert!(trie.queries_with_prefix("h", 5).is_empty());
	}
}
