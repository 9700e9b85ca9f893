use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Number of fixed page slots an event description is spread across
/// (top, side, and three bottom blocks).
pub const SLOT_COUNT: usize = 5;

/// Text shown when an event has no description at all. A description of
/// only whitespace is kept as given and leaves every slot empty.
pub const FALLBACK_DESCRIPTION: &str = "No description available.";

fn sentence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[^.!?]+[.!?]+|[^.!?]+$").expect("sentence pattern is valid")
    })
}

/// Description text split into the five event page slots, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DescriptionSlots([String; SLOT_COUNT]);

impl DescriptionSlots {
    pub fn slots(&self) -> &[String; SLOT_COUNT] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Slots that carry text, with their position. Empty slots are not rendered.
    pub fn non_empty(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(index, text)| (index, text.as_str()))
    }
}

/// Spreads an event description over the five page slots.
///
/// Paragraphs (blank-line separated) are the unit of distribution. When there
/// are fewer than five of them the text is re-split into sentences so sparse
/// descriptions still fill the page.
pub fn distribute_description(description: Option<&str>) -> DescriptionSlots {
    let chunks = split_chunks(description.unwrap_or_default());
    let buckets = distribute(&chunks, SLOT_COUNT);

    let mut slots: [String; SLOT_COUNT] = Default::default();
    for (slot, bucket) in slots.iter_mut().zip(buckets) {
        *slot = bucket.join(" ");
    }

    DescriptionSlots(slots)
}

/// Normalizes the text and splits it into chunks: paragraphs, or sentences
/// when there are fewer paragraphs than slots.
pub fn split_chunks(description: &str) -> Vec<String> {
    let description = if description.is_empty() {
        FALLBACK_DESCRIPTION
    } else {
        description
    };
    let normalized = description.replace('\r', "");
    let cleaned = normalized.trim();

    let paragraphs: Vec<&str> = cleaned
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .collect();

    if paragraphs.len() >= SLOT_COUNT {
        return paragraphs.into_iter().map(str::to_string).collect();
    }

    paragraphs
        .into_iter()
        .flat_map(split_sentences)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_sentences(chunk: &str) -> Vec<&str> {
    let sentences: Vec<&str> = sentence_pattern()
        .find_iter(chunk)
        .map(|m| m.as_str())
        .collect();

    // Chunks made only of terminators ("...") have no match; keep them whole.
    if sentences.is_empty() {
        vec![chunk]
    } else {
        sentences
    }
}

/// Assigns chunks to `slots` buckets contiguously and in order. The first
/// `len % slots` buckets get one extra chunk.
pub fn distribute<T: Clone>(chunks: &[T], slots: usize) -> Vec<Vec<T>> {
    if slots == 0 {
        return Vec::new();
    }

    let base = chunks.len() / slots;
    let remainder = chunks.len() % slots;

    let mut buckets = Vec::with_capacity(slots);
    let mut start = 0;
    for index in 0..slots {
        let count = if index < remainder { base + 1 } else { base };
        buckets.push(chunks[start..start + count].to_vec());
        start += count;
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_description_uses_fallback() {
        let slots = distribute_description(Some(""));

        assert_eq!(slots.get(0), Some(FALLBACK_DESCRIPTION));
        for index in 1..SLOT_COUNT {
            assert_eq!(slots.get(index), Some(""));
        }
    }

    #[test]
    fn test_missing_description_uses_fallback() {
        assert_eq!(
            distribute_description(None).get(0),
            Some(FALLBACK_DESCRIPTION)
        );
    }

    #[test]
    fn test_whitespace_description_leaves_slots_empty() {
        let slots = distribute_description(Some(" \r\n\r\n  "));

        assert_eq!(slots.non_empty().count(), 0);
        assert!(split_chunks("\n\t ").is_empty());
    }

    #[test]
    fn test_five_paragraphs_are_not_split_into_sentences() {
        let text = "One. Two.\n\nThree.\n\nFour! Five?\n\nSix.\n\nSeven. Eight.";
        let chunks = split_chunks(text);

        assert_eq!(
            chunks,
            vec!["One. Two.", "Three.", "Four! Five?", "Six.", "Seven. Eight."]
        );

        let slots = distribute_description(Some(text));
        assert_eq!(slots.get(0), Some("One. Two."));
        assert_eq!(slots.get(4), Some("Seven. Eight."));
    }

    #[test]
    fn test_single_paragraph_falls_back_to_sentences() {
        let slots = distribute_description(Some("Come early. Bring a friend! Will you join us?"));

        assert_eq!(slots.get(0), Some("Come early."));
        assert_eq!(slots.get(1), Some("Bring a friend!"));
        assert_eq!(slots.get(2), Some("Will you join us?"));
        assert_eq!(slots.get(3), Some(""));
        assert_eq!(slots.get(4), Some(""));
        assert_eq!(slots.non_empty().count(), 3);
    }

    #[test]
    fn test_run_on_sentence_fills_one_slot() {
        let text = "a long announcement without any terminator at all";
        let slots = distribute_description(Some(text));

        assert_eq!(slots.get(0), Some(text));
        assert_eq!(slots.non_empty().count(), 1);
    }

    #[test]
    fn test_carriage_returns_are_stripped() {
        let chunks = split_chunks("First line.\r\n\r\nSecond line.");
        assert_eq!(chunks, vec!["First line.", "Second line."]);
    }

    #[test]
    fn test_terminator_only_chunk_is_kept() {
        let chunks = split_chunks("...");
        assert_eq!(chunks, vec!["..."]);
    }

    #[test]
    fn test_distribution_sizes_and_order() {
        for n in 0..23usize {
            let chunks: Vec<usize> = (0..n).collect();
            let buckets = distribute(&chunks, SLOT_COUNT);

            assert_eq!(buckets.len(), SLOT_COUNT);

            let flattened: Vec<usize> = buckets.iter().flatten().copied().collect();
            assert_eq!(flattened, chunks, "order must be preserved for n={}", n);

            let sizes: Vec<usize> = buckets.iter().map(Vec::len).collect();
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            assert!(max - min <= 1, "sizes {:?} for n={}", sizes, n);

            for (index, size) in sizes.iter().enumerate() {
                let expected = n / SLOT_COUNT + usize::from(index < n % SLOT_COUNT);
                assert_eq!(*size, expected);
            }
        }
    }

    #[test]
    fn test_slots_reproduce_chunks_in_order() {
        let text = "Alpha one. Alpha two.\n\nBeta.\n\nGamma! Delta? Epsilon. Zeta.";
        let chunks = split_chunks(text);
        let slots = distribute_description(Some(text));

        let joined: Vec<&str> = slots
            .slots()
            .iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect();
        assert_eq!(joined.join(" "), chunks.join(" "));
    }

    #[test]
    fn test_seven_paragraphs_spread_two_two_one_one_one() {
        let text = (1..=7)
            .map(|i| format!("Paragraph {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let slots = distribute_description(Some(&text));

        assert_eq!(slots.get(0), Some("Paragraph 1. Paragraph 2."));
        assert_eq!(slots.get(1), Some("Paragraph 3. Paragraph 4."));
        assert_eq!(slots.get(2), Some("Paragraph 5."));
        assert_eq!(slots.get(4), Some("Paragraph 7."));
    }

    #[test]
    fn test_formatter_is_deterministic() {
        let text = "Worship night.\n\nPrayer and praise! Everyone welcome.";
        assert_eq!(
            distribute_description(Some(text)),
            distribute_description(Some(text))
        );
    }
}
