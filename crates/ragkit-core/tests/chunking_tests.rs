use proptest::prelude::*;

use ragkit_core::{normalize_text, split_text, Chunker, ChunkerConfig, Error};

fn default_separators() -> Vec<String> {
    ChunkerConfig::default().separators
}

fn letters(n: usize) -> String {
    (0..n).map(|i| (b'a' + (i % 26) as u8) as char).collect()
}

/// True when `chunks` can be placed in `text` left to right, each starting no
/// earlier than the one before, so that only whitespace is left uncovered.
fn covers_in_order(text: &str, chunks: &[String]) -> bool {
    let blank = |from: usize, to: usize| from >= to || text[from..to].trim().is_empty();
    let mut placed: Vec<(usize, usize)> = vec![(0, 0)];
    for chunk in chunks {
        let next: Vec<(usize, usize)> = (0..=text.len().saturating_sub(chunk.len()))
            .filter(|&q| text.is_char_boundary(q) && text[q..].starts_with(chunk.as_str()))
            .filter(|&q| placed.iter().any(|&(start, end)| start <= q && blank(end, q)))
            .map(|q| (q, q + chunk.len()))
            .collect();
        if next.is_empty() {
            return false;
        }
        placed = next;
    }
    placed.iter().any(|&(_, end)| blank(end, text.len()))
}

#[test]
fn empty_and_whitespace_input_yield_no_chunks() {
    let seps = default_separators();
    assert!(split_text("", 500, 50, &seps).unwrap().is_empty());
    assert!(split_text("  \n\n \t \n", 500, 50, &seps).unwrap().is_empty());
}

#[test]
fn short_input_is_a_single_chunk() {
    let text = "A short note about seed saving.";
    let chunks = split_text(text, text.len() + 10, 0, &default_separators()).unwrap();
    assert_eq!(chunks, vec![text.to_string()]);
}

#[test]
fn overlap_not_below_chunk_size_is_a_config_error() {
    let seps = default_separators();
    assert!(matches!(split_text("abc", 10, 10, &seps), Err(Error::Config(_))));
    assert!(matches!(split_text("abc", 10, 20, &seps), Err(Error::Config(_))));
    assert!(matches!(Chunker::new(ChunkerConfig::new(0, 0)), Err(Error::Config(_))));
}

#[test]
fn twelve_hundred_chars_make_three_overlapping_chunks() {
    let text = letters(1200);
    let chunks = split_text(&text, 500, 50, &default_separators()).unwrap();

    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.chars().count() <= 500));
    assert_eq!(chunks[0], text[0..500]);
    assert_eq!(chunks[1], text[450..950]);
    assert_eq!(chunks[2], text[900..1200]);
    assert!(chunks[1].starts_with(&chunks[0][450..]));
}

#[test]
fn normalization_collapses_whitespace_and_blank_lines() {
    let raw = "  Hello   world \n\n\n\n  second\tline  \nthird  \n\n";
    assert_eq!(normalize_text(raw), "Hello world\n\nsecond line\nthird");
}

#[test]
fn large_paragraphs_split_on_paragraph_breaks() {
    let para_a = format!("alpha {}", "a".repeat(300));
    let para_b = format!("bravo {}", "b".repeat(300));
    let para_c = format!("charlie {}", "c".repeat(300));
    let text = format!("{para_a}\n\n{para_b}\n\n{para_c}");

    let chunks = split_text(&text, 400, 40, &default_separators()).unwrap();

    assert_eq!(chunks, vec![para_a, para_b, para_c]);
}

#[test]
fn merged_windows_carry_trailing_pieces_forward() {
    // Four 170-char lines; a 341-char window holds exactly two.
    let lines: Vec<String> = (0..4).map(|i| format!("{i}{}", "x".repeat(169))).collect();
    let text = lines.join("\n");

    let chunks = split_text(&text, 341, 200, &default_separators()).unwrap();

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0], format!("{}\n{}", lines[0], lines[1]));
    assert_eq!(chunks[1], format!("{}\n{}", lines[1], lines[2]));
    assert_eq!(chunks[2], format!("{}\n{}", lines[2], lines[3]));
}

#[test]
fn oversized_piece_is_split_with_finer_separators() {
    let small = "s".repeat(200);
    let big = letters(700);
    let text = format!("{small}\n\n{big}");

    let chunks = split_text(&text, 300, 0, &default_separators()).unwrap();

    assert_eq!(chunks[0], small);
    assert_eq!(chunks[1..].concat(), big);
    assert!(chunks.iter().all(|c| c.chars().count() <= 300));
}

#[test]
fn multibyte_text_is_counted_in_chars() {
    let text = "é".repeat(30);
    let chunks = split_text(&text, 10, 2, &default_separators()).unwrap();
    assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    assert_eq!(chunks.len(), 4);
}

proptest! {
    #[test]
    fn chunks_are_bounded_substrings_of_normalized_text(
        text in "[a-z .\n]{0,1500}",
        size in 20usize..300,
        overlap_pct in 0usize..90,
    ) {
        let overlap = size * overlap_pct / 100;
        let chunks = split_text(&text, size, overlap, &default_separators()).unwrap();
        let normalized = normalize_text(&text);

        prop_assert_eq!(chunks.is_empty(), normalized.is_empty());
        for c in &chunks {
            prop_assert!(!c.is_empty());
            prop_assert!(c.chars().count() <= size);
            prop_assert!(normalized.contains(c.as_str()));
        }
        let again = split_text(&text, size, overlap, &default_separators()).unwrap();
        prop_assert_eq!(chunks, again);
    }

    #[test]
    fn separator_chunks_cover_the_normalized_text_in_order(
        words in prop::collection::vec(("[a-z]{1,8}", prop::sample::select(vec![" ", "  ", "\n", "\n\n", ". "])), 1..150),
        size in 30usize..120,
        overlap_pct in 0usize..25,
    ) {
        let text: String = words.iter().map(|(w, sep)| format!("{w}{sep}")).collect();
        let overlap = size * overlap_pct / 100;
        let chunks = split_text(&text, size, overlap, &default_separators()).unwrap();
        let normalized = normalize_text(&text);

        prop_assert!(!chunks.is_empty());
        prop_assert!(covers_in_order(&normalized, &chunks), "chunks {:?} drop part of {:?}", chunks, normalized);
    }

    #[test]
    fn stride_chunks_reconstruct_unbroken_text(
        text in "[a-z]{1,2000}",
        size in 5usize..400,
        overlap_pct in 0usize..90,
    ) {
        let overlap = size * overlap_pct / 100;
        let chunks = split_text(&text, size, overlap, &default_separators()).unwrap();

        let mut rebuilt = chunks[0].clone();
        for c in &chunks[1..] {
            rebuilt.push_str(&c[overlap..]);
        }
        prop_assert_eq!(rebuilt, text);
    }
}
