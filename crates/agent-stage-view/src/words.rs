//! Regroup letters into word wrappers so lines wrap between words.

use agent_stage_core::config::DocumentConfig;

use crate::dom::{Element, Node};
use crate::splitter::Letter;

/// A run of non-whitespace letters, or one whitespace letter kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Word(Vec<Letter>),
    Space(Letter),
}

/// Group letters into words split on whitespace.
///
/// Whitespace letters stay in place as [`Segment::Space`]. Leading, trailing
/// or repeated whitespace never yields an empty word.
pub fn group_words(letters: &[Letter]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut word: Vec<Letter> = Vec::new();

    for letter in letters {
        if letter.whitespace {
            if !word.is_empty() {
                segments.push(Segment::Word(std::mem::take(&mut word)));
            }
            segments.push(Segment::Space(letter.clone()));
        } else {
            word.push(letter.clone());
        }
    }
    if !word.is_empty() {
        segments.push(Segment::Word(word));
    }
    segments
}

fn letter_node(letter: &Letter, names: &DocumentConfig) -> Element {
    Element::new("span")
        .with_class(&names.letter_class)
        .with_text(&letter.text)
}

/// Build the letter/word element structure for a text element's content.
pub fn segments_to_nodes(segments: &[Segment], names: &DocumentConfig) -> Vec<Node> {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Word(letters) => {
                let word = letters.iter().fold(
                    Element::new("span").with_class(&names.word_class),
                    |word, letter| word.with_child(letter_node(letter, names)),
                );
                Node::Element(word)
            }
            Segment::Space(letter) => Node::Element(letter_node(letter, names)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::{LetterSplitter, TextSplitter};

    fn words_of(segments: &[Segment]) -> Vec<String> {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Word(letters) => Some(letters.iter().map(|l| l.text.as_str()).collect()),
                Segment::Space(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_hi_bye() {
        let segments = group_words(&LetterSplitter.split("hi bye"));
        assert_eq!(segments.len(), 3);
        assert_eq!(words_of(&segments), vec!["hi", "bye"]);
        assert_eq!(segments[1], Segment::Space(Letter::new(" ")));
    }

    #[test]
    fn test_word_count_matches_whitespace_split() {
        for text in [
            "one",
            "  leading and trailing  ",
            "double  space",
            "tabs\tand\nnewlines",
            "",
            "   ",
        ] {
            let segments = group_words(&LetterSplitter.split(text));
            let expected: Vec<String> = text.split_whitespace().map(String::from).collect();
            assert_eq!(words_of(&segments), expected, "text: {text:?}");
        }
    }

    #[test]
    fn test_spacing_preserved_verbatim() {
        let segments = group_words(&LetterSplitter.split("a \t b"));
        let spaces: Vec<&str> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Space(l) => Some(l.text.as_str()),
                Segment::Word(_) => None,
            })
            .collect();
        assert_eq!(spaces, vec![" ", "\t", " "]);
    }

    #[test]
    fn test_segments_to_nodes() {
        let names = DocumentConfig::default();
        let segments = group_words(&LetterSplitter.split("hi bye"));
        let nodes = segments_to_nodes(&segments, &names);
        assert_eq!(nodes.len(), 3);

        let first = nodes[0].as_element().unwrap();
        assert!(first.has_class("agent-word"));
        assert_eq!(first.child_elements().count(), 2);
        assert!(first.child_elements().all(|l| l.has_class("agent-letter")));
        assert_eq!(first.text_content(), "hi");

        let space = nodes[1].as_element().unwrap();
        assert!(space.has_class("agent-letter"));
        assert_eq!(space.text_content(), " ");

        let last = nodes[2].as_element().unwrap();
        let letters: Vec<String> = last.child_elements().map(|l| l.text_content()).collect();
        assert_eq!(letters, vec!["b", "y", "e"]);
    }
}
