//! Text similarity for task matching.
//!
//! Two measures are used:
//! - [`task_similarity`]: Jaccard overlap of content terms, for comparing a new
//!   task against stored trajectory tasks.
//! - [`description_coverage`]: the share of a skill description's fixed
//!   vocabulary that a task covers. `{placeholder}` slots are wildcards, so a
//!   task that fills a slot with new words still covers the description fully.
//!
//! Both are case-insensitive, ignore stop words, and apply light stemming.
//! Coverage also accepts acronyms ("HN" covers "Hacker News" and vice versa).

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "i", "me", "my", "we", "our",
    "you", "your", "it", "its", "this", "that", "these", "those", "and", "or", "but", "so",
    "if", "then", "than", "too", "very", "just", "all", "some", "any", "into", "from", "with",
    "for", "on", "at", "to", "of", "in", "by", "up", "about", "please", "can", "could",
];

/// A word of the input text with its byte offsets and normalised form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// Lower-cased and stemmed.
    pub norm: String,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    pub fn is_stop_word(&self) -> bool {
        is_stop_word(&self.norm)
    }

    /// All-caps short words such as "HN" or "NYT".
    pub fn is_acronym(&self) -> bool {
        (2..=6).contains(&self.text.len()) && self.text.chars().all(|c| c.is_ascii_uppercase())
    }

    fn initial(&self) -> Option<char> {
        self.text.chars().next().map(|c| c.to_ascii_lowercase())
    }
}

pub fn is_stop_word(norm: &str) -> bool {
    STOP_WORDS.contains(&norm)
}

/// Lower-case and strip a plural `s` ("tutorials" and "tutorial" compare equal).
pub fn stem(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.len() > 3 && lower.ends_with('s') && !lower.ends_with("ss") {
        lower[..lower.len() - 1].to_string()
    } else {
        lower
    }
}

/// Split text into alphanumeric words.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            tokens.push(make_token(text, s, i));
        }
    }
    if let Some(s) = start {
        tokens.push(make_token(text, s, text.len()));
    }
    tokens
}

fn make_token(text: &str, start: usize, end: usize) -> Token<'_> {
    let word = &text[start..end];
    Token {
        text: word,
        norm: stem(word),
        start,
        end,
    }
}

/// Normalised non-stop-word terms of `text`.
pub fn content_terms(text: &str) -> HashSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !t.is_stop_word())
        .map(|t| t.norm)
        .collect()
}

/// Jaccard similarity of the content terms of two task texts, in `[0, 1]`.
pub fn task_similarity(a: &str, b: &str) -> f64 {
    let a_terms = content_terms(a);
    let b_terms = content_terms(b);
    if a_terms.is_empty() || b_terms.is_empty() {
        return 0.0;
    }
    let intersection = a_terms.intersection(&b_terms).count();
    let union = a_terms.union(&b_terms).count();
    intersection as f64 / union as f64
}

/// Replace every `{name}` slot with a space.
pub fn strip_placeholders(description: &str) -> String {
    let mut out = String::with_capacity(description.len());
    let mut rest = description;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push(' ');
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

/// How a task's words line up with a skill description's fixed words.
#[derive(Debug)]
pub struct Alignment<'a> {
    pub task_tokens: Vec<Token<'a>>,
    /// Per task token: whether the description accounts for it.
    pub explained: Vec<bool>,
    /// Fixed (non-stop) description words covered by the task.
    pub covered: usize,
    /// Fixed (non-stop) description words in total.
    pub total: usize,
}

impl Alignment<'_> {
    /// Share of the description's fixed words the task covers.
    pub fn coverage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.covered as f64 / self.total as f64
        }
    }

    pub fn fully_covered(&self) -> bool {
        self.total > 0 && self.covered == self.total
    }
}

/// Align `task` against the fixed vocabulary of `description`.
pub fn align<'a>(task: &'a str, description: &str) -> Alignment<'a> {
    let stripped = strip_placeholders(description);
    let desc_tokens = tokenize(&stripped);
    let desc_vocab: HashSet<&str> = desc_tokens.iter().map(|t| t.norm.as_str()).collect();
    let fixed: Vec<&Token<'_>> = desc_tokens.iter().filter(|t| !t.is_stop_word()).collect();

    let task_tokens = tokenize(task);
    let task_vocab: HashSet<&str> = task_tokens.iter().map(|t| t.norm.as_str()).collect();

    let mut explained: Vec<bool> = task_tokens
        .iter()
        .map(|t| desc_vocab.contains(t.norm.as_str()))
        .collect();
    let mut fixed_covered: Vec<bool> = fixed
        .iter()
        .map(|t| task_vocab.contains(t.norm.as_str()))
        .collect();

    // Task acronym against a run of description words.
    for (i, token) in task_tokens.iter().enumerate() {
        if explained[i] || !token.is_acronym() {
            continue;
        }
        if let Some(range) = find_initials(&fixed, &token.text.to_ascii_lowercase()) {
            explained[i] = true;
            for covered in &mut fixed_covered[range] {
                *covered = true;
            }
        }
    }

    // Description acronym against a run of task words.
    let task_content: Vec<(usize, &Token<'_>)> = task_tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_stop_word())
        .collect();
    for (j, token) in fixed.iter().enumerate() {
        if fixed_covered[j] || !token.is_acronym() {
            continue;
        }
        let run: Vec<&Token<'_>> = task_content.iter().map(|(_, t)| *t).collect();
        if let Some(range) = find_initials(&run, &token.text.to_ascii_lowercase()) {
            fixed_covered[j] = true;
            for (idx, _) in &task_content[range] {
                explained[*idx] = true;
            }
        }
    }

    Alignment {
        covered: fixed_covered.iter().filter(|c| **c).count(),
        total: fixed.len(),
        task_tokens,
        explained,
    }
}

/// Find consecutive words whose initials spell `letters`.
fn find_initials(words: &[&Token<'_>], letters: &str) -> Option<std::ops::Range<usize>> {
    let letters: Vec<char> = letters.chars().collect();
    let n = letters.len();
    if n < 2 || words.len() < n {
        return None;
    }
    (0..=words.len() - n)
        .find(|&start| {
            words[start..start + n]
                .iter()
                .zip(&letters)
                .all(|(w, l)| w.initial() == Some(*l))
        })
        .map(|start| start..start + n)
}

/// Share of the description's fixed vocabulary covered by the task, in `[0, 1]`.
pub fn description_coverage(task: &str, description: &str) -> f64 {
    align(task, description).coverage()
}
