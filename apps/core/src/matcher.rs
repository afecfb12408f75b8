use crate::cache::{CacheStats, LruCache};
use pinyin::ToPinyinMulti;
use std::collections::HashSet;

pub const DEFAULT_MATCH_CACHE_CAPACITY: usize = 1000;

/// Inclusive `[start, end]` character positions inside the matched label.
pub type Span = [usize; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Abbreviation,
    Phonetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatch {
    pub kind: MatchKind,
    pub spans: Vec<Span>,
}

impl LabelMatch {
    pub fn start(&self) -> usize {
        self.spans.first().map(|span| span[0]).unwrap_or(0)
    }
}

/// Memoizing front for [`match_label`].
pub struct Matcher {
    cache: LruCache<(String, String), Option<LabelMatch>>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_CACHE_CAPACITY)
    }
}

impl Matcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(capacity),
        }
    }

    pub fn matches(&mut self, subject: &str, query: &str) -> Option<LabelMatch> {
        let key = (subject.to_string(), query.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        let found = match_label(subject, query);
        self.cache.put(key, found.clone());
        found
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Tries the abbreviation matcher first and falls back to phonetic matching.
pub fn match_label(subject: &str, query: &str) -> Option<LabelMatch> {
    if let Some(spans) = match_abbreviation(subject, query) {
        return Some(LabelMatch {
            kind: MatchKind::Abbreviation,
            spans,
        });
    }
    match_phonetic(subject, query).map(|spans| LabelMatch {
        kind: MatchKind::Phonetic,
        spans,
    })
}

/// Labels made only of ASCII letters and whitespace can be matched by initials.
pub fn is_abbreviation_candidate(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c.is_ascii_whitespace())
        && (word_starts(text).len() >= 2 || camel_starts(text).len() >= 2)
}

/// Matches `abbr` against the initials of a multi-word label
/// ("Visual Studio Code" / "vsc") or of a camel-cased one ("WeChat" / "wc").
/// Each initial must be consumed in order and the count must equal the
/// query length.
pub fn match_abbreviation(text: &str, abbr: &str) -> Option<Vec<Span>> {
    if text.is_empty() || abbr.is_empty() {
        return None;
    }
    if !text
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c.is_ascii_whitespace())
    {
        return None;
    }
    let letters: Vec<char> = abbr.chars().map(|c| c.to_ascii_lowercase()).collect();
    let chars: Vec<char> = text.chars().collect();

    let words = word_starts(text);
    if words.len() >= 2 && words.len() == letters.len() {
        if let Some(spans) = initials_match(&chars, &words, &letters) {
            return Some(spans);
        }
    }

    let runs = camel_starts(text);
    if runs.len() >= 2 && runs.len() == letters.len() {
        return initials_match(&chars, &runs, &letters);
    }
    None
}

fn initials_match(chars: &[char], starts: &[usize], letters: &[char]) -> Option<Vec<Span>> {
    let mut spans = Vec::with_capacity(starts.len());
    for (start, letter) in starts.iter().zip(letters) {
        if chars[*start].to_ascii_lowercase() != *letter {
            return None;
        }
        spans.push([*start, *start]);
    }
    Some(spans)
}

fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut previous_blank = true;
    for (index, c) in text.chars().enumerate() {
        let blank = c.is_whitespace();
        if !blank && previous_blank {
            starts.push(index);
        }
        previous_blank = blank;
    }
    starts
}

// Each `[A-Z][a-z]*` run starts at its uppercase letter.
fn camel_starts(text: &str) -> Vec<usize> {
    text.chars()
        .enumerate()
        .filter(|(_, c)| c.is_ascii_uppercase())
        .map(|(index, _)| index)
        .collect()
}

enum Reading {
    Blank,
    Spellings(Vec<Vec<char>>),
}

fn reading_of(c: char) -> Reading {
    if c.is_whitespace() {
        return Reading::Blank;
    }
    let mut spellings: Vec<Vec<char>> = vec![c.to_lowercase().collect()];
    if c.is_ascii() {
        return Reading::Spellings(spellings);
    }
    let mut push = |raw: &str| {
        let spelling = romanized_spelling(raw);
        if !spelling.is_empty() && !spellings.contains(&spelling) {
            spellings.push(spelling);
        }
    };
    // Han characters carry every heteronym reading ("行" is both xing and hang).
    match c.to_pinyin_multi() {
        Some(readings) => {
            for reading in readings {
                push(reading.plain());
                if reading.plain().contains('ü') {
                    push(&reading.plain().replace('ü', "v"));
                }
            }
        }
        None => {
            if let Some(romanized) = deunicode::deunicode_char(c) {
                push(romanized);
            }
        }
    }
    Reading::Spellings(spellings)
}

fn romanized_spelling(raw: &str) -> Vec<char> {
    raw.trim()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Matches `query` against the romanized reading of `subject`.
///
/// Every subject character may be consumed by any non-empty prefix of its
/// literal spelling or of any of its readings, so "wx" and "weixin" both hit
/// "微信" and "yh" hits "银行".
/// Whitespace in the query is ignored and whitespace inside the subject may
/// be skipped once a match has started. The result is one contiguous span.
pub fn match_phonetic(subject: &str, query: &str) -> Option<Vec<Span>> {
    let needle: Vec<char> = query
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    if needle.is_empty() || subject.is_empty() {
        return None;
    }
    let readings: Vec<Reading> = subject.chars().map(reading_of).collect();
    let mut dead_ends = HashSet::new();

    for start in 0..readings.len() {
        if matches!(readings[start], Reading::Blank) {
            continue;
        }
        if let Some(end) = consume(&readings, start, &needle, 0, &mut dead_ends) {
            return Some(vec![[start, end]]);
        }
    }
    None
}

fn consume(
    readings: &[Reading],
    position: usize,
    needle: &[char],
    offset: usize,
    dead_ends: &mut HashSet<(usize, usize)>,
) -> Option<usize> {
    if position >= readings.len() || dead_ends.contains(&(position, offset)) {
        return None;
    }
    let found = match &readings[position] {
        Reading::Blank => consume(readings, position + 1, needle, offset, dead_ends),
        Reading::Spellings(spellings) => {
            let rest = &needle[offset..];
            let mut found = None;
            for spelling in spellings {
                let shared = spelling
                    .iter()
                    .zip(rest)
                    .take_while(|(left, right)| left == right)
                    .count();
                for taken in (1..=shared).rev() {
                    if offset + taken == needle.len() {
                        found = Some(position);
                    } else {
                        found = consume(readings, position + 1, needle, offset + taken, dead_ends);
                    }
                    if found.is_some() {
                        break;
                    }
                }
                if found.is_some() {
                    break;
                }
            }
            found
        }
    };
    if found.is_none() {
        dead_ends.insert((position, offset));
    }
    found
}
