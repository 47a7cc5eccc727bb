use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use porter_stemmer::stem;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock, RwLock};

static STOP_WORDS: OnceLock<RwLock<HashMap<&'static str, Arc<HashSet<String>>>>> = OnceLock::new();

/// Stop words for an ISO 639-1 language code. Unknown codes fall back to English.
fn get_stop_words(language: &str) -> Arc<HashSet<String>> {
    let code = stop_word_language(language);
    let cache = STOP_WORDS.get_or_init(|| RwLock::new(HashMap::new()));
    if let Ok(cache) = cache.read() {
        if let Some(words) = cache.get(code.0) {
            return words.clone();
        }
    }
    let words: Arc<HashSet<String>> = Arc::new(
        stop_words::get(code.1)
            .into_iter()
            .map(|x| x.to_string())
            .collect(),
    );
    if let Ok(mut cache) = cache.write() {
        cache.insert(code.0, words.clone());
    }
    words
}

fn stop_word_language(language: &str) -> (&'static str, stop_words::LANGUAGE) {
    use stop_words::LANGUAGE;
    match language.to_lowercase().as_str() {
        "de" => ("de", LANGUAGE::German),
        "es" => ("es", LANGUAGE::Spanish),
        "fr" => ("fr", LANGUAGE::French),
        "it" => ("it", LANGUAGE::Italian),
        "nl" => ("nl", LANGUAGE::Dutch),
        "pl" => ("pl", LANGUAGE::Polish),
        "pt" => ("pt", LANGUAGE::Portuguese),
        "ru" => ("ru", LANGUAGE::Russian),
        "sv" => ("sv", LANGUAGE::Swedish),
        _ => ("en", LANGUAGE::English),
    }
}

/// A character filter receives the original text as a stream of characters and can transform the stream by adding,
/// removing, or changing characters, e.g. to strip HTML elements like <b> from highlighted snippets.
pub trait CharacterFilter: Send + Sync {
    fn filter(&self, text: String) -> String;
}

/// Strips markup, keeping the text of every element except scripts and styles.
/// Input without any `<` is passed through untouched.
#[derive(Debug, Default)]
pub struct HTMLTagFilter;

impl HTMLTagFilter {
    pub fn get_dom(html: &str) -> Option<RcDom> {
        parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut std::io::Cursor::new(html))
            .ok()
    }

    fn walk_html(handle: &Handle, out: &mut String) {
        match &handle.data {
            NodeData::Text { contents } => {
                let s = contents.borrow();
                let s = s.trim();
                if !s.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(s);
                }
            }
            NodeData::Element { name, .. } => {
                if matches!(&*name.local, "script" | "style" | "noscript") {
                    return;
                }
                for child in handle.children.borrow().iter() {
                    Self::walk_html(child, out);
                }
            }
            _ => {
                for child in handle.children.borrow().iter() {
                    Self::walk_html(child, out);
                }
            }
        }
    }
}

impl CharacterFilter for HTMLTagFilter {
    fn filter(&self, html: String) -> String {
        if !html.contains('<') {
            return html;
        }
        match Self::get_dom(&html) {
            Some(dom) => {
                let mut out = String::new();
                Self::walk_html(&dom.document, &mut out);
                out
            }
            None => html,
        }
    }
}

/// A tokenizer receives a stream of characters, breaks it up into individual tokens (usually individual words),
/// and outputs a stream of tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: String) -> Vec<String>;
}

pub struct WhiteSpaceTokenizer;

impl Tokenizer for WhiteSpaceTokenizer {
    fn tokenize(&self, text: String) -> Vec<String> {
        text.split_whitespace()
            .map(|w| w.to_string())
            .collect::<Vec<String>>()
    }
}

/// A token filter receives the token stream and may add, remove, or change tokens.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken>;
}

pub struct LowerCaseTokenFilter;

impl TokenFilter for LowerCaseTokenFilter {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken> {
        tokens
            .into_iter()
            .map(|mut t| {
                t.term = t.term.to_lowercase();
                t
            })
            .collect()
    }
}

/// Removes stop words of one language.
pub struct StopWordTokenFilter {
    language: String,
}

impl StopWordTokenFilter {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

impl Default for StopWordTokenFilter {
    fn default() -> Self {
        Self::new("en")
    }
}

impl TokenFilter for StopWordTokenFilter {
    fn filter(&self, mut tokens: Vec<TextToken>) -> Vec<TextToken> {
        let stop_words = get_stop_words(&self.language);
        tokens.retain(|w| !stop_words.contains(&w.term));
        tokens
    }
}

pub struct PorterStemmerTokenFilter;

impl TokenFilter for PorterStemmerTokenFilter {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken> {
        tokens
            .into_iter()
            .map(|mut w| {
                w.term = stem(&w.term);
                w
            })
            .collect::<Vec<TextToken>>()
    }
}

/// Strips punctuation from tokens and filters out tokens that become empty or are too short
pub struct PunctuationStripFilter {
    min_length: usize,
}

impl PunctuationStripFilter {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Default for PunctuationStripFilter {
    fn default() -> Self {
        Self { min_length: 2 }
    }
}

impl TokenFilter for PunctuationStripFilter {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken> {
        tokens
            .into_iter()
            .filter_map(|mut token| {
                let trimmed: String = token
                    .term
                    .trim_matches(|c: char| !c.is_alphanumeric())
                    .to_string();

                if trimmed.chars().count() >= self.min_length
                    && trimmed.chars().any(|c| c.is_alphanumeric())
                {
                    token.term = trimmed;
                    Some(token)
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Filters out tokens that are purely numeric (like "123", "45.67", etc.)
pub struct NumericTokenFilter;

impl TokenFilter for NumericTokenFilter {
    fn filter(&self, tokens: Vec<TextToken>) -> Vec<TextToken> {
        tokens
            .into_iter()
            .filter(|token| token.term.chars().any(|c| c.is_alphabetic()))
            .collect()
    }
}

/// Pure text analysis pipeline - no async, no IO, just text transformations
pub struct TextAnalyzer {
    char_filters: Vec<Box<dyn CharacterFilter>>,
    tokenizer: Box<dyn Tokenizer>,
    token_filters: Vec<Box<dyn TokenFilter>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextToken {
    pub term: String,
    pub pos: usize,
}

impl std::ops::Deref for TextToken {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.term
    }
}

impl TextAnalyzer {
    pub fn new(
        char_filters: Vec<Box<dyn CharacterFilter>>,
        tokenizer: Box<dyn Tokenizer>,
        token_filters: Vec<Box<dyn TokenFilter>>,
    ) -> Self {
        Self {
            char_filters,
            tokenizer,
            token_filters,
        }
    }

    /// The indexing analyzer: stripped markup, lowercased, stop words removed, stemmed.
    pub fn stemming(language: &str) -> Self {
        Self::new(
            vec![Box::new(HTMLTagFilter)],
            Box::new(WhiteSpaceTokenizer),
            vec![
                Box::new(PunctuationStripFilter::default()),
                Box::new(LowerCaseTokenFilter),
                Box::new(NumericTokenFilter),
                Box::new(StopWordTokenFilter::new(language)),
                Box::new(PorterStemmerTokenFilter),
            ],
        )
    }

    /// Same as [`TextAnalyzer::stemming`] but keeps surface forms, for labels.
    pub fn surface(language: &str) -> Self {
        Self::new(
            vec![Box::new(HTMLTagFilter)],
            Box::new(WhiteSpaceTokenizer),
            vec![
                Box::new(PunctuationStripFilter::default()),
                Box::new(LowerCaseTokenFilter),
                Box::new(NumericTokenFilter),
                Box::new(StopWordTokenFilter::new(language)),
            ],
        )
    }

    /// Lowercased, punctuation-stripped tokens with no stop word or stem step.
    pub fn keyword() -> Self {
        Self::new(
            vec![],
            Box::new(WhiteSpaceTokenizer),
            vec![
                Box::new(PunctuationStripFilter::new(1)),
                Box::new(LowerCaseTokenFilter),
            ],
        )
    }

    pub fn char_filter(&self, mut content: String) -> String {
        for filter in self.char_filters.iter() {
            content = filter.filter(content);
        }
        content
    }

    pub fn tokenize(&self, content: String) -> Vec<TextToken> {
        self.tokenizer
            .tokenize(content)
            .into_iter()
            .enumerate()
            .map(|(pos, term)| TextToken { term, pos })
            .collect()
    }

    pub fn token_filter(&self, mut tokens: Vec<TextToken>) -> Vec<TextToken> {
        for filter in self.token_filters.iter() {
            tokens = filter.filter(tokens);
        }
        tokens
    }

    /// Analyzes raw content and returns a list of tokens
    pub fn analyze(&self, raw_content: &str) -> Vec<TextToken> {
        let content = self.char_filter(raw_content.to_string());
        let tokens = self.tokenize(content);
        self.token_filter(tokens)
    }

    pub fn terms(&self, raw_content: &str) -> Vec<String> {
        self.analyze(raw_content).into_iter().map(|t| t.term).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_tokens(terms: &[&str]) -> Vec<TextToken> {
        terms
            .iter()
            .enumerate()
            .map(|(pos, term)| TextToken {
                term: (*term).to_string(),
                pos,
            })
            .collect()
    }

    fn terms(tokens: Vec<TextToken>) -> Vec<String> {
        tokens.into_iter().map(|t| t.term).collect()
    }

    #[test]
    fn test_html_tag_filter_keeps_highlighted_text() {
        let filter = HTMLTagFilter;
        let filtered = filter.filter("Data <b>mining</b> tools<script>x()</script>".into());
        assert_eq!(filtered, "Data mining tools");
    }

    #[test]
    fn test_html_tag_filter_passes_plain_text() {
        let filter = HTMLTagFilter;
        assert_eq!(filter.filter("just text".into()), "just text");
    }

    #[test]
    fn test_punctuation_strip_filter() {
        let filter = PunctuationStripFilter::default();
        let tokens = mk_tokens(&["!.", "!important", "world!", "...dots...", "a", "ab"]);
        assert_eq!(
            terms(filter.filter(tokens)),
            vec!["important", "world", "dots", "ab"]
        );
    }

    #[test]
    fn test_numeric_token_filter() {
        let filter = NumericTokenFilter;
        let tokens = mk_tokens(&["123", "45.67", "test123", "hello", "2024"]);
        assert_eq!(terms(filter.filter(tokens)), vec!["test123", "hello"]);
    }

    #[test]
    fn test_stop_words_follow_language() {
        let en = StopWordTokenFilter::new("en");
        let de = StopWordTokenFilter::new("de");
        assert_eq!(
            terms(en.filter(mk_tokens(&["the", "clustering"]))),
            vec!["clustering"]
        );
        assert_eq!(
            terms(de.filter(mk_tokens(&["und", "clustering"]))),
            vec!["clustering"]
        );
    }

    #[test]
    fn test_stemming_analyzer() {
        let analyzer = TextAnalyzer::stemming("en");
        let terms = analyzer.terms("The Mining of <em>Clustered</em> documents, 2024!");
        assert!(terms.contains(&"mine".to_string()));
        assert!(terms.contains(&"cluster".to_string()));
        assert!(!terms.contains(&"the".to_string()));
        assert!(!terms.contains(&"2024".to_string()));
    }

    #[test]
    fn test_surface_analyzer_keeps_word_forms() {
        let analyzer = TextAnalyzer::surface("en");
        assert_eq!(analyzer.terms("Clustered Galaxies"), vec!["clustered", "galaxies"]);
    }
}
