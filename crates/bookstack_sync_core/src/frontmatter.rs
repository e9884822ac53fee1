//! Splits a markdown document into its YAML front matter and body, and joins them back.
//!
//! A header is recognised only when the very first line is `---`, ignoring a leading
//! byte order mark and trailing whitespace. It runs until the next such line; the body
//! starts right after that line's ending.

use serde_yaml::{Mapping, Value};

use crate::error::{Result, SyncError};

pub const DELIMITER: &str = "---";

const BYTE_ORDER_MARK: char = '\u{feff}';

pub const KEY_BOOK_ID: &str = "book_id";
pub const KEY_CHAPTER_ID: &str = "chapter_id";
pub const KEY_PAGE_ID: &str = "page_id";
pub const KEY_PAGE_NAME: &str = "page_name";
pub const KEY_CHECKSUM: &str = "checksum";

/// Ordered metadata mapping carried at the top of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    entries: Mapping,
}

/// Typed view over the keys the sync engine understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub book_id: Option<i64>,
    pub chapter_id: Option<i64>,
    pub page_id: Option<i64>,
    pub page_name: Option<String>,
    pub checksum: Option<String>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(entries: Mapping) -> Self {
        Self { entries }
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Insert or replace `key`. Existing keys keep their position.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.entries.insert(Value::from(key), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().filter_map(Value::as_str)
    }

    /// Integer value of `key`. Decimal strings count too, since older documents
    /// stored `page_id` quoted.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// String value of `key`; bare numbers and booleans are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn page_metadata(&self) -> PageMetadata {
        PageMetadata {
            book_id: self.integer(KEY_BOOK_ID),
            chapter_id: self.integer(KEY_CHAPTER_ID),
            page_id: self.integer(KEY_PAGE_ID),
            page_name: self.text(KEY_PAGE_NAME),
            checksum: self.text(KEY_CHECKSUM),
        }
    }
}

/// Split `document` into front matter and body.
///
/// A document without a header yields an empty mapping and the whole text as body.
pub fn split_document(document: &str) -> Result<(FrontMatter, &str)> {
    let document = document.strip_prefix(BYTE_ORDER_MARK).unwrap_or(document);
    let Some(after_open) = strip_delimiter_line(document) else {
        return Ok((FrontMatter::new(), document));
    };

    let mut offset = 0;
    while offset < after_open.len() {
        let rest = &after_open[offset..];
        let line_end = rest.find('\n').map_or(rest.len(), |index| index + 1);
        let line = &rest[..line_end];
        if line.trim_end() == DELIMITER {
            let yaml = &after_open[..offset];
            let body = &rest[line_end..];
            return Ok((parse_header(yaml)?, body));
        }
        offset += line_end;
    }

    Err(SyncError::Format(
        "front matter is missing its closing `---` line".to_string(),
    ))
}

/// Render `front_matter` as a YAML header followed by `body`, unchanged.
pub fn join_document(body: &str, front_matter: &FrontMatter) -> Result<String> {
    let yaml = serde_yaml::to_string(front_matter.as_mapping())
        .map_err(|error| SyncError::Format(format!("failed to serialize front matter: {error}")))?;
    let mut output = String::with_capacity(yaml.len() + body.len() + 8);
    output.push_str(DELIMITER);
    output.push('\n');
    output.push_str(&yaml);
    if !yaml.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(DELIMITER);
    output.push('\n');
    output.push_str(body);
    Ok(output)
}

fn strip_delimiter_line(document: &str) -> Option<&str> {
    let line_end = document.find('\n').map_or(document.len(), |index| index + 1);
    (document[..line_end].trim_end() == DELIMITER).then(|| &document[line_end..])
}

fn parse_header(yaml: &str) -> Result<FrontMatter> {
    if yaml.trim().is_empty() {
        return Ok(FrontMatter::new());
    }
    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|error| SyncError::Format(error.to_string()))?;
    match value {
        Value::Null => Ok(FrontMatter::new()),
        Value::Mapping(entries) => Ok(FrontMatter::from_mapping(entries)),
        other => Err(SyncError::Format(format!(
            "front matter must be a mapping, found {}",
            describe(&other)
        ))),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_without_header_is_all_body() {
        let (front_matter, body) = split_document("# Title\n\ntext\n").expect("split");
        assert!(front_matter.is_empty());
        assert_eq!(body, "# Title\n\ntext\n");
    }

    #[test]
    fn splits_header_and_keeps_body_untrimmed() {
        let document = "---\nbook_id: 3\npage_name: Intro\n---\n\n  Hello\n\n";
        let (front_matter, body) = split_document(document).expect("split");
        assert_eq!(front_matter.integer(KEY_BOOK_ID), Some(3));
        assert_eq!(front_matter.text(KEY_PAGE_NAME).as_deref(), Some("Intro"));
        assert_eq!(body, "\n  Hello\n\n");
    }

    #[test]
    fn accepts_crlf_delimiters() {
        let document = "---\r\npage_id: 12\r\n---\r\nbody\r\n";
        let (front_matter, body) = split_document(document).expect("split");
        assert_eq!(front_matter.integer(KEY_PAGE_ID), Some(12));
        assert_eq!(body, "body\r\n");
    }

    #[test]
    fn empty_header_is_an_empty_mapping() {
        let (front_matter, body) = split_document("---\n---\nHello").expect("split");
        assert!(front_matter.is_empty());
        assert_eq!(body, "Hello");
    }

    #[test]
    fn closing_delimiter_at_end_of_input_gives_empty_body() {
        let (front_matter, body) = split_document("---\npage_id: 1\n---").expect("split");
        assert_eq!(front_matter.integer(KEY_PAGE_ID), Some(1));
        assert_eq!(body, "");
    }

    #[test]
    fn leading_rule_that_is_not_a_delimiter_line_is_body() {
        let (front_matter, body) = split_document("----\ntext").expect("split");
        assert!(front_matter.is_empty());
        assert_eq!(body, "----\ntext");
    }

    #[test]
    fn delimiter_lines_may_carry_trailing_whitespace() {
        let document = "--- \npage_id: 3\npage_name: Intro\n---\t\r\nBody";
        let (front_matter, body) = split_document(document).expect("split");
        assert_eq!(front_matter.integer(KEY_PAGE_ID), Some(3));
        assert_eq!(front_matter.text(KEY_PAGE_NAME).as_deref(), Some("Intro"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn leading_byte_order_mark_is_skipped() {
        let document = "\u{feff}---\npage_id: 3\n---\nBody";
        let (front_matter, body) = split_document(document).expect("split");
        assert_eq!(front_matter.integer(KEY_PAGE_ID), Some(3));
        assert_eq!(body, "Body");

        let (front_matter, body) = split_document("\u{feff}Plain").expect("split");
        assert!(front_matter.is_empty());
        assert_eq!(body, "Plain");
    }

    #[test]
    fn longer_rule_is_not_a_closing_delimiter() {
        let error = split_document("---\npage_id: 3\n----\nBody").expect_err("must fail");
        assert!(matches!(error, SyncError::Format(_)));
    }

    #[test]
    fn unterminated_header_is_a_format_error() {
        let error = split_document("---\npage_id: 1\nHello\n").expect_err("must fail");
        assert!(matches!(error, SyncError::Format(_)));
    }

    #[test]
    fn malformed_yaml_is_a_format_error() {
        let error = split_document("---\npage_id: [1, 2\n---\nbody").expect_err("must fail");
        assert!(matches!(error, SyncError::Format(_)));
    }

    #[test]
    fn non_mapping_header_is_a_format_error() {
        let error = split_document("---\n- a\n- b\n---\nbody").expect_err("must fail");
        assert!(error.to_string().contains("a sequence"));
    }

    #[test]
    fn quoted_integers_are_read_as_integers() {
        let (front_matter, _) = split_document("---\npage_id: \"9\"\n---\n").expect("split");
        assert_eq!(front_matter.integer(KEY_PAGE_ID), Some(9));
    }

    #[test]
    fn page_metadata_reads_recognised_keys() {
        let document = "---\nbook_id: 5\nchapter_id: 7\npage_id: 42\npage_name: Setup\nchecksum: abc\n---\n";
        let (front_matter, _) = split_document(document).expect("split");
        assert_eq!(
            front_matter.page_metadata(),
            PageMetadata {
                book_id: Some(5),
                chapter_id: Some(7),
                page_id: Some(42),
                page_name: Some("Setup".to_string()),
                checksum: Some("abc".to_string()),
            }
        );
    }

    #[test]
    fn unknown_shapes_read_as_absent() {
        let (front_matter, _) =
            split_document("---\npage_id: [1]\nbook_id: nope\n---\n").expect("split");
        let metadata = front_matter.page_metadata();
        assert_eq!(metadata.page_id, None);
        assert_eq!(metadata.book_id, None);
        assert_eq!(metadata.page_name, None);
    }

    #[test]
    fn joined_document_splits_back_to_the_same_parts() {
        let mut front_matter = FrontMatter::new();
        front_matter.insert(KEY_PAGE_NAME, "Intro");
        front_matter.insert("tags", "draft");
        front_matter.insert(KEY_PAGE_ID, 9);
        front_matter.insert(KEY_CHECKSUM, "1234e5");
        let body = "---\nnot a header\n---\ntrailing text without newline";

        let document = join_document(body, &front_matter).expect("join");
        let (parsed, parsed_body) = split_document(&document).expect("split");
        assert_eq!(parsed_body, body);
        assert_eq!(parsed, front_matter);
        assert_eq!(parsed.text(KEY_CHECKSUM).as_deref(), Some("1234e5"));
    }

    #[test]
    fn empty_mapping_still_gets_a_header() {
        let document = join_document("Hello", &FrontMatter::new()).expect("join");
        assert!(document.starts_with("---\n"));
        let (parsed, body) = split_document(&document).expect("split");
        assert!(parsed.is_empty());
        assert_eq!(body, "Hello");
    }

    #[test]
    fn insert_keeps_existing_key_position() {
        let (mut front_matter, body) =
            split_document("---\npage_id: 0\npage_name: Intro\nchecksum: ''\n---\nHello")
                .expect("split");
        front_matter.insert(KEY_PAGE_ID, 9);
        front_matter.insert(KEY_CHECKSUM, "abc");
        assert_eq!(
            front_matter.keys().collect::<Vec<_>>(),
            vec![KEY_PAGE_ID, KEY_PAGE_NAME, KEY_CHECKSUM]
        );
        let document = join_document(body, &front_matter).expect("join");
        assert_eq!(
            document,
            "---\npage_id: 9\npage_name: Intro\nchecksum: abc\n---\nHello"
        );
    }
}
