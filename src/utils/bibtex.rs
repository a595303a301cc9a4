//! BibTeX reading and writing.
//!
//! Writing is literal: values are emitted as stored, without
//! escaping, one `key = {value},` line per field in stored order.
//!
//! Reading covers the flat single-entry documents Google Scholar serves from
//! its citation export link:
//!
//! ```text
//! @article{smith2020deep,
//!   title={Deep {L}earning},
//!   author={Smith, John and Doe, Jane},
//!   year={2020}
//! }
//! ```

use crate::models::{value_to_text, Publication, BIB_ID_KEY};

/// Citation key used when a record has no `bib_id`
pub const MISSING_KEY: &str = "N/A";

/// Format a publication as a BibTeX `@article` entry.
///
/// The entry ends with a closing brace and a blank line so that entries can
/// be concatenated directly into a `.bib` file.
pub fn format_entry(publication: &Publication) -> String {
    let key = publication
        .bib
        .as_ref()
        .and_then(|bib| bib.bib_id())
        .unwrap_or_else(|| MISSING_KEY.to_string());

    let mut out = format!("@article{{{},\n", key);
    if let Some(bib) = &publication.bib {
        for (field, value) in bib.iter().filter(|(field, _)| *field != BIB_ID_KEY) {
            out.push_str(&format!("  {} = {{{}}},\n", field, value_to_text(value)));
        }
    }
    out.push_str("}\n\n");
    out
}

/// A parsed BibTeX entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibtexEntry {
    /// Entry type, lowercased (`article`, `inproceedings`, ...)
    pub entry_type: String,

    /// Citation key
    pub key: String,

    /// Fields in document order; names lowercased
    pub fields: Vec<(String, String)>,
}

/// Errors raised while reading BibTeX
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BibtexError {
    #[error("no BibTeX entry found")]
    NoEntry,

    #[error("unexpected end of input while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("malformed field near byte {0}")]
    MalformedField(usize),
}

/// Parse the first entry of a BibTeX document.
pub fn parse_entry(input: &str) -> Result<BibtexEntry, BibtexError> {
    let start = input.find('@').ok_or(BibtexError::NoEntry)?;
    let mut cursor = Cursor {
        text: input,
        pos: start + 1,
    };

    let entry_type = cursor.take_while(|c| c != '{' && c != '(').trim().to_lowercase();
    let close = match cursor.next() {
        Some('{') => '}',
        Some('(') => ')',
        _ => return Err(BibtexError::UnexpectedEof("entry header")),
    };
    let key = cursor.take_while(|c| c != ',' && c != close).trim().to_string();

    let mut fields = Vec::new();
    loop {
        cursor.skip_while(|c| c.is_whitespace() || c == ',');
        match cursor.peek() {
            None => return Err(BibtexError::UnexpectedEof("entry body")),
            Some(c) if c == close => break,
            Some(_) => {}
        }

        let name_pos = cursor.pos;
        let name = cursor.take_while(|c| c != '=' && c != close).trim().to_lowercase();
        if name.is_empty() || cursor.next() != Some('=') {
            return Err(BibtexError::MalformedField(name_pos));
        }
        cursor.skip_while(char::is_whitespace);

        let value = match cursor.peek() {
            Some('{') => {
                cursor.next();
                cursor.take_balanced('}')?
            }
            Some('"') => {
                cursor.next();
                cursor.take_balanced('"')?
            }
            Some(_) => cursor
                .take_while(|c| c != ',' && c != close)
                .trim()
                .to_string(),
            None => return Err(BibtexError::UnexpectedEof("field value")),
        };

        fields.push((name, collapse_whitespace(&value)));
    }

    Ok(BibtexEntry {
        entry_type,
        key,
        fields,
    })
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.text[start..self.pos]
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        self.take_while(pred);
    }

    /// Read up to the matching `terminator`, keeping inner braces.
    /// The opening delimiter must already be consumed.
    fn take_balanced(&mut self, terminator: char) -> Result<String, BibtexError> {
        let mut depth = 0usize;
        let mut out = String::new();
        while let Some(c) = self.next() {
            match c {
                '{' => depth += 1,
                '}' if depth > 0 => depth -= 1,
                c if c == terminator && depth == 0 => return Ok(out),
                _ => {}
            }
            out.push(c);
        }
        Err(BibtexError::UnexpectedEof("delimited value"))
    }
}
